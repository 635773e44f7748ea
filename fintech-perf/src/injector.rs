use crate::recorder::Recorder;
use crate::transaction::RECORDER;
use fintech_perf_core::InjectionPhase;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Open-model user injection: iterations start on schedule whether or not
/// earlier ones have completed.
pub(crate) struct Injector<T> {
    scenario: T,
    recorder: Arc<Recorder>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T, F> Injector<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = bool> + Send + 'static,
{
    pub fn new(scenario: T, recorder: Arc<Recorder>) -> Self {
        Self {
            scenario,
            recorder,
            tasks: vec![],
        }
    }

    /// Start every arrival of `phase` and return once the phase's duration has
    /// elapsed. Iterations still running are left in flight.
    pub async fn run_phase(&mut self, phase: &InjectionPhase) {
        let start = Instant::now();
        let end = start + phase.duration();
        let arrivals = phase.arrivals();

        match phase.arrival_interval() {
            None => trace!("Phase `{phase}` has no arrivals."),
            Some(gap) if gap.is_zero() => {
                for _ in 0..arrivals {
                    self.spawn().await;
                }
            }
            Some(gap) => {
                let mut interval = interval_at(start, gap);
                // Catch up on late ticks so the total arrival count holds.
                interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
                for _ in 0..arrivals {
                    interval.tick().await;
                    self.spawn().await;
                }
            }
        }

        sleep_until(end).await;
        debug!(
            "Phase `{phase}` done; {} iterations in flight.",
            self.in_flight()
        );
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Wait for every started iteration to finish.
    pub async fn shutdown(mut self) {
        for task in std::mem::take(&mut self.tasks) {
            self.join(task).await;
        }
    }

    /// Join the iterations that already finished and keep the rest.
    async fn reap(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|t| t.is_finished());
        self.tasks = running;

        for task in finished {
            self.join(task).await;
        }
    }

    /// A task that panicked or was cancelled counts as a failed iteration.
    async fn join(&self, task: JoinHandle<()>) {
        if let Err(err) = task.await {
            error!("Iteration task did not complete: {err}");
            self.recorder.record_iteration(false);
        }
    }

    async fn spawn(&mut self) {
        self.reap().await;

        let scenario = self.scenario.clone();
        let recorder = self.recorder.clone();
        self.tasks.push(tokio::spawn(RECORDER.scope(
            self.recorder.clone(),
            async move {
                let passed = scenario().await;
                recorder.record_iteration(passed);
            },
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::sleep;

    fn tracking_scenario(
        starts: Arc<Mutex<Vec<Instant>>>,
        work: Duration,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync + Clone + 'static
    {
        move || {
            let starts = starts.clone();
            Box::pin(async move {
                starts.lock().unwrap().push(Instant::now());
                sleep(work).await;
                true
            })
        }
    }

    fn offsets_secs(start: Instant, starts: &Mutex<Vec<Instant>>) -> Vec<u64> {
        starts
            .lock()
            .unwrap()
            .iter()
            .map(|t| (*t - start).as_millis() as u64 / 1000)
            .collect()
    }

    fn assert_elapsed(start: Instant, secs: u64) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs(secs) && elapsed < Duration::from_secs(secs) + Duration::from_millis(50),
            "elapsed {elapsed:?}, expected {secs}s"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ramp_spreads_arrivals_evenly() {
        let starts = Arc::new(Mutex::new(vec![]));
        let recorder = Arc::new(Recorder::new(["step"]));
        let mut injector = Injector::new(
            tracking_scenario(starts.clone(), Duration::from_millis(10)),
            recorder.clone(),
        );

        let start = Instant::now();
        injector
            .run_phase(&InjectionPhase::Ramp {
                users: 5,
                duration: Duration::from_secs(20),
            })
            .await;
        assert_elapsed(start, 20);

        injector.shutdown().await;
        assert_eq!(offsets_secs(start, &starts), vec![0, 4, 8, 12, 16]);
        assert_eq!(recorder.collect().iterations_passed, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn constant_rate_starts_rate_times_duration() {
        let starts = Arc::new(Mutex::new(vec![]));
        let recorder = Arc::new(Recorder::new(["step"]));
        let mut injector = Injector::new(
            tracking_scenario(starts.clone(), Duration::from_millis(10)),
            recorder.clone(),
        );

        injector
            .run_phase(&InjectionPhase::ConstantRate {
                users_per_sec: 2.,
                duration: Duration::from_secs(3),
            })
            .await;
        injector.shutdown().await;

        assert_eq!(starts.lock().unwrap().len(), 6);
        assert_eq!(recorder.collect().iterations_passed, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_phase_still_takes_its_duration() {
        let starts = Arc::new(Mutex::new(vec![]));
        let mut injector = Injector::new(
            tracking_scenario(starts.clone(), Duration::ZERO),
            Arc::new(Recorder::new(["step"])),
        );

        let start = Instant::now();
        injector
            .run_phase(&InjectionPhase::ConstantRate {
                users_per_sec: 0.,
                duration: Duration::from_secs(2),
            })
            .await;

        assert_elapsed(start, 2);
        assert!(starts.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn panicked_iterations_count_as_failed() {
        let recorder = Arc::new(Recorder::new(["step"]));
        async fn explode() -> bool {
            panic!("iteration blew up")
        }
        let mut injector = Injector::new(explode, recorder.clone());

        // The first task panics long before the next arrival is spawned.
        injector
            .run_phase(&InjectionPhase::Ramp {
                users: 3,
                duration: Duration::from_secs(3),
            })
            .await;
        assert_eq!(injector.tasks.len(), 1);

        injector.shutdown().await;
        let measurements = recorder.collect();
        assert_eq!(measurements.iterations_failed, 3);
        assert_eq!(measurements.iterations_passed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_slow_iterations() {
        let starts = Arc::new(Mutex::new(vec![]));
        let recorder = Arc::new(Recorder::new(["step"]));
        let mut injector = Injector::new(
            tracking_scenario(starts.clone(), Duration::from_secs(10)),
            recorder.clone(),
        );

        let start = Instant::now();
        injector
            .run_phase(&InjectionPhase::Ramp {
                users: 1,
                duration: Duration::from_secs(1),
            })
            .await;
        assert_eq!(injector.in_flight(), 1);

        injector.shutdown().await;
        assert_elapsed(start, 10);
        assert_eq!(recorder.collect().iterations_passed, 1);
    }
}
