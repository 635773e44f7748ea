//! Simulation runner
use crate::http::Transport;
use crate::injector::Injector;
use crate::iteration::run_iteration;
use crate::recorder::Recorder;
use crate::{EngineError, RunReport};
use fintech_perf_core::{Assertion, InjectionPhase, RuntimeConfig, SimulationKind, SimulationPlan};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// A runnable simulation: one journey injected against the API and judged by
/// its assertions.
///
/// Awaiting it drives the whole run and yields the [`RunReport`].
///
/// # Example
/// ```no_run
/// use fintech_perf::prelude::*;
///
/// #[tokio::main]
/// async fn main() {
///     let config = RuntimeConfig::load(Properties::new()).unwrap();
///     let report = Simulation::from_config(SimulationKind::Funding, &config)
///         .await
///         .unwrap();
///     println!("{report}");
/// }
/// ```
#[pin_project::pin_project]
pub struct Simulation {
    plan: SimulationPlan,
    base_url: String,
    runner_fut: Option<Pin<Box<dyn Future<Output = Result<RunReport, EngineError>> + Send>>>,
}

impl Simulation {
    pub fn new(plan: SimulationPlan, base_url: impl Into<String>) -> Self {
        Self {
            plan,
            base_url: base_url.into(),
            runner_fut: None,
        }
    }

    /// One of the built-in simulations, configured from `config`.
    pub fn from_config(kind: SimulationKind, config: &RuntimeConfig) -> Self {
        Self::new(kind.plan(config), config.api_base_url.clone())
    }

    pub fn plan(&self) -> &SimulationPlan {
        &self.plan
    }

    /// Replace the injection profile.
    pub fn injection(mut self, phases: Vec<InjectionPhase>) -> Self {
        self.plan.injection = phases;
        self
    }

    /// Add an assertion on top of the plan's own.
    pub fn assertion(mut self, assertion: Assertion) -> Self {
        self.plan.assertions.push(assertion);
        self
    }

    /// Replace all assertions.
    pub fn assertions(mut self, assertions: Vec<Assertion>) -> Self {
        self.plan.assertions = assertions;
        self
    }
}

impl Future for Simulation {
    type Output = Result<RunReport, EngineError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if this.runner_fut.is_none() {
            let plan = this.plan.clone();
            let base_url = this.base_url.clone();
            *this.runner_fut = Some(Box::pin(run_simulation(plan, base_url)));
        }

        if let Some(runner) = this.runner_fut {
            runner.as_mut().poll(cx)
        } else {
            unreachable!()
        }
    }
}

#[instrument(name = "simulation", skip_all, fields(name = %plan.scenario.name))]
pub(crate) async fn run_simulation(
    plan: SimulationPlan,
    base_url: String,
) -> Result<RunReport, EngineError> {
    info!("Running {} against {base_url}", plan.scenario.name);

    let transport = Arc::new(Transport::new(&base_url)?);
    let recorder = Arc::new(Recorder::new(plan.scenario.request_names()));
    let scenario = Arc::new(plan.scenario.clone());

    let iteration = move || {
        let transport = transport.clone();
        let scenario = scenario.clone();
        async move { run_iteration(&transport, &scenario).await.is_passed() }
    };

    let start = Instant::now();
    let mut injector = Injector::new(iteration, recorder.clone());
    for (i, phase) in plan.injection.iter().enumerate() {
        info!("Phase {}/{}: {phase}", i + 1, plan.injection.len());
        injector.run_phase(phase).await;
    }

    debug!("Injection complete; draining {} iterations.", injector.in_flight());
    injector.shutdown().await;

    let report = RunReport::new(
        &plan.scenario.name,
        start.elapsed(),
        &recorder.collect(),
        &plan.assertions,
    );

    for failed in report.failed_assertions() {
        warn!("Assertion failed: {failed}");
    }
    info!("Simulation complete");

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn builder_adjusts_the_plan() {
        let config = RuntimeConfig::default();
        let phase = InjectionPhase::Ramp {
            users: 1,
            duration: Duration::from_secs(1),
        };

        let simulation = Simulation::from_config(SimulationKind::Funding, &config)
            .injection(vec![phase])
            .assertion(Assertion::GlobalP95 { max_ms: 5 });

        assert_eq!(simulation.plan().injection, vec![phase]);
        assert_eq!(
            simulation.plan().assertions.last(),
            Some(&Assertion::GlobalP95 { max_ms: 5 })
        );
        assert_eq!(simulation.base_url, config.api_base_url);

        let simulation = simulation.assertions(vec![]);
        assert!(simulation.plan().assertions.is_empty());
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn empty_schedule_reports_without_load() {
        let plan = SimulationKind::Auth.plan(&RuntimeConfig::default());
        let report = Simulation::new(plan, "http://127.0.0.1:9")
            .injection(vec![])
            .await
            .unwrap();

        assert_eq!(report.global.total, 0);
        assert!(report.requests.is_empty());
        // Nothing ran, so nothing breached a threshold.
        assert!(report.passed());
    }
}
