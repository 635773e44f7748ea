use crate::recorder::Recorder;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Times a request and records its outcome under `name` with the recorder of
/// the current run. Outside of a run the request is executed unrecorded.
pub async fn transaction_hook<T, R, E>(name: &str, func: T) -> T::Output
where
    T: Future<Output = Result<R, E>>,
{
    let start = Instant::now();
    let res = func.await;
    let elapsed = start.elapsed();

    if RECORDER
        .try_with(|recorder| recorder.record(name, elapsed, res.is_ok()))
        .is_err()
    {
        tracing::error!("No recorder available for `{name}`.");
    }

    res
}

pub(crate) fn record_consistency(ok: bool) {
    let _ = RECORDER.try_with(|recorder| recorder.record_consistency(ok));
}

tokio::task_local! {
    pub(crate) static RECORDER: Arc<Recorder>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn records_under_the_scoped_recorder() {
        let recorder = Arc::new(Recorder::new(["ok", "err"]));

        RECORDER
            .scope(recorder.clone(), async {
                let _ = transaction_hook("ok", async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok::<_, ()>(())
                })
                .await;
                let _ = transaction_hook("err", async { Err::<(), _>("boom") }).await;
                record_consistency(false);
            })
            .await;

        let measurements = recorder.collect();
        let counts: Vec<_> = measurements
            .requests
            .iter()
            .map(|(name, m)| (name.as_str(), m.success, m.error))
            .collect();
        assert_eq!(counts, vec![("ok", 1, 0), ("err", 0, 1), ("consistency", 0, 1)]);
        assert!(measurements.requests[0].1.latency(0.5) >= Duration::from_millis(4));
    }

    #[tokio::test]
    #[traced_test]
    async fn passes_through_without_a_recorder() {
        let res = transaction_hook("orphan", async { Ok::<_, ()>(7) }).await;
        assert_eq!(res, Ok(7));
        assert!(logs_contain("No recorder available for `orphan`"));
    }
}
