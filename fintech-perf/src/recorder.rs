use crate::measurement::Measurement;
use fintech_perf_core::constants::requests::CONSISTENCY;
use metrics_util::AtomicBucket;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[cfg_attr(not(feature = "metrics"), allow(unused))]
struct RequestLabels {
    success: String,
    error: String,
    latency: String,
}

impl RequestLabels {
    fn new(name: &str) -> Self {
        Self {
            success: format!("{name}_success"),
            error: format!("{name}_error"),
            latency: format!("{name}_latency"),
        }
    }
}

struct RequestAtomics {
    labels: RequestLabels,
    success: AtomicU64,
    error: AtomicU64,
    latency: AtomicBucket<Duration>,
}

impl RequestAtomics {
    fn new(name: &str) -> Self {
        Self {
            labels: RequestLabels::new(name),
            success: AtomicU64::new(0),
            error: AtomicU64::new(0),
            latency: AtomicBucket::new(),
        }
    }
}

/// Lock-free sink for request outcomes shared by every iteration of a run.
///
/// The set of request names is fixed at construction, so recording never
/// touches a lock; only the counters and latency buckets are written.
pub(crate) struct Recorder {
    order: Vec<String>,
    requests: HashMap<String, RequestAtomics>,
    iterations_passed: AtomicU64,
    iterations_failed: AtomicU64,
}

/// Everything measured during a run, per request and overall.
#[derive(Debug, Clone)]
pub(crate) struct Measurements {
    pub global: Measurement,
    /// In journey order, followed by the consistency pseudo-request.
    pub requests: Vec<(String, Measurement)>,
    pub iterations_passed: u64,
    pub iterations_failed: u64,
}

impl Recorder {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut order: Vec<String> = vec![];
        for name in names.into_iter().chain([CONSISTENCY]) {
            if !order.iter().any(|n| n == name) {
                order.push(name.to_string());
            }
        }

        let requests = order
            .iter()
            .map(|name| (name.clone(), RequestAtomics::new(name)))
            .collect();

        Self {
            order,
            requests,
            iterations_passed: AtomicU64::new(0),
            iterations_failed: AtomicU64::new(0),
        }
    }

    /// Record one finished request.
    pub fn record(&self, name: &str, elapsed: Duration, ok: bool) {
        let Some(request) = self.requests.get(name) else {
            error!("Request `{name}` is not part of this run; dropping its measurement.");
            return;
        };

        request.latency.push(elapsed);
        #[cfg(feature = "metrics")]
        {
            metrics::describe_histogram!(request.labels.latency.clone(), metrics::Unit::Nanoseconds, "");
            metrics::histogram!(request.labels.latency.clone()).record(elapsed.as_nanos() as f64);
        }

        self.count(request, ok);
    }

    /// Record the consistency verdict of one iteration. It counts toward the
    /// error rate but carries no latency.
    pub fn record_consistency(&self, ok: bool) {
        if let Some(request) = self.requests.get(CONSISTENCY) {
            self.count(request, ok);
        }
    }

    pub fn record_iteration(&self, passed: bool) {
        if passed {
            self.iterations_passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.iterations_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn count(&self, request: &RequestAtomics, ok: bool) {
        if ok {
            request.success.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "metrics")]
            metrics::counter!(request.labels.success.clone()).increment(1);
        } else {
            request.error.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "metrics")]
            metrics::counter!(request.labels.error.clone()).increment(1);
        }
    }

    /// Drain everything recorded so far.
    pub fn collect(&self) -> Measurements {
        let mut global = Measurement::new();
        let mut requests = Vec::with_capacity(self.order.len());

        for name in &self.order {
            let Some(atomics) = self.requests.get(name) else {
                continue;
            };

            let mut measurement = Measurement::new();
            let success = atomics.success.swap(0, Ordering::Relaxed);
            let error = atomics.error.swap(0, Ordering::Relaxed);
            measurement.add_counts(success, error);
            global.add_counts(success, error);

            atomics.latency.clear_with(|dur| {
                measurement.populate_latencies(dur);
                global.populate_latencies(dur);
            });

            requests.push((name.clone(), measurement));
        }

        Measurements {
            global,
            requests,
            iterations_passed: self.iterations_passed.swap(0, Ordering::Relaxed),
            iterations_failed: self.iterations_failed.swap(0, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_journey_order_and_appends_consistency() {
        let recorder = Recorder::new(["b", "a", "b"]);
        let names: Vec<_> = recorder
            .collect()
            .requests
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["b", "a", CONSISTENCY]);
    }

    #[test]
    #[tracing_test::traced_test]
    fn aggregates_per_request_and_globally() {
        let recorder = Recorder::new(["fund", "balance"]);
        recorder.record("fund", Duration::from_millis(10), true);
        recorder.record("fund", Duration::from_millis(20), false);
        recorder.record("balance", Duration::from_millis(5), true);
        recorder.record("unknown", Duration::from_millis(5), true);
        recorder.record_consistency(false);
        recorder.record_iteration(true);
        recorder.record_iteration(false);

        let measurements = recorder.collect();
        assert_eq!(measurements.global.total(), 4);
        assert_eq!(measurements.global.error, 2);
        assert_eq!(measurements.iterations_passed, 1);
        assert_eq!(measurements.iterations_failed, 1);

        let fund = &measurements.requests[0].1;
        assert_eq!((fund.success, fund.error), (1, 1));
        let consistency = &measurements.requests[2].1;
        assert_eq!((consistency.success, consistency.error), (0, 1));
        assert_eq!(consistency.latency(0.95), Duration::ZERO);
        assert!(logs_contain("Request `unknown` is not part of this run"));
    }

    #[test]
    fn collect_drains() {
        let recorder = Recorder::new(["fund"]);
        recorder.record("fund", Duration::from_millis(10), true);
        assert_eq!(recorder.collect().global.total(), 1);
        assert_eq!(recorder.collect().global.total(), 0);
    }
}
