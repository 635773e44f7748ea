use pdatastructs::tdigest::{TDigest, K1};
use std::fmt;
use std::time::Duration;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;
const TDIGEST_COMPRESSION: f64 = 100.;

/// Outcome counts and latency distribution for one request name, or for the
/// whole run.
#[derive(Debug, Clone)]
pub(crate) struct Measurement {
    pub success: u64,
    pub error: u64,
    latency: TDigest<K1>,
    latency_count: usize,
}

impl Measurement {
    pub fn new() -> Self {
        Self {
            success: 0,
            error: 0,
            latency: default_tdigest(),
            latency_count: 0,
        }
    }

    pub fn add_counts(&mut self, success: u64, error: u64) {
        self.success += success;
        self.error += error;
    }

    pub fn populate_latencies(&mut self, dur: &[Duration]) {
        for latency in dur {
            self.latency.insert(latency.as_secs_f64());
        }
        self.latency_count += dur.len();
    }

    pub fn total(&self) -> u64 {
        self.success + self.error
    }

    /// Failed share of all outcomes, in percent. Zero when nothing ran.
    pub fn error_rate_percent(&self) -> f64 {
        match self.total() {
            0 => 0.,
            total => self.error as f64 / total as f64 * 100.,
        }
    }

    pub fn latency(&self, quantile: f64) -> Duration {
        if self.latency_count == 0 {
            return Duration::ZERO;
        }

        let secs = self.latency.quantile(quantile);

        // TDigest can hand back NaN for degenerate inputs.
        let secs = if secs.is_finite() && secs >= 0. {
            secs
        } else {
            error!("Non-finite latency quantile {quantile}; reporting 0.");
            0.
        };

        Duration::from_secs_f64(secs)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Requests={}, Failed={:.2}%, p50={:?}, p95={:?}, p99={:?}",
            self.total(),
            self.error_rate_percent(),
            self.latency(0.5),
            self.latency(0.95),
            self.latency(0.99),
        )
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(TDIGEST_COMPRESSION), TDIGEST_BACKLOG_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rate_in_percent() {
        let mut m = Measurement::new();
        assert_eq!(m.error_rate_percent(), 0.);

        m.add_counts(199, 1);
        assert_eq!(m.total(), 200);
        assert!((m.error_rate_percent() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_latency_is_zero() {
        assert_eq!(Measurement::new().latency(0.95), Duration::ZERO);
    }

    #[test]
    fn p95_of_uniform_latencies() {
        let mut m = Measurement::new();
        let latencies: Vec<_> = (1..=1000).map(Duration::from_millis).collect();
        m.populate_latencies(&latencies);

        let p95 = m.latency(0.95).as_millis();
        assert!((930..=970).contains(&p95), "p95 was {p95}ms");
        let p50 = m.latency(0.5).as_millis();
        assert!((470..=530).contains(&p50), "p50 was {p50}ms");
    }
}
