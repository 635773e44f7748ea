//! End-of-run summaries and assertion verdicts.
use crate::measurement::Measurement;
use crate::recorder::Measurements;
use fintech_perf_core::Assertion;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSummary {
    pub name: String,
    pub total: u64,
    pub failed: u64,
    pub error_rate_percent: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl RequestSummary {
    fn new(name: &str, measurement: &Measurement) -> Self {
        Self {
            name: name.to_string(),
            total: measurement.total(),
            failed: measurement.error,
            error_rate_percent: measurement.error_rate_percent(),
            p50_ms: millis(measurement.latency(0.5)),
            p95_ms: millis(measurement.latency(0.95)),
            p99_ms: millis(measurement.latency(0.99)),
        }
    }
}

impl fmt::Display for RequestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<32} total={:<6} failed={:<6} ({:>6.2}%) p50={:>8.1}ms p95={:>8.1}ms p99={:>8.1}ms",
            self.name,
            self.total,
            self.failed,
            self.error_rate_percent,
            self.p50_ms,
            self.p95_ms,
            self.p99_ms,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssertionResult {
    pub assertion: Assertion,
    /// The measured value the assertion was checked against.
    pub actual: f64,
    pub passed: bool,
}

impl fmt::Display for AssertionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "OK" } else { "KO" };
        write!(f, "[{verdict}] {} (actual {:.2})", self.assertion, self.actual)
    }
}

/// Outcome of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub scenario: String,
    pub elapsed_ms: u64,
    pub iterations_passed: u64,
    pub iterations_failed: u64,
    pub global: RequestSummary,
    pub requests: Vec<RequestSummary>,
    pub assertions: Vec<AssertionResult>,
}

impl RunReport {
    pub(crate) fn new(
        scenario: &str,
        elapsed: Duration,
        measurements: &Measurements,
        assertions: &[Assertion],
    ) -> Self {
        let requests = measurements
            .requests
            .iter()
            .filter(|(_, m)| m.total() > 0)
            .map(|(name, m)| RequestSummary::new(name, m))
            .collect();

        Self {
            scenario: scenario.to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
            iterations_passed: measurements.iterations_passed,
            iterations_failed: measurements.iterations_failed,
            global: RequestSummary::new("global", &measurements.global),
            requests,
            assertions: assertions
                .iter()
                .map(|a| evaluate(a, measurements))
                .collect(),
        }
    }

    /// Whether every assertion held.
    pub fn passed(&self) -> bool {
        self.assertions.iter().all(|a| a.passed)
    }

    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionResult> {
        self.assertions.iter().filter(|a| !a.passed)
    }

    pub fn request(&self, name: &str) -> Option<&RequestSummary> {
        self.requests.iter().find(|r| r.name == name)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({}): {} iterations passed, {} failed",
            self.scenario,
            humantime::format_duration(Duration::from_millis(self.elapsed_ms)),
            self.iterations_passed,
            self.iterations_failed,
        )?;
        writeln!(f, "{}", self.global)?;
        for request in &self.requests {
            writeln!(f, "{request}")?;
        }
        for assertion in &self.assertions {
            writeln!(f, "{assertion}")?;
        }
        Ok(())
    }
}

fn millis(dur: Duration) -> f64 {
    dur.as_secs_f64() * 1000.
}

/// A request-scoped assertion on a request that never ran holds trivially.
fn evaluate(assertion: &Assertion, measurements: &Measurements) -> AssertionResult {
    let request = |name: &str| {
        measurements
            .requests
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m)
            .filter(|m| m.total() > 0)
    };

    let (actual, passed) = match assertion {
        Assertion::GlobalErrorRate { max_percent } => {
            let rate = measurements.global.error_rate_percent();
            (rate, rate <= *max_percent)
        }
        Assertion::GlobalP95 { max_ms } => {
            let p95 = millis(measurements.global.latency(0.95));
            (p95, p95 <= *max_ms as f64)
        }
        Assertion::RequestNoFailures { request: name } => match request(name) {
            Some(m) => (m.error_rate_percent(), m.error == 0),
            None => (0., true),
        },
        Assertion::RequestP95 {
            request: name,
            max_ms,
        } => match request(name) {
            Some(m) => {
                let p95 = millis(m.latency(0.95));
                (p95, p95 <= *max_ms as f64)
            }
            None => (0., true),
        },
    };

    AssertionResult {
        assertion: assertion.clone(),
        actual,
        passed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::Recorder;
    use fintech_perf_core::constants::requests::CONSISTENCY;

    fn measurements() -> Measurements {
        let recorder = Recorder::new(["fund", "balance", "idle"]);
        for _ in 0..99 {
            recorder.record("fund", Duration::from_millis(20), true);
        }
        recorder.record("fund", Duration::from_millis(20), false);
        for _ in 0..100 {
            recorder.record("balance", Duration::from_millis(900), true);
        }
        recorder.record_iteration(true);
        recorder.collect()
    }

    #[test]
    fn error_rate_and_no_failure_assertions() {
        let report = RunReport::new(
            "Funding",
            Duration::from_secs(1),
            &measurements(),
            &[
                Assertion::GlobalErrorRate { max_percent: 1.0 },
                Assertion::GlobalErrorRate { max_percent: 0.1 },
                Assertion::RequestNoFailures {
                    request: "fund".to_string(),
                },
                Assertion::RequestNoFailures {
                    request: "balance".to_string(),
                },
            ],
        );

        let verdicts: Vec<_> = report.assertions.iter().map(|a| a.passed).collect();
        assert_eq!(verdicts, vec![true, false, false, true]);
        assert!((report.assertions[0].actual - 0.5).abs() < 1e-9);
        assert!(!report.passed());
        assert_eq!(report.failed_assertions().count(), 2);
    }

    #[test]
    fn p95_assertions() {
        let report = RunReport::new(
            "Funding",
            Duration::from_secs(1),
            &measurements(),
            &[
                Assertion::RequestP95 {
                    request: "fund".to_string(),
                    max_ms: 100,
                },
                Assertion::RequestP95 {
                    request: "balance".to_string(),
                    max_ms: 500,
                },
                Assertion::GlobalP95 { max_ms: 500 },
            ],
        );

        let verdicts: Vec<_> = report.assertions.iter().map(|a| a.passed).collect();
        assert_eq!(verdicts, vec![true, false, false]);
    }

    #[test]
    fn assertions_on_requests_that_never_ran_hold() {
        let report = RunReport::new(
            "Funding",
            Duration::from_secs(1),
            &measurements(),
            &[
                Assertion::RequestNoFailures {
                    request: "idle".to_string(),
                },
                Assertion::RequestP95 {
                    request: "unknown".to_string(),
                    max_ms: 1,
                },
            ],
        );
        assert!(report.passed());
    }

    #[test]
    fn summaries_skip_empty_requests() {
        let report = RunReport::new("Funding", Duration::from_secs(1), &measurements(), &[]);
        let names: Vec<_> = report.requests.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["fund", "balance"]);
        assert!(report.request(CONSISTENCY).is_none());
        assert_eq!(report.global.total, 200);
        assert_eq!(report.iterations_passed, 1);
        assert!(report.passed());
    }

    #[test]
    fn serializes_to_json() {
        let report = RunReport::new(
            "Funding",
            Duration::from_millis(1500),
            &measurements(),
            &[Assertion::GlobalErrorRate { max_percent: 1.0 }],
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["scenario"], "Funding");
        assert_eq!(json["elapsed_ms"], 1500);
        assert_eq!(json["assertions"][0]["assertion"]["kind"], "global_error_rate");
        assert_eq!(json["assertions"][0]["passed"], true);
    }
}
