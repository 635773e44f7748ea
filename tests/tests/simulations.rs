use fintech_perf_tests::*;

use fintech_perf::core::constants::requests::{self, CONSISTENCY};
use fintech_perf::prelude::*;
use fintech_perf::EngineError;
use mock_service::Faults;
use std::num::NonZeroU32;
use std::time::Duration;

fn ramp(users: u64) -> Vec<InjectionPhase> {
    vec![InjectionPhase::Ramp {
        users,
        duration: Duration::from_millis(500),
    }]
}

async fn run(kind: SimulationKind, config: &RuntimeConfig, users: u64) -> RunReport {
    Simulation::from_config(kind, config)
        .injection(ramp(users))
        .await
        .unwrap()
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn auth_passes() {
    let config = mock_api(Faults::default()).await;
    let report = run(SimulationKind::Auth, &config, 3).await;

    assert!(report.passed(), "{report}");
    assert_eq!(report.iterations_passed, 3);
    assert_eq!(report.request(requests::auth::LOGIN).unwrap().total, 3);
    assert!(report.request(CONSISTENCY).is_none());
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn funding_passes_against_a_consistent_api() {
    let config = mock_api(Faults::default()).await;
    let report = run(SimulationKind::Funding, &config, 4).await;

    assert!(report.passed(), "{report}");
    assert_eq!(report.iterations_passed, 4);
    assert_eq!(report.iterations_failed, 0);
    assert_eq!(report.global.failed, 0);
    assert_eq!(report.request(requests::funding::FUND).unwrap().total, 4);
    assert_eq!(report.request(CONSISTENCY).unwrap().total, 4);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn balance_drift_within_tolerance_passes() {
    let config = mock_api(Faults::default().balance_skew(0.00005)).await;
    let report = run(SimulationKind::Funding, &config, 2).await;

    assert!(report.passed(), "{report}");
    assert_eq!(report.request(CONSISTENCY).unwrap().failed, 0);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn skewed_balance_fails_funding_consistency() {
    let config = mock_api(Faults::default().balance_skew(0.5)).await;
    let report = run(SimulationKind::Funding, &config, 4).await;

    assert!(!report.passed(), "{report}");
    assert_eq!(report.iterations_failed, 4);
    assert_eq!(report.request(CONSISTENCY).unwrap().failed, 4);
    // Every request itself succeeded; only the verdicts count as failures.
    assert_eq!(report.request(requests::funding::BALANCE).unwrap().failed, 0);
    assert_eq!(report.global.failed, 4);

    let failed: Vec<_> = report.failed_assertions().map(|a| &a.assertion).collect();
    assert_eq!(
        failed,
        vec![&Assertion::GlobalErrorRate { max_percent: 2.0 }]
    );
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn payment_passes_against_a_consistent_api() {
    let config = mock_api(Faults::default()).await;
    let report = run(SimulationKind::Payment, &config, 3).await;

    assert!(report.passed(), "{report}");
    assert_eq!(report.iterations_passed, 3);
    assert_eq!(report.request(requests::payment::TRANSFER).unwrap().total, 3);
    assert_eq!(report.request(CONSISTENCY).unwrap().failed, 0);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn missing_history_fails_payment_consistency() {
    let config = mock_api(Faults::default().drop_history()).await;
    let report = run(SimulationKind::Payment, &config, 3).await;

    assert!(!report.passed(), "{report}");
    assert_eq!(report.iterations_failed, 3);
    assert_eq!(report.request(CONSISTENCY).unwrap().failed, 3);
    assert_eq!(
        report.request(requests::payment::PAYER_TRANSACTIONS).unwrap().failed,
        0
    );
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn unexpected_payment_status_stops_the_journey() {
    let config = mock_api(Faults::default().payment_status("PENDING")).await;
    let report = run(SimulationKind::Payment, &config, 3).await;

    assert!(!report.passed(), "{report}");
    assert_eq!(report.iterations_failed, 3);
    assert_eq!(report.request(requests::payment::TRANSFER).unwrap().failed, 3);
    // Later steps and the consistency check never ran.
    assert!(report.request(requests::payment::PAYER_BALANCE).is_none());
    assert!(report.request(CONSISTENCY).is_none());

    let transfer_failures = Assertion::RequestNoFailures {
        request: requests::payment::TRANSFER.to_string(),
    };
    assert!(report
        .failed_assertions()
        .any(|a| a.assertion == transfer_failures));
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn throttled_api_breaches_error_rate() {
    let config = mock_api(Faults::default().max_tps(NonZeroU32::new(1).unwrap())).await;
    let report = Simulation::from_config(SimulationKind::Auth, &config)
        .injection(vec![InjectionPhase::Ramp {
            users: 10,
            duration: Duration::ZERO,
        }])
        .await
        .unwrap();

    assert!(!report.passed(), "{report}");
    assert!(report.global.failed >= 8, "{report}");
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn slow_api_times_out_the_first_step() {
    let config = RuntimeConfig {
        request_timeout: Duration::from_millis(50),
        ..mock_api(Faults::default().latency(Duration::from_millis(300))).await
    };
    let report = run(SimulationKind::Auth, &config, 2).await;

    assert!(!report.passed(), "{report}");
    assert_eq!(report.iterations_failed, 2);
    assert_eq!(report.request(requests::auth::REGISTER).unwrap().failed, 2);
    assert!(report.request(requests::auth::LOGIN).is_none());
    assert_eq!(report.global.error_rate_percent, 100.);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn unreachable_api_fails_every_iteration() {
    init();
    let config = RuntimeConfig {
        profile: Profile::Stress,
        api_base_url: "http://127.0.0.1:9".to_string(),
        request_timeout: Duration::from_secs(2),
        ..RuntimeConfig::default()
    };
    let report = run(SimulationKind::Funding, &config, 2).await;

    assert!(!report.passed());
    assert_eq!(report.iterations_failed, 2);
    assert_eq!(report.global.error_rate_percent, 100.);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn invalid_base_url_is_rejected_before_load() {
    init();
    let plan = SimulationKind::Auth.plan(&RuntimeConfig::default());
    let res = Simulation::new(plan, "not a url").await;

    assert!(matches!(res, Err(EngineError::InvalidBaseUrl(_))));
}
