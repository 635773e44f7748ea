//! Shared setup for the integration tests.
use fintech_perf::core::{Profile, RuntimeConfig};
use mock_service::Faults;
use std::sync::OnceLock;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::new("fintech_perf=debug,mock_service=debug"))
            .try_init();
    });
}

/// A fresh mock API with the given faults, and a stress-profile config
/// pointing at it. The stress thresholds keep latency noise out of verdicts.
pub async fn mock_api(faults: Faults) -> RuntimeConfig {
    init();

    let addr = mock_service::spawn(faults)
        .await
        .unwrap_or_else(|err| panic!("Unable to start mock service: {err}"));

    RuntimeConfig {
        profile: Profile::Stress,
        api_base_url: format!("http://{addr}"),
        ..RuntimeConfig::default()
    }
}
