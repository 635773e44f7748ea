use mock_service::Faults;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mock_service=debug,tower_http=debug")),
        )
        .init();

    let addr: SocketAddr = std::env::var("MOCK_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;

    let mut faults = Faults::default();
    if let Ok(tps) = std::env::var("MOCK_MAX_TPS") {
        faults = faults.max_tps(tps.parse::<NonZeroU32>()?);
    }

    info!("Mock financial API listening on {addr}");
    mock_service::run(addr, faults).await?;
    Ok(())
}
