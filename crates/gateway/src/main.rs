use common::init_observability;
use gateway::{config::GatewayConfig, serve, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env();

    // Holds the OTLP providers; dropping it flushes pending spans.
    let _telemetry = init_observability("gateway", config.otel_endpoint.as_deref(), config.environment);

    tracing::info!(
        environment = ?config.environment,
        addr = %config.addr,
        settings = %config.settings_path.display(),
        "Gateway starting"
    );

    let state = AppState::build(&config)?;
    serve(&config, state).await
}
