use dashboard_gateway::AppState;
use dashboard_gateway::config::get_configuration;
use dashboard_gateway::startup::build_router;
use dotenvy::dotenv;
use gateway_core::observability::logging::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        "dashboard-gateway",
        "info",
        configuration.observability.otlp_endpoint.as_deref(),
    );

    dashboard_gateway::services::metrics::init_metrics();

    let address = format!(
        "{}:{}",
        configuration.server.host, configuration.server.port
    );

    let state = AppState::new(configuration);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    info!("Starting dashboard-gateway on {}", address);
    axum::serve(listener, app).await.map_err(|e| {
        tracing::error!("Server error: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    Ok(())
}
