use gbsip::config::Config;
use gbsip::{ClientBuilder, DeviceController, NotificationHandler};
use std::sync::Arc;
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting gbsip");

    // Load configuration
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;
    info!(
        "Server {} at {}:{}, local {}:{}",
        config.server.id, config.server.host, config.server.port, config.local.host, config.local.port
    );

    let span = info_span!("client", user = %config.user.name);
    let client = ClientBuilder::new(config.server_options(), config.client_options())
        .handler(Arc::new(NotificationHandler::new()))
        .span(span)
        .build()
        .await?;

    if let Some(local) = client.local_addr().await {
        info!("Registered from {}", local);
    }

    // Make sure the configured device is reachable and idle
    let controller = DeviceController::new(client.clone());
    match controller.stop(&config.device.id).await {
        Ok(response) => info!(
            "Device {} answered stop with {}",
            config.device.id,
            response.status_code()
        ),
        Err(e) => warn!("Device {} did not answer: {}", config.device.id, e),
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    client.shutdown().await;

    Ok(())
}
