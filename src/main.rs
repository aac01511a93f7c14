use idlegate::config::Config;
use idlegate::core::Core;
use idlegate::host::DockerHost;
use idlegate::server::FrontDoor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

const PKG_NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path).map_err(|e| {
        anyhow::anyhow!("failed to load configuration from {}: {}", config_path.display(), e)
    })?;

    // Initialize logging
    let default_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                format!("idlegate={}", default_level)
                    .parse()
                    .expect("valid log directive"),
            ),
        )
        .init();

    info!(
        name = PKG_NAME,
        version = VERSION,
        path = %config_path.display(),
        "Starting lazy lifecycle controller"
    );
    info!(
        listen = %config.listen,
        label_prefix = %config.label_prefix,
        stop_delay_secs = config.stop_delay_secs,
        poll_freq_secs = config.poll_freq_secs,
        timeout_secs = config.timeout_secs,
        stop_at_boot = config.stop_at_boot,
        status_host = ?config.status_host,
        "Configuration"
    );

    // Connect to the container host and bring up the controller
    let host = Arc::new(DockerHost::connect(config.docker_host.as_deref()).await?);
    let core = Core::connect(host, config.core_options()).await?;

    if config.stop_at_boot {
        info!("stop_at_boot set, stopping all lazy-managed containers");
        core.stop_all().await;
    }

    // Bring up the front door
    let listen: SocketAddr = config
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address '{}': {}", config.listen, e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let front_door = FrontDoor::new(
        listen,
        Arc::clone(&core),
        config.status_host.clone(),
        shutdown_rx,
    );

    let server_handle = tokio::spawn(async move {
        if let Err(e) = front_door.run().await {
            error!(error = %e, "front door error");
        }
    });

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }

    // Signal shutdown and release the controller
    let _ = shutdown_tx.send(true);
    core.close().await;

    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;

    info!("Shutdown complete");
    Ok(())
}
