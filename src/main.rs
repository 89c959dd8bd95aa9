use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use party_queue_rs::server::{build_router, serve};
use party_queue_rs::{
    AccountsRefresher, Clock, CredentialLease, Credentials, Orchestrator, OrchestratorConfig,
    PlaybackMonitor, Settings, SpotifyGateway, SystemClock,
};
use reqwest::Client;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let settings = Settings::from_env()?;

    let client = Client::builder()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .timeout(settings.request_timeout)
        .connect_timeout(settings.request_timeout)
        .build()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let refresher = Arc::new(AccountsRefresher::new(
        client.clone(),
        &settings.accounts_base,
        &settings.client_id,
        &settings.client_secret,
    ));
    let lease = Arc::new(CredentialLease::new(
        Credentials {
            access_token: settings.access_token.clone(),
            refresh_token: settings.refresh_token.clone(),
            ttl_secs: settings.token_ttl_secs,
        },
        clock,
        refresher,
    ));
    let gateway = Arc::new(SpotifyGateway::new(client, &settings.api_base, lease));
    let orchestrator = Arc::new(Orchestrator::new(
        gateway,
        OrchestratorConfig::from(&settings),
    ));

    if let Err(e) = orchestrator.check_device().await {
        warn!(error = %e, "Starting without the target device; playback waits until it shows up");
    }

    let shutdown = CancellationToken::new();
    let monitor = PlaybackMonitor::new(
        orchestrator.clone(),
        settings.monitor_interval,
        settings.advance_threshold_ms,
    )
    .spawn(shutdown.clone());

    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    let router = build_router(orchestrator, settings.static_dir.as_deref());
    let listener = TcpListener::bind(settings.bind_addr).await?;
    info!("Server running on http://{}", settings.bind_addr);

    serve(listener, router, shutdown.clone()).await?;
    shutdown.cancel();
    monitor.await?;

    info!("Shut down cleanly.");
    Ok(())
}

async fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Ctrl-C received, shutting down.");
            shutdown.cancel();
        }
        Err(e) => error!(error = %e, "Could not listen for Ctrl-C"),
    }
}
