use ofr_backoffice::{ApiClient, AppState, Config, Dashboard, SessionEvent, SessionGuard, Storage, router};
use std::net::SocketAddr;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env();
    let storage = Storage::open(&config.storage_path).await?;
    let session = SessionGuard::load(storage, config.redirect_delay).await;
    let _watcher = session.spawn_watcher(config.storage_poll_interval);
    tokio::spawn(log_session_events(session.clone()));

    let api = ApiClient::new(&config.api_base_url, config.request_timeout)?;
    let dashboard = Dashboard::new(api, session.clone(), config.stale_window);
    dashboard.mount();

    let app = router(AppState::new(session, dashboard));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("api at {}", config.api_base_url);
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn log_session_events(session: SessionGuard) {
    let mut events = session.subscribe_events();
    loop {
        match events.recv().await {
            Ok(SessionEvent::Expired { redirect_to, after }) => {
                warn!("session expired; dashboard redirects to {redirect_to} after {after:?}");
            }
            Ok(SessionEvent::SignedIn) => info!("session started"),
            Err(RecvError::Lagged(skipped)) => warn!("missed {skipped} session events"),
            Err(RecvError::Closed) => return,
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
