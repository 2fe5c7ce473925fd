use std::net::SocketAddr;

use log::{error, info};
use tokio::net::TcpListener;

use folio::{app, build_state, Config, Logger, WikiError};

#[tokio::main]
async fn main() -> Result<(), WikiError> {
    if let Err(e) = Logger::init() {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let config = Config::load()?;
    let addr = config.socket_addr()?;
    let state = build_state(config)?;

    let guard = state.guard.clone();
    let mut sweep = tokio::time::interval(state.config.sweep_interval());
    tokio::spawn(async move {
        // First tick fires immediately
        sweep.tick().await;
        loop {
            sweep.tick().await;
            guard.sweep();
        }
    });

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind {}: {}", addr, e);
        WikiError::from(e)
    })?;
    info!("Folio listening on http://{}", addr);
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(WikiError::from)
}
