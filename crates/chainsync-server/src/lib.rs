//! chainsync-server: HTTP query API and WebSocket event stream.
//!
//! ```text
//! SyncScheduler ──► EventBuffer ◄── GET /events
//!       │
//!       └──► SubscriptionHub ──► AppState::attach ──► broadcast ──► GET /ws
//! ```

pub mod api;
pub mod error;
pub mod state;
pub mod stream;

use std::future::Future;

use tokio::net::TcpListener;

pub use api::router;
pub use error::ServerError;
pub use state::{AppState, NodeInfo, StatusSource, TrackedContract};
pub use stream::connected_frame;

/// Bind a listener on `addr`.
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Serve the API until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "API server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("API server stopped");
    Ok(())
}
