//! HTTP binding for onetime.
//!
//! Exposes the vault over two JSON endpoints plus a static landing page:
//! - `POST /api/encrypt?storeType=<mode>` with form field `data`
//! - `GET /api/decrypt?keyName=<token>`
//! - `GET /`

pub mod routes;

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use onetime_common::Result;
use onetime_vault::Vault;

pub use routes::router;

/// Serve the vault on `listener` until `shutdown` resolves.
///
/// In-flight requests are allowed to finish after `shutdown` fires.
pub async fn serve<F>(listener: TcpListener, vault: Arc<Vault>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, router(vault))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
