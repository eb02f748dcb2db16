//! # Gateway - Refresh endpoint and mutation authorization for syncgate
//!
//! The gateway sits between clients and two backends:
//! - the auth service, which owns sessions and mints tokens. The gateway's
//!   refresh endpoint turns a valid session into the three identity cookies.
//! - the sync engine, which applies mutation batches. The gateway verifies
//!   the bearer token on every push and forwards the batch with the verified
//!   caller context, never anything the caller claimed about itself.

pub mod api;
pub mod auth_service;
pub mod config;
pub mod error;
pub mod logging;
pub mod logout;
pub mod mutation;
pub mod refresh;

pub use api::{create_router, ApiState};
pub use auth_service::{AuthService, AuthSession, HttpAuthService};
pub use config::GatewayConfig;
pub use error::{GatewayError, ProcessorError, Result};
pub use logout::LogoutService;
pub use mutation::{AnonymousPolicy, HttpMutationProcessor, MutationGateway, MutationProcessor, Rejection};
pub use refresh::{CookiePolicy, RefreshService};

use std::future::Future;

use tokio::net::TcpListener;
use tracing::info;

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve(listener: TcpListener, state: ApiState, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    info!("Gateway listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
