//! Web server adapter.
//!
//! Exposes the verification engine over HTTP in two shapes: a
//! machine-readable JSON report and an apply-then-redirect flow whose
//! redirect carries a human-readable status summary. Caller identity and
//! role arrive from the fronting auth layer as `X-Actor-Id` /
//! `X-Actor-Role` headers.

mod error;
mod handlers;

pub use error::WebError;
pub use handlers::*;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::ports::catalog_port::CatalogPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::progress_port::ProgressPort;

pub struct AppState {
    pub catalog: Arc<dyn CatalogPort + Send + Sync>,
    pub ledger: Arc<dyn LedgerPort + Send + Sync>,
    pub progress: Arc<dyn ProgressPort + Send + Sync>,
    pub chunk_size: usize,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/verify", post(handlers::verify))
        .route("/verify/apply", post(handlers::verify_apply))
        .with_state(Arc::new(state))
}
