//! WebSocket notifier for video encode completion.
//!
//! This crate provides:
//! - The connection supervisor, client actors and one-shot topic rooms
//! - Ownership-gated subscriptions with a fast path for finished jobs
//! - The encoder's publish-completion endpoint
//! - Prometheus metrics and health probes

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod notifier;
pub mod routes;
pub mod state;
pub mod ws;

pub use auth::{Identity, IdentityResolver, TokenVerifier};
pub use catalog::MemoryCatalog;
pub use config::{NotifyConfig, WsConfig};
pub use error::{ApiError, ApiResult};
pub use notifier::Notifier;
pub use routes::create_router;
pub use state::AppState;
