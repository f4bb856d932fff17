//! Inbound HTTP surface: session-gated dashboard and form, plain-text
//! download, status check, and the API-key protected JSON API.

mod api_handlers;
mod auth_runtime;
mod endpoints;
mod server_bootstrap;
mod status_runtime;
mod types;
mod web_handlers;
mod web_pages;

pub use endpoints::*;
pub use server_bootstrap::{build_gateway_router, run_gateway_server, GatewayConfig, GatewayState};
pub use types::ApiError;
