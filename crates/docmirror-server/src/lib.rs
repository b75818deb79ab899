//! Process surface of the docmirror service: configuration, repository
//! HTTP clients, the served replication API, and graceful shutdown.

pub mod api;
pub mod auth;
pub mod client_http;
pub mod config;
pub mod shutdown;

pub use api::router;
pub use auth::{AuthInfo, TokenSource};
pub use client_http::HttpRepository;
pub use config::Config;
pub use shutdown::GracefulShutdown;
