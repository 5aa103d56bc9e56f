//! Streaming chat relay library.
//!
//! Accepts a chat request from a browser, forwards it to one upstream
//! model provider and streams the provider's response body back as it
//! arrives.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod upstream;

pub use config::RelayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use upstream::UpstreamClient;
