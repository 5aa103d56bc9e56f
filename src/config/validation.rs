//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, the upstream URL and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::RelayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("listener.max_body_size must be greater than zero")]
    ZeroBodyLimit,

    #[error("upstream.url '{0}' is not an http(s) URL")]
    UpstreamUrl(String),

    #[error("upstream.api_key_env must not be empty")]
    EmptyKeyVariable,

    #[error("upstream.default_model must not be empty")]
    EmptyDefaultModel,

    #[error("upstream.read_buffer_bytes must be greater than zero")]
    ZeroReadBuffer,

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    let upstream = &config.upstream;
    match Url::parse(&upstream.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::UpstreamUrl(upstream.url.clone())),
    }
    if upstream.api_key_env.trim().is_empty() {
        errors.push(ValidationError::EmptyKeyVariable);
    }
    if upstream.default_model.trim().is_empty() {
        errors.push(ValidationError::EmptyDefaultModel);
    }
    if upstream.read_buffer_bytes == 0 {
        errors.push(ValidationError::ZeroReadBuffer);
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(observability.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
