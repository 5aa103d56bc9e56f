//! Chat payloads and upstream error definitions.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body accepted on `POST /chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub input: String,
}

/// A chat request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidChat {
    pub input: String,
    pub model: String,
}

/// Why a decoded chat request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChatRejection {
    #[error("input is required")]
    EmptyInput,
}

impl ChatRequest {
    /// Reject empty input and fill in the model when none was given.
    pub fn validate(self, default_model: &str) -> Result<ValidChat, ChatRejection> {
        if self.input.is_empty() {
            return Err(ChatRejection::EmptyInput);
        }
        let model = match self.model {
            Some(model) if !model.is_empty() => model,
            _ => default_model.to_string(),
        };
        Ok(ValidChat {
            input: self.input,
            model,
        })
    }
}

/// Payload posted to the model provider.
#[derive(Debug, Serialize)]
pub struct UpstreamRequest<'a> {
    pub model: &'a str,
    pub input: &'a str,
    pub stream: bool,
}

impl<'a> UpstreamRequest<'a> {
    pub fn streaming(input: &'a str, model: &'a str) -> Self {
        Self {
            model,
            input,
            stream: true,
        }
    }
}

/// Errors that can occur while talking to the model provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request payload could not be serialized.
    #[error("failed to marshal request: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The HTTP request could not be constructed.
    #[error("failed to create upstream request: {0}")]
    Build(#[source] reqwest::Error),

    /// The API key is not a valid header value.
    #[error("api key is not a valid header value")]
    InvalidCredential,

    /// The provider answered with a non-success status.
    #[error("upstream returned non-success status: {0}")]
    Status(StatusCode),

    /// The request could not be delivered.
    #[error("upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The response body broke off mid-stream.
    #[error("error reading upstream response: {0}")]
    Read(#[source] reqwest::Error),
}

impl UpstreamError {
    /// True for failures raised before any connection was attempted.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            UpstreamError::Serialize(_) | UpstreamError::Build(_) | UpstreamError::InvalidCredential
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Serialize(_) => "serialize",
            UpstreamError::Build(_) => "build",
            UpstreamError::InvalidCredential => "credential",
            UpstreamError::Status(_) => "status",
            UpstreamError::Transport(_) => "transport",
            UpstreamError::Read(_) => "read",
        }
    }
}
