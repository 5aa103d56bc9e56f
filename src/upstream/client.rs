//! Streaming client for the model provider.
//!
//! # Responsibilities
//! - Turn one chat request into one streaming POST
//! - Run the body read loop on its own task
//! - Hand chunks to the caller over a bounded channel
//! - Report at most one terminal error, out-of-band
//!
//! # Data Flow
//! ```text
//! stream()
//!     → serialize payload, build request     (errors returned directly)
//!     → spawn pump task
//!           connect → status check → read loop
//!           each read → split to ≤ buffer → mpsc (capacity 1)
//!           failure   → oneshot error slot, then close
//! ChunkStream
//!     ← next_chunk() until None
//!     ← take_error() once, without blocking
//! ```

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Request;
use tokio::sync::{mpsc, oneshot};

use crate::config::{ApiKey, UpstreamConfig};
use crate::upstream::cancel::CancelSignal;
use crate::upstream::types::{UpstreamError, UpstreamRequest};

/// Client for the single upstream model provider.
///
/// Cheap to share behind an `Arc`; the inner `reqwest::Client` pools
/// connections across requests.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    url: String,
    api_key: ApiKey,
    read_buffer_bytes: usize,
}

impl UpstreamClient {
    /// Build a client with its own connection pool.
    pub fn new(config: &UpstreamConfig, api_key: ApiKey) -> Result<Self, UpstreamError> {
        // No overall timeout: a stream lives as long as its cancellation allows.
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(UpstreamError::Build)?;

        Ok(Self::with_http_client(http, config, api_key))
    }

    /// Build a client around an existing `reqwest::Client`.
    pub fn with_http_client(http: reqwest::Client, config: &UpstreamConfig, api_key: ApiKey) -> Self {
        Self {
            http,
            url: config.url.clone(),
            api_key,
            read_buffer_bytes: config.read_buffer_bytes.max(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start one streaming call.
    ///
    /// Construction failures are returned directly and no task is spawned.
    /// Otherwise the read loop runs in the background until the body ends,
    /// fails, or `cancel` fires.
    pub fn stream(
        &self,
        cancel: CancelSignal,
        input: &str,
        model: &str,
    ) -> Result<ChunkStream, UpstreamError> {
        let request = self.build_request(input, model)?;

        let (chunk_tx, chunk_rx) = mpsc::channel(1);
        let (error_tx, error_rx) = oneshot::channel();

        let pump = Pump {
            chunks: chunk_tx,
            error: error_tx,
            cancel,
            max_chunk: self.read_buffer_bytes,
        };
        tokio::spawn(pump.run(self.http.clone(), request));

        Ok(ChunkStream {
            chunks: chunk_rx,
            error: error_rx,
        })
    }

    fn build_request(&self, input: &str, model: &str) -> Result<Request, UpstreamError> {
        let body = serde_json::to_vec(&UpstreamRequest::streaming(input, model))?;

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key.expose()))
            .map_err(|_| UpstreamError::InvalidCredential)?;
        bearer.set_sensitive(true);

        self.http
            .post(&self.url)
            .header(AUTHORIZATION, bearer)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .body(body)
            .build()
            .map_err(UpstreamError::Build)
    }
}

/// Caller side of one streaming call.
#[derive(Debug)]
pub struct ChunkStream {
    chunks: mpsc::Receiver<Bytes>,
    error: oneshot::Receiver<UpstreamError>,
}

impl ChunkStream {
    /// Next chunk in arrival order, or `None` once the stream is closed.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.chunks.recv().await
    }

    /// The terminal error, if one was posted.
    ///
    /// Never blocks. Meaningful once `next_chunk` has returned `None`: the
    /// error is always posted before the chunk channel closes.
    pub fn take_error(&mut self) -> Option<UpstreamError> {
        self.error.try_recv().ok()
    }
}

/// Producer side of one streaming call.
///
/// Owns both channel ends; every terminal path consumes it, so the chunk
/// channel closes exactly once and the error slot is written at most once.
struct Pump {
    chunks: mpsc::Sender<Bytes>,
    error: oneshot::Sender<UpstreamError>,
    cancel: CancelSignal,
    max_chunk: usize,
}

impl Pump {
    async fn run(mut self, http: reqwest::Client, request: Request) {
        let url = request.url().clone();

        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(%url, "upstream request canceled");
                return;
            }
            res = http.execute(request) => res,
        };

        let mut response = match sent {
            Ok(response) => response,
            Err(e) => return self.fail(UpstreamError::Transport(e)),
        };

        let status = response.status();
        if !status.is_success() {
            return self.fail(UpstreamError::Status(status));
        }
        tracing::debug!(%url, %status, "upstream stream opened");

        // `response` is dropped on every return below, which releases the body.
        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("upstream response read canceled");
                    return;
                }
                read = response.chunk() => read,
            };

            match read {
                Ok(Some(frame)) => {
                    for chunk in split_chunk(frame, self.max_chunk) {
                        if !self.publish(chunk).await {
                            return;
                        }
                    }
                }
                Ok(None) => {
                    tracing::debug!("upstream response read completed");
                    return;
                }
                Err(e) => return self.fail(UpstreamError::Read(e)),
            }
        }
    }

    /// Hand one chunk to the consumer. False means stop quietly.
    async fn publish(&mut self, chunk: Bytes) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!("upstream publish canceled");
                false
            }
            sent = self.chunks.send(chunk) => {
                if sent.is_err() {
                    tracing::debug!("chunk receiver dropped; stopping upstream read");
                }
                sent.is_ok()
            }
        }
    }

    /// Post the terminal error, then close the chunk channel.
    fn fail(self, err: UpstreamError) {
        tracing::warn!(error = %err, "upstream stream failed");
        let Pump { chunks, error, .. } = self;
        let _ = error.send(err);
        drop(chunks);
    }
}

/// Split a body frame into non-empty pieces of at most `max` bytes.
fn split_chunk(mut frame: Bytes, max: usize) -> Vec<Bytes> {
    let mut pieces = Vec::with_capacity(frame.len().div_ceil(max.max(1)));
    while frame.len() > max {
        pieces.push(frame.split_to(max));
    }
    if !frame.is_empty() {
        pieces.push(frame);
    }
    pieces
}
