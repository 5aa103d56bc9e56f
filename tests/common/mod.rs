//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use futures_util::stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use chat_relay::config::{ApiKey, RelayConfig};
use chat_relay::{HttpServer, Shutdown, UpstreamClient};

pub const API_KEY: &str = "test-key";

/// What the fake upstream answers with.
#[derive(Clone)]
pub enum Script {
    /// 200 with these body frames, `delay` apart.
    Chunks { chunks: Vec<Bytes>, delay: Duration },
    /// Bare status code with an empty body.
    Status(u16),
    /// 200 with these frames, then a broken body.
    FailAfter(Vec<Bytes>),
    /// 200 that emits a frame every `interval` until the client goes away.
    Endless { interval: Duration },
}

impl Script {
    pub fn chunks(chunks: &[&'static str]) -> Self {
        Script::Chunks {
            chunks: chunks.iter().map(|c| Bytes::from_static(c.as_bytes())).collect(),
            delay: Duration::from_millis(5),
        }
    }
}

/// One request as seen by the fake upstream.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

#[derive(Clone)]
struct FakeState {
    script: Script,
    calls: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<Recorded>>>,
    body_dropped: Arc<AtomicBool>,
}

/// Handle to a running fake model provider.
pub struct FakeUpstream {
    pub addr: SocketAddr,
    calls: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<Recorded>>>,
    body_dropped: Arc<AtomicBool>,
}

impl FakeUpstream {
    pub fn url(&self) -> String {
        format!("http://{}/v1/responses", self.addr)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn body_dropped(&self) -> bool {
        self.body_dropped.load(Ordering::SeqCst)
    }

    /// Poll until the response body has been dropped, up to `limit`.
    pub async fn wait_body_dropped(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if self.body_dropped() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.body_dropped()
    }
}

/// Sets a flag when the response body it travels with is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Start a fake model provider on an ephemeral port.
pub async fn start_fake_upstream(script: Script) -> FakeUpstream {
    let state = FakeState {
        script,
        calls: Arc::new(AtomicU32::new(0)),
        requests: Arc::new(Mutex::new(Vec::new())),
        body_dropped: Arc::new(AtomicBool::new(false)),
    };
    let handle = FakeUpstream {
        addr: "127.0.0.1:0".parse().unwrap(),
        calls: state.calls.clone(),
        requests: state.requests.clone(),
        body_dropped: state.body_dropped.clone(),
    };

    let app = Router::new()
        .route("/v1/responses", post(respond))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    FakeUpstream { addr, ..handle }
}

async fn respond(State(state): State<FakeState>, headers: HeaderMap, body: Bytes) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    state.requests.lock().unwrap().push(Recorded { headers, body });

    let flag = DropFlag(state.body_dropped.clone());
    match state.script {
        Script::Status(code) => {
            drop(flag);
            StatusCode::from_u16(code).unwrap().into_response()
        }
        Script::Chunks { chunks, delay } => {
            let frames = stream::unfold((chunks.into_iter(), flag), move |(mut it, flag)| async move {
                let chunk = it.next()?;
                tokio::time::sleep(delay).await;
                Some((Ok::<_, io::Error>(chunk), (it, flag)))
            });
            Body::from_stream(frames).into_response()
        }
        Script::FailAfter(chunks) => {
            let frames = stream::unfold(
                (chunks.into_iter(), Some(flag)),
                |(mut it, flag)| async move {
                    let flag = flag?;
                    match it.next() {
                        Some(chunk) => Some((Ok(chunk), (it, Some(flag)))),
                        None => {
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            Some((Err(io::Error::other("upstream exploded")), (it, None)))
                        }
                    }
                },
            );
            Body::from_stream(frames).into_response()
        }
        Script::Endless { interval } => {
            let frames = stream::unfold((0u64, flag), move |(n, flag)| async move {
                tokio::time::sleep(interval).await;
                let chunk = Bytes::from(format!("data: tick {n}\n\n"));
                Some((Ok::<_, io::Error>(chunk), (n + 1, flag)))
            });
            Body::from_stream(frames).into_response()
        }
    }
}

/// Behaviour of a raw TCP upstream, for cases a well-behaved server cannot produce.
#[derive(Clone, Copy)]
pub enum Stall {
    /// Read the request and never answer.
    NoHeaders,
    /// Answer 200 with one chunked frame, then go quiet without ending the body.
    AfterFrame(&'static str),
}

/// Handle to a raw upstream that reports when its client hangs up.
pub struct StalledUpstream {
    pub addr: SocketAddr,
    calls: Arc<AtomicU32>,
    closed: Arc<AtomicBool>,
}

impl StalledUpstream {
    pub fn url(&self) -> String {
        format!("http://{}/v1/responses", self.addr)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Poll until the client closed the connection, up to `limit`.
    pub async fn wait_closed(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if self.closed() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.closed()
    }
}

/// Start a raw TCP upstream that never writes after `stall` and flags EOF.
pub async fn start_stalled_upstream(stall: Stall) -> StalledUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let closed = Arc::new(AtomicBool::new(false));

    let (c, cl) = (calls.clone(), closed.clone());
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            let (c, cl) = (c.clone(), cl.clone());
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut seen = Vec::new();
                while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => {
                            cl.store(true, Ordering::SeqCst);
                            return;
                        }
                        Ok(n) => seen.extend_from_slice(&buf[..n]),
                    }
                }
                c.fetch_add(1, Ordering::SeqCst);

                if let Stall::AfterFrame(frame) = stall {
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{}\r\n",
                        frame.len(),
                        frame
                    );
                    if socket.write_all(head.as_bytes()).await.is_err() {
                        cl.store(true, Ordering::SeqCst);
                        return;
                    }
                }

                // Remaining request body bytes are ignored; only EOF matters.
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                cl.store(true, Ordering::SeqCst);
            });
        }
    });

    StalledUpstream { addr, calls, closed }
}

/// Relay configuration pointed at `upstream`.
pub fn relay_config(upstream: &FakeUpstream) -> RelayConfig {
    relay_config_for(upstream.url())
}

pub fn relay_config_for(upstream_url: String) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.url = upstream_url;
    config
}

pub fn upstream_client(config: &RelayConfig) -> UpstreamClient {
    UpstreamClient::new(&config.upstream, ApiKey::new(API_KEY)).unwrap()
}

/// Start the relay; the returned `Shutdown` stops it.
pub async fn start_relay(config: RelayConfig) -> (SocketAddr, Shutdown) {
    let upstream = upstream_client(&config);
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, upstream);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    (addr, shutdown)
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
