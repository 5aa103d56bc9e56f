//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → chat.rs (validate, relay upstream chunks)  POST /chat
//!     → index.rs (static page)                     GET  /
//! ```

pub mod chat;
pub mod index;
pub mod request;
pub mod server;

pub use request::{request_id, UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
