//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every subscriber wakes → server stops accepting,
//!     in-flight relays finish or are cancelled by their clients
//! ```
//!
//! # Design Decisions
//! - Startup is fail-fast and lives in main: config, credential, bind
//! - One broadcast channel fans the shutdown out to all listeners

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
