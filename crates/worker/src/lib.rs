//! Courier notification worker.
//!
//! [`WorkerConfig`] reads the environment, [`App`] wires the event bus,
//! trigger engine, dispatcher, listeners, cache and stream broker together
//! and owns their background tasks.

pub mod app;
pub mod config;

pub use app::{App, Providers};
pub use config::{StreamBackend, StreamConfig, WorkerConfig};
