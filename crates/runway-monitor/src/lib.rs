//! Async driver for the runway monitor: keeps the push transport alive,
//! falls back to status polling while it is down, and publishes reduced
//! snapshots of the persisted event window.

pub mod config;
pub mod error;
pub mod monitor;
pub mod render;
pub mod status_client;

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use monitor::{Monitor, MonitorHandle, MonitorView};
pub use status_client::StatusClient;
