//! Network access: HTTP client and connectivity monitoring.

pub mod client;
pub mod monitor;

pub use client::HttpClient;
pub use monitor::NetworkMonitor;
