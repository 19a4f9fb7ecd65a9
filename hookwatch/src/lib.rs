//! Unhooked-alert monitor for safety-harness sensor devices.
//!
//! A [`link::DeviceLink`] keeps one live connection to a harness sensor,
//! an [`monitor::EpisodeMonitor`] turns its readings into at most one alert
//! per continuous unhooked episode, and the [`service::Services`] container
//! delivers and records those alerts.

pub mod config;
pub mod debounce;
pub mod error;
pub mod history;
pub mod link;
pub mod monitor;
pub mod notify;
pub mod service;
pub mod store;
pub mod tracing;
pub mod types;
