//! # Courier Server
//!
//! Process wiring for the Courier notification pipeline: settings loading,
//! client-side live stats and pipeline health. The `courier` binary runs
//! either the relay (broker topic to push topic) or a live stats watcher.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod health;
pub mod live;
pub mod settings;

pub use health::{broker_health, HealthReport};
pub use live::{LiveStats, LiveStatsHandle};
pub use settings::{Settings, SettingsError};
