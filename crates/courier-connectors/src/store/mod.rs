//! External notification store access.
//!
//! - `config` - Base URL, timeout and credentials
//! - `client` - REST client and the `StatsSource` seam used for resync

pub mod client;
pub mod config;

pub use client::{
    ListQuery, NewNotification, NotificationPage, NotificationStoreClient, StatsSource,
};
pub use config::StoreConfig;
