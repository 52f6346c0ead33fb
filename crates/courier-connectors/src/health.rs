//! Connector health status types.
//!
//! Provides health reporting for connectors and the pipeline that owns them.

use std::fmt;

/// Health status of a connector.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HealthStatus {
    /// Connector is healthy and operating normally.
    Healthy,

    /// Connector is degraded but still operational.
    /// Contains a description of the degradation.
    Degraded(String),

    /// Connector is unhealthy and not processing data.
    /// Contains a description of the failure.
    Unhealthy(String),

    /// Health status is unknown (e.g., connector not yet started).
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Returns `true` if the connector is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Returns `true` if the connector can still process data.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded(_))
    }

    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Unknown => 1,
            HealthStatus::Degraded(_) => 2,
            HealthStatus::Unhealthy(_) => 3,
        }
    }

    /// Returns the worse of two statuses.
    ///
    /// When both are degraded or both unhealthy, the messages are joined.
    #[must_use]
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Degraded(a), HealthStatus::Degraded(b)) => {
                HealthStatus::Degraded(format!("{a}; {b}"))
            }
            (HealthStatus::Unhealthy(a), HealthStatus::Unhealthy(b)) => {
                HealthStatus::Unhealthy(format!("{a}; {b}"))
            }
            (a, b) => {
                if b.severity() > a.severity() {
                    b
                } else {
                    a
                }
            }
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded(msg) => write!(f, "Degraded: {msg}"),
            HealthStatus::Unhealthy(msg) => write!(f, "Unhealthy: {msg}"),
            HealthStatus::Unknown => write!(f, "Unknown"),
        }
    }
}
