//! Pipeline health reporting.

use std::fmt;

use courier_connectors::broker::BrokerStatus;
use courier_connectors::HealthStatus;

/// Maps broker connection status onto a health status.
///
/// Both roles up is healthy, one role up is degraded, none is unhealthy.
#[must_use]
pub fn broker_health(status: &BrokerStatus) -> HealthStatus {
    match (status.producer, status.consumer) {
        (true, true) => HealthStatus::Healthy,
        (false, true) => HealthStatus::Degraded(format!(
            "producer disconnected from {}",
            status.broker_address
        )),
        (true, false) => HealthStatus::Degraded(format!(
            "consumer disconnected from {}",
            status.broker_address
        )),
        (false, false) => {
            HealthStatus::Unhealthy(format!("disconnected from {}", status.broker_address))
        }
    }
}

/// Health of each pipeline component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    components: Vec<(&'static str, HealthStatus)>,
}

impl HealthReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component.
    #[must_use]
    pub fn with(mut self, component: &'static str, status: HealthStatus) -> Self {
        self.components.push((component, status));
        self
    }

    /// Returns the per-component statuses.
    #[must_use]
    pub fn components(&self) -> &[(&'static str, HealthStatus)] {
        &self.components
    }

    /// Returns the worst component status. An empty report is unknown.
    #[must_use]
    pub fn overall(&self) -> HealthStatus {
        let mut statuses = self.components.iter().map(|(_, s)| s.clone());
        match statuses.next() {
            Some(first) => statuses.fold(first, HealthStatus::worst),
            None => HealthStatus::Unknown,
        }
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.overall())?;
        for (name, status) in &self.components {
            write!(f, " [{name}: {status}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(producer: bool, consumer: bool) -> BrokerStatus {
        BrokerStatus {
            producer,
            consumer,
            broker_address: "k1:9092".into(),
        }
    }

    #[test]
    fn test_broker_health() {
        assert!(broker_health(&status(true, true)).is_healthy());
        assert!(matches!(
            broker_health(&status(false, true)),
            HealthStatus::Degraded(ref m) if m.contains("producer")
        ));
        assert!(broker_health(&status(true, false)).is_operational());
        assert!(!broker_health(&status(false, false)).is_operational());
    }

    #[test]
    fn test_overall_is_worst() {
        assert_eq!(HealthReport::new().overall(), HealthStatus::Unknown);

        let report = HealthReport::new()
            .with("broker", HealthStatus::Healthy)
            .with("push", HealthStatus::Degraded("reconnecting".into()));
        assert_eq!(
            report.overall(),
            HealthStatus::Degraded("reconnecting".into())
        );
        assert_eq!(
            report.to_string(),
            "Degraded: reconnecting [broker: Healthy] [push: Degraded: reconnecting]"
        );

        let report = report.with("store", HealthStatus::Unhealthy("unreachable".into()));
        assert!(!report.overall().is_operational());
    }
}
