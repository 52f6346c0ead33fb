//! Kafka-backed broker sessions.
//!
//! [`KafkaSessionFactory`] opens rdkafka `FutureProducer` / `StreamConsumer`
//! sessions. rdkafka creates clients lazily, so each open verifies the
//! connection with a metadata request bounded by the connection timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::Message;
use tracing::{debug, info};

use super::config::BrokerConfig;
use super::session::{BrokerMessage, ConsumerSession, ProducerSession, Role, SessionFactory};
use crate::error::ConnectorError;

/// Opens sessions against a Kafka cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct KafkaSessionFactory;

impl KafkaSessionFactory {
    /// Creates a new factory.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn connection_error(role: Role, reason: impl std::fmt::Display) -> ConnectorError {
    ConnectorError::BrokerConnection {
        role: role.to_string(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl SessionFactory for KafkaSessionFactory {
    async fn open_producer(
        &self,
        config: &BrokerConfig,
    ) -> Result<Box<dyn ProducerSession>, ConnectorError> {
        debug!(brokers = %config.bootstrap_servers, "creating Kafka producer");

        let producer: FutureProducer = config.to_producer_config().create().map_err(|e| {
            connection_error(Role::Producer, format!("failed to create producer: {e}"))
        })?;

        let probe = producer.clone();
        let topic = config.topic.clone();
        let timeout = config.connection_timeout;
        tokio::task::spawn_blocking(move || probe.client().fetch_metadata(Some(&topic), timeout))
            .await
            .map_err(|e| connection_error(Role::Producer, e))?
            .map_err(|e| connection_error(Role::Producer, format!("metadata request failed: {e}")))?;

        info!(brokers = %config.bootstrap_servers, "Kafka producer ready");
        Ok(Box::new(KafkaProducerSession {
            producer,
            request_timeout: config.request_timeout,
        }))
    }

    async fn open_consumer(
        &self,
        config: &BrokerConfig,
    ) -> Result<Box<dyn ConsumerSession>, ConnectorError> {
        debug!(
            brokers = %config.bootstrap_servers,
            group_id = %config.group_id,
            topic = %config.topic,
            "creating Kafka consumer"
        );

        let consumer: StreamConsumer = config.to_consumer_config().create().map_err(|e| {
            connection_error(Role::Consumer, format!("failed to create consumer: {e}"))
        })?;
        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| connection_error(Role::Consumer, format!("failed to subscribe: {e}")))?;

        let consumer = Arc::new(consumer);
        let probe = Arc::clone(&consumer);
        let topic = config.topic.clone();
        let timeout = config.connection_timeout;
        tokio::task::spawn_blocking(move || probe.fetch_metadata(Some(&topic), timeout))
            .await
            .map_err(|e| connection_error(Role::Consumer, e))?
            .map_err(|e| connection_error(Role::Consumer, format!("metadata request failed: {e}")))?;

        info!(group_id = %config.group_id, topic = %config.topic, "Kafka consumer ready");
        Ok(Box::new(KafkaConsumerSession { consumer }))
    }
}

struct KafkaProducerSession {
    producer: FutureProducer,
    request_timeout: Duration,
}

#[async_trait]
impl ProducerSession for KafkaProducerSession {
    async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<(), ConnectorError> {
        let mut record: FutureRecord<'_, str, [u8]> = FutureRecord::to(topic).payload(payload);
        if let Some(k) = key {
            record = record.key(k);
        }

        self.producer
            .send(record, self.request_timeout)
            .await
            .map(|_delivery| ())
            .map_err(|(err, _msg)| ConnectorError::BrokerPublish {
                topic: topic.to_string(),
                reason: err.to_string(),
            })
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        let producer = self.producer.clone();
        let timeout = self.request_timeout;
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| ConnectorError::InvalidState {
                expected: "flush task completed".into(),
                actual: e.to_string(),
            })?
            .map_err(|e| ConnectorError::BrokerPublish {
                topic: "*".into(),
                reason: format!("flush failed: {e}"),
            })
    }
}

struct KafkaConsumerSession {
    consumer: Arc<StreamConsumer>,
}

#[async_trait]
impl ConsumerSession for KafkaConsumerSession {
    async fn recv(&self) -> Result<BrokerMessage, ConnectorError> {
        let msg = self
            .consumer
            .recv()
            .await
            .map_err(|e| ConnectorError::BrokerReceive(e.to_string()))?;

        Ok(BrokerMessage {
            topic: msg.topic().to_string(),
            key: msg.key().map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            partition: msg.partition(),
            offset: msg.offset(),
        })
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        self.consumer.unsubscribe();
        Ok(())
    }
}
