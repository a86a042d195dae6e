use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::logging::{ClientLogLevel, GatewayContext};
use super::sasl::SaslMechanism;
use super::tls::TransportSecurity;
use crate::config::KafkaConfig;
use crate::error::PublishError;
use crate::{Error, Result};

const CLIENT_ID: &str = "kafka-http-gateway";

/// Where an acknowledged record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// Publishes one record per call to a fixed default topic.
///
/// Implementations are shared by every request handler and must accept
/// concurrent calls.
pub trait Publisher: Send + Sync + 'static {
    fn topic(&self) -> &str;

    /// Resolves once the record is acknowledged or has failed. Dropping the
    /// future abandons the wait without affecting other calls.
    fn publish(
        &self,
        payload: Bytes,
    ) -> impl Future<Output = std::result::Result<Delivery, PublishError>> + Send;
}

/// Everything needed to build a broker client, fully validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub brokers: Vec<String>,
    pub topic: String,
    pub transport: TransportSecurity,
    pub sasl: Option<SaslMechanism>,
    pub log_level: ClientLogLevel,
}

impl ClientSettings {
    pub fn from_config(config: &KafkaConfig) -> Result<Self> {
        let transport = TransportSecurity::from_config(&config.auth.tls)?;
        let sasl = SaslMechanism::for_client(&config.auth)?;

        Ok(Self {
            brokers: config.brokers.clone(),
            topic: config.topic.clone(),
            transport,
            sasl,
            log_level: ClientLogLevel::current(),
        })
    }

    pub fn with_log_level(mut self, log_level: ClientLogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn security_protocol(&self) -> &'static str {
        match (self.transport.is_tls(), self.sasl.is_some()) {
            (false, false) => "plaintext",
            (true, false) => "ssl",
            (false, true) => "sasl_plaintext",
            (true, true) => "sasl_ssl",
        }
    }

    /// Renders the librdkafka configuration. Pure: equal settings render
    /// equal configurations.
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", self.brokers.join(","))
            .set("client.id", CLIENT_ID)
            .set("security.protocol", self.security_protocol());

        self.transport.apply(&mut client_config);
        if let Some(mechanism) = &self.sasl {
            mechanism.apply(&mut client_config);
        }

        client_config.set_log_level(self.log_level.to_rdkafka());
        client_config
    }
}

/// Long-lived producer shared by all request handlers.
///
/// Dropping it tears down the underlying client; [`BrokerClient::close`]
/// additionally flushes queued records first.
pub struct BrokerClient {
    producer: FutureProducer<GatewayContext>,
    topic: String,
}

impl BrokerClient {
    /// Creates the client and proves the cluster is reachable with the
    /// configured transport and credentials.
    #[instrument(skip_all, fields(brokers = ?settings.brokers, topic = %settings.topic))]
    pub async fn connect(settings: &ClientSettings) -> Result<Self> {
        info!(
            security_protocol = settings.security_protocol(),
            sasl_mechanism = settings.sasl.as_ref().map(|m| m.name()),
            "Creating Kafka client"
        );

        let producer: FutureProducer<GatewayContext> = settings
            .client_config()
            .create_with_context(GatewayContext::new(settings.log_level))
            .map_err(|source| Error::ClientCreate { source })?;

        let probe = producer.clone();
        let topic = settings.topic.clone();
        let timeout = settings.transport.connect_timeout();
        let metadata = tokio::task::spawn_blocking(move || {
            probe.client().fetch_metadata(Some(&topic), timeout)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
        .map_err(|source| Error::ClientCreate { source })?;

        debug!(
            brokers = metadata.brokers().len(),
            "Fetched cluster metadata"
        );
        info!("Kafka client ready");

        Ok(Self {
            producer,
            topic: settings.topic.clone(),
        })
    }

    /// Waits up to `timeout` for queued records to be delivered.
    pub async fn flush(&self, timeout: Duration) {
        let producer = self.producer.clone();
        let flushed = tokio::task::spawn_blocking(move || producer.flush(timeout)).await;

        match flushed {
            Ok(Ok(())) => debug!(topic = %self.topic, "Kafka client flushed"),
            Ok(Err(e)) => warn!(error = %e, "Kafka client has unflushed records"),
            Err(e) => warn!(error = %e, "Kafka client flush did not complete"),
        }
    }

    /// Flushes outstanding records, then releases the client.
    pub async fn close(self, timeout: Duration) {
        self.flush(timeout).await;
        info!(topic = %self.topic, "Kafka client closed");
    }
}

impl Publisher for BrokerClient {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, payload: Bytes) -> std::result::Result<Delivery, PublishError> {
        let record: FutureRecord<'_, (), [u8]> = FutureRecord::to(&self.topic).payload(&payload[..]);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::Never)
            .await
            .map_err(|(e, _)| PublishError::Kafka(e))?;

        Ok(Delivery { partition, offset })
    }
}
