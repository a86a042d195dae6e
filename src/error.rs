//! Error types and result handling for kafka-http-gateway.
//!
//! This module defines the startup error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate. Failures scoped to a
//! single HTTP request are described by [`PublishError`] instead, so they
//! can never be confused with the fatal errors that abort startup.
//!
//! # Example
//!
//! ```rust
//! use kafka_http_gateway::{Error, Result};
//!
//! fn check_topic(topic: &str) -> Result<()> {
//!     if topic.is_empty() {
//!         return Err(Error::Config("kafka.topic must not be empty".to_string()));
//!     }
//!     Ok(())
//! }
//!
//! match check_topic("") {
//!     Ok(()) => println!("ok"),
//!     Err(Error::Config(msg)) => eprintln!("Configuration error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use std::path::PathBuf;

use rdkafka::error::KafkaError;
use thiserror::Error;

/// The main error type for gateway startup and shutdown.
///
/// Every variant is fatal: configuration problems and broker client
/// construction failures abort the process before the listener binds.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration file could not be read or deserialized.
    #[error("Configuration error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// TLS material could not be loaded.
    #[error("TLS error: {}: {reason}", path.display())]
    Tls {
        /// File the failure relates to
        path: PathBuf,
        /// What went wrong with it
        reason: String,
    },

    /// TLS context assembly rejected the loaded material.
    #[error("TLS error: {0}")]
    TlsContext(#[from] rustls::Error),

    /// Invalid SASL selection.
    #[error("SASL error: {0}")]
    Sasl(String),

    /// The broker client could not be created or could not reach the cluster.
    #[error("failed to create kafka client: {source}")]
    ClientCreate {
        /// Underlying client error
        #[source]
        source: KafkaError,
    },

    /// I/O error, typically from binding the listener.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP server failed while serving.
    #[error("Server error: {0}")]
    Server(String),
}

/// A convenient Result type alias for gateway operations.
///
/// This is equivalent to `std::result::Result<T, kafka_http_gateway::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single publish attempt.
///
/// Scoped to one request; the HTTP layer turns it into a response.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The broker rejected the record or the client gave up on it.
    #[error("publish failed: {0}")]
    Kafka(#[from] KafkaError),

    /// No acknowledgment arrived before the request deadline.
    #[error("publish timed out after {0:?}")]
    TimedOut(std::time::Duration),
}
