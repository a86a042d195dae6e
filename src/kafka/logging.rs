//! Bridges librdkafka's logging into `tracing`.
//!
//! librdkafka filters its own log lines by a syslog-style level, so the
//! level is derived once from what the installed subscriber has enabled
//! and handed to the client together with a [`GatewayContext`] that
//! re-emits every line as a `tracing` event under the `librdkafka` target.

use rdkafka::client::ClientContext;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::error::KafkaError;
use tracing::Level;

pub const LOG_TARGET: &str = "librdkafka";

/// Verbosity of the broker client, least verbose first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientLogLevel {
    None,
    Error,
    Warn,
    Info,
    Debug,
}

impl ClientLogLevel {
    /// The most verbose level accepted by `enabled`, or `None` if it accepts
    /// none of them.
    pub fn from_enabled<F>(enabled: F) -> Self
    where
        F: Fn(Level) -> bool,
    {
        if enabled(Level::DEBUG) {
            Self::Debug
        } else if enabled(Level::INFO) {
            Self::Info
        } else if enabled(Level::WARN) {
            Self::Warn
        } else if enabled(Level::ERROR) {
            Self::Error
        } else {
            Self::None
        }
    }

    /// Asks the current subscriber.
    pub fn current() -> Self {
        Self::from_enabled(|level| {
            if level == Level::DEBUG {
                tracing::enabled!(target: LOG_TARGET, Level::DEBUG)
            } else if level == Level::INFO {
                tracing::enabled!(target: LOG_TARGET, Level::INFO)
            } else if level == Level::WARN {
                tracing::enabled!(target: LOG_TARGET, Level::WARN)
            } else if level == Level::ERROR {
                tracing::enabled!(target: LOG_TARGET, Level::ERROR)
            } else {
                false
            }
        })
    }

    /// Level of a librdkafka log line.
    pub fn of(level: RDKafkaLogLevel) -> Self {
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => Self::Error,
            RDKafkaLogLevel::Warning => Self::Warn,
            RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => Self::Info,
            RDKafkaLogLevel::Debug => Self::Debug,
        }
    }

    /// Level to configure librdkafka with. librdkafka has no "off", so
    /// `None` maps to the quietest level and the context drops the rest.
    pub fn to_rdkafka(self) -> RDKafkaLogLevel {
        match self {
            Self::None => RDKafkaLogLevel::Emerg,
            Self::Error => RDKafkaLogLevel::Error,
            Self::Warn => RDKafkaLogLevel::Warning,
            Self::Info => RDKafkaLogLevel::Info,
            Self::Debug => RDKafkaLogLevel::Debug,
        }
    }

    pub fn allows(self, line: ClientLogLevel) -> bool {
        line != Self::None && line <= self
    }
}

/// Client context that forwards librdkafka logs and errors to `tracing`.
#[derive(Debug, Clone, Copy)]
pub struct GatewayContext {
    level: ClientLogLevel,
}

impl GatewayContext {
    pub fn new(level: ClientLogLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> ClientLogLevel {
        self.level
    }
}

impl ClientContext for GatewayContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        let line = ClientLogLevel::of(level);
        if !self.level.allows(line) {
            return;
        }

        match line {
            ClientLogLevel::Error => {
                tracing::error!(target: LOG_TARGET, facility = fac, "{}", log_message)
            }
            ClientLogLevel::Warn => {
                tracing::warn!(target: LOG_TARGET, facility = fac, "{}", log_message)
            }
            ClientLogLevel::Info => {
                tracing::info!(target: LOG_TARGET, facility = fac, "{}", log_message)
            }
            ClientLogLevel::Debug => {
                tracing::debug!(target: LOG_TARGET, facility = fac, "{}", log_message)
            }
            ClientLogLevel::None => {}
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        if self.level.allows(ClientLogLevel::Error) {
            tracing::error!(target: LOG_TARGET, error = %error, "{}", reason);
        }
    }
}
