pub mod client;
pub mod logging;
pub mod sasl;
pub mod tls;

pub use client::{BrokerClient, ClientSettings, Delivery, Publisher};
pub use logging::{ClientLogLevel, GatewayContext};
pub use sasl::{Credentials, SaslMechanism};
pub use tls::{CaSource, ClientIdentity, TransportSecurity};
