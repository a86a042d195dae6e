use kafka_http_gateway::config::{AuthConfig, Config, KafkaConfig, ServerConfig};
use std::env;

/// Get test configuration from environment variables
pub fn get_test_config() -> Config {
    // Use TEST_ prefix for test environment variables
    let kafka = KafkaConfig {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        topic: format!("gateway_test_{}", std::process::id()),
        auth: AuthConfig {
            username: env::var("TEST_KAFKA_USERNAME").unwrap_or_default(),
            password: env::var("TEST_KAFKA_PASSWORD").unwrap_or_default(),
            scram: env::var("TEST_KAFKA_SCRAM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            ..Default::default()
        },
    };

    let server = ServerConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };

    Config { kafka, server }
}
