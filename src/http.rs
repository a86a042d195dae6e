//! HTTP front of the gateway: `POST /` publishes the request body as one
//! record on the default topic.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use http_body_util::LengthLimitError;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::ServerConfig;
use crate::error::PublishError;
use crate::kafka::{Delivery, Publisher};

/// Per-request glue between an HTTP body and the shared publisher.
pub struct ProduceBridge<P> {
    publisher: Arc<P>,
    max_body_bytes: usize,
    request_timeout: Duration,
}

impl<P> Clone for ProduceBridge<P> {
    fn clone(&self) -> Self {
        Self {
            publisher: Arc::clone(&self.publisher),
            max_body_bytes: self.max_body_bytes,
            request_timeout: self.request_timeout,
        }
    }
}

impl<P: Publisher> ProduceBridge<P> {
    pub fn new(publisher: Arc<P>, config: &ServerConfig) -> Self {
        Self {
            publisher,
            max_body_bytes: config.max_body_bytes,
            request_timeout: config.request_timeout(),
        }
    }
}

/// Acknowledgment returned for a published record.
#[derive(Debug, Serialize)]
struct Ack<'a> {
    topic: &'a str,
    #[serde(flatten)]
    delivery: Delivery,
}

pub fn router<P: Publisher>(bridge: ProduceBridge<P>) -> Router {
    Router::new()
        .route("/", post(produce::<P>))
        .with_state(bridge)
}

async fn produce<P: Publisher>(State(bridge): State<ProduceBridge<P>>, body: Body) -> Response {
    let payload = match axum::body::to_bytes(body, bridge.max_body_bytes).await {
        Ok(payload) => payload,
        Err(e) if is_length_limit(&e) => {
            warn!(limit = bridge.max_body_bytes, "Request body too large");
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("request body exceeds {} bytes", bridge.max_body_bytes),
            )
                .into_response();
        }
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return (StatusCode::EXPECTATION_FAILED, e.to_string()).into_response();
        }
    };

    let size = payload.len();
    let published = tokio::time::timeout(
        bridge.request_timeout,
        bridge.publisher.publish(payload),
    )
    .await
    .unwrap_or(Err(PublishError::TimedOut(bridge.request_timeout)));

    match published {
        Ok(delivery) => {
            debug!(
                bytes = size,
                partition = delivery.partition,
                offset = delivery.offset,
                "Record published"
            );
            Json(Ack {
                topic: bridge.publisher.topic(),
                delivery,
            })
            .into_response()
        }
        Err(e) => {
            error!(error = %e, bytes = size, "Failed to publish record");
            let status = match e {
                PublishError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
                PublishError::Kafka(_) => StatusCode::BAD_GATEWAY,
            };
            (status, e.to_string()).into_response()
        }
    }
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}
