//! Event bus abstraction for trigger → applier communication.
//!
//! This module provides the [`EventBus`] trait for publishing keyed messages and
//! subscribing to topics with explicit acknowledgement. Triggers publish one
//! message per candidate; consumers acknowledge a [`Delivery`] only after the
//! store change it describes has committed (or was recognised as a no-op).
//!
//! # Key Principles
//!
//! - **Keyed publish**: the partition key routes all messages about one entity
//!   (employee or vacation) to the same ordered lane
//! - **At-least-once delivery**: messages may be delivered more than once
//! - **Ack after commit**: an unacknowledged delivery is redelivered
//! - **Idempotency**: subscribers must neutralise duplicates themselves
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (`vacation-ledger-testing`) - for tests
//! - `RedpandaEventBus` (`vacation-ledger-redpanda`) - Kafka-compatible, for production
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use vacation_ledger_core::event_bus::{EventBus, publish_json};
//!
//! async fn example(bus: &dyn EventBus) -> Result<(), Box<dyn std::error::Error>> {
//!     publish_json(bus, "vacation.accrual", "42", &request).await?;
//!
//!     let mut deliveries = bus.subscribe(&["vacation.accrual"]).await?;
//!     while let Some(Ok(delivery)) = deliveries.next().await {
//!         apply(delivery.envelope()).await?;
//!         delivery.ack();
//!     }
//!     Ok(())
//! }
//! ```

use futures::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}' (key '{key}'): {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The partition key of the message
        key: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to serialize a payload before publishing
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// A received message could not be turned into an envelope
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// A message as it travels over the bus.
///
/// Payloads are self-describing JSON records; the key is the decimal id of the
/// entity the message is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Topic the message was published to
    pub topic: String,
    /// Partition key
    pub key: String,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create an envelope from raw parts.
    #[must_use]
    pub fn new(topic: impl Into<String>, key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload,
        }
    }

    /// Serialize `value` as JSON into a new envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SerializationFailed`] if `value` cannot be encoded.
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, EventBusError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| EventBusError::SerializationFailed(e.to_string()))?;
        Ok(Self::new(topic, key, payload))
    }

    /// Decode the JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// Verdict a consumer returns to the bus for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Processing finished; the bus may move past this message.
    Ack,
    /// Processing did not finish; the bus must redeliver this message.
    Nack,
}

/// A received message plus the handle used to acknowledge it.
///
/// Dropping a delivery without calling [`Delivery::ack`] is equivalent to
/// calling [`Delivery::nack`].
#[derive(Debug)]
pub struct Delivery {
    envelope: Envelope,
    responder: Option<oneshot::Sender<Acknowledgement>>,
}

impl Delivery {
    /// Create a delivery whose verdict is reported through `responder`.
    #[must_use]
    pub const fn new(envelope: Envelope, responder: oneshot::Sender<Acknowledgement>) -> Self {
        Self {
            envelope,
            responder: Some(responder),
        }
    }

    /// Create a delivery for a transport that does not track acknowledgements.
    #[must_use]
    pub const fn detached(envelope: Envelope) -> Self {
        Self {
            envelope,
            responder: None,
        }
    }

    /// The message being delivered.
    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Acknowledge the message.
    pub fn ack(self) {
        self.respond(Acknowledgement::Ack);
    }

    /// Reject the message so that it is redelivered.
    pub fn nack(self) {
        self.respond(Acknowledgement::Nack);
    }

    fn respond(mut self, verdict: Acknowledgement) {
        if let Some(responder) = self.responder.take() {
            // The transport may have shut down already; nothing left to tell it.
            let _ = responder.send(verdict);
        }
    }
}

/// Stream of deliveries from a subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so that components can hold an `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish `payload` to `topic` under partition key `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker rejects the message
    /// or the send times out.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: &'a str,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>>;

    /// Subscribe to one or more topics.
    ///
    /// Implementations use consumer groups so that several replicas share the
    /// partitions of a topic. Within a subscription, the next message of a
    /// partition is not delivered before the previous one has been acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the subscription cannot be set up.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>>;
}

/// Serialize `value` as JSON and publish it.
///
/// # Errors
///
/// Returns [`EventBusError::SerializationFailed`] or the publish error of the bus.
pub async fn publish_json<T: Serialize + Sync>(
    bus: &dyn EventBus,
    topic: &str,
    key: &str,
    value: &T,
) -> Result<(), EventBusError> {
    let payload =
        serde_json::to_vec(value).map_err(|e| EventBusError::SerializationFailed(e.to_string()))?;
    bus.publish(topic, key, &payload).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Ping {
        employee_id: i64,
    }

    #[test]
    fn envelope_json_encodes_payload() {
        let envelope = Envelope::json("t", "7", &Ping { employee_id: 7 }).unwrap();
        assert_eq!(envelope.payload, br#"{"employeeId":7}"#);
        assert_eq!(envelope.decode::<Ping>().unwrap(), Ping { employee_id: 7 });
    }

    #[tokio::test]
    async fn dropping_delivery_reports_nothing_but_closes_channel() {
        let (tx, rx) = oneshot::channel();
        let delivery = Delivery::new(Envelope::new("t", "1", vec![]), tx);
        drop(delivery);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn ack_and_nack_reach_the_transport() {
        let (tx, rx) = oneshot::channel();
        Delivery::new(Envelope::new("t", "1", vec![]), tx).ack();
        assert_eq!(rx.await.unwrap(), Acknowledgement::Ack);

        let (tx, rx) = oneshot::channel();
        Delivery::new(Envelope::new("t", "1", vec![]), tx).nack();
        assert_eq!(rx.await.unwrap(), Acknowledgement::Nack);
    }

    #[test]
    fn detached_delivery_ack_is_noop() {
        Delivery::detached(Envelope::new("t", "1", vec![])).ack();
    }
}
