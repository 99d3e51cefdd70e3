use crate::lock;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use vacation_ledger_core::event_bus::{
    Acknowledgement, Delivery, DeliveryStream, Envelope, EventBus, EventBusError,
};

/// In-memory event bus with a single consumer group.
///
/// Each topic is an append-only log with one committed offset. A subscription
/// delivers the message at the committed offset and waits for its verdict:
/// an ack advances the offset, a nack or a dropped delivery redelivers the
/// same message. Messages published before a subscription starts are still
/// delivered, as with a broker reading from the earliest uncommitted offset.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    appended: Notify,
}

#[derive(Debug, Default)]
struct State {
    published: Vec<Envelope>,
    logs: HashMap<String, Vec<Envelope>>,
    committed: HashMap<String, usize>,
    failing_keys: HashSet<String>,
    redeliveries: usize,
}

impl State {
    fn next_pending(&self, topics: &[String]) -> Option<(String, Envelope)> {
        topics.iter().find_map(|topic| {
            let offset = self.committed.get(topic).copied().unwrap_or(0);
            self.logs
                .get(topic)
                .and_then(|log| log.get(offset))
                .map(|envelope| (topic.clone(), envelope.clone()))
        })
    }
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish with this partition key fail.
    pub fn fail_publishes_for_key(&self, key: impl Into<String>) {
        lock(&self.inner.state).failing_keys.insert(key.into());
    }

    /// Stop injecting publish failures.
    pub fn clear_publish_failures(&self) {
        lock(&self.inner.state).failing_keys.clear();
    }

    /// Every successfully published message, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<Envelope> {
        lock(&self.inner.state).published.clone()
    }

    /// Messages published to one topic, in publish order.
    #[must_use]
    pub fn published_on(&self, topic: &str) -> Vec<Envelope> {
        lock(&self.inner.state)
            .logs
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of acknowledged messages on `topic`.
    #[must_use]
    pub fn committed(&self, topic: &str) -> usize {
        lock(&self.inner.state)
            .committed
            .get(topic)
            .copied()
            .unwrap_or(0)
    }

    /// Number of deliveries that were nacked or dropped and will be retried.
    #[must_use]
    pub fn redeliveries(&self) -> usize {
        lock(&self.inner.state).redeliveries
    }

    /// Wait until every message on `topic` has been acknowledged.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_until_consumed(&self, topic: &str, timeout: Duration) -> bool {
        let drained = async {
            loop {
                {
                    let state = lock(&self.inner.state);
                    let len = state.logs.get(topic).map_or(0, Vec::len);
                    if state.committed.get(topic).copied().unwrap_or(0) >= len {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: &'a str,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            {
                let mut state = lock(&self.inner.state);
                if state.failing_keys.contains(key) {
                    return Err(EventBusError::PublishFailed {
                        topic: topic.to_string(),
                        key: key.to_string(),
                        reason: "injected failure".to_string(),
                    });
                }
                let envelope = Envelope::new(topic, key, payload.to_vec());
                state.published.push(envelope.clone());
                state
                    .logs
                    .entry(topic.to_string())
                    .or_default()
                    .push(envelope);
            }
            self.inner.appended.notify_waiters();
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();
        let inner = Arc::clone(&self.inner);

        Box::pin(async move {
            let stream = async_stream::stream! {
                loop {
                    let appended = inner.appended.notified();
                    let pending = lock(&inner.state).next_pending(&topics);

                    let Some((topic, envelope)) = pending else {
                        appended.await;
                        continue;
                    };

                    let (tx, rx) = oneshot::channel();
                    yield Ok(Delivery::new(envelope, tx));

                    let acked = matches!(rx.await, Ok(Acknowledgement::Ack));
                    let mut state = lock(&inner.state);
                    if acked {
                        *state.committed.entry(topic).or_insert(0) += 1;
                    } else {
                        state.redeliveries += 1;
                    }
                    drop(state);
                }
                #[allow(unreachable_code)]
                ()
            };
            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn delivers_messages_published_before_subscribing() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", "1", b"a").await.unwrap();

        let mut stream = bus.subscribe(&["t"]).await.unwrap();
        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.envelope().payload, b"a");
        delivery.ack();

        bus.publish("t", "2", b"b").await.unwrap();
        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.envelope().key, "2");
        delivery.ack();
        drop(stream);
        assert_eq!(bus.committed("t"), 2);
    }

    #[tokio::test]
    async fn nack_redelivers_the_same_message() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", "1", b"a").await.unwrap();
        bus.publish("t", "1", b"b").await.unwrap();

        let mut stream = bus.subscribe(&["t"]).await.unwrap();
        stream.next().await.unwrap().unwrap().nack();
        let again = stream.next().await.unwrap().unwrap();
        assert_eq!(again.envelope().payload, b"a");
        drop(again);
        let third = stream.next().await.unwrap().unwrap();
        assert_eq!(third.envelope().payload, b"a");
        assert_eq!(bus.redeliveries(), 2);
    }

    #[tokio::test]
    async fn injected_failures_are_per_key() {
        let bus = InMemoryEventBus::new();
        bus.fail_publishes_for_key("bad");

        assert!(bus.publish("t", "bad", b"x").await.is_err());
        assert!(bus.publish("t", "good", b"y").await.is_ok());
        assert_eq!(bus.published().len(), 1);

        bus.clear_publish_failures();
        assert!(bus.publish("t", "bad", b"x").await.is_ok());
    }
}
