//! Event-to-sink orchestration.

use crate::coerce::{coerce, Coercion};
use crate::dispatch::Dispatcher;
use crate::record::{build_record, Record};
use crate::rules::RuleTable;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A message received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    /// Fully qualified topic the message arrived on
    pub topic: String,
    /// Raw payload
    pub payload: Vec<u8>,
}

impl BusEvent {
    /// Create an event.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Drives each bus event through lookup, coercion, record building and dispatch.
///
/// The rule table and sinks are fixed at construction. [`Forwarder::run`] can be
/// called again with a fresh event stream after the bus reconnects.
pub struct Forwarder {
    rules: Arc<RuleTable>,
    dispatcher: Dispatcher,
}

impl Forwarder {
    /// Create a forwarder.
    #[must_use]
    pub fn new(rules: Arc<RuleTable>, dispatcher: Dispatcher) -> Self {
        Self { rules, dispatcher }
    }

    /// Rule table in use.
    #[must_use]
    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Build the record for an event, or `None` if its topic has no rule.
    #[must_use]
    pub fn prepare(&self, event: &BusEvent) -> Option<Record> {
        let Some(rule) = self.rules.lookup(&event.topic) else {
            tracing::trace!(topic = %event.topic, "No rule for topic, ignoring");
            return None;
        };

        let outcome = coerce(&event.payload, rule.value_type);
        if let Coercion::Failed { reason, .. } = &outcome {
            tracing::debug!(
                topic = %event.topic,
                value_type = ?rule.value_type,
                reason = %reason,
                "Payload did not match declared type, forwarding raw text"
            );
        }

        Some(build_record(&event.topic, rule, outcome.into_value()).with_timestamp(Utc::now()))
    }

    /// Process one event. Returns whether a record was dispatched.
    pub async fn handle_event(&self, event: &BusEvent) -> bool {
        tracing::debug!(
            topic = %event.topic,
            payload_len = event.payload.len(),
            "Received bus event"
        );

        match self.prepare(event) {
            Some(record) => {
                self.dispatcher.dispatch(&record).await;
                true
            }
            None => false,
        }
    }

    /// Consume events until the stream closes.
    pub async fn run(&self, events: &mut mpsc::Receiver<BusEvent>) {
        tracing::info!(
            rules = self.rules.len(),
            sinks = self.dispatcher.len(),
            "Forwarder running"
        );

        while let Some(event) = events.recv().await {
            self.handle_event(&event).await;
        }

        tracing::info!("Event stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use crate::rules::{TopicRule, ValueType};
    use crate::sink::{Sink, SinkError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingSink {
        received: Arc<Mutex<Vec<Record>>>,
    }

    #[async_trait]
    impl Sink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn store_record(&self, record: &Record) -> Result<(), SinkError> {
            self.received.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn forwarder(sink: &RecordingSink) -> Forwarder {
        let rules = RuleTable::from_rules([TopicRule::new("sensors/outside/humidity")
            .with_value_type(ValueType::Float)
            .with_tag("loc", "outside")]);
        Forwarder::new(
            Arc::new(rules),
            Dispatcher::default().with_sink(sink.clone()),
        )
    }

    #[tokio::test]
    async fn forwards_configured_topic() {
        let sink = RecordingSink::default();
        let forwarder = forwarder(&sink);

        let forwarded = forwarder
            .handle_event(&BusEvent::new("sensors/outside/humidity", "54.3"))
            .await;
        assert!(forwarded);

        let received = sink.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let record = &received[0];
        assert_eq!(record.measurement, "sensors/outside/humidity");
        assert_eq!(record.tags.get("loc").map(String::as_str), Some("outside"));
        assert_eq!(record.value(), Some(&FieldValue::Float(54.3)));
        assert!(record.timestamp.is_some());
    }

    #[tokio::test]
    async fn malformed_payload_is_forwarded_as_text() {
        let sink = RecordingSink::default();
        let forwarder = forwarder(&sink);

        forwarder
            .handle_event(&BusEvent::new("sensors/outside/humidity", "not-a-number"))
            .await;

        let received = sink.received.lock().unwrap();
        assert_eq!(
            received[0].value(),
            Some(&FieldValue::String("not-a-number".to_string()))
        );
    }

    #[tokio::test]
    async fn unknown_topic_is_ignored() {
        let sink = RecordingSink::default();
        let forwarder = forwarder(&sink);

        let forwarded = forwarder
            .handle_event(&BusEvent::new("sensors/unknown/x", "1"))
            .await;

        assert!(!forwarded);
        assert!(sink.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_resumes_with_a_new_stream() {
        let sink = RecordingSink::default();
        let forwarder = forwarder(&sink);

        for payload in ["1.0", "2.0"] {
            let (tx, mut rx) = mpsc::channel(8);
            tx.send(BusEvent::new("sensors/outside/humidity", payload))
                .await
                .unwrap();
            tx.send(BusEvent::new("sensors/other", payload)).await.unwrap();
            drop(tx);
            forwarder.run(&mut rx).await;
        }

        let values: Vec<FieldValue> = sink
            .received
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.value().cloned())
            .collect();
        assert_eq!(values, vec![FieldValue::Float(1.0), FieldValue::Float(2.0)]);
    }
}
