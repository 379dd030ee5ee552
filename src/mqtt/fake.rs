//! In-memory publisher used by engine tests and dry runs.

use crate::config::model::BrokerSpec;
use crate::error::TransportError;
use crate::mqtt::{BrokerConnector, Publisher};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// One recorded publish.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
}

/// Records every publish; fails configured topics with a transport error.
#[derive(Debug, Default)]
pub struct FakePublisher {
    published: Mutex<Vec<PublishedMessage>>,
    fail_topics: HashSet<String>,
    closed: Mutex<bool>,
}

impl FakePublisher {
    pub fn new() -> FakePublisher {
        FakePublisher::default()
    }

    pub fn failing_topics<I, S>(topics: I) -> FakePublisher
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FakePublisher {
            fail_topics: topics.into_iter().map(Into::into).collect(),
            ..FakePublisher::default()
        }
    }

    /// Snapshot of everything published so far.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().expect("fake publisher poisoned").clone()
    }

    /// Payloads published to one topic, in publish order.
    pub fn payloads_for(&self, topic: &str) -> Vec<Vec<u8>> {
        self.published()
            .into_iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().expect("fake publisher poisoned")
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: u8,
        retain: bool,
    ) -> Result<(), TransportError> {
        if self.fail_topics.contains(topic) {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                message: "simulated publish failure".to_string(),
            });
        }
        self.published
            .lock()
            .expect("fake publisher poisoned")
            .push(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                qos,
                retain,
            });
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        *self.closed.lock().expect("fake publisher poisoned") = true;
        Ok(())
    }
}

/// Test connector: hands out pre-built fake publishers by broker name and
/// optionally refuses to connect configured brokers.
#[derive(Debug, Default)]
pub struct FakeBrokerHub {
    publishers: Mutex<HashMap<String, Arc<FakePublisher>>>,
    refuse: HashSet<String>,
}

impl FakeBrokerHub {
    pub fn new() -> FakeBrokerHub {
        FakeBrokerHub::default()
    }

    pub fn refusing_brokers<I, S>(brokers: I) -> FakeBrokerHub
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FakeBrokerHub {
            refuse: brokers.into_iter().map(Into::into).collect(),
            ..FakeBrokerHub::default()
        }
    }

    /// Pre-register the publisher to hand out for one broker.
    pub fn insert(&self, broker: impl Into<String>, publisher: Arc<FakePublisher>) {
        self.publishers
            .lock()
            .expect("fake hub poisoned")
            .insert(broker.into(), publisher);
    }

    /// Publisher for a broker, creating a fresh recording one on demand.
    pub fn publisher(&self, broker: &str) -> Arc<FakePublisher> {
        self.publishers
            .lock()
            .expect("fake hub poisoned")
            .entry(broker.to_string())
            .or_insert_with(|| Arc::new(FakePublisher::new()))
            .clone()
    }
}

#[async_trait]
impl BrokerConnector for FakeBrokerHub {
    async fn connect(&self, spec: &BrokerSpec) -> Result<Arc<dyn Publisher>, TransportError> {
        if self.refuse.contains(&spec.name) {
            return Err(TransportError::Connect {
                broker: spec.name.clone(),
                message: "simulated connect failure".to_string(),
            });
        }
        Ok(self.publisher(&spec.name))
    }
}
