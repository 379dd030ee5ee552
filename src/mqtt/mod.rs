//! Broker capability: connect, publish, close.
//!
//! The engine talks to brokers only through the [`Publisher`] trait, so the
//! scheduler and tests never depend on a live broker.

pub mod fake;
pub mod rumqtt;

use crate::config::model::BrokerSpec;
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;

pub use fake::{FakeBrokerHub, FakePublisher, PublishedMessage};
pub use rumqtt::{MqttConnector, MqttPublisher};

/// One broker connection shared by every stream bound to that broker.
///
/// `publish` must be safe to call from multiple workers concurrently.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one message with the given QoS and retain flag.
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: u8,
        retain: bool,
    ) -> Result<(), TransportError>;

    /// Orderly disconnect.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens publishers for the scheduler; swapped out for a fake in tests.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, spec: &BrokerSpec) -> Result<Arc<dyn Publisher>, TransportError>;
}
