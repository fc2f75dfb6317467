//! Seam between the fan connection and the MQTT client
//!
//! [`Connector`] opens a session with the broker and yields a [`Transport`] for
//! outbound traffic plus a channel of inbound messages. The production implementation
//! lives in [`mqtt_handler`](crate::mqtt::mqtt_handler); tests substitute an in-memory
//! broker.

use crate::credentials::FanCredentials;
use crate::error::FanError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Outbound half of an open broker session
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes a payload; resolves once the client has accepted it
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), String>;

    async fn subscribe(&self, topic: &str) -> Result<(), String>;

    /// Ends the session; the inbound channel closes afterwards
    async fn close(&self) -> Result<(), String>;
}

/// An open broker session
pub struct Connection {
    pub transport: Arc<dyn Transport>,
    /// Closes when the session ends
    pub inbound: mpsc::Receiver<InboundMessage>,
}

/// Opens broker sessions
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects and authenticates, failing with [`FanError::ConnectionError`] if the
    /// broker is unreachable, rejects the credentials or does not answer within `timeout`
    async fn connect(
        &self,
        credentials: &FanCredentials,
        timeout: Duration,
    ) -> Result<Connection, FanError>;
}
