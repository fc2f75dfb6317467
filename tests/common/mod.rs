//! In-memory broker standing in for a fan's MQTT broker

#![allow(dead_code)]

use async_trait::async_trait;
use fanlink::credentials::FanCredentials;
use fanlink::mqtt::transport::{Connection, Connector, InboundMessage, Transport};
use fanlink::{Fan, FanError, FanModel};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const USERNAME: &str = "NN2-EU-ABC1234A";
pub const COMMAND_TOPIC: &str = "475/NN2-EU-ABC1234A/command";
pub const STATUS_TOPIC: &str = "475/NN2-EU-ABC1234A/status/current";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Published {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.payload).expect("published payload is JSON")
    }
}

#[derive(Default)]
struct BrokerState {
    published: Mutex<Vec<Published>>,
    subscriptions: Mutex<Vec<String>>,
    inbound: Mutex<Option<mpsc::Sender<InboundMessage>>>,
    connects: AtomicUsize,
    refuse: AtomicBool,
    fail_publish: AtomicBool,
    connect_delay: Mutex<Duration>,
}

/// Records every publish and lets tests inject inbound messages
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_connections(&self) {
        self.state.refuse.store(true, Ordering::SeqCst);
    }

    pub fn fail_publishes(&self) {
        self.state.fail_publish.store(true, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock().unwrap() = delay;
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.subscriptions.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.state.published.lock().unwrap().clone()
    }

    /// Waits until at least `count` payloads have been published
    pub async fn wait_for_publishes(&self, count: usize) -> Vec<Published> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let published = self.published();
                if published.len() >= count {
                    return published;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("publishes did not arrive in time")
    }

    pub async fn inject(&self, topic: &str, payload: &str) {
        let sender = self
            .state
            .inbound
            .lock()
            .unwrap()
            .clone()
            .expect("no open session");
        sender
            .send(InboundMessage {
                topic: topic.to_string(),
                payload: payload.as_bytes().to_vec(),
            })
            .await
            .expect("session stopped reading");
    }

    /// Sends a reply on the fan's status topic
    pub async fn reply(&self, payload: &str) {
        self.inject(STATUS_TOPIC, payload).await;
    }

    /// Ends the session from the broker side
    pub fn drop_session(&self) {
        self.state.inbound.lock().unwrap().take();
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(
        &self,
        credentials: &FanCredentials,
        _timeout: Duration,
    ) -> Result<Connection, FanError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(FanError::ConnectionError(format!(
                "credentials for {} rejected",
                credentials.username()
            )));
        }

        let (sender, inbound) = mpsc::channel(16);
        *self.state.inbound.lock().unwrap() = Some(sender);

        Ok(Connection {
            transport: Arc::new(MemoryTransport {
                state: Arc::clone(&self.state),
            }),
            inbound,
        })
    }
}

struct MemoryTransport {
    state: Arc<BrokerState>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), String> {
        if self.state.fail_publish.load(Ordering::SeqCst) {
            return Err("broker unavailable".to_string());
        }
        self.state.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), String> {
        self.state
            .subscriptions
            .lock()
            .unwrap()
            .push(topic.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), String> {
        self.state.inbound.lock().unwrap().take();
        Ok(())
    }
}

pub fn fan_with(broker: &MemoryBroker) -> Fan {
    Fan::with_connector(
        FanModel::PureCoolLinkTower,
        FanCredentials::new(&format!("DYSON-{}", USERNAME), "secret"),
        Arc::new(broker.clone()),
    )
}

pub async fn connected_fan() -> (Fan, MemoryBroker) {
    let broker = MemoryBroker::new();
    let fan = fan_with(&broker);
    fan.connect().await.expect("in-memory connect succeeds");
    (fan, broker)
}
