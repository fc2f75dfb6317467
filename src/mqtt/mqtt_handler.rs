//! MQTT session handling
//!
//! [`MqttLink`] owns the rumqttc client and its event loop task and moves through a
//! two-state lifecycle enforced at compile time. [`MqttHandle`] sits on top of any
//! [`Transport`]: it publishes commands, feeds inbound payloads to the
//! [`Correlator`] and keeps the session counters.
//!
//! # State Machine
//!
//! ```text
//! Configured ──connect──► Connected
//! ```
//!
//! # Architecture
//!
//! ```text
//!              publish task (one per command)
//! Command ──► [MqttHandle] ──────────────────► Transport ──► broker
//!                  │                                            │
//!            [Correlator] ◄── inbound loop ◄── mpsc ◄── event loop task
//! ```

use crate::credentials::FanCredentials;
use crate::error::FanError;
use crate::mqtt::correlation::{Correlator, Dispatch, Reply, ReplyHandle};
use crate::mqtt::message::Command;
use crate::mqtt::transport::{Connection, Connector, InboundMessage, Transport};
use crate::mqtt::Topics;
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use statum::{machine, state};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Counters of a single session
#[derive(Clone, Debug, Default)]
pub struct MqttStatus {
    pub connection_state: ConnectionState,
    pub last_error: Option<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    /// Inbound payloads that matched no request or could not be read
    pub messages_discarded: usize,
    pub last_activity: Option<chrono::DateTime<chrono::Local>>,
}

/// States of the rumqttc link
#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Configured, // Options built, no network activity yet
    Connected,  // Broker acknowledged the session
}

/// rumqttc client plus the task driving its event loop
#[machine]
pub struct MqttLink<S: LinkState> {
    options: MqttOptions,
    channel_capacity: usize,
    client: Option<AsyncClient>,
    shutdown: CancellationToken,
}

impl MqttLink<Configured> {
    pub fn create(
        host: &str,
        port: u16,
        credentials: &FanCredentials,
        keep_alive: Duration,
        channel_capacity: usize,
    ) -> Self {
        let client_id = format!(
            "fanlink-{:x}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        debug!("Creating MQTT link {} for {}:{}", client_id, host, port);

        let mut options = MqttOptions::new(client_id, host, port);
        options
            .set_credentials(credentials.username(), credentials.password_hashed())
            .set_keep_alive(keep_alive)
            .set_clean_session(true);

        Self::new(
            options,
            channel_capacity,
            None,                     // client
            CancellationToken::new(), // shutdown
        )
    }

    /// Starts the event loop and waits for the broker's acknowledgement
    pub async fn connect(
        mut self,
        timeout: Duration,
    ) -> Result<(MqttLink<Connected>, mpsc::Receiver<InboundMessage>), FanError> {
        let (host, port) = self.options.broker_address();
        info!("Connecting to MQTT broker at {}:{}", host, port);

        let (client, eventloop) = AsyncClient::new(self.options.clone(), self.channel_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.channel_capacity);
        let (ack_tx, ack_rx) = oneshot::channel();

        tokio::spawn(drive_event_loop(
            eventloop,
            inbound_tx,
            ack_tx,
            self.shutdown.clone(),
        ));

        match tokio::time::timeout(timeout, ack_rx).await {
            Ok(Ok(Ok(()))) => {
                info!("Connected to MQTT broker at {}:{}", host, port);
                self.client = Some(client);
                Ok((self.transition(), inbound_rx))
            }
            Ok(Ok(Err(reason))) => {
                error!("MQTT connection failed: {}", reason);
                self.shutdown.cancel();
                Err(FanError::ConnectionError(reason))
            }
            Ok(Err(_)) => {
                self.shutdown.cancel();
                Err(FanError::ConnectionError(
                    "event loop stopped before the broker answered".to_string(),
                ))
            }
            Err(_) => {
                error!("MQTT connection timed out after {:?}", timeout);
                self.shutdown.cancel();
                Err(FanError::ConnectionError(format!(
                    "no answer from {}:{} within {:?}",
                    host, port, timeout
                )))
            }
        }
    }
}

impl MqttLink<Connected> {
    fn client(&self) -> Result<&AsyncClient, String> {
        if self.shutdown.is_cancelled() {
            return Err("connection closed".to_string());
        }
        self.client
            .as_ref()
            .ok_or_else(|| "MQTT client not initialized".to_string())
    }
}

#[async_trait]
impl Transport for MqttLink<Connected> {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), String> {
        self.client()?
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| e.to_string())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), String> {
        self.client()?
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| e.to_string())
    }

    async fn close(&self) -> Result<(), String> {
        let result = match self.client() {
            Ok(client) => client.disconnect().await.map_err(|e| e.to_string()),
            Err(_) => Ok(()),
        };
        self.shutdown.cancel();
        result
    }
}

async fn drive_event_loop(
    mut eventloop: EventLoop,
    inbound: mpsc::Sender<InboundMessage>,
    ack: oneshot::Sender<Result<(), String>>,
    shutdown: CancellationToken,
) {
    let mut ack = Some(ack);

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                if connack.code == ConnectReturnCode::Success {
                    if let Some(ack) = ack.take() {
                        let _ = ack.send(Ok(()));
                    }
                } else {
                    if let Some(ack) = ack.take() {
                        let _ = ack.send(Err(format!(
                            "broker refused connection: {:?}",
                            connack.code
                        )));
                    }
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!("Received {} bytes on {}", publish.payload.len(), publish.topic);
                let message = InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                if inbound.send(message).await.is_err() {
                    debug!("Inbound receiver dropped, stopping event loop");
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker closed the session");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                match ack.take() {
                    Some(ack) => {
                        let _ = ack.send(Err(e.to_string()));
                    }
                    None => error!("MQTT connection lost: {}", e),
                }
                break;
            }
        }
    }

    shutdown.cancel();
    debug!("MQTT event loop stopped");
}

/// Opens sessions with a fan's built-in broker through rumqttc
#[derive(Debug, Clone)]
pub struct MqttConnector {
    host: String,
    port: u16,
    keep_alive: Duration,
    channel_capacity: usize,
}

impl MqttConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            keep_alive: DEFAULT_KEEP_ALIVE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }
}

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(
        &self,
        credentials: &FanCredentials,
        timeout: Duration,
    ) -> Result<Connection, FanError> {
        let link = MqttLink::create(
            &self.host,
            self.port,
            credentials,
            self.keep_alive,
            self.channel_capacity,
        );
        let (link, inbound) = link.connect(timeout).await?;

        Ok(Connection {
            transport: Arc::new(link),
            inbound,
        })
    }
}

/// An established session with a fan
pub struct MqttHandle {
    transport: Arc<dyn Transport>,
    topics: Topics,
    correlator: Arc<Correlator>,
    status: Arc<Mutex<MqttStatus>>,
    shutdown: CancellationToken,
    inbound_task: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
}

impl MqttHandle {
    /// Subscribes to the status topic and starts routing inbound payloads
    pub async fn start(connection: Connection, topics: Topics) -> Result<MqttHandle, FanError> {
        let Connection { transport, inbound } = connection;

        if let Err(e) = transport.subscribe(&topics.status).await {
            error!("Failed to subscribe to {}: {}", topics.status, e);
            let _ = transport.close().await;
            return Err(FanError::ConnectionError(format!(
                "failed to subscribe to {}: {}",
                topics.status, e
            )));
        }
        info!("Subscribed to {}", topics.status);

        let correlator = Arc::new(Correlator::new());
        let status = Arc::new(Mutex::new(MqttStatus {
            connection_state: ConnectionState::Connected,
            last_activity: Some(chrono::Local::now()),
            ..MqttStatus::default()
        }));
        let shutdown = CancellationToken::new();

        let inbound_task = tokio::spawn(route_inbound(
            inbound,
            topics.status.clone(),
            Arc::clone(&correlator),
            Arc::clone(&status),
            shutdown.clone(),
        ));

        Ok(MqttHandle {
            transport,
            topics,
            correlator,
            status,
            shutdown,
            inbound_task: Mutex::new(Some(inbound_task)),
            runtime: Handle::current(),
        })
    }

    /// Whether the session is still open
    pub fn is_active(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn pending_messages(&self) -> usize {
        self.correlator.pending_messages()
    }

    pub fn status(&self) -> MqttStatus {
        lock(&self.status).clone()
    }

    /// Publishes a command that expects no reply
    ///
    /// The handle resolves once the transport has accepted the payload.
    pub fn send(&self, command: Command) -> Result<ReplyHandle<()>, FanError> {
        let payload = self.encode(&command)?;
        let guard = self.correlator.track();
        let (sender, receiver) = oneshot::channel();

        let transport = Arc::clone(&self.transport);
        let topic = self.topics.command.clone();
        let status = Arc::clone(&self.status);

        self.runtime.spawn(async move {
            let result = transport
                .publish(&topic, payload)
                .await
                .map_err(FanError::PublishError);
            record_publish(&status, &result);
            drop(guard);
            let _ = sender.send(result);
        });

        Ok(ReplyHandle::from_receiver(receiver))
    }

    /// Publishes a command and waits for a reply of type `T`
    ///
    /// The wait is registered before the payload goes out so that a fast reply cannot
    /// slip past it.
    pub fn request<T: Reply>(&self, command: Command) -> Result<ReplyHandle<T>, FanError> {
        debug_assert_eq!(command.expected_reply(), Some(T::KIND));

        let payload = self.encode(&command)?;
        let handle = self.correlator.expect::<T>()?;
        let wait_id = handle.wait_id();

        let transport = Arc::clone(&self.transport);
        let topic = self.topics.command.clone();
        let status = Arc::clone(&self.status);
        let correlator = Arc::clone(&self.correlator);

        self.runtime.spawn(async move {
            let result = transport
                .publish(&topic, payload)
                .await
                .map_err(FanError::PublishError);
            record_publish(&status, &result);
            if let (Err(e), Some(id)) = (result, wait_id) {
                correlator.fail(id, e);
            }
        });

        Ok(handle)
    }

    fn encode(&self, command: &Command) -> Result<Vec<u8>, FanError> {
        if !self.is_active() {
            return Err(FanError::NotConnected);
        }
        let payload = command.encode();
        debug!("Publishing {} to {}", payload.msg, self.topics.command);
        payload
            .to_bytes()
            .map_err(|e| FanError::PublishError(e.to_string()))
    }

    /// Closes the session and fails every outstanding wait with [`FanError::Abandoned`]
    pub async fn shutdown(&self) {
        info!("Closing MQTT session");
        self.shutdown.cancel();

        if let Err(e) = self.transport.close().await {
            warn!("Error while closing MQTT session: {}", e);
        }

        let task = lock(&self.inbound_task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Inbound task ended abnormally: {}", e);
            }
        }

        self.correlator.abandon_all();
        lock(&self.status).connection_state = ConnectionState::Disconnected;
    }
}

impl Drop for MqttHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn route_inbound(
    mut inbound: mpsc::Receiver<InboundMessage>,
    status_topic: String,
    correlator: Arc<Correlator>,
    status: Arc<Mutex<MqttStatus>>,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = inbound.recv() => message,
        };

        let Some(message) = message else {
            warn!("Inbound stream closed, session is gone");
            break;
        };

        {
            let mut status = lock(&status);
            status.messages_received += 1;
            status.last_activity = Some(chrono::Local::now());
        }

        let outcome = if message.topic == status_topic {
            correlator.dispatch(&message.payload)
        } else {
            debug!("Ignoring message on unexpected topic {}", message.topic);
            Dispatch::Unmatched
        };

        if matches!(outcome, Dispatch::Unmatched | Dispatch::Unparseable) {
            lock(&status).messages_discarded += 1;
        }
    }

    shutdown.cancel();
    let abandoned = correlator.abandon_all();
    if abandoned > 0 {
        warn!("Abandoned {} requests still waiting for a reply", abandoned);
    }
    lock(&status).connection_state = ConnectionState::Disconnected;
}

fn record_publish(status: &Mutex<MqttStatus>, result: &Result<(), FanError>) {
    let mut status = lock(status);
    match result {
        Ok(()) => {
            status.messages_sent += 1;
            status.last_activity = Some(chrono::Local::now());
        }
        Err(e) => {
            error!("Failed to publish: {}", e);
            status.last_error = Some(e.to_string());
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
