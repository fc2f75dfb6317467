//! The fan: typed operations over one MQTT session
//!
//! A [`Fan`] is cheap to clone; clones share the same connection. Operations that talk
//! to the device return a [`ReplyHandle`] right away, or [`FanError::NotConnected`]
//! when no session is active.
//!
//! # Connection lifecycle
//!
//! ```text
//!              connect               attempt succeeds
//! Unconnected ─────────► Connecting ─────────────────► Connected
//!      ▲                     │                             │
//!      └─────────────────────┴──── attempt fails / disconnect / session lost
//! ```
//!
//! Callers that call `connect` while an attempt is running share its outcome. The
//! attempt runs as its own task, so it completes even if every caller stops waiting.

use crate::config::FanConfig;
use crate::credentials::FanCredentials;
use crate::error::{ConfigError, FanError};
use crate::model::FanModel;
use crate::mqtt::correlation::ReplyHandle;
use crate::mqtt::message::{Command, StateChange};
use crate::mqtt::mqtt_handler::{ConnectionState, MqttConnector, MqttHandle, MqttStatus};
use crate::mqtt::response::{DeviceStatus, SensorData};
use crate::mqtt::transport::Connector;
use crate::mqtt::Topics;
use crate::setting::{Setting, SettingValue, StateValue};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

type ConnectOutcome = Option<Result<(), FanError>>;

enum LinkState {
    Unconnected,
    Connecting(watch::Receiver<ConnectOutcome>),
    Connected(Arc<MqttHandle>),
}

struct FanInner {
    model: FanModel,
    credentials: FanCredentials,
    connector: Arc<dyn Connector>,
    state: Mutex<LinkState>,
}

impl FanInner {
    fn lock_state(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn establish(&self, timeout: Duration) -> Result<(), FanError> {
        let result = async {
            let connection = self.connector.connect(&self.credentials, timeout).await?;
            let topics = Topics::new(self.model, self.credentials.username());
            MqttHandle::start(connection, topics).await
        }
        .await;

        let mut state = self.lock_state();
        match result {
            Ok(handle) => {
                info!("Connected to {}", self.model);
                *state = LinkState::Connected(Arc::new(handle));
                Ok(())
            }
            Err(e) => {
                warn!("Connecting to {} failed: {}", self.model, e);
                *state = LinkState::Unconnected;
                Err(e)
            }
        }
    }
}

#[derive(Clone)]
pub struct Fan {
    inner: Arc<FanInner>,
}

impl Fan {
    /// A fan reachable at `host:port` through its built-in MQTT broker
    pub fn new(model: FanModel, host: &str, port: u16, credentials: FanCredentials) -> Fan {
        Self::with_connector(model, credentials, Arc::new(MqttConnector::new(host, port)))
    }

    pub fn from_config(config: &FanConfig) -> Result<Fan, ConfigError> {
        config.validate()?;
        let model = config
            .fan_model()
            .ok_or_else(|| ConfigError::InvalidConfig(format!("unknown model code: {}", config.model)))?;
        let connector = MqttConnector::new(config.host.as_str(), config.port)
            .with_keep_alive(config.keep_alive())
            .with_channel_capacity(config.channel_capacity);

        Ok(Self::with_connector(model, config.credentials(), Arc::new(connector)))
    }

    /// A fan whose sessions are opened by `connector`
    pub fn with_connector(
        model: FanModel,
        credentials: FanCredentials,
        connector: Arc<dyn Connector>,
    ) -> Fan {
        Fan {
            inner: Arc::new(FanInner {
                model,
                credentials,
                connector,
                state: Mutex::new(LinkState::Unconnected),
            }),
        }
    }

    pub fn model(&self) -> FanModel {
        self.inner.model
    }

    pub fn supports_feature(&self, setting: Setting) -> bool {
        self.inner.model.supports_feature(setting)
    }

    pub async fn connect(&self) -> Result<(), FanError> {
        self.connect_with_timeout(DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connects unless already connected; joins an attempt already in progress
    pub async fn connect_with_timeout(&self, timeout: Duration) -> Result<(), FanError> {
        if timeout.is_zero() {
            return Err(FanError::ConnectionError(
                "connect timeout must be greater than zero".to_string(),
            ));
        }

        let mut progress = {
            let mut state = self.inner.lock_state();
            match &*state {
                LinkState::Connected(handle) if handle.is_active() => return Ok(()),
                LinkState::Connecting(progress) => progress.clone(),
                _ => {
                    debug!("Starting connection attempt to {}", self.inner.model);
                    let (sender, receiver) = watch::channel(None);
                    *state = LinkState::Connecting(receiver.clone());

                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        let result = inner.establish(timeout).await;
                        sender.send_replace(Some(result));
                    });
                    receiver
                }
            }
        };

        let outcome = match progress.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(FanError::ConnectionError(
                "connection attempt ended without a result".to_string(),
            ))
        })
    }

    pub fn is_connected(&self) -> bool {
        matches!(&*self.inner.lock_state(), LinkState::Connected(handle) if handle.is_active())
    }

    pub fn connection_state(&self) -> ConnectionState {
        match &*self.inner.lock_state() {
            LinkState::Connected(handle) if handle.is_active() => ConnectionState::Connected,
            LinkState::Connecting(_) => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Counters of the current or most recent session
    pub fn status(&self) -> Option<MqttStatus> {
        match &*self.inner.lock_state() {
            LinkState::Connected(handle) => Some(handle.status()),
            _ => None,
        }
    }

    fn session(&self) -> Result<Arc<MqttHandle>, FanError> {
        match &*self.inner.lock_state() {
            LinkState::Connected(handle) if handle.is_active() => Ok(Arc::clone(handle)),
            _ => Err(FanError::NotConnected),
        }
    }

    /// Changes one setting
    ///
    /// Settings the model does not support are skipped and the handle resolves at once.
    pub fn set_state<T: StateValue>(&self, value: T) -> Result<ReplyHandle<()>, FanError> {
        self.set_value(value.into())
    }

    /// Changes one setting from an untyped value
    pub fn set_value(&self, value: SettingValue) -> Result<ReplyHandle<()>, FanError> {
        let session = self.session()?;
        if !self.supports_feature(value.setting()) {
            debug!("{} does not support {}, skipping", self.inner.model, value.setting());
            return Ok(ReplyHandle::ready(Ok(())));
        }
        session.send(Command::SetOne(value))
    }

    /// Changes several settings in one message
    pub fn set_states(&self, mut change: StateChange) -> Result<ReplyHandle<()>, FanError> {
        let session = self.session()?;
        change.retain_supported(self.inner.model);
        if change.is_empty() {
            debug!("No supported settings left to send");
            return Ok(ReplyHandle::ready(Ok(())));
        }
        session.send(Command::SetMany(change))
    }

    pub fn request_current_state(&self) -> Result<ReplyHandle<DeviceStatus>, FanError> {
        self.session()?.request(Command::RequestCurrentState)
    }

    pub fn request_sensor_data(&self) -> Result<ReplyHandle<SensorData>, FanError> {
        self.session()?.request(Command::RequestSensorData)
    }

    /// Number of requests that have not concluded yet
    pub fn pending_messages(&self) -> usize {
        match &*self.inner.lock_state() {
            LinkState::Connected(handle) => handle.pending_messages(),
            _ => 0,
        }
    }

    pub fn has_pending_messages(&self) -> bool {
        self.pending_messages() > 0
    }

    /// Closes the session; outstanding requests fail with [`FanError::Abandoned`]
    ///
    /// Waits for a connection attempt in progress before closing it.
    pub async fn disconnect(&self) {
        loop {
            let state = {
                let mut state = self.inner.lock_state();
                match &*state {
                    LinkState::Connecting(progress) => Err(progress.clone()),
                    _ => Ok(std::mem::replace(&mut *state, LinkState::Unconnected)),
                }
            };

            match state {
                Err(mut progress) => {
                    let _ = progress.wait_for(Option::is_some).await;
                }
                Ok(LinkState::Connected(handle)) => {
                    info!("Disconnecting from {}", self.inner.model);
                    handle.shutdown().await;
                    return;
                }
                Ok(_) => return,
            }
        }
    }
}

impl std::fmt::Debug for Fan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fan")
            .field("model", &self.inner.model)
            .field("connection_state", &self.connection_state())
            .finish()
    }
}
