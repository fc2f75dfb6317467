//! # fanlink
//!
//! Local control of Wi-Fi connected air purifier fans through the MQTT broker each
//! device runs on the home network.
//!
//! ```text
//! fanlink/
//! ├── setting/     - Setting catalogue and typed setting values
//! ├── model.rs     - Fan models and product codes
//! ├── credentials.rs
//! ├── mqtt/        - Payload codec, reply correlation, MQTT session
//! ├── fan.rs       - The typed fan API
//! ├── config.rs    - TOML configuration
//! └── error.rs
//! ```
//!
//! ```no_run
//! use fanlink::{Fan, FanCredentials, FanModel, FanSpeed};
//!
//! # async fn run() -> Result<(), fanlink::FanError> {
//! let credentials = FanCredentials::new("DYSON-NN2-EU-ABC1234A", "label password");
//! let fan = Fan::new(FanModel::PureCoolLinkTower, "192.168.1.20", 1883, credentials);
//! fan.connect().await?;
//!
//! fan.set_state(FanSpeed::Power4)?.await?;
//! let status = fan.request_current_state()?.await?;
//! println!("{}", status);
//!
//! fan.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod fan;
pub mod model;
pub mod mqtt;
pub mod setting;

pub use config::FanConfig;
pub use credentials::FanCredentials;
pub use error::{ConfigError, DecodeError, FanError, SettingError};
pub use fan::Fan;
pub use model::FanModel;
pub use mqtt::correlation::ReplyHandle;
pub use mqtt::message::{Command, StateChange};
pub use mqtt::mqtt_handler::{ConnectionState, MqttStatus};
pub use mqtt::response::{AmbientTemperature, DeviceStatus, SensorData, VolatileCompounds};
pub use setting::{
    AirQualityMonitor, AirQualityTarget, FanMode, FanSpeed, FocusMode, HeatMode, NightMode,
    Oscillation, ResetFilterState, Setting, SettingValue, SleepTimer, StateValue,
    TemperatureLimit, TemperatureUnit, WireToken,
};
