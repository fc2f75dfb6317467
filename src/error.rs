//! Error types shared by the setting catalogue, the payload codec and the fan connection.

use thiserror::Error;

/// Errors raised while constructing a setting value
///
/// These are raised at construction time only. Decoding a wire token never produces
/// a `SettingError`; unknown or out-of-range tokens decode to `None` instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingError {
    /// Fan speed outside of the ten discrete levels
    #[error("Fan speed must be within 1 - 10 (inclusive). Given: {0}")]
    SpeedOutOfRange(i64),

    /// Sleep timer of 10,000 minutes or more
    #[error("Sleep timer must not exceed 9999 minutes. Given: {0}")]
    SleepTimerTooLong(i64),

    /// Temperature limit outside of the unit's hard bounds
    #[error("Temperature must be within {min} - {max} {unit}. Given: {given} {unit}")]
    TemperatureOutOfRange {
        unit: &'static str,
        min: f32,
        max: f32,
        given: f32,
    },
}

/// Errors raised while decoding an inbound payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Payload is not a JSON object
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Mandatory field is absent
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Field is present but its value cannot be interpreted
    #[error("Invalid value for field {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Errors surfaced to callers of the fan API
///
/// A single connect outcome is cloned to every caller joined on the same attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FanError {
    /// The transport could not be reached, rejected the credentials or timed out
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// An operation was attempted without an active connection
    #[error("Not connected to fan")]
    NotConnected,

    /// The transport refused or failed to send a payload
    #[error("Publish error: {0}")]
    PublishError(String),

    /// A reply matched a pending request but could not be decoded
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// The connection was torn down before a reply arrived
    #[error("Reply abandoned: connection was closed")]
    Abandoned,

    /// The caller stopped waiting for a reply
    #[error("Timed out waiting for reply")]
    Timeout,
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
