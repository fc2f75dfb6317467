//! Outbound commands and the JSON payloads exchanged with the fan
//!
//! Every payload is a JSON object carrying a message tag (`msg`), a send time (`time`)
//! and, for setting changes, a `data` block of wire id → wire token pairs:
//!
//! ```text
//! { "msg": "STATE-SET", "time": "2024-05-01T12:00:00.000Z", "data": { "oson": "ON" } }
//! ```

use crate::error::DecodeError;
use crate::model::FanModel;
use crate::setting::{Setting, SettingValue, StateValue};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Outbound tag for setting changes
pub const MESSAGE_STATE_SET: &str = "STATE-SET";
/// Outbound tag for status and sensor data requests
pub const MESSAGE_REQUEST_CURRENT_STATE: &str = "REQUEST-CURRENT-STATE";
/// Inbound tag of a status reply
pub const MESSAGE_CURRENT_STATE: &str = "CURRENT-STATE";
/// Inbound tag of a sensor data reply
pub const MESSAGE_ENVIRONMENTAL_SENSOR_DATA: &str = "ENVIRONMENTAL-CURRENT-SENSOR-DATA";

/// Kind of reply a command waits for, identified on the wire by its message tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    CurrentState,
    EnvironmentalSensorData,
}

impl ReplyKind {
    pub fn tag(self) -> &'static str {
        match self {
            ReplyKind::CurrentState => MESSAGE_CURRENT_STATE,
            ReplyKind::EnvironmentalSensorData => MESSAGE_ENVIRONMENTAL_SENSOR_DATA,
        }
    }

    pub fn from_tag(tag: &str) -> Option<ReplyKind> {
        match tag {
            MESSAGE_CURRENT_STATE => Some(ReplyKind::CurrentState),
            MESSAGE_ENVIRONMENTAL_SENSOR_DATA => Some(ReplyKind::EnvironmentalSensorData),
            _ => None,
        }
    }
}

/// A batch of setting changes sent in a single message
///
/// Each setting appears at most once; setting it again replaces the earlier value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateChange {
    values: BTreeMap<Setting, SettingValue>,
}

impl StateChange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a typed value, replacing any earlier value for the same setting
    pub fn set<T: StateValue>(mut self, value: T) -> Self {
        self.insert(value.into());
        self
    }

    pub fn insert(&mut self, value: SettingValue) {
        self.values.insert(value.setting(), value);
    }

    /// Drops every setting the predicate rejects
    pub fn retain(&mut self, mut keep: impl FnMut(Setting) -> bool) {
        self.values.retain(|setting, _| keep(*setting));
    }

    /// Drops settings the model does not support
    pub fn retain_supported(&mut self, model: FanModel) {
        self.retain(|setting| model.supports_feature(setting));
    }

    pub fn get(&self, setting: Setting) -> Option<&SettingValue> {
        self.values.get(&setting)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> impl Iterator<Item = &SettingValue> {
        self.values.values()
    }
}

impl FromIterator<SettingValue> for StateChange {
    fn from_iter<I: IntoIterator<Item = SettingValue>>(iter: I) -> Self {
        let mut change = StateChange::new();
        for value in iter {
            change.insert(value);
        }
        change
    }
}

/// An operation sent to the fan
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Change one setting
    SetOne(SettingValue),
    /// Change several settings at once
    SetMany(StateChange),
    /// Ask for a [`DeviceStatus`](crate::mqtt::response::DeviceStatus)
    RequestCurrentState,
    /// Ask for [`SensorData`](crate::mqtt::response::SensorData)
    RequestSensorData,
}

impl Command {
    /// Outbound message tag
    ///
    /// Both request kinds share one tag; the reply tag is what tells them apart.
    pub fn message_tag(&self) -> &'static str {
        match self {
            Command::SetOne(_) | Command::SetMany(_) => MESSAGE_STATE_SET,
            Command::RequestCurrentState | Command::RequestSensorData => {
                MESSAGE_REQUEST_CURRENT_STATE
            }
        }
    }

    /// Reply this command waits for, if any
    pub fn expected_reply(&self) -> Option<ReplyKind> {
        match self {
            Command::SetOne(_) | Command::SetMany(_) => None,
            Command::RequestCurrentState => Some(ReplyKind::CurrentState),
            Command::RequestSensorData => Some(ReplyKind::EnvironmentalSensorData),
        }
    }

    pub fn encode(&self) -> OutboundPayload {
        self.encode_at(Utc::now())
    }

    /// Builds the payload with an explicit send time
    pub fn encode_at(&self, at: DateTime<Utc>) -> OutboundPayload {
        let data = match self {
            Command::SetOne(value) => Some(
                [(value.setting().id().to_string(), value.to_wire())]
                    .into_iter()
                    .collect(),
            ),
            Command::SetMany(change) => Some(
                change
                    .values()
                    .map(|value| (value.setting().id().to_string(), value.to_wire()))
                    .collect(),
            ),
            Command::RequestCurrentState | Command::RequestSensorData => None,
        };

        OutboundPayload {
            msg: self.message_tag().to_string(),
            time: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
        }
    }
}

/// JSON body of an outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub msg: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
}

impl OutboundPayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A parsed inbound message: its tag plus the raw JSON object
#[derive(Debug, Clone, PartialEq)]
pub struct InboundPayload {
    tag: String,
    body: Map<String, Value>,
}

impl InboundPayload {
    pub fn parse(raw: &[u8]) -> Result<InboundPayload, DecodeError> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;

        let Value::Object(body) = value else {
            return Err(DecodeError::MalformedPayload(
                "payload is not a JSON object".to_string(),
            ));
        };

        let tag = match body.get("msg") {
            Some(Value::String(tag)) => tag.clone(),
            Some(other) => {
                return Err(DecodeError::InvalidField {
                    field: "msg",
                    value: other.to_string(),
                })
            }
            None => return Err(DecodeError::MissingField("msg")),
        };

        Ok(InboundPayload { tag, body })
    }

    /// Message tag (`msg`)
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// First of the named object blocks present in the payload
    pub fn block(&self, keys: &[&str]) -> Option<&Map<String, Value>> {
        keys.iter()
            .find_map(|key| self.body.get(*key).and_then(Value::as_object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setting::{FanSpeed, NightMode, Oscillation};
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn set_one_populates_a_single_data_entry() {
        let payload = Command::SetOne(Oscillation::On.into()).encode_at(fixed_time());

        assert_eq!(payload.msg, "STATE-SET");
        assert_eq!(payload.time, "2024-05-01T12:00:00.000Z");
        let data = payload.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("oson").map(String::as_str), Some("ON"));
    }

    #[test]
    fn set_many_populates_every_entry() {
        let change = StateChange::new()
            .set(FanSpeed::Power4)
            .set(NightMode::On)
            .set(FanSpeed::Power6);
        assert_eq!(change.len(), 2);

        let payload = Command::SetMany(change).encode_at(fixed_time());
        let data = payload.data.unwrap();
        assert_eq!(data.get("fnsp").map(String::as_str), Some("0006"));
        assert_eq!(data.get("nmod").map(String::as_str), Some("ON"));
    }

    #[test]
    fn requests_share_a_tag_and_carry_no_data() {
        let status = Command::RequestCurrentState.encode_at(fixed_time());
        let sensors = Command::RequestSensorData.encode_at(fixed_time());

        assert_eq!(status.msg, "REQUEST-CURRENT-STATE");
        assert_eq!(sensors.msg, "REQUEST-CURRENT-STATE");
        assert!(status.data.is_none());

        let json: Value = serde_json::from_slice(&status.to_bytes().unwrap()).unwrap();
        assert!(json.get("data").is_none());
        assert!(json.get("time").is_some());
    }

    #[test]
    fn expected_replies() {
        assert_eq!(Command::SetOne(Oscillation::Off.into()).expected_reply(), None);
        assert_eq!(
            Command::RequestCurrentState.expected_reply(),
            Some(ReplyKind::CurrentState)
        );
        assert_eq!(
            Command::RequestSensorData.expected_reply(),
            Some(ReplyKind::EnvironmentalSensorData)
        );
    }

    #[test]
    fn parse_extracts_the_tag() {
        let payload = InboundPayload::parse(br#"{"msg":"CURRENT-STATE","data":{}}"#).unwrap();
        assert_eq!(payload.tag(), "CURRENT-STATE");
        assert!(payload.block(&["data"]).is_some());
        assert!(payload.block(&["product-state"]).is_none());
    }

    #[test]
    fn parse_rejects_non_objects_and_missing_tags() {
        assert!(matches!(
            InboundPayload::parse(b"not json"),
            Err(DecodeError::MalformedPayload(_))
        ));
        assert!(matches!(
            InboundPayload::parse(b"[1,2]"),
            Err(DecodeError::MalformedPayload(_))
        ));
        assert_eq!(
            InboundPayload::parse(br#"{"data":{}}"#),
            Err(DecodeError::MissingField("msg"))
        );
    }
}
