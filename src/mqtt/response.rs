//! Decoders for the fan's replies
//!
//! A status reply carries three mandatory fields (`ercd`, `wacd`, `filf`) and any number
//! of setting fields. Setting fields are decoded through the setting catalogue; ids the
//! catalogue does not know and tokens a setting does not accept are left out of the
//! decoded map rather than failing the reply.
//!
//! A sensor reply is all-or-nothing: any field that cannot be read fails the decode.

use crate::error::DecodeError;
use crate::mqtt::message::InboundPayload;
use crate::setting::{ResetFilterState, Setting, SettingValue, SleepTimer, StateValue};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Error code reported by a fan operating normally
pub const ERROR_CODE_NORMAL: &str = "02C0";
/// Alternative normal error code reported by some firmware
pub const ERROR_CODE_NORMAL_ALT: &str = "02C9";
/// Error code reported when the filter must be replaced
pub const ERROR_CODE_REPLACE_FILTER: &str = "NONE";
/// Warning code reported by a fan operating normally
pub const WARNING_CODE_NORMAL: &str = "NONE";
/// Warning code reported when the filter must be replaced
pub const WARNING_CODE_REPLACE_FILTER: &str = "FLTR";

/// Blocks a status reply may carry its fields in, in lookup order
const STATUS_BLOCKS: &[&str] = &["data", "product-state"];
const SENSOR_BLOCKS: &[&str] = &["data"];
const OFF_TOKEN: &str = "OFF";
const INIT_TOKEN: &str = "INIT";

/// Snapshot of the fan's state
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    error_code: String,
    warning_code: String,
    remaining_filter_life: u32,
    settings: BTreeMap<Setting, SettingValue>,
}

impl DeviceStatus {
    pub fn decode(payload: &InboundPayload) -> Result<DeviceStatus, DecodeError> {
        let block = payload
            .block(STATUS_BLOCKS)
            .ok_or(DecodeError::MissingField("data"))?;

        let error_code = required_str(block, "ercd")?.to_string();
        let warning_code = required_str(block, "wacd")?.to_string();
        let filter = required_str(block, "filf")?;
        let remaining_filter_life = filter.parse().map_err(|_| DecodeError::InvalidField {
            field: "filf",
            value: filter.to_string(),
        })?;

        let mut settings = BTreeMap::new();
        for &setting in Setting::all() {
            let Some(raw) = block.get(setting.id()).and_then(Value::as_str) else {
                continue;
            };
            if let Some(value) = setting.decode(raw) {
                settings.insert(setting, value);
            }
        }

        if error_code == ERROR_CODE_REPLACE_FILTER {
            settings.insert(Setting::ResetFilterState, ResetFilterState::Reset.into());
        }

        Ok(DeviceStatus {
            error_code,
            warning_code,
            remaining_filter_life,
            settings,
        })
    }

    pub fn error_code(&self) -> &str {
        &self.error_code
    }

    pub fn warning_code(&self) -> &str {
        &self.warning_code
    }

    /// Remaining filter life in hours
    pub fn remaining_filter_life(&self) -> u32 {
        self.remaining_filter_life
    }

    /// Typed value of a setting, if the reply carried it
    pub fn get<T: StateValue>(&self) -> Option<&T> {
        self.settings.get(&T::SETTING).and_then(T::from_value)
    }

    pub fn value(&self, setting: Setting) -> Option<&SettingValue> {
        self.settings.get(&setting)
    }

    pub fn settings(&self) -> &BTreeMap<Setting, SettingValue> {
        &self.settings
    }

    pub fn needs_filter_replacement(&self) -> bool {
        self.error_code == ERROR_CODE_REPLACE_FILTER
            || self.warning_code == WARNING_CODE_REPLACE_FILTER
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error code:            {}", self.error_code)?;
        writeln!(f, "Warning code:          {}", self.warning_code)?;
        write!(f, "Remaining filter life: {} h", self.remaining_filter_life)?;
        for (setting, value) in &self.settings {
            write!(f, "\n{:<22} {}", format!("{}:", setting.name()), value)?;
        }
        Ok(())
    }
}

/// Ambient temperature reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AmbientTemperature {
    /// Sensor is switched off
    Off,
    Kelvin(f32),
}

impl AmbientTemperature {
    pub fn kelvin(self) -> Option<f32> {
        match self {
            AmbientTemperature::Off => None,
            AmbientTemperature::Kelvin(kelvin) => Some(kelvin),
        }
    }
}

impl fmt::Display for AmbientTemperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmbientTemperature::Off => write!(f, "off"),
            AmbientTemperature::Kelvin(kelvin) => write!(f, "{:.1} K", kelvin),
        }
    }
}

/// Volatile organic compound reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatileCompounds {
    /// Sensor is still warming up
    Initializing,
    Level(u32),
}

impl fmt::Display for VolatileCompounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatileCompounds::Initializing => write!(f, "initializing"),
            VolatileCompounds::Level(level) => write!(f, "{}", level),
        }
    }
}

/// Environmental sensor readings
#[derive(Debug, Clone, PartialEq)]
pub struct SensorData {
    pub temperature: AmbientTemperature,
    /// Relative humidity in percent
    pub humidity: u32,
    pub particles: u32,
    pub volatile_compounds: VolatileCompounds,
    pub sleep_timer: SleepTimer,
}

impl SensorData {
    pub fn decode(payload: &InboundPayload) -> Result<SensorData, DecodeError> {
        let block = payload
            .block(SENSOR_BLOCKS)
            .ok_or(DecodeError::MissingField("data"))?;

        let temperature = match required_str(block, "tact")? {
            OFF_TOKEN => AmbientTemperature::Off,
            raw => AmbientTemperature::Kelvin(parse_number::<f32>("tact", raw)? / 10.0),
        };

        let humidity = parse_number("hact", required_str(block, "hact")?)?;
        let particles = parse_number("pact", required_str(block, "pact")?)?;

        let volatile_compounds = match required_str(block, "vact")? {
            INIT_TOKEN => VolatileCompounds::Initializing,
            raw => VolatileCompounds::Level(parse_number("vact", raw)?),
        };

        let sleep_timer = match required_str(block, "sltm")? {
            OFF_TOKEN => SleepTimer::OFF,
            raw => {
                let minutes: i64 = parse_number("sltm", raw)?;
                SleepTimer::of_minutes(minutes).map_err(|_| DecodeError::InvalidField {
                    field: "sltm",
                    value: raw.to_string(),
                })?
            }
        };

        Ok(SensorData {
            temperature,
            humidity,
            particles,
            volatile_compounds,
            sleep_timer,
        })
    }
}

impl fmt::Display for SensorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Temperature:        {}", self.temperature)?;
        writeln!(f, "Humidity:           {} %", self.humidity)?;
        writeln!(f, "Particles:          {}", self.particles)?;
        writeln!(f, "Volatile compounds: {}", self.volatile_compounds)?;
        write!(f, "Sleep timer:        {}", self.sleep_timer)
    }
}

fn required_str<'a>(block: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, DecodeError> {
    match block.get(field) {
        Some(Value::String(raw)) => Ok(raw),
        Some(other) => Err(DecodeError::InvalidField {
            field,
            value: other.to_string(),
        }),
        None => Err(DecodeError::MissingField(field)),
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, DecodeError> {
    raw.parse().map_err(|_| DecodeError::InvalidField {
        field,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setting::{FanSpeed, NightMode, Oscillation};

    fn payload(json: &str) -> InboundPayload {
        InboundPayload::parse(json.as_bytes()).unwrap()
    }

    #[test]
    fn status_with_only_mandatory_fields() {
        let status = DeviceStatus::decode(&payload(
            r#"{"msg":"CURRENT-STATE","data":{"ercd":"02C0","wacd":"NONE","filf":"500"}}"#,
        ))
        .unwrap();

        assert_eq!(status.error_code(), "02C0");
        assert_eq!(status.warning_code(), "NONE");
        assert_eq!(status.remaining_filter_life(), 500);
        assert!(status.settings().is_empty());
        assert!(!status.needs_filter_replacement());
    }

    #[test]
    fn status_decodes_known_settings_and_skips_the_rest() {
        let status = DeviceStatus::decode(&payload(
            r#"{"msg":"CURRENT-STATE","data":{
                "ercd":"02C0","wacd":"NONE","filf":"2117",
                "fnsp":"0004","oson":"ON","nmod":"MAYBE","zzzz":"1"
            }}"#,
        ))
        .unwrap();

        assert_eq!(status.get::<FanSpeed>(), Some(&FanSpeed::Power4));
        assert_eq!(status.get::<Oscillation>(), Some(&Oscillation::On));
        assert_eq!(status.get::<NightMode>(), None);
        assert_eq!(status.settings().len(), 2);
    }

    #[test]
    fn status_error_code_none_implies_filter_reset() {
        let status = DeviceStatus::decode(&payload(
            r#"{"msg":"CURRENT-STATE","data":{"ercd":"NONE","wacd":"FLTR","filf":"0"}}"#,
        ))
        .unwrap();

        assert_eq!(status.get::<ResetFilterState>(), Some(&ResetFilterState::Reset));
        assert!(status.needs_filter_replacement());
    }

    #[test]
    fn status_reads_product_state_block() {
        let status = DeviceStatus::decode(&payload(
            r#"{"msg":"CURRENT-STATE","product-state":{"ercd":"02C9","wacd":"NONE","filf":"12","fmod":"AUTO"}}"#,
        ))
        .unwrap();

        assert_eq!(status.error_code(), ERROR_CODE_NORMAL_ALT);
        assert_eq!(status.value(Setting::FanMode).map(|v| v.to_wire()), Some("AUTO".to_string()));
    }

    #[test]
    fn status_missing_or_invalid_mandatory_fields_fail() {
        assert_eq!(
            DeviceStatus::decode(&payload(r#"{"msg":"CURRENT-STATE","data":{"ercd":"02C0","filf":"1"}}"#)),
            Err(DecodeError::MissingField("wacd"))
        );
        assert_eq!(
            DeviceStatus::decode(&payload(
                r#"{"msg":"CURRENT-STATE","data":{"ercd":"02C0","wacd":"NONE","filf":"lots"}}"#
            )),
            Err(DecodeError::InvalidField {
                field: "filf",
                value: "lots".to_string()
            })
        );
        assert_eq!(
            DeviceStatus::decode(&payload(r#"{"msg":"CURRENT-STATE"}"#)),
            Err(DecodeError::MissingField("data"))
        );
    }

    #[test]
    fn sensor_data_decodes_every_field() {
        let data = SensorData::decode(&payload(
            r#"{"msg":"ENVIRONMENTAL-CURRENT-SENSOR-DATA","data":{
                "tact":"2955","hact":"0041","pact":"0003","vact":"0002","sltm":"0030"
            }}"#,
        ))
        .unwrap();

        assert_eq!(data.temperature, AmbientTemperature::Kelvin(295.5));
        assert_eq!(data.humidity, 41);
        assert_eq!(data.particles, 3);
        assert_eq!(data.volatile_compounds, VolatileCompounds::Level(2));
        assert_eq!(data.sleep_timer.minutes(), 30);
    }

    #[test]
    fn sensor_data_sentinels() {
        let data = SensorData::decode(&payload(
            r#"{"msg":"ENVIRONMENTAL-CURRENT-SENSOR-DATA","data":{
                "tact":"OFF","hact":"50","pact":"0","vact":"INIT","sltm":"OFF"
            }}"#,
        ))
        .unwrap();

        assert_eq!(data.temperature, AmbientTemperature::Off);
        assert_eq!(data.temperature.kelvin(), None);
        assert_eq!(data.volatile_compounds, VolatileCompounds::Initializing);
        assert!(data.sleep_timer.is_off());
    }

    #[test]
    fn sensor_data_fails_as_a_whole() {
        let result = SensorData::decode(&payload(
            r#"{"msg":"ENVIRONMENTAL-CURRENT-SENSOR-DATA","data":{
                "tact":"2955","hact":"wet","pact":"0","vact":"1","sltm":"OFF"
            }}"#,
        ));
        assert_eq!(
            result,
            Err(DecodeError::InvalidField {
                field: "hact",
                value: "wet".to_string()
            })
        );

        let result = SensorData::decode(&payload(
            r#"{"msg":"ENVIRONMENTAL-CURRENT-SENSOR-DATA","data":{"tact":"2955"}}"#,
        ));
        assert_eq!(result, Err(DecodeError::MissingField("hact")));
    }
}
