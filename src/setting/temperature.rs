//! Temperature units and the heating limit (`hmax`)

use super::WireToken;
use crate::error::SettingError;
use std::fmt;

const FAHRENHEIT_FREEZING: f32 = 32.0;
const KELVIN_FREEZING_IN_CELSIUS: f32 = 273.15;
const NINE_FIFTHS: f32 = 9.0 / 5.0;

/// Unit a temperature is expressed in
///
/// Each unit carries its own hard bounds for [`TemperatureLimit`]; they are not exact
/// conversions of one another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl TemperatureUnit {
    pub const VALUES: &'static [TemperatureUnit] = &[
        TemperatureUnit::Celsius,
        TemperatureUnit::Fahrenheit,
        TemperatureUnit::Kelvin,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "Celsius",
            TemperatureUnit::Fahrenheit => "Fahrenheit",
            TemperatureUnit::Kelvin => "Kelvin",
        }
    }

    /// Lowest temperature limit accepted in this unit
    pub fn min_value(self) -> f32 {
        match self {
            TemperatureUnit::Celsius => 1.0,
            TemperatureUnit::Fahrenheit => 34.0,
            TemperatureUnit::Kelvin => 274.15,
        }
    }

    /// Highest temperature limit accepted in this unit
    pub fn max_value(self) -> f32 {
        match self {
            TemperatureUnit::Celsius => 37.0,
            TemperatureUnit::Fahrenheit => 98.0,
            TemperatureUnit::Kelvin => 310.15,
        }
    }

    pub fn to_celsius(self, temperature: f32) -> f32 {
        match self {
            TemperatureUnit::Celsius => temperature,
            TemperatureUnit::Fahrenheit => (temperature - FAHRENHEIT_FREEZING) / NINE_FIFTHS,
            TemperatureUnit::Kelvin => temperature - KELVIN_FREEZING_IN_CELSIUS,
        }
    }

    pub fn to_fahrenheit(self, temperature: f32) -> f32 {
        match self {
            TemperatureUnit::Celsius => temperature * NINE_FIFTHS + FAHRENHEIT_FREEZING,
            TemperatureUnit::Fahrenheit => temperature,
            TemperatureUnit::Kelvin => {
                (temperature - KELVIN_FREEZING_IN_CELSIUS) * NINE_FIFTHS + FAHRENHEIT_FREEZING
            }
        }
    }

    pub fn to_kelvin(self, temperature: f32) -> f32 {
        match self {
            TemperatureUnit::Celsius => temperature + KELVIN_FREEZING_IN_CELSIUS,
            TemperatureUnit::Fahrenheit => self.to_celsius(temperature) + KELVIN_FREEZING_IN_CELSIUS,
            TemperatureUnit::Kelvin => temperature,
        }
    }

    /// Converts a temperature expressed in this unit into `target`
    pub fn convert(self, target: TemperatureUnit, temperature: f32) -> f32 {
        match target {
            TemperatureUnit::Celsius => self.to_celsius(temperature),
            TemperatureUnit::Fahrenheit => self.to_fahrenheit(temperature),
            TemperatureUnit::Kelvin => self.to_kelvin(temperature),
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Upper temperature the fan heats to, stored in kelvin
///
/// Equality tolerates [`TemperatureLimit::EPSILON`] of difference so that limits built
/// in different units compare equal when they describe the same temperature.
#[derive(Debug, Clone, Copy)]
pub struct TemperatureLimit {
    kelvin: f32,
}

impl TemperatureLimit {
    pub const EPSILON: f32 = 0.02;

    pub fn new(temperature: f32, unit: TemperatureUnit) -> Result<TemperatureLimit, SettingError> {
        if !(unit.min_value()..=unit.max_value()).contains(&temperature) {
            return Err(SettingError::TemperatureOutOfRange {
                unit: unit.name(),
                min: unit.min_value(),
                max: unit.max_value(),
                given: temperature,
            });
        }
        Ok(TemperatureLimit {
            kelvin: unit.to_kelvin(temperature),
        })
    }

    /// The limit expressed in `unit`
    pub fn temperature(&self, unit: TemperatureUnit) -> f32 {
        TemperatureUnit::Kelvin.convert(unit, self.kelvin)
    }

    pub fn kelvin(&self) -> f32 {
        self.kelvin
    }
}

impl PartialEq for TemperatureLimit {
    fn eq(&self, other: &Self) -> bool {
        (self.kelvin - other.kelvin).abs() <= Self::EPSILON
    }
}

// The device expects whole kelvin followed by a literal zero digit; fractions are dropped.
impl WireToken for TemperatureLimit {
    fn to_wire(&self) -> String {
        format!("{}0", self.kelvin as i32)
    }

    fn from_wire(raw: &str) -> Option<Self> {
        let kelvin: u16 = raw.get(..3)?.parse().ok()?;
        Self::new(f32::from(kelvin), TemperatureUnit::Kelvin).ok()
    }
}

impl fmt::Display for TemperatureLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} K", self.kelvin)
    }
}
