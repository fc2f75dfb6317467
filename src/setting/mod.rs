//! Setting catalogue
//!
//! Every setting a fan exposes over MQTT is identified on the wire by a short id
//! (`fnsp`, `oson`, ...) and carries a value of one specific type. The catalogue is a
//! closed enum ([`Setting`]) plus one value type per setting, tied together by the
//! [`StateValue`] trait so that the setting a value belongs to is known at compile time.
//!
//! # Architecture
//!
//! ```text
//! wire id ──► Setting::describe ──► Setting ──► Setting::decode ──► SettingValue
//!                                                                      │
//!                         typed value (FanSpeed, SleepTimer, ...) ◄────┘ StateValue::from_value
//! ```
//!
//! The id table is built once on first use and never mutated afterwards.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Declares a setting value type backed by a fixed set of wire tokens
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $token:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// All values in declaration order
            pub const VALUES: &'static [$name] = &[$( $name::$variant ),+];

            /// Wire token of this value
            pub fn token(self) -> &'static str {
                match self {
                    $( $name::$variant => $token ),+
                }
            }
        }

        impl $crate::setting::WireToken for $name {
            fn to_wire(&self) -> String {
                self.token().to_string()
            }

            fn from_wire(raw: &str) -> Option<Self> {
                match raw {
                    $( $token => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.token())
            }
        }
    };
}

pub mod simple;
pub mod sleep_timer;
pub mod speed;
pub mod temperature;

pub use simple::{
    AirQualityMonitor, AirQualityTarget, FanMode, FocusMode, HeatMode, NightMode, Oscillation,
    ResetFilterState,
};
pub use sleep_timer::SleepTimer;
pub use speed::FanSpeed;
pub use temperature::{TemperatureLimit, TemperatureUnit};

/// Conversion between a value and its wire token
///
/// `to_wire` is total. `from_wire` is partial: tokens it does not recognise yield
/// `None`, which decoders treat as "field omitted".
pub trait WireToken: Sized {
    fn to_wire(&self) -> String;

    fn from_wire(raw: &str) -> Option<Self>;
}

/// A value type bound to exactly one [`Setting`]
pub trait StateValue: WireToken + Clone + Into<SettingValue> {
    /// The setting this type is the value of
    const SETTING: Setting;

    /// Borrows the typed value out of a [`SettingValue`] of the matching variant
    fn from_value(value: &SettingValue) -> Option<&Self>;
}

macro_rules! settings {
    ( $( $setting:ident => $id:literal, $name:literal, $value:ty; )+ ) => {
        /// Descriptor of a single fan setting
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Setting {
            $( $setting ),+
        }

        impl Setting {
            /// Every setting, in registration order
            pub const ALL: &'static [Setting] = &[$( Setting::$setting ),+];

            /// Wire id used as the key in payload data blocks
            pub fn id(self) -> &'static str {
                match self {
                    $( Setting::$setting => $id ),+
                }
            }

            /// Human-readable name
            pub fn name(self) -> &'static str {
                match self {
                    $( Setting::$setting => $name ),+
                }
            }

            /// Decodes a wire token into this setting's value type
            pub fn decode(self, raw: &str) -> Option<SettingValue> {
                match self {
                    $( Setting::$setting => <$value as WireToken>::from_wire(raw).map(SettingValue::$setting) ),+
                }
            }
        }

        /// A value of any setting, tagged by the setting it belongs to
        #[derive(Debug, Clone, PartialEq)]
        pub enum SettingValue {
            $( $setting($value) ),+
        }

        impl SettingValue {
            /// The setting this value belongs to
            pub fn setting(&self) -> Setting {
                match self {
                    $( SettingValue::$setting(_) => Setting::$setting ),+
                }
            }

            pub fn to_wire(&self) -> String {
                match self {
                    $( SettingValue::$setting(value) => value.to_wire() ),+
                }
            }
        }

        $(
            impl From<$value> for SettingValue {
                fn from(value: $value) -> Self {
                    SettingValue::$setting(value)
                }
            }

            impl StateValue for $value {
                const SETTING: Setting = Setting::$setting;

                fn from_value(value: &SettingValue) -> Option<&Self> {
                    match value {
                        SettingValue::$setting(inner) => Some(inner),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )+
    };
}

settings! {
    FanMode => "fmod", "Fan Mode", FanMode;
    FanSpeed => "fnsp", "Fan Speed", FanSpeed;
    Oscillation => "oson", "Oscillation", Oscillation;
    SleepTimer => "sltm", "Sleep Timer", SleepTimer;
    MonitorAirQuality => "rhtm", "Monitor Air Quality", AirQualityMonitor;
    ResetFilterState => "rsft", "Reset Filter State", ResetFilterState;
    AirQualityTarget => "qtar", "Air Quality Target", AirQualityTarget;
    NightMode => "nmod", "Night Mode", NightMode;
    HeatMode => "hmod", "Heat Mode", HeatMode;
    FocusMode => "ffoc", "Focus Mode", FocusMode;
    MaximumTemperature => "hmax", "Maximum Temperature", TemperatureLimit;
}

static BY_ID: Lazy<HashMap<&'static str, Setting>> = Lazy::new(|| {
    let mut table = HashMap::with_capacity(Setting::ALL.len());
    for &setting in Setting::ALL {
        if table.insert(setting.id(), setting).is_some() {
            panic!("duplicate setting wire id registered: {}", setting.id());
        }
    }
    table
});

impl Setting {
    /// Looks up a setting by its wire id
    pub fn describe(id: &str) -> Option<Setting> {
        BY_ID.get(id).copied()
    }

    /// Every setting, in registration order
    pub fn all() -> &'static [Setting] {
        Self::ALL
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}
