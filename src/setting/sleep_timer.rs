//! Sleep timer (`sltm`)

use super::WireToken;
use crate::error::SettingError;
use std::fmt;

const OFF_TOKEN: &str = "OFF";

/// Minutes until the fan switches itself off, or off
///
/// Zero minutes is the canonical off value; constructors collapse every
/// non-positive duration onto [`SleepTimer::OFF`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SleepTimer {
    minutes: u16,
}

impl SleepTimer {
    pub const OFF: SleepTimer = SleepTimer { minutes: 0 };

    /// Largest accepted duration
    pub const MAX_MINUTES: i64 = 9999;

    pub fn of_minutes(minutes: i64) -> Result<SleepTimer, SettingError> {
        if minutes <= 0 {
            return Ok(Self::OFF);
        }
        if minutes > Self::MAX_MINUTES {
            return Err(SettingError::SleepTimerTooLong(minutes));
        }
        Ok(SleepTimer {
            minutes: minutes as u16,
        })
    }

    pub fn of_hours(hours: i64) -> Result<SleepTimer, SettingError> {
        Self::of_minutes(hours.saturating_mul(60))
    }

    /// Sleep timer for a duration, truncated to whole minutes
    pub fn from_duration(duration: chrono::Duration) -> Result<SleepTimer, SettingError> {
        Self::of_minutes(duration.num_minutes())
    }

    pub fn minutes(&self) -> u16 {
        self.minutes
    }

    pub fn is_off(&self) -> bool {
        self.minutes == 0
    }
}

impl WireToken for SleepTimer {
    fn to_wire(&self) -> String {
        if self.is_off() {
            OFF_TOKEN.to_string()
        } else {
            self.minutes.to_string()
        }
    }

    fn from_wire(raw: &str) -> Option<Self> {
        if raw == OFF_TOKEN {
            return Some(Self::OFF);
        }
        let minutes: u32 = raw.parse().ok()?;
        Self::of_minutes(i64::from(minutes)).ok()
    }
}

impl fmt::Display for SleepTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_off() {
            write!(f, "off")
        } else {
            write!(f, "{} min", self.minutes)
        }
    }
}
