//! Fan speed (`fnsp`)

use crate::error::SettingError;

wire_enum! {
    /// One of ten discrete power levels, or automatic
    FanSpeed {
        Power1 => "0001",
        Power2 => "0002",
        Power3 => "0003",
        Power4 => "0004",
        Power5 => "0005",
        Power6 => "0006",
        Power7 => "0007",
        Power8 => "0008",
        Power9 => "0009",
        Power10 => "0010",
        Auto => "AUTO",
    }
}

impl FanSpeed {
    /// Speed for a power level between 1 and 10 (inclusive)
    pub fn power(level: i64) -> Result<FanSpeed, SettingError> {
        if !(1..=10).contains(&level) {
            return Err(SettingError::SpeedOutOfRange(level));
        }
        Ok(Self::VALUES[(level - 1) as usize])
    }

    /// Power level, or `None` for [`FanSpeed::Auto`]
    pub fn level(self) -> Option<u8> {
        Self::VALUES[..10]
            .iter()
            .position(|speed| *speed == self)
            .map(|index| index as u8 + 1)
    }
}
