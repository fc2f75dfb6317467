//! Settings whose values are a small fixed set of tokens

wire_enum! {
    /// Fan power mode (`fmod`)
    FanMode {
        On => "FAN",
        Off => "OFF",
        Auto => "AUTO",
    }
}

wire_enum! {
    /// Oscillation (`oson`)
    Oscillation {
        On => "ON",
        Off => "OFF",
    }
}

wire_enum! {
    /// Continuous air quality monitoring (`rhtm`)
    AirQualityMonitor {
        On => "ON",
        Off => "OFF",
    }
}

wire_enum! {
    /// Filter life reset request (`rsft`)
    ///
    /// Also synthesized by the status decoder when the device reports the
    /// replace-filter error code.
    ResetFilterState {
        Reset => "RSTF",
        DoNothing => "STET",
    }
}

wire_enum! {
    /// Air quality the fan aims for in auto mode (`qtar`)
    AirQualityTarget {
        Better => "0001",
        High => "0003",
        Normal => "0004",
    }
}

wire_enum! {
    /// Night mode (`nmod`)
    NightMode {
        On => "ON",
        Off => "OFF",
    }
}

wire_enum! {
    /// Heating (`hmod`)
    HeatMode {
        Heat => "HEAT",
        Off => "OFF",
    }
}

wire_enum! {
    /// Airflow focus (`ffoc`)
    FocusMode {
        Focus => "ON",
        Diffuse => "OFF",
    }
}
