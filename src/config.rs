/// Monitor configuration.
///
/// Resolved once at startup from compiled-in defaults plus optional string
/// overrides (the firmware feeds build-time `PROBEWATCH_*` variables).
use core::fmt;
use core::str::FromStr;

use crate::dedup::{DEFAULT_CAPACITY, MAX_CAPACITY};
use crate::sweep::{MAX_CHANNEL, MIN_CHANNEL};

/// Reference channel hop interval in milliseconds.
pub const DEFAULT_SWEEP_INTERVAL_MS: u32 = 30_000;

/// What happens to the observation buffer when a sweep cycle completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Keep entries across cycles; the oldest roll out when full
    Rolling,
    /// Clear the buffer after every full 1-14 sweep
    ResetPerSweep,
}

impl WindowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowPolicy::Rolling => "rolling",
            WindowPolicy::ResetPerSweep => "reset",
        }
    }
}

impl FromStr for WindowPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "rolling" | "roll" => Ok(WindowPolicy::Rolling),
            "reset" | "reset-per-sweep" => Ok(WindowPolicy::ResetPerSweep),
            _ => Err(ConfigError::UnknownPolicy),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Drop locally administered (randomized) addresses
    pub ignore_local_addresses: bool,
    /// Channel hop period
    pub sweep_interval_ms: u32,
    /// Stay on `initial_channel`; disables the sweep scheduler
    pub static_mode: bool,
    /// Static channel, or first channel of the sweep
    pub initial_channel: u8,
    pub buffer_capacity: usize,
    pub window_policy: WindowPolicy,
    /// Report every new address and channel change, not just summaries
    pub verbose: bool,
}

impl MonitorConfig {
    pub const fn new() -> Self {
        Self {
            ignore_local_addresses: false,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            static_mode: false,
            initial_channel: 1,
            buffer_capacity: DEFAULT_CAPACITY,
            window_policy: WindowPolicy::ResetPerSweep,
            verbose: true,
        }
    }

    /// Apply string overrides from `lookup` on top of `self` and validate.
    ///
    /// Recognized keys: `IGNORE_LOCAL_MACS`, `SWEEP_INTERVAL_MS`,
    /// `STATIC_MODE`, `INITIAL_CHANNEL`, `BUFFER_CAPACITY`, `WINDOW_POLICY`,
    /// `VERBOSE`. Missing keys keep their current value.
    pub fn with_overrides<'a, F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        if let Some(v) = lookup("IGNORE_LOCAL_MACS") {
            self.ignore_local_addresses = parse_bool(v)?;
        }
        if let Some(v) = lookup("SWEEP_INTERVAL_MS") {
            self.sweep_interval_ms = v.trim().parse().map_err(|_| ConfigError::InvalidNumber)?;
        }
        if let Some(v) = lookup("STATIC_MODE") {
            self.static_mode = parse_bool(v)?;
        }
        if let Some(v) = lookup("INITIAL_CHANNEL") {
            self.initial_channel = v.trim().parse().map_err(|_| ConfigError::InvalidNumber)?;
        }
        if let Some(v) = lookup("BUFFER_CAPACITY") {
            self.buffer_capacity = v.trim().parse().map_err(|_| ConfigError::InvalidNumber)?;
        }
        if let Some(v) = lookup("WINDOW_POLICY") {
            self.window_policy = v.parse()?;
        }
        if let Some(v) = lookup("VERBOSE") {
            self.verbose = parse_bool(v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reference defaults overridden by `PROBEWATCH_*` variables set at build time.
    pub fn from_build_env() -> Result<Self, ConfigError> {
        Self::new().with_overrides(|key| match key {
            "IGNORE_LOCAL_MACS" => option_env!("PROBEWATCH_IGNORE_LOCAL_MACS"),
            "SWEEP_INTERVAL_MS" => option_env!("PROBEWATCH_SWEEP_INTERVAL_MS"),
            "STATIC_MODE" => option_env!("PROBEWATCH_STATIC_MODE"),
            "INITIAL_CHANNEL" => option_env!("PROBEWATCH_INITIAL_CHANNEL"),
            "BUFFER_CAPACITY" => option_env!("PROBEWATCH_BUFFER_CAPACITY"),
            "WINDOW_POLICY" => option_env!("PROBEWATCH_WINDOW_POLICY"),
            "VERBOSE" => option_env!("PROBEWATCH_VERBOSE"),
            _ => None,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CHANNEL..=MAX_CHANNEL).contains(&self.initial_channel) {
            return Err(ConfigError::ChannelOutOfRange(self.initial_channel));
        }
        if self.buffer_capacity == 0 || self.buffer_capacity > MAX_CAPACITY {
            return Err(ConfigError::CapacityOutOfRange(self.buffer_capacity));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(v: &str) -> Result<bool, ConfigError> {
    match v.trim() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    InvalidBool,
    InvalidNumber,
    UnknownPolicy,
    ChannelOutOfRange(u8),
    CapacityOutOfRange(usize),
    ZeroInterval,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBool => f.write_str("expected true/false"),
            ConfigError::InvalidNumber => f.write_str("expected an unsigned integer"),
            ConfigError::UnknownPolicy => f.write_str("window policy must be 'rolling' or 'reset'"),
            ConfigError::ChannelOutOfRange(ch) => {
                write!(f, "initial channel {ch} outside {MIN_CHANNEL}-{MAX_CHANNEL}")
            }
            ConfigError::CapacityOutOfRange(n) => {
                write!(f, "buffer capacity {n} outside 1-{MAX_CAPACITY}")
            }
            ConfigError::ZeroInterval => f.write_str("sweep interval must be non-zero"),
        }
    }
}
