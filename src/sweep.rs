/// Channel sweep scheduler.
///
/// Advances the listening channel 1 → 14 on every tick and wraps back to 1,
/// flagging the wrap as a completed cycle. In static mode the scheduler is
/// disabled and ticks do nothing.
///
/// Tuning the radio goes through [`ChannelControl`]. A failed tune is the
/// driver's problem: the scheduler has already advanced and does not retry.
use crate::config::MonitorConfig;

/// 2.4 GHz channel range swept (channel 14 included)
pub const MIN_CHANNEL: u8 = 1;
pub const MAX_CHANNEL: u8 = 14;

/// Capture driver channel control.
pub trait ChannelControl {
    type Error: core::fmt::Debug;

    /// Tune the radio. Best effort; the caller does not retry.
    fn set_channel(&mut self, channel: u8) -> Result<(), Self::Error>;

    /// Channel the radio reports it is on, if it can tell.
    fn channel(&self) -> Option<u8>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    /// Static single-channel mode; never transitions
    Disabled { channel: u8 },
    /// Sweeping, currently on `channel`
    Active { channel: u8 },
}

impl SweepState {
    pub fn channel(&self) -> u8 {
        match *self {
            SweepState::Disabled { channel } | SweepState::Active { channel } => channel,
        }
    }

    pub fn is_sweeping(&self) -> bool {
        matches!(self, SweepState::Active { .. })
    }
}

/// What a tick asks the caller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepTick {
    /// Channel to tune to
    pub channel: u8,
    /// The sweep wrapped from 14 back to 1
    pub cycle_complete: bool,
}

/// The channel after `channel`, wrapping 14 → 1.
pub const fn next_channel(channel: u8) -> (u8, bool) {
    if channel >= MAX_CHANNEL {
        (MIN_CHANNEL, true)
    } else {
        (channel + 1, false)
    }
}

#[derive(Debug, Clone)]
pub struct SweepScheduler {
    state: SweepState,
    cycles: u32,
}

impl SweepScheduler {
    /// `initial_channel` is clamped to 1-14.
    pub const fn new(initial_channel: u8, sweeping: bool) -> Self {
        let channel = if initial_channel < MIN_CHANNEL {
            MIN_CHANNEL
        } else if initial_channel > MAX_CHANNEL {
            MAX_CHANNEL
        } else {
            initial_channel
        };
        let state = if sweeping {
            SweepState::Active { channel }
        } else {
            SweepState::Disabled { channel }
        };
        Self { state, cycles: 0 }
    }

    pub const fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.initial_channel, !config.static_mode)
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn channel(&self) -> u8 {
        self.state.channel()
    }

    /// Completed 1-14 cycles since start.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Advance one step. `None` when disabled.
    pub fn tick(&mut self) -> Option<SweepTick> {
        let SweepState::Active { channel } = self.state else {
            return None;
        };

        let (channel, cycle_complete) = next_channel(channel);
        if cycle_complete {
            self.cycles = self.cycles.wrapping_add(1);
        }
        self.state = SweepState::Active { channel };
        Some(SweepTick {
            channel,
            cycle_complete,
        })
    }
}
