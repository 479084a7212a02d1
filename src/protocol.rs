/// JSON message protocol for probewatch report lines.
///
/// All messages are newline-delimited JSON (NDJSON), one event per line.
/// Uses `heapless` types for no_std/no-alloc operation.
use heapless::{String, Vec};
use serde::Serialize;

/// Maximum length for MAC address strings ("aa:bb:cc:dd:ee:ff")
pub type MacString = String<18>;

/// Maximum length for SSID strings
pub type NameString = String<33>;

/// Messages emitted by the device
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// First probe request from a device in the current window
    #[serde(rename = "probe")]
    Probe {
        mac: &'a MacString,
        /// Probed SSID, empty for wildcard probes
        ssid: &'a NameString,
        rssi: i8,
        ch: u8,
        rate: u8,
        /// Devices in the window after this one
        count: u16,
        /// Uptime in milliseconds when captured
        ts: u32,
    },
    /// Sweep wrapped from channel 14 to 1
    #[serde(rename = "cycle")]
    Cycle { cycle: u32, total: u16, ts: u32 },
    /// Observation buffer cleared
    #[serde(rename = "reset")]
    Reset { cleared: u16, ts: u32 },
    /// Oldest entry evicted to make room
    #[serde(rename = "rolled")]
    Rolled {
        evicted: &'a MacString,
        /// Evictions since the last reset
        evicted_count: u32,
        ts: u32,
    },
    /// Radio tuned to a new channel
    #[serde(rename = "channel")]
    Channel { ch: u8, ts: u32 },
    /// Device status report
    #[serde(rename = "status")]
    Status {
        sweeping: bool,
        ch: u8,
        /// Devices in the current window
        count: u16,
        /// Uptime in seconds
        uptime: u32,
        /// Free heap in bytes
        heap_free: u32,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;
