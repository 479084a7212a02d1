/// Report transport: turns monitor events into NDJSON lines.
///
/// The firmware writes each line to serial through the logger. When
/// `verbose` is off only summaries (cycle, reset, roll) and status go out.
use crate::monitor::MonitorEvent;
use crate::protocol::{DeviceMessage, MsgBuffer, MAX_MSG_LEN};

/// Serial baud rate
pub const SERIAL_BAUD: u32 = 115200;

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Serialize into a fresh `MsgBuffer`.
pub fn encode_message(msg: &DeviceMessage) -> Option<MsgBuffer> {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    let len = serialize_message(msg, &mut buf)?;
    buf.truncate(len);
    Some(buf)
}

/// Whether an event is reported at the given verbosity.
pub fn is_reported(event: &MonitorEvent, verbose: bool) -> bool {
    match event {
        MonitorEvent::AddressObserved { .. } | MonitorEvent::ChannelChanged { .. } => verbose,
        MonitorEvent::CycleComplete { .. }
        | MonitorEvent::BufferReset { .. }
        | MonitorEvent::BufferRolled { .. } => true,
    }
}

/// Encode a monitor event as an NDJSON line stamped with uptime `ts` (ms).
pub fn encode_event(event: &MonitorEvent, ts: u32) -> Option<MsgBuffer> {
    match event {
        MonitorEvent::AddressObserved {
            probe,
            running_count,
        } => {
            let mac = probe.address.to_mac_string();
            encode_message(&DeviceMessage::Probe {
                mac: &mac,
                ssid: &probe.ssid,
                rssi: probe.metadata.rssi,
                ch: probe.metadata.channel,
                rate: probe.metadata.rate,
                count: saturate(*running_count),
                ts,
            })
        }
        MonitorEvent::CycleComplete { total_count, cycle } => {
            encode_message(&DeviceMessage::Cycle {
                cycle: *cycle,
                total: saturate(*total_count),
                ts,
            })
        }
        MonitorEvent::BufferReset { cleared } => encode_message(&DeviceMessage::Reset {
            cleared: saturate(*cleared),
            ts,
        }),
        MonitorEvent::BufferRolled {
            evicted,
            evicted_count,
        } => {
            let mac = evicted.to_mac_string();
            encode_message(&DeviceMessage::Rolled {
                evicted: &mac,
                evicted_count: *evicted_count,
                ts,
            })
        }
        MonitorEvent::ChannelChanged { channel } => {
            encode_message(&DeviceMessage::Channel { ch: *channel, ts })
        }
    }
}

fn saturate(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}
