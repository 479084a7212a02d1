/// 802.11 frame classification.
///
/// Decides whether a captured frame is a probe request and, if so, pulls out
/// the transmitter MAC (Address 2) and the probed SSID. Everything else is
/// rejected after reading two bytes.
///
/// Safe to call from ISR context (no allocation, no blocking).
use core::fmt;

use ieee80211::match_frames;
use ieee80211::mgmt_frame::ProbeRequestFrame;

use crate::protocol::{MacString, NameString};

/// Maximum payload length delivered by the sniffer driver.
pub const DATA_LENGTH: usize = 112;

/// Frame type values (frame control bits 2-3)
pub const TYPE_MANAGEMENT: u8 = 0x00;
pub const TYPE_CONTROL: u8 = 0x01;
pub const TYPE_DATA: u8 = 0x02;

/// Management subtype for probe requests (frame control bits 4-7)
pub const SUBTYPE_PROBE_REQUEST: u8 = 0x04;

/// Offset of Address 2 (transmitter): frame ctrl (2) + duration (2) + addr1 (6)
const TRANSMITTER_OFFSET: usize = 10;

/// A 6-octet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// True if the locally-administered bit (bit 1 of the first octet) is set.
    pub const fn is_locally_administered(&self) -> bool {
        self.0[0] & 0b0000_0010 != 0
    }

    /// Render as "aa:bb:cc:dd:ee:ff".
    pub fn to_mac_string(&self) -> MacString {
        use core::fmt::Write;
        let mut buf = MacString::new();
        let _ = write!(buf, "{self}");
        buf
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

/// Per-frame capture metadata reported by the radio.
///
/// Carried for reporting only; deduplication ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureMetadata {
    /// Signal strength (dBm)
    pub rssi: i8,
    /// Channel the frame was received on (1-14)
    pub channel: u8,
    /// Raw PHY rate index from the radio's RX control header
    pub rate: u8,
}

/// Decoded 802.11 frame control field (first two payload bytes, little-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl(u16);

impl FrameControl {
    /// Read the frame control field. `None` if fewer than two bytes were captured.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            [lo, hi, ..] => Some(Self(u16::from_le_bytes([*lo, *hi]))),
            _ => None,
        }
    }

    pub const fn raw(&self) -> u16 {
        self.0
    }

    pub const fn version(&self) -> u8 {
        (self.0 & 0b11) as u8
    }

    pub const fn frame_type(&self) -> u8 {
        ((self.0 >> 2) & 0b11) as u8
    }

    pub const fn subtype(&self) -> u8 {
        ((self.0 >> 4) & 0b1111) as u8
    }

    pub const fn to_ds(&self) -> bool {
        self.0 & (1 << 8) != 0
    }

    pub const fn from_ds(&self) -> bool {
        self.0 & (1 << 9) != 0
    }

    pub const fn is_probe_request(&self) -> bool {
        self.frame_type() == TYPE_MANAGEMENT && self.subtype() == SUBTYPE_PROBE_REQUEST
    }
}

/// A probe request extracted from a captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    /// Transmitter address (Address 2)
    pub address: MacAddress,
    pub metadata: CaptureMetadata,
    /// Requested SSID; empty for wildcard probes or an unparseable body
    pub ssid: NameString,
}

/// Result of classifying one captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    NotRelevant,
    ProbeRequest(ProbeRequest),
}

impl Classified {
    pub fn probe_request(self) -> Option<ProbeRequest> {
        match self {
            Classified::ProbeRequest(probe) => Some(probe),
            Classified::NotRelevant => None,
        }
    }
}

/// Classify a captured frame.
///
/// Reads never go past the captured length or `DATA_LENGTH`, whichever is
/// shorter. A probe request too short to hold Address 2 is not relevant.
pub fn classify(payload: &[u8], metadata: CaptureMetadata) -> Classified {
    let payload = &payload[..payload.len().min(DATA_LENGTH)];

    let Some(fc) = FrameControl::parse(payload) else {
        return Classified::NotRelevant;
    };
    if !fc.is_probe_request() {
        return Classified::NotRelevant;
    }

    let Some(address) = transmitter_address(payload) else {
        return Classified::NotRelevant;
    };

    Classified::ProbeRequest(ProbeRequest {
        address,
        metadata,
        ssid: probed_ssid(payload),
    })
}

/// Extract Address 2 from a raw 802.11 header.
pub fn transmitter_address(payload: &[u8]) -> Option<MacAddress> {
    let octets: [u8; 6] = payload
        .get(TRANSMITTER_OFFSET..TRANSMITTER_OFFSET + 6)?
        .try_into()
        .ok()?;
    Some(MacAddress(octets))
}

/// Extract the SSID element of a probe request using the ieee80211 parser.
fn probed_ssid(frame: &[u8]) -> NameString {
    let mut ssid = NameString::new();
    let _ = match_frames! {
        frame,
        probe_req = ProbeRequestFrame<'_> => {
            let _ = ssid.push_str(probe_req.body.ssid().unwrap_or(""));
        }
    };
    ssid
}
