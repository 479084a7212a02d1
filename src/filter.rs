/// Address filter applied between classification and deduplication.
///
/// The only policy is the locally-administered bit test. Randomized client
/// addresses set that bit, so suppressing them leaves burned-in addresses.
use crate::config::MonitorConfig;
use crate::frame::MacAddress;

/// True if the address is locally administered (bit 1 of the first octet).
pub fn is_locally_administered(mac: &MacAddress) -> bool {
    mac.is_locally_administered()
}

/// Filter decision for an observed address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Dropped because local addresses are being ignored
    LocalAddress,
}

/// Address filter policy, resolved from configuration at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressFilter {
    /// Drop locally administered addresses
    pub ignore_local: bool,
}

impl AddressFilter {
    pub const fn new(ignore_local: bool) -> Self {
        Self { ignore_local }
    }

    pub const fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.ignore_local_addresses)
    }

    pub fn evaluate(&self, mac: &MacAddress) -> Verdict {
        if self.ignore_local && is_locally_administered(mac) {
            Verdict::LocalAddress
        } else {
            Verdict::Accept
        }
    }

    pub fn accepts(&self, mac: &MacAddress) -> bool {
        self.evaluate(mac) == Verdict::Accept
    }
}
