/// Bounded, insertion-ordered set of addresses seen in the current window.
///
/// Storage is a fixed `heapless::Vec` sized to `MAX_CAPACITY`; the working
/// capacity is chosen at construction. When full, the oldest entry is evicted
/// to make room (FIFO), so the newest devices are always counted.
///
/// Membership is a linear scan over the live entries only.
use heapless::Vec;

use crate::frame::MacAddress;

/// Upper bound for the configured buffer capacity.
pub const MAX_CAPACITY: usize = 256;

/// Reference capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Result of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Already present; buffer unchanged
    AlreadySeen,
    /// Appended without eviction
    Inserted,
    /// Appended after evicting the oldest entry
    Rolled { evicted: MacAddress },
}

impl InsertOutcome {
    pub fn is_new(&self) -> bool {
        !matches!(self, InsertOutcome::AlreadySeen)
    }
}

#[derive(Debug, Clone)]
pub struct ObservationBuffer {
    entries: Vec<MacAddress, MAX_CAPACITY>,
    capacity: usize,
}

impl ObservationBuffer {
    /// Create an empty buffer. `capacity` is clamped to `1..=MAX_CAPACITY`.
    pub const fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            1
        } else if capacity > MAX_CAPACITY {
            MAX_CAPACITY
        } else {
            capacity
        };
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn contains(&self, mac: &MacAddress) -> bool {
        self.entries.iter().any(|seen| seen == mac)
    }

    /// Insert an address unless already present, evicting the oldest entry
    /// when at capacity.
    pub fn insert(&mut self, mac: MacAddress) -> InsertOutcome {
        if self.contains(&mac) {
            return InsertOutcome::AlreadySeen;
        }

        if self.entries.len() >= self.capacity {
            let evicted = self.entries.remove(0);
            // Capacity <= MAX_CAPACITY and one slot was just freed.
            let _ = self.entries.push(mac);
            return InsertOutcome::Rolled { evicted };
        }

        let _ = self.entries.push(mac);
        InsertOutcome::Inserted
    }

    /// Drop every entry. Returns how many were cleared.
    pub fn reset(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        cleared
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Live entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MacAddress> {
        self.entries.iter()
    }
}

impl Default for ObservationBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u16) -> MacAddress {
        let [hi, lo] = n.to_be_bytes();
        MacAddress::new([0x00, 0x1A, 0x2B, 0x3C, hi, lo])
    }

    #[test]
    fn new_buffer_is_empty() {
        let buf = ObservationBuffer::new(10);
        assert_eq!(buf.size(), 0);
        assert!(buf.is_empty());
        assert!(!buf.is_full());
        assert_eq!(buf.capacity(), 10);
        assert!(!buf.contains(&mac(1)));
    }

    #[test]
    fn capacity_is_clamped() {
        assert_eq!(ObservationBuffer::new(0).capacity(), 1);
        assert_eq!(ObservationBuffer::new(10_000).capacity(), MAX_CAPACITY);
        assert_eq!(ObservationBuffer::default().capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn insert_new_address_grows_by_one() {
        let mut buf = ObservationBuffer::new(10);
        assert_eq!(buf.insert(mac(1)), InsertOutcome::Inserted);
        assert_eq!(buf.size(), 1);
        assert!(buf.contains(&mac(1)));
    }

    #[test]
    fn insert_is_idempotent() {
        let mut buf = ObservationBuffer::new(10);
        assert!(buf.insert(mac(7)).is_new());
        assert_eq!(buf.insert(mac(7)), InsertOutcome::AlreadySeen);
        assert!(!buf.insert(mac(7)).is_new());
        assert_eq!(buf.size(), 1);
    }

    #[test]
    fn contains_ignores_unused_slots() {
        let mut buf = ObservationBuffer::new(4);
        buf.insert(mac(1));
        buf.insert(mac(2));
        buf.reset();
        buf.insert(mac(3));
        // mac(1)/mac(2) sat in storage before the reset
        assert!(!buf.contains(&mac(1)));
        assert!(!buf.contains(&mac(2)));
        assert!(buf.contains(&mac(3)));
    }

    #[test]
    fn full_buffer_evicts_oldest() {
        let mut buf = ObservationBuffer::new(100);
        for n in 0..100 {
            assert_eq!(buf.insert(mac(n)), InsertOutcome::Inserted);
        }
        assert!(buf.is_full());

        assert_eq!(
            buf.insert(mac(100)),
            InsertOutcome::Rolled { evicted: mac(0) }
        );
        assert_eq!(buf.size(), 100);
        assert!(!buf.contains(&mac(0)));
        for n in 1..=100 {
            assert!(buf.contains(&mac(n)), "{} should be retained", mac(n));
        }
    }

    #[test]
    fn eviction_preserves_insertion_order() {
        let mut buf = ObservationBuffer::new(3);
        for n in 1..=5 {
            buf.insert(mac(n));
        }
        let live: std::vec::Vec<MacAddress> = buf.iter().copied().collect();
        assert_eq!(live, [mac(3), mac(4), mac(5)]);
    }

    #[test]
    fn duplicate_of_live_entry_does_not_evict() {
        let mut buf = ObservationBuffer::new(2);
        buf.insert(mac(1));
        buf.insert(mac(2));
        assert_eq!(buf.insert(mac(1)), InsertOutcome::AlreadySeen);
        assert!(buf.contains(&mac(1)));
        assert!(buf.contains(&mac(2)));
    }

    #[test]
    fn evicted_address_counts_as_new_again() {
        let mut buf = ObservationBuffer::new(2);
        buf.insert(mac(1));
        buf.insert(mac(2));
        buf.insert(mac(3));
        assert_eq!(buf.insert(mac(1)), InsertOutcome::Rolled { evicted: mac(2) });
    }

    #[test]
    fn reset_clears_everything() {
        let mut buf = ObservationBuffer::new(10);
        for n in 0..6 {
            buf.insert(mac(n));
        }
        assert_eq!(buf.reset(), 6);
        assert_eq!(buf.size(), 0);
        for n in 0..6 {
            assert!(!buf.contains(&mac(n)));
        }
        assert_eq!(buf.reset(), 0);
    }

    #[test]
    fn capacity_of_one_always_holds_latest() {
        let mut buf = ObservationBuffer::new(1);
        buf.insert(mac(1));
        assert_eq!(buf.insert(mac(2)), InsertOutcome::Rolled { evicted: mac(1) });
        assert_eq!(buf.size(), 1);
        assert!(buf.contains(&mac(2)));
    }
}
