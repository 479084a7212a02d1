//! probewatch library: portable probe-request counting engine.
//!
//! Watches 802.11 probe requests captured in promiscuous mode and keeps a
//! bounded, deduplicated set of the transmitting devices' MAC addresses for
//! the current observation window, optionally sweeping channels 1-14.
//!
//! Everything here is `no_std`, allocation-free, and testable on any host
//! with `cargo test`. The firmware binaries are thin consumers that provide
//! the radio (frames in, channel control) and the serial output sink.
//!
//! Data flow per frame: [`frame::classify`] → [`filter::AddressFilter`] →
//! [`dedup::ObservationBuffer`] → [`monitor::ReportSink`]. Per sweep tick:
//! [`sweep::SweepScheduler`] → radio tune, cycle summary, optional reset.

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod comm;
pub mod config;
pub mod dedup;
pub mod filter;
pub mod frame;
pub mod monitor;
pub mod protocol;
pub mod sweep;
