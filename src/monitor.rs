/// Probe monitor: classifier, address filter, observation buffer, and sweep
/// scheduler wired together.
///
/// Two entry points drive it: [`ProbeMonitor::observe`] (or `on_frame`) per
/// captured frame, and [`ProbeMonitor::tick`] per sweep interval. Both take
/// `&mut self`, so the caller serializes them: one event loop in the Embassy
/// firmware, one mutex in the std firmware.
use crate::config::{MonitorConfig, WindowPolicy};
use crate::dedup::{InsertOutcome, ObservationBuffer};
use crate::filter::{AddressFilter, Verdict};
use crate::frame::{classify, CaptureMetadata, MacAddress, ProbeRequest};
use crate::sweep::{ChannelControl, SweepScheduler, SweepState};

/// Events delivered to the reporting sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A device not yet in the buffer sent a probe request
    AddressObserved {
        probe: ProbeRequest,
        /// Buffer size after the insert
        running_count: usize,
    },
    /// The sweep wrapped from channel 14 to 1
    CycleComplete {
        /// Buffer size at the end of the cycle
        total_count: usize,
        cycle: u32,
    },
    /// Buffer cleared at a cycle boundary
    BufferReset { cleared: usize },
    /// Buffer was full; the oldest entry was evicted
    BufferRolled {
        evicted: MacAddress,
        /// Evictions since the buffer was last reset
        evicted_count: u32,
    },
    /// Radio was asked to tune to a new channel
    ChannelChanged { channel: u8 },
}

/// Receives monitor events for display or forwarding. Must not block.
pub trait ReportSink {
    fn report(&mut self, event: &MonitorEvent);
}

#[derive(Debug, Clone)]
pub struct ProbeMonitor {
    filter: AddressFilter,
    buffer: ObservationBuffer,
    scheduler: SweepScheduler,
    policy: WindowPolicy,
    evicted: u32,
}

impl ProbeMonitor {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            filter: AddressFilter::from_config(config),
            buffer: ObservationBuffer::new(config.buffer_capacity),
            scheduler: SweepScheduler::from_config(config),
            policy: config.window_policy,
            evicted: 0,
        }
    }

    /// Tune the radio to the starting channel.
    pub fn start<R: ChannelControl>(&mut self, radio: &mut R) {
        let channel = self.scheduler.channel();
        tune(radio, channel);
        match self.scheduler.state() {
            SweepState::Active { .. } => log::info!(
                "Sweeping channels from {} (radio reports {:?})",
                channel,
                radio.channel()
            ),
            SweepState::Disabled { .. } => log::info!(
                "Static mode on channel {} (radio reports {:?})",
                channel,
                radio.channel()
            ),
        }
    }

    /// Classify a raw frame and record it if it is a probe request.
    pub fn on_frame<S: ReportSink>(
        &mut self,
        payload: &[u8],
        metadata: CaptureMetadata,
        sink: &mut S,
    ) -> Option<InsertOutcome> {
        let probe = classify(payload, metadata).probe_request()?;
        self.observe(&probe, sink)
    }

    /// Record a classified probe request. `None` if the filter dropped it.
    pub fn observe<S: ReportSink>(
        &mut self,
        probe: &ProbeRequest,
        sink: &mut S,
    ) -> Option<InsertOutcome> {
        if let Verdict::LocalAddress = self.filter.evaluate(&probe.address) {
            log::trace!("Ignoring local address {}", probe.address);
            return None;
        }

        let outcome = self.buffer.insert(probe.address);
        if let InsertOutcome::Rolled { evicted } = outcome {
            self.evicted = self.evicted.wrapping_add(1);
            sink.report(&MonitorEvent::BufferRolled {
                evicted,
                evicted_count: self.evicted,
            });
        }
        if outcome.is_new() {
            log::debug!(
                "New device {} rssi {} ch {} ({} seen)",
                probe.address,
                probe.metadata.rssi,
                probe.metadata.channel,
                self.buffer.size()
            );
            sink.report(&MonitorEvent::AddressObserved {
                probe: probe.clone(),
                running_count: self.buffer.size(),
            });
        }
        Some(outcome)
    }

    /// Advance the sweep by one channel. No-op in static mode.
    pub fn tick<R: ChannelControl, S: ReportSink>(&mut self, radio: &mut R, sink: &mut S) {
        let Some(step) = self.scheduler.tick() else {
            return;
        };

        if step.cycle_complete {
            let total_count = self.buffer.size();
            log::info!(
                "Sweep cycle {} complete: {} devices",
                self.scheduler.cycles(),
                total_count
            );
            sink.report(&MonitorEvent::CycleComplete {
                total_count,
                cycle: self.scheduler.cycles(),
            });
            if self.policy == WindowPolicy::ResetPerSweep {
                self.reset(sink);
            }
        }

        tune(radio, step.channel);
        sink.report(&MonitorEvent::ChannelChanged {
            channel: step.channel,
        });
    }

    /// Clear the observation window.
    pub fn reset<S: ReportSink>(&mut self, sink: &mut S) {
        let cleared = self.buffer.reset();
        self.evicted = 0;
        sink.report(&MonitorEvent::BufferReset { cleared });
    }

    pub fn buffer(&self) -> &ObservationBuffer {
        &self.buffer
    }

    pub fn sweep_state(&self) -> SweepState {
        self.scheduler.state()
    }

    pub fn channel(&self) -> u8 {
        self.scheduler.channel()
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }
}

/// Fire-and-forget tune: failures are logged, never retried.
fn tune<R: ChannelControl>(radio: &mut R, channel: u8) {
    if let Err(e) = radio.set_channel(channel) {
        log::warn!("Failed to tune channel {}: {:?}", channel, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::probe_request_frame;
    use std::vec::Vec;

    #[derive(Default)]
    struct Recorder(Vec<MonitorEvent>);

    impl ReportSink for Recorder {
        fn report(&mut self, event: &MonitorEvent) {
            self.0.push(event.clone());
        }
    }

    impl Recorder {
        fn cycles(&self) -> usize {
            self.0
                .iter()
                .filter(|e| matches!(e, MonitorEvent::CycleComplete { .. }))
                .count()
        }
    }

    #[derive(Default)]
    struct FakeRadio {
        current: Option<u8>,
        tunes: Vec<u8>,
        fail: bool,
    }

    impl ChannelControl for FakeRadio {
        type Error = &'static str;

        fn set_channel(&mut self, channel: u8) -> Result<(), Self::Error> {
            self.tunes.push(channel);
            if self.fail {
                return Err("radio busy");
            }
            self.current = Some(channel);
            Ok(())
        }

        fn channel(&self) -> Option<u8> {
            self.current
        }
    }

    fn meta() -> CaptureMetadata {
        CaptureMetadata {
            rssi: -60,
            channel: 1,
            rate: 0,
        }
    }

    fn probe(octets: [u8; 6]) -> ProbeRequest {
        ProbeRequest {
            address: MacAddress::new(octets),
            metadata: meta(),
            ssid: Default::default(),
        }
    }

    fn config() -> MonitorConfig {
        MonitorConfig::new()
    }

    // ── Frame path ──────────────────────────────────────────────────

    #[test]
    fn new_probe_is_reported_once() {
        let mut monitor = ProbeMonitor::new(&config());
        let mut sink = Recorder::default();
        let frame = probe_request_frame([0x00, 0x11, 0x22, 0x33, 0x44, 0x55], "Cafe");

        assert_eq!(
            monitor.on_frame(&frame, meta(), &mut sink),
            Some(InsertOutcome::Inserted)
        );
        assert_eq!(
            monitor.on_frame(&frame, meta(), &mut sink),
            Some(InsertOutcome::AlreadySeen)
        );

        assert_eq!(monitor.buffer().size(), 1);
        assert_eq!(sink.0.len(), 1);
        match &sink.0[0] {
            MonitorEvent::AddressObserved {
                probe,
                running_count,
            } => {
                assert_eq!(probe.address.to_mac_string().as_str(), "00:11:22:33:44:55");
                assert_eq!(probe.ssid.as_str(), "Cafe");
                assert_eq!(*running_count, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn irrelevant_frames_never_touch_the_buffer() {
        let mut monitor = ProbeMonitor::new(&config());
        let mut sink = Recorder::default();
        let mut frame = probe_request_frame([0x00, 0x11, 0x22, 0x33, 0x44, 0x55], "");
        for fc in [0x80u8, 0x50, 0x08, 0x88, 0xB4, 0x44] {
            frame[0] = fc;
            assert_eq!(monitor.on_frame(&frame, meta(), &mut sink), None);
        }
        assert_eq!(monitor.on_frame(&[], meta(), &mut sink), None);
        assert!(monitor.buffer().is_empty());
        assert!(sink.0.is_empty());
    }

    #[test]
    fn local_addresses_dropped_only_when_ignored() {
        let global = probe([0xA8, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        let local = probe([0x02, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

        let mut cfg = config();
        cfg.ignore_local_addresses = true;
        let mut monitor = ProbeMonitor::new(&cfg);
        let mut sink = Recorder::default();
        assert_eq!(monitor.observe(&global, &mut sink), Some(InsertOutcome::Inserted));
        assert_eq!(monitor.observe(&local, &mut sink), None);
        assert!(!monitor.buffer().contains(&local.address));
        assert_eq!(monitor.buffer().size(), 1);

        let mut monitor = ProbeMonitor::new(&config());
        assert_eq!(monitor.observe(&local, &mut sink), Some(InsertOutcome::Inserted));
        assert!(monitor.buffer().contains(&local.address));
    }

    #[test]
    fn full_buffer_reports_roll() {
        let mut cfg = config();
        cfg.buffer_capacity = 2;
        let mut monitor = ProbeMonitor::new(&cfg);
        let mut sink = Recorder::default();
        for n in 1..=3u8 {
            monitor.observe(&probe([0, 0, 0, 0, 0, n]), &mut sink);
        }
        assert_eq!(monitor.buffer().size(), 2);
        assert!(sink.0.contains(&MonitorEvent::BufferRolled {
            evicted: MacAddress::new([0, 0, 0, 0, 0, 1]),
            evicted_count: 1,
        }));
        assert_eq!(
            sink.0.last(),
            Some(&MonitorEvent::AddressObserved {
                probe: probe([0, 0, 0, 0, 0, 3]),
                running_count: 2,
            })
        );
    }

    // ── Sweep path ──────────────────────────────────────────────────

    #[test]
    fn start_tunes_initial_channel() {
        let mut cfg = config();
        cfg.initial_channel = 9;
        let mut monitor = ProbeMonitor::new(&cfg);
        let mut radio = FakeRadio::default();
        monitor.start(&mut radio);
        assert_eq!(radio.tunes, [9]);
        assert_eq!(radio.channel(), Some(9));
    }

    #[test]
    fn tick_mid_sweep_tunes_next_channel() {
        let mut cfg = config();
        cfg.initial_channel = 5;
        let mut monitor = ProbeMonitor::new(&cfg);
        let mut radio = FakeRadio::default();
        let mut sink = Recorder::default();

        monitor.tick(&mut radio, &mut sink);

        assert_eq!(monitor.channel(), 6);
        assert_eq!(radio.tunes, [6]);
        assert_eq!(sink.cycles(), 0);
        assert_eq!(sink.0, [MonitorEvent::ChannelChanged { channel: 6 }]);
    }

    #[test]
    fn wrap_reports_cycle_then_resets() {
        let mut cfg = config();
        cfg.initial_channel = 14;
        let mut monitor = ProbeMonitor::new(&cfg);
        let mut radio = FakeRadio::default();
        let mut sink = Recorder::default();
        monitor.observe(&probe([0, 1, 2, 3, 4, 5]), &mut sink);
        monitor.observe(&probe([0, 1, 2, 3, 4, 6]), &mut sink);
        sink.0.clear();

        monitor.tick(&mut radio, &mut sink);

        assert_eq!(monitor.channel(), 1);
        assert_eq!(radio.tunes, [1]);
        assert_eq!(sink.cycles(), 1);
        assert_eq!(
            sink.0,
            [
                MonitorEvent::CycleComplete {
                    total_count: 2,
                    cycle: 1
                },
                MonitorEvent::BufferReset { cleared: 2 },
                MonitorEvent::ChannelChanged { channel: 1 },
            ]
        );
        assert!(monitor.buffer().is_empty());
    }

    #[test]
    fn rolling_policy_keeps_buffer_across_cycles() {
        let mut cfg = config();
        cfg.initial_channel = 14;
        cfg.window_policy = WindowPolicy::Rolling;
        let mut monitor = ProbeMonitor::new(&cfg);
        let mut radio = FakeRadio::default();
        let mut sink = Recorder::default();
        monitor.observe(&probe([0, 1, 2, 3, 4, 5]), &mut sink);
        sink.0.clear();

        monitor.tick(&mut radio, &mut sink);

        assert_eq!(sink.cycles(), 1);
        assert_eq!(monitor.buffer().size(), 1);
        assert!(!sink
            .0
            .iter()
            .any(|e| matches!(e, MonitorEvent::BufferReset { .. })));
    }

    #[test]
    fn static_mode_never_tunes_on_tick() {
        let mut cfg = config();
        cfg.static_mode = true;
        cfg.initial_channel = 11;
        let mut monitor = ProbeMonitor::new(&cfg);
        let mut radio = FakeRadio::default();
        let mut sink = Recorder::default();
        monitor.start(&mut radio);
        for _ in 0..50 {
            monitor.tick(&mut radio, &mut sink);
        }
        assert_eq!(monitor.channel(), 11);
        assert_eq!(radio.tunes, [11]);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn failed_tune_is_not_retried() {
        let mut cfg = config();
        cfg.initial_channel = 3;
        let mut monitor = ProbeMonitor::new(&cfg);
        let mut radio = FakeRadio {
            fail: true,
            ..Default::default()
        };
        let mut sink = Recorder::default();

        monitor.tick(&mut radio, &mut sink);

        assert_eq!(radio.tunes, [4]);
        assert_eq!(monitor.channel(), 4);
        assert_eq!(sink.0, [MonitorEvent::ChannelChanged { channel: 4 }]);
    }

    #[test]
    fn reset_clears_eviction_count() {
        let mut cfg = config();
        cfg.buffer_capacity = 1;
        let mut monitor = ProbeMonitor::new(&cfg);
        let mut sink = Recorder::default();
        monitor.observe(&probe([0, 0, 0, 0, 0, 1]), &mut sink);
        monitor.observe(&probe([0, 0, 0, 0, 0, 2]), &mut sink);
        monitor.reset(&mut sink);
        monitor.observe(&probe([0, 0, 0, 0, 0, 3]), &mut sink);
        monitor.observe(&probe([0, 0, 0, 0, 0, 4]), &mut sink);
        let rolled: Vec<u32> = sink
            .0
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::BufferRolled { evicted_count, .. } => Some(*evicted_count),
                _ => None,
            })
            .collect();
        assert_eq!(rolled, [1, 1]);
    }
}
