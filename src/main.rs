//! probewatch: WiFi probe-request device counter
//!
//! Puts the radio in promiscuous mode, counts the distinct devices sending
//! probe requests during each observation window, and streams the results
//! as NDJSON over serial. Channels 1-14 are swept unless built in static mode.

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, Ordering};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Ticker, Timer};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;

use probewatch::config::MonitorConfig;
use probewatch::frame::{self, CaptureMetadata, Classified, ProbeRequest};
use probewatch::monitor::{MonitorEvent, ProbeMonitor, ReportSink};
use probewatch::protocol::{DeviceMessage, MsgBuffer, VERSION};
use probewatch::sweep::{ChannelControl, SweepState};
use probewatch::{board, comm};

// ── Channel type aliases ──────────────────────────────────────────────

type ProbeChannel = Channel<CriticalSectionRawMutex, ProbeRequest, 16>;
type OutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 8>;

// ── Static channels and shared state ─────────────────────────────────

/// Probe requests classified in the sniffer ISR, waiting for the monitor task
static PROBE_CHANNEL: ProbeChannel = Channel::new();

/// Static channel for serialized output messages
static OUTPUT_CHANNEL: OutputChannel = Channel::new();

/// Read-only mirrors of monitor state for the status task.
/// Written only by the monitor task.
static SWEEPING: AtomicBool = AtomicBool::new(false);
static CURRENT_CHANNEL: AtomicU8 = AtomicU8::new(0);
static DEVICE_COUNT: AtomicU16 = AtomicU16::new(0);

/// Probe requests lost because the monitor task fell behind
static DROPPED_PROBES: AtomicU32 = AtomicU32::new(0);

fn uptime_millis_u32() -> u32 {
    (Instant::now().as_millis() & 0xFFFF_FFFF) as u32
}

// ── WiFi sniffer ─────────────────────────────────────────────────────

/// WiFi sniffer callback, called from ISR context by the esp-radio sniffer.
///
/// Classifies the frame and forwards probe requests to the monitor task via
/// `try_send`. Everything else is dropped after the frame control check.
fn wifi_sniffer_callback(pkt: esp_radio::wifi::sniffer::PromiscuousPkt<'_>) {
    let metadata = CaptureMetadata {
        rssi: pkt.rx_cntl.rssi as i8,
        channel: pkt.rx_cntl.channel as u8,
        rate: pkt.rx_cntl.rate as u8,
    };
    if let Classified::ProbeRequest(probe) = frame::classify(pkt.data, metadata) {
        if PROBE_CHANNEL.try_send(probe).is_err() {
            DROPPED_PROBES.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// FFI bindings for WiFi channel control.
// The symbols are linked via esp-radio's WiFi driver.
unsafe extern "C" {
    fn esp_wifi_set_channel(primary: u8, second: u32) -> i32;
    fn esp_wifi_get_channel(primary: *mut u8, second: *mut u32) -> i32;
}

/// Radio channel control through the ESP WiFi driver.
struct EspRadio;

impl ChannelControl for EspRadio {
    /// `esp_err_t` code
    type Error = i32;

    fn set_channel(&mut self, channel: u8) -> Result<(), Self::Error> {
        match unsafe { esp_wifi_set_channel(channel, 0) } {
            0 => Ok(()),
            err => Err(err),
        }
    }

    fn channel(&self) -> Option<u8> {
        let mut primary = 0u8;
        let mut second = 0u32;
        let err = unsafe { esp_wifi_get_channel(&mut primary, &mut second) };
        (err == 0).then_some(primary)
    }
}

// ── Report sink ──────────────────────────────────────────────────────

/// Serializes monitor events and queues them for the serial output task.
/// Drops lines when the output channel is full.
struct SerialSink {
    verbose: bool,
}

impl ReportSink for SerialSink {
    fn report(&mut self, event: &MonitorEvent) {
        if !comm::is_reported(event, self.verbose) {
            return;
        }
        if let Some(buf) = comm::encode_event(event, uptime_millis_u32()) {
            let _ = OUTPUT_CHANNEL.try_send(buf);
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Heap for the WiFi driver
    esp_alloc::heap_allocator!(size: 72 * 1024);

    // Start the RTOS: requires timer + software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("probewatch v{} starting on {}", VERSION, board::BOARD_NAME);

    let config = match MonitorConfig::from_build_env() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Ignoring PROBEWATCH_* overrides: {}", e);
            MonitorConfig::new()
        }
    };

    log::info!(
        "Config: {} mode, start channel {}, hop every {} ms, capacity {}, policy {}, ignore local {}",
        if config.static_mode { "static" } else { "sweep" },
        config.initial_channel,
        config.sweep_interval_ms,
        config.buffer_capacity,
        config.window_policy.as_str(),
        config.ignore_local_addresses,
    );

    // ── WiFi sniffer initialization ─────────────────────────────────────

    let (_wifi_controller, wifi_interfaces) =
        esp_radio::wifi::new(peripherals.WIFI, Default::default()).expect("WiFi init failed");

    let mut sniffer = wifi_interfaces.sniffer;
    sniffer.set_receive_cb(wifi_sniffer_callback);
    sniffer
        .set_promiscuous_mode(true)
        .expect("Promiscuous mode failed");

    log::info!("WiFi sniffer initialized in promiscuous mode");

    spawner.spawn(output_serial_task()).unwrap();
    spawner.spawn(status_task()).unwrap();
    spawner.spawn(monitor_task(config)).unwrap();

    // Keep the sniffer and controller alive.
    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}

/// Monitor task, the single owner of the observation buffer and sweep state.
///
/// Frame arrivals and sweep ticks are handled one at a time on this task, so
/// neither ever sees the other's half-finished update.
#[embassy_executor::task]
async fn monitor_task(config: MonitorConfig) {
    log::info!("Monitor task started");

    let mut monitor = ProbeMonitor::new(&config);
    let mut radio = EspRadio;
    let mut sink = SerialSink {
        verbose: config.verbose,
    };

    monitor.start(&mut radio);
    publish_state(&monitor);

    let probes = PROBE_CHANNEL.receiver();
    let mut ticker = Ticker::every(Duration::from_millis(config.sweep_interval_ms as u64));

    loop {
        match select(probes.receive(), ticker.next()).await {
            Either::First(probe) => {
                monitor.observe(&probe, &mut sink);
            }
            Either::Second(()) => {
                monitor.tick(&mut radio, &mut sink);
            }
        }
        publish_state(&monitor);
    }
}

fn publish_state(monitor: &ProbeMonitor) {
    SWEEPING.store(
        matches!(monitor.sweep_state(), SweepState::Active { .. }),
        Ordering::Relaxed,
    );
    CURRENT_CHANNEL.store(monitor.channel(), Ordering::Relaxed);
    DEVICE_COUNT.store(
        u16::try_from(monitor.buffer().size()).unwrap_or(u16::MAX),
        Ordering::Relaxed,
    );
}

/// Serial output task. Reads from the output channel and writes each
/// NDJSON line to serial via esp-println.
#[embassy_executor::task]
async fn output_serial_task() {
    log::info!("Serial output task started");

    let output_rx = OUTPUT_CHANNEL.receiver();

    loop {
        let msg = output_rx.receive().await;
        if let Ok(s) = core::str::from_utf8(&msg) {
            log::info!("{}", s.trim_end());
        }
    }
}

/// Periodic status reporting task
#[embassy_executor::task]
async fn status_task() {
    loop {
        Timer::after(Duration::from_secs(30)).await;

        let dropped = DROPPED_PROBES.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            log::warn!("{} probe requests dropped (monitor backlog)", dropped);
        }

        let msg = DeviceMessage::Status {
            sweeping: SWEEPING.load(Ordering::Relaxed),
            ch: CURRENT_CHANNEL.load(Ordering::Relaxed),
            count: DEVICE_COUNT.load(Ordering::Relaxed),
            uptime: (Instant::now().as_millis() / 1000) as u32,
            heap_free: esp_alloc::HEAP.free() as u32,
            board: board::BOARD_NAME,
            version: VERSION,
        };

        if let Some(buf) = comm::encode_message(&msg) {
            let _ = OUTPUT_CHANNEL.try_send(buf);
        }
    }
}
