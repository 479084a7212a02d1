//! probewatch: ESP-IDF std firmware
//!
//! Thread-based implementation using FreeRTOS threads and std::sync::mpsc
//! channels. Feature-equivalent to the no_std Embassy firmware; instead of
//! one event loop, frame handling and sweep ticks share the monitor through
//! a single global mutex.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use probewatch::config::MonitorConfig;
use probewatch::frame::{self, CaptureMetadata, Classified, ProbeRequest};
use probewatch::monitor::{MonitorEvent, ProbeMonitor, ReportSink};
use probewatch::protocol::{DeviceMessage, MsgBuffer, VERSION};
use probewatch::sweep::{ChannelControl, SweepState};
use probewatch::{board, comm};

use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::sys::{
    esp, esp_get_free_heap_size, esp_wifi_get_channel, esp_wifi_set_channel,
    esp_wifi_set_promiscuous, esp_wifi_set_promiscuous_rx_cb, wifi_promiscuous_pkt_t,
    wifi_promiscuous_pkt_type_t, wifi_second_chan_t, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE,
    EspError,
};
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};

// ── Shared state ─────────────────────────────────────────────────────

/// The monitor. Every frame and every sweep tick takes this lock, so the
/// buffer and sweep state are only ever seen whole.
static MONITOR: Mutex<Option<ProbeMonitor>> = Mutex::new(None);

/// Probe requests lost because the monitor thread fell behind
static DROPPED_PROBES: AtomicU32 = AtomicU32::new(0);

/// Boot time, captured once in main, used for uptime calculation.
static BOOT_INSTANT: Mutex<Option<Instant>> = Mutex::new(None);

fn uptime_secs() -> u32 {
    BOOT_INSTANT
        .lock()
        .ok()
        .and_then(|i| i.map(|boot| boot.elapsed().as_secs() as u32))
        .unwrap_or(0)
}

fn uptime_millis_u32() -> u32 {
    BOOT_INSTANT
        .lock()
        .ok()
        .and_then(|i| i.map(|boot| (boot.elapsed().as_millis() & 0xFFFF_FFFF) as u32))
        .unwrap_or(0)
}

// ── Global probe channel sender (for WiFi promisc callback) ──────────

static PROBE_TX: Mutex<Option<SyncSender<ProbeRequest>>> = Mutex::new(None);

// ── WiFi promiscuous callback ────────────────────────────────────────

/// WiFi promiscuous mode callback.
///
/// Runs in the WiFi driver task context (not ISR on ESP-IDF, but still
/// must be non-blocking). Classifies the frame and forwards probe requests
/// to the monitor thread via try_send.
unsafe extern "C" fn promisc_rx_cb(
    buf: *mut std::ffi::c_void,
    _pkt_type: wifi_promiscuous_pkt_type_t,
) {
    let pkt = unsafe { &*(buf as *const wifi_promiscuous_pkt_t) };
    let sig_len = pkt.rx_ctrl.sig_len() as usize;

    if sig_len == 0 {
        return;
    }

    // Safety: payload is `sig_len` bytes starting at pkt.payload
    let payload = unsafe { std::slice::from_raw_parts(pkt.payload.as_ptr(), sig_len) };

    let metadata = CaptureMetadata {
        rssi: pkt.rx_ctrl.rssi() as i8,
        channel: pkt.rx_ctrl.channel() as u8,
        rate: pkt.rx_ctrl.rate() as u8,
    };

    if let Classified::ProbeRequest(probe) = frame::classify(payload, metadata) {
        if let Ok(guard) = PROBE_TX.lock() {
            if let Some(ref tx) = *guard {
                if tx.try_send(probe).is_err() {
                    DROPPED_PROBES.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

// ── Radio channel control ────────────────────────────────────────────

struct IdfRadio;

impl ChannelControl for IdfRadio {
    type Error = EspError;

    fn set_channel(&mut self, channel: u8) -> Result<(), Self::Error> {
        esp!(unsafe { esp_wifi_set_channel(channel, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE) })
    }

    fn channel(&self) -> Option<u8> {
        let mut primary = 0u8;
        let mut second: wifi_second_chan_t = wifi_second_chan_t_WIFI_SECOND_CHAN_NONE;
        esp!(unsafe { esp_wifi_get_channel(&mut primary, &mut second) })
            .ok()
            .map(|_| primary)
    }
}

// ── Report sink ──────────────────────────────────────────────────────

struct SerialSink {
    verbose: bool,
    output_tx: SyncSender<MsgBuffer>,
}

impl ReportSink for SerialSink {
    fn report(&mut self, event: &MonitorEvent) {
        if !comm::is_reported(event, self.verbose) {
            return;
        }
        if let Some(buf) = comm::encode_event(event, uptime_millis_u32()) {
            let _ = self.output_tx.try_send(buf);
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    // Record boot time
    *BOOT_INSTANT.lock().unwrap() = Some(Instant::now());

    log::info!("probewatch v{} starting on {} (std)", VERSION, board::BOARD_NAME);

    let config = MonitorConfig::from_build_env().unwrap_or_else(|e| {
        log::warn!("Ignoring PROBEWATCH_* overrides: {}", e);
        MonitorConfig::new()
    });

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ── Channels ─────────────────────────────────────────────────────

    let (probe_tx, probe_rx) = mpsc::sync_channel::<ProbeRequest>(16);
    let (output_tx, output_rx) = mpsc::sync_channel::<MsgBuffer>(8);

    *PROBE_TX.lock().unwrap() = Some(probe_tx);
    *MONITOR.lock().unwrap() = Some(ProbeMonitor::new(&config));

    // ── Output thread ────────────────────────────────────────────────

    thread::Builder::new()
        .name("output".into())
        .stack_size(4096)
        .spawn(move || {
            output_thread(output_rx);
        })?;
    log::info!("Output thread spawned");

    // ── Status thread ────────────────────────────────────────────────

    let status_output_tx = output_tx.clone();
    thread::Builder::new()
        .name("status".into())
        .stack_size(4096)
        .spawn(move || {
            status_thread(status_output_tx);
        })?;
    log::info!("Status thread spawned");

    // ── WiFi sniffer ─────────────────────────────────────────────────

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;
    wifi.set_configuration(&esp_idf_svc::wifi::Configuration::Client(Default::default()))?;
    wifi.start()?;

    unsafe {
        esp!(esp_wifi_set_promiscuous(true))?;
        esp!(esp_wifi_set_promiscuous_rx_cb(Some(promisc_rx_cb)))?;
    }
    log::info!("WiFi sniffer initialized in promiscuous mode");

    if let Some(monitor) = MONITOR.lock().unwrap().as_mut() {
        monitor.start(&mut IdfRadio);
    }

    // ── Sweep thread ─────────────────────────────────────────────────

    if !config.static_mode {
        let sweep_sink = SerialSink {
            verbose: config.verbose,
            output_tx: output_tx.clone(),
        };
        let interval = Duration::from_millis(config.sweep_interval_ms as u64);
        thread::Builder::new()
            .name("sweep".into())
            .stack_size(3072)
            .spawn(move || {
                sweep_thread(interval, sweep_sink);
            })?;
        log::info!("Sweep thread spawned");
    }

    // ── Monitor loop (main thread) ───────────────────────────

    let mut sink = SerialSink {
        verbose: config.verbose,
        output_tx,
    };
    monitor_loop(probe_rx, &mut sink);

    // Keep the WiFi driver alive for as long as the monitor runs.
    drop(wifi);
    Ok(())
}

// ── Monitor loop ─────────────────────────────────────────────────────

fn monitor_loop(probe_rx: mpsc::Receiver<ProbeRequest>, sink: &mut SerialSink) {
    log::info!("Monitor loop started");

    while let Ok(probe) = probe_rx.recv() {
        if let Ok(mut guard) = MONITOR.lock() {
            if let Some(monitor) = guard.as_mut() {
                monitor.observe(&probe, sink);
            }
        }
    }

    log::warn!("Probe channel closed, monitor loop exiting");
}

// ── Sweep thread ─────────────────────────────────────────────────────

fn sweep_thread(interval: Duration, mut sink: SerialSink) {
    let mut radio = IdfRadio;
    loop {
        thread::sleep(interval);
        if let Ok(mut guard) = MONITOR.lock() {
            if let Some(monitor) = guard.as_mut() {
                monitor.tick(&mut radio, &mut sink);
            }
        }
    }
}

// ── Output thread ────────────────────────────────────────────────────

fn output_thread(output_rx: mpsc::Receiver<MsgBuffer>) {
    log::info!("Output thread started");

    while let Ok(msg) = output_rx.recv() {
        if let Ok(s) = std::str::from_utf8(&msg) {
            log::info!("{}", s.trim_end());
        }
    }
}

// ── Status thread ────────────────────────────────────────────────────

fn status_thread(output_tx: SyncSender<MsgBuffer>) {
    loop {
        thread::sleep(Duration::from_secs(30));

        let dropped = DROPPED_PROBES.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            log::warn!("{} probe requests dropped (monitor backlog)", dropped);
        }

        let (sweeping, ch, count) = match MONITOR.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(monitor) => (
                    matches!(monitor.sweep_state(), SweepState::Active { .. }),
                    monitor.channel(),
                    u16::try_from(monitor.buffer().size()).unwrap_or(u16::MAX),
                ),
                None => continue,
            },
            Err(_) => continue,
        };

        let heap_free = unsafe { esp_get_free_heap_size() };

        let msg = DeviceMessage::Status {
            sweeping,
            ch,
            count,
            uptime: uptime_secs(),
            heap_free,
            board: board::BOARD_NAME,
            version: VERSION,
        };

        if let Some(buf) = comm::encode_message(&msg) {
            let _ = output_tx.try_send(buf);
        }
    }
}
