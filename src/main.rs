//! netmgr firmware entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  WifiDriver            BleDriver             (NetworkDriver) │
//! │      │  ▲                  │  ▲                              │
//! │ notify  enable/disable  notify  enable/disable               │
//! │      ▼  │                  ▼  │                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │          NetworkManager (state · subscriptions)        │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │      │                              │                        │
//! │  LogListener              ChannelListener ──▶ net-events     │
//! │  (serial log)             (embassy channel)    thread        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The main loop forwards BLE-provisioned credentials to the WiFi driver and
//! polls both drivers once per second.
#![deny(unused_must_use)]

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use embassy_sync::channel::Channel;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{info, warn};

use netmgr::adapters::ble::BleDriver;
use netmgr::adapters::channel_sink::{ChannelListener, EventChannel};
use netmgr::adapters::log_sink::LogListener;
use netmgr::adapters::wifi::WifiDriver;
use netmgr::{NetworkConfig, NetworkManager, NetworkSet, NetworkState, NetworkType};

const EVENT_QUEUE_DEPTH: usize = 16;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// ESP32-S3: WiFi + BLE radios, both up at boot.
const BOARD: NetworkConfig = NetworkConfig::board(
    NetworkSet::single(NetworkType::Wifi).with(NetworkType::Ble),
    NetworkSet::single(NetworkType::Wifi).with(NetworkType::Ble),
);

static WIFI: WifiDriver = WifiDriver::new();
static BLE: BleDriver = BleDriver::new("netmgr");

static EVENTS: EventChannel<EVENT_QUEUE_DEPTH> = Channel::new();
static LOG_LISTENER: LogListener = LogListener;
static CHANNEL_LISTENER: ChannelListener<'static, EVENT_QUEUE_DEPTH> = ChannelListener::new(&EVENTS);

static MANAGER: OnceLock<NetworkManager<'static>> = OnceLock::new();

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;
    info!("netmgr v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Radios ─────────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let wifi = EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs))?;
    WIFI.attach(BlockingWifi::wrap(wifi, sysloop)?);
    BLE.attach();

    // ── 3. Manager ────────────────────────────────────────────
    let manager = NetworkManager::builder(BOARD).driver(&WIFI).driver(&BLE).build()?;
    let manager = MANAGER.get_or_init(|| manager);

    manager.subscribe(NetworkSet::ALL, &LOG_LISTENER)?;
    manager.subscribe(NetworkSet::single(NetworkType::Wifi), &CHANNEL_LISTENER)?;
    manager.start()?;

    // ── 4. Event consumer ─────────────────────────────────────
    std::thread::Builder::new()
        .name("net-events".into())
        .stack_size(4096)
        .spawn(consume_events)?;

    info!("System ready. Entering main loop.");

    // ── 5. Main loop ──────────────────────────────────────────
    let mut dropped_seen = 0;
    loop {
        BLE.poll(manager);

        if let Some((ssid, password)) = BLE.take_pending_credentials() {
            match WIFI.provision(&ssid, &password, manager) {
                Ok(()) => {
                    if let Err(e) = WIFI.connect(manager) {
                        warn!("WiFi connect after provisioning failed: {}", e);
                    }
                }
                Err(e) => warn!("BLE-provisioned credentials rejected: {}", e),
            }
        }

        WIFI.poll(manager);

        let dropped = CHANNEL_LISTENER.dropped();
        if dropped > dropped_seen {
            warn!("net-events lagging, {} events dropped", dropped - dropped_seen);
            dropped_seen = dropped;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn consume_events() {
    loop {
        let event = futures_lite::future::block_on(EVENTS.receive());
        match event.state {
            NetworkState::Connected => {
                let endpoint = MANAGER.get().and_then(|m| m.get_endpoint(event.network));
                match endpoint {
                    Some(ep) => info!("{} up, server {}:{}", event.network, ep.host, ep.port),
                    None => info!("{} up, no server endpoint provisioned", event.network),
                }
            }
            NetworkState::Disconnected => info!("{} down, driver retries with backoff", event.network),
            _ => {}
        }
    }
}
