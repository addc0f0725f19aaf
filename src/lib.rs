//! Network manager for ESP32-class devices.
//!
//! Tracks one connectivity state per network type (Ethernet, WiFi, BLE,
//! 802.15.4, cellular), fans state changes out to subscribers, and brings
//! networks up and down through injected drivers.  All ESP-IDF-specific
//! code is guarded by `#[cfg(target_os = "espidf")]` within each module;
//! everything else builds and tests on the host.
//!
//! ```no_run
//! use netmgr::{NetworkConfig, NetworkManager, NetworkSet, NetworkState, NetworkType};
//! use netmgr::adapters::{ble::BleDriver, wifi::WifiDriver};
//!
//! let wifi = WifiDriver::new();
//! let ble = BleDriver::new("demo");
//! let on_change = |network: NetworkType, state: NetworkState| println!("{network}: {state}");
//!
//! let manager = NetworkManager::builder(NetworkConfig::default())
//!     .driver(&wifi)
//!     .driver(&ble)
//!     .build()?;
//! manager.subscribe(NetworkSet::ALL, &on_change)?;
//! manager.start()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod network;
pub mod registry;

pub use app::ports::{NetworkDriver, NetworkInterface, StateChangeListener, StateReporter};
pub use app::service::{ManagerBuilder, NetworkManager};
pub use config::NetworkConfig;
pub use error::{ConfigError, DriverError, NmError};
pub use network::{Credentials, Endpoint, NetworkSet, NetworkState, NetworkType};
pub use registry::SubscriptionHandle;
