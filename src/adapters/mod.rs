//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter        | Implements          | Connects to                 |
//! |----------------|---------------------|-----------------------------|
//! | `wifi`         | NetworkDriver       | ESP-IDF WiFi STA            |
//! | `ble`          | NetworkDriver       | Bluedroid GATT provisioning |
//! | `log_sink`     | StateChangeListener | Serial log output           |
//! | `channel_sink` | StateChangeListener | embassy-sync channel        |

pub mod ble;
pub mod channel_sink;
pub mod log_sink;
pub(super) mod utils;
pub mod wifi;
