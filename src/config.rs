//! Board network configuration.
//!
//! Which network types the board has (`supported`) and which of them are
//! brought up at boot (`enabled`).  `enabled` must always be a subset of
//! `supported`; a board definition that breaks this is a build error when
//! declared through [`NetworkConfig::board`], and a [`ConfigError`] when
//! loaded at runtime.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::network::{NetworkSet, NetworkType};

/// Network configuration supplied at init time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network types compiled into this board.
    pub supported: NetworkSet,
    /// Network types enabled at startup.
    pub enabled: NetworkSet,
}

impl NetworkConfig {
    /// Compile-time board definition.
    ///
    /// Evaluated in a `const` item, a violated subset rule aborts the
    /// build:
    ///
    /// ```compile_fail
    /// use netmgr::config::NetworkConfig;
    /// use netmgr::network::{NetworkSet, NetworkType};
    /// const _: NetworkConfig = NetworkConfig::board(
    ///     NetworkSet::single(NetworkType::Wifi),
    ///     NetworkSet::single(NetworkType::Ble),
    /// );
    /// ```
    pub const fn board(supported: NetworkSet, enabled: NetworkSet) -> Self {
        assert!(
            enabled.is_subset_of(supported),
            "enabled networks must be a subset of supported networks"
        );
        Self { supported, enabled }
    }

    /// Runtime constructor.
    pub const fn new(supported: NetworkSet, enabled: NetworkSet) -> Result<Self, ConfigError> {
        if !enabled.is_subset_of(supported) {
            return Err(ConfigError::EnabledNotSupported);
        }
        Ok(Self { supported, enabled })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled.is_subset_of(self.supported) {
            Ok(())
        } else {
            Err(ConfigError::EnabledNotSupported)
        }
    }

    /// Parse `{ "supported": <mask>, "enabled": <mask> }` and validate.
    pub fn from_json(text: &[u8]) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_slice(text).map_err(|_| ConfigError::Malformed)?;
        let supported = NetworkSet::from_bits(raw.supported).ok_or(ConfigError::UnknownNetworkBits)?;
        let enabled = NetworkSet::from_bits(raw.enabled).ok_or(ConfigError::UnknownNetworkBits)?;
        Self::new(supported, enabled)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        // ESP32-S3: WiFi + BLE radios, both up at boot.
        let radios = NetworkSet::single(NetworkType::Wifi).with(NetworkType::Ble);
        Self::board(radios, radios)
    }
}

/// Wire form used by [`NetworkConfig::from_json`] so unknown bits surface as
/// [`ConfigError::UnknownNetworkBits`] rather than a generic parse error.
#[derive(Deserialize)]
struct RawConfig {
    supported: u8,
    enabled: u8,
}
