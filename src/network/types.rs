//! Network type and network state enumerations.
//!
//! Each [`NetworkType`] owns exactly one bit of the boundary bitmask so a
//! single `u8` can carry a set of types (see [`NetworkSet`](super::NetworkSet)).
//! The raw encodings are stable and match the values used by the drivers.

use core::fmt;

use crate::error::NmError;

// ───────────────────────────────────────────────────────────────
// Network type
// ───────────────────────────────────────────────────────────────

/// One addressable kind of network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum NetworkType {
    Ethernet = 0b0000_0001,
    Wifi = 0b0000_0010,
    Ble = 0b0000_0100,
    /// IEEE 802.15.4 (Thread / Zigbee radios).
    Ieee802154 = 0b0000_1000,
    Cellular = 0b0001_0000,
}

impl NetworkType {
    /// Number of network types; sizes every per-type table.
    pub const COUNT: usize = 5;

    /// All network types in ascending bit order.
    pub const ALL: [NetworkType; Self::COUNT] = [
        Self::Ethernet,
        Self::Wifi,
        Self::Ble,
        Self::Ieee802154,
        Self::Cellular,
    ];

    /// The bit this type occupies in a boundary bitmask.
    pub const fn bit(self) -> u8 {
        self as u8
    }

    /// Dense index (0..COUNT) used to address per-type tables.
    pub const fn index(self) -> usize {
        (self as u8).trailing_zeros() as usize
    }

    /// Decode a single-type bitmask.
    ///
    /// Returns `None` for zero, for values with more than one bit set and
    /// for bits no network type owns.
    pub const fn from_bit(bits: u8) -> Option<Self> {
        match bits {
            0b0000_0001 => Some(Self::Ethernet),
            0b0000_0010 => Some(Self::Wifi),
            0b0000_0100 => Some(Self::Ble),
            0b0000_1000 => Some(Self::Ieee802154),
            0b0001_0000 => Some(Self::Cellular),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ethernet => "ethernet",
            Self::Wifi => "wifi",
            Self::Ble => "ble",
            Self::Ieee802154 => "802.15.4",
            Self::Cellular => "cellular",
        }
    }
}

impl TryFrom<u8> for NetworkType {
    type Error = NmError;

    fn try_from(bits: u8) -> Result<Self, NmError> {
        Self::from_bit(bits).ok_or(NmError::Invalid)
    }
}

impl From<NetworkType> for u8 {
    fn from(network: NetworkType) -> u8 {
        network.bit()
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

// ───────────────────────────────────────────────────────────────
// Network state
// ───────────────────────────────────────────────────────────────

/// Connectivity phase of one network type.
///
/// Ordered by increasing readiness, but `Provisioned` marks a credential
/// update rather than "more connected than `Connected`", and drivers may
/// move between any two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum NetworkState {
    /// Stack is off.
    #[default]
    Disabled = 0,
    /// Stack is initialised and idle; connections may be established.
    Disconnected = 1,
    Connected = 2,
    /// A new configuration (e.g. credentials) has been provisioned.
    Provisioned = 3,
}

impl NetworkState {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Provisioned => "provisioned",
        }
    }
}

impl TryFrom<u8> for NetworkState {
    type Error = NmError;

    fn try_from(raw: u8) -> Result<Self, NmError> {
        match raw {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::Disconnected),
            2 => Ok(Self::Connected),
            3 => Ok(Self::Provisioned),
            _ => Err(NmError::Invalid),
        }
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}
