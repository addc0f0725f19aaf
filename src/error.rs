//! Error types for the network manager.
//!
//! Every facade operation returns [`Result`].  `Ok` is the success code;
//! [`NmError`] carries the failure codes.  All variants are `Copy` so they
//! can be returned from driver and interrupt contexts without allocation.

use core::fmt;

use crate::network::NetworkType;

// ---------------------------------------------------------------------------
// Facade error
// ---------------------------------------------------------------------------

/// Failure codes returned by manager operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NmError {
    /// Bad argument or stale/unknown subscription handle.
    Invalid = 1,
    /// Network type outside the board's supported set.
    NotSupported = 2,
    /// Subscription pool exhausted.
    NoMemory = 3,
    /// Driver failed to bring the network up (or down).
    InitFailed = 4,
    /// Driver rejected the configured credentials.
    InvalidCredentials = 5,
}

impl NmError {
    /// Stable numeric code (0 is reserved for success).
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for NmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "invalid argument"),
            Self::NotSupported => write!(f, "network type not supported"),
            Self::NoMemory => write!(f, "subscription pool exhausted"),
            Self::InitFailed => write!(f, "network driver init failed"),
            Self::InvalidCredentials => write!(f, "invalid credentials"),
        }
    }
}

impl core::error::Error for NmError {}

// ---------------------------------------------------------------------------
// Driver errors
// ---------------------------------------------------------------------------

/// Failures a [`NetworkDriver`](crate::app::ports::NetworkDriver) may report
/// from enable/disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The radio or stack could not be initialised / shut down.
    InitFailed,
    /// Stored credentials were rejected during bring-up.
    InvalidCredentials,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed => write!(f, "driver init failed"),
            Self::InvalidCredentials => write!(f, "driver rejected credentials"),
        }
    }
}

impl From<DriverError> for NmError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::InitFailed => Self::InitFailed,
            DriverError::InvalidCredentials => Self::InvalidCredentials,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Configuration errors are fatal: the manager is never built from a
/// configuration that fails these checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `enabled` contains a type that is not in `supported`.
    EnabledNotSupported,
    /// A mask contains bits no network type owns.
    UnknownNetworkBits,
    /// Configuration text could not be parsed.
    Malformed,
    /// A supported network type has no driver.
    MissingDriver(NetworkType),
    /// Two drivers were registered for the same network type.
    DuplicateDriver(NetworkType),
    /// A driver was registered for a type the board does not support.
    UnsupportedDriver(NetworkType),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnabledNotSupported => write!(f, "enabled networks must be a subset of supported networks"),
            Self::UnknownNetworkBits => write!(f, "network mask contains unknown bits"),
            Self::Malformed => write!(f, "malformed network configuration"),
            Self::MissingDriver(t) => write!(f, "no driver registered for supported network {t}"),
            Self::DuplicateDriver(t) => write!(f, "more than one driver registered for {t}"),
            Self::UnsupportedDriver(t) => write!(f, "driver registered for unsupported network {t}"),
        }
    }
}

impl core::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, NmError>;
