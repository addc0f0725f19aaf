//! Port traits: the boundary between the manager core and the outside world.
//!
//! ```text
//!   Driver ──▶ StateReporter ──▶ NetworkManager ──▶ StateChangeListener ──▶ App
//!     ▲                               │
//!     └──────── NetworkDriver ◀───────┘  (enable / disable / config reads)
//! ```
//!
//! Drivers implement [`NetworkDriver`] and push state changes back through
//! [`StateReporter`].  Application code implements [`StateChangeListener`].
//! Every port is `Sync`: drivers, listeners and the manager are shared
//! between the application task and driver/interrupt contexts.

use core::fmt;

use crate::error::{DriverError, Result};
use crate::network::{Credentials, Endpoint, NetworkState, NetworkType};

// ───────────────────────────────────────────────────────────────
// Listener port (domain → application)
// ───────────────────────────────────────────────────────────────

/// Receives state-change notifications for the network types it subscribed to.
///
/// Called synchronously from whichever context reported the change, with no
/// manager lock held.  Implementations must return promptly and may call back
/// into the manager (subscribe, unsubscribe, query, report).
///
/// Any `Fn(NetworkType, NetworkState) + Sync` closure is a listener; whatever
/// the closure captures is its context.
pub trait StateChangeListener: Sync {
    fn on_state_change(&self, network: NetworkType, state: NetworkState);
}

impl<F> StateChangeListener for F
where
    F: Fn(NetworkType, NetworkState) + Sync,
{
    fn on_state_change(&self, network: NetworkType, state: NetworkState) {
        self(network, state);
    }
}

// ───────────────────────────────────────────────────────────────
// Reporter port (driver → domain)
// ───────────────────────────────────────────────────────────────

/// Entry point drivers use to publish a connectivity change.
pub trait StateReporter {
    fn notify_state_change(&self, network: NetworkType, state: NetworkState) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Driver port (domain → driver)
// ───────────────────────────────────────────────────────────────

/// One network stack (WiFi, BLE, Ethernet, ...).
///
/// `enable`/`disable` perform the actual bring-up and tear-down; the manager
/// only records the resulting state.  The accessors return `None` while the
/// corresponding data has not been provisioned.
pub trait NetworkDriver: Sync {
    /// The single network type this driver owns.
    fn network_type(&self) -> NetworkType;

    fn enable(&self) -> core::result::Result<(), DriverError>;

    fn disable(&self) -> core::result::Result<(), DriverError>;

    /// Transport used to open connections over this network.
    fn interface(&self) -> Option<&dyn NetworkInterface>;

    fn endpoint(&self) -> Option<Endpoint>;

    fn credentials(&self) -> Option<Credentials>;
}

// ───────────────────────────────────────────────────────────────
// Transport port (application → network)
// ───────────────────────────────────────────────────────────────

/// Identifier of an open connection on a [`NetworkInterface`].
pub type ConnectionId = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceError {
    /// The network is not connected or the connection is closed.
    NotConnected,
    /// No free connection slots.
    Exhausted,
    /// Underlying socket / GATT I/O error.
    Io,
    /// TLS handshake or credential failure.
    Tls,
}

impl fmt::Display for InterfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Exhausted => write!(f, "no free connections"),
            Self::Io => write!(f, "I/O error"),
            Self::Tls => write!(f, "TLS failure"),
        }
    }
}

/// Connection-oriented transport over one network type.
pub trait NetworkInterface: Sync {
    fn open(
        &self,
        endpoint: &Endpoint,
        credentials: Option<&Credentials>,
    ) -> core::result::Result<ConnectionId, InterfaceError>;

    /// Returns the number of bytes accepted.
    fn send(&self, conn: ConnectionId, data: &[u8]) -> core::result::Result<usize, InterfaceError>;

    /// Returns the number of bytes read; 0 if nothing is pending.
    fn receive(&self, conn: ConnectionId, buf: &mut [u8]) -> core::result::Result<usize, InterfaceError>;

    fn close(&self, conn: ConnectionId) -> core::result::Result<(), InterfaceError>;
}

/// An interface that accepts one connection, discards all writes and never
/// reads.  Used by simulation drivers on the host.
pub struct NullInterface;

impl NetworkInterface for NullInterface {
    fn open(
        &self,
        _endpoint: &Endpoint,
        _credentials: Option<&Credentials>,
    ) -> core::result::Result<ConnectionId, InterfaceError> {
        Ok(0)
    }

    fn send(&self, _conn: ConnectionId, data: &[u8]) -> core::result::Result<usize, InterfaceError> {
        Ok(data.len())
    }

    fn receive(&self, _conn: ConnectionId, _buf: &mut [u8]) -> core::result::Result<usize, InterfaceError> {
        Ok(0)
    }

    fn close(&self, _conn: ConnectionId) -> core::result::Result<(), InterfaceError> {
        Ok(())
    }
}
