//! WiFi station-mode driver.
//!
//! Implements [`NetworkDriver`] for [`NetworkType::Wifi`].  The manager calls
//! `enable`/`disable` to bring the radio up and down; link events
//! (provisioned, connected, lost) are pushed back through a
//! [`StateReporter`] passed to each call, normally the manager itself.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: ESP-IDF WiFi STA through a `BlockingWifi`
//!   handed over with [`WifiDriver::attach`] at boot.
//! - **all other targets**: simulation with failure injection for host tests.
//!
//! ## Reconnection policy
//!
//! On a failed connect or a lost link the driver enters `Reconnecting` and
//! retries from [`WifiDriver::poll`], doubling the backoff (2 s → 4 s →
//! 8 s … capped at 60 s) after every failed attempt.

use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{error, info, warn};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::EspError;
#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use super::utils::is_printable_ascii;
use crate::app::ports::{NetworkDriver, NetworkInterface, StateReporter};
use crate::error::DriverError;
use crate::network::{Credentials, Endpoint, NetworkState, NetworkType};

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;
const MIN_WPA2_PASSWORD_LEN: usize = 8;

const INITIAL_BACKOFF_SECS: u32 = 2;
const MAX_BACKOFF_SECS: u32 = 60;

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    RadioOff,
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    AlreadyConnected,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RadioOff => write!(f, "WiFi radio is disabled"),
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::AlreadyConnected => write!(f, "already connected to AP"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Link state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiLink {
    /// Radio disabled by the manager.
    Off,
    /// Radio up, not associated.
    Idle,
    Connected,
    Reconnecting { attempt: u32 },
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

pub fn validate_ssid(ssid: &str) -> Result<(), WifiError> {
    if ssid.is_empty() || ssid.len() > MAX_SSID_LEN || !is_printable_ascii(ssid) {
        return Err(WifiError::InvalidSsid);
    }
    Ok(())
}

/// Empty means an open network.
pub fn validate_password(password: &str) -> Result<(), WifiError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < MIN_WPA2_PASSWORD_LEN || password.len() > MAX_PASSWORD_LEN {
        return Err(WifiError::InvalidPassword);
    }
    Ok(())
}

fn report(reporter: &dyn StateReporter, state: NetworkState) {
    if let Err(e) = reporter.notify_state_change(NetworkType::Wifi, state) {
        warn!("WiFi: state report {} rejected: {}", state, e);
    }
}

// ───────────────────────────────────────────────────────────────
// Driver
// ───────────────────────────────────────────────────────────────

/// Host-side fault injection.
#[cfg(not(target_os = "espidf"))]
struct Sim {
    enable_error: Option<DriverError>,
    failing_connects: u32,
    link_up: bool,
}

struct WifiInner {
    link: WifiLink,
    ssid: heapless::String<MAX_SSID_LEN>,
    password: heapless::String<MAX_PASSWORD_LEN>,
    backoff_secs: u32,
    endpoint: Option<Endpoint>,
    tls: Option<Credentials>,
    #[cfg(not(target_os = "espidf"))]
    sim: Sim,
}

#[cfg(target_os = "espidf")]
type Radio = BlockingWifi<EspWifi<'static>>;

pub struct WifiDriver {
    inner: Mutex<CriticalSectionRawMutex, RefCell<WifiInner>>,
    /// Blocking calls into the WiFi stack; never taken inside `inner`.
    #[cfg(target_os = "espidf")]
    radio: std::sync::Mutex<Option<Radio>>,
}

impl WifiDriver {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(WifiInner {
                link: WifiLink::Off,
                ssid: heapless::String::new(),
                password: heapless::String::new(),
                backoff_secs: INITIAL_BACKOFF_SECS,
                endpoint: None,
                tls: None,
                #[cfg(not(target_os = "espidf"))]
                sim: Sim {
                    enable_error: None,
                    failing_connects: 0,
                    link_up: false,
                },
            })),
            #[cfg(target_os = "espidf")]
            radio: std::sync::Mutex::new(None),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut WifiInner) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn link(&self) -> WifiLink {
        self.with_inner(|w| w.link)
    }

    pub fn backoff_secs(&self) -> u32 {
        self.with_inner(|w| w.backoff_secs)
    }

    pub fn is_provisioned(&self) -> bool {
        self.with_inner(|w| !w.ssid.is_empty())
    }

    /// Server the application connects to over WiFi.
    pub fn set_endpoint(&self, endpoint: Endpoint) {
        self.with_inner(|w| w.endpoint = Some(endpoint));
    }

    pub fn set_tls_credentials(&self, credentials: Credentials) {
        self.with_inner(|w| w.tls = Some(credentials));
    }

    /// Store AP credentials and report [`NetworkState::Provisioned`].
    ///
    /// Re-provisioning while connected keeps the current link; the new
    /// credentials are used on the next connect.
    pub fn provision(&self, ssid: &str, password: &str, reporter: &dyn StateReporter) -> Result<(), WifiError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.with_inner(|w| {
            w.ssid.clear();
            w.ssid.push_str(ssid).map_err(|_| WifiError::InvalidSsid)?;
            w.password.clear();
            w.password.push_str(password).map_err(|_| WifiError::InvalidPassword)
        })?;
        info!("WiFi: credentials updated (SSID='{}')", ssid);
        report(reporter, NetworkState::Provisioned);
        Ok(())
    }

    /// Associate with the provisioned AP.  On failure the driver keeps
    /// retrying from [`poll`](Self::poll).
    pub fn connect(&self, reporter: &dyn StateReporter) -> Result<(), WifiError> {
        let ssid = self.with_inner(|w| match w.link {
            WifiLink::Off => Err(WifiError::RadioOff),
            WifiLink::Connected => Err(WifiError::AlreadyConnected),
            _ if w.ssid.is_empty() => Err(WifiError::NoCredentials),
            _ => Ok(w.ssid.clone()),
        })?;

        info!("WiFi: connecting to '{}'", ssid);
        match self.platform_connect(&ssid) {
            Ok(()) => {
                self.on_connected(reporter);
                Ok(())
            }
            Err(e) => {
                error!("WiFi: connection failed: {}", e);
                self.with_inner(|w| w.link = WifiLink::Reconnecting { attempt: 0 });
                Err(e)
            }
        }
    }

    /// Drop the association.  The radio stays up.
    pub fn disconnect(&self, reporter: &dyn StateReporter) {
        let was_linked = self.with_inner(|w| {
            let linked = matches!(w.link, WifiLink::Connected | WifiLink::Reconnecting { .. });
            if linked {
                w.link = WifiLink::Idle;
                w.backoff_secs = INITIAL_BACKOFF_SECS;
            }
            linked
        });
        if was_linked {
            self.platform_disconnect();
            info!("WiFi: disconnected");
            report(reporter, NetworkState::Disconnected);
        }
    }

    /// Periodic tick: detect link loss and drive reconnect attempts.
    pub fn poll(&self, reporter: &dyn StateReporter) {
        let (link, ssid) = self.with_inner(|w| (w.link, w.ssid.clone()));
        match link {
            WifiLink::Connected if !self.platform_is_connected() => {
                warn!("WiFi: connection lost, entering reconnect");
                self.with_inner(|w| w.link = WifiLink::Reconnecting { attempt: 0 });
                report(reporter, NetworkState::Disconnected);
            }
            WifiLink::Reconnecting { attempt } => {
                info!("WiFi: reconnect attempt {} (backoff {}s)", attempt, self.backoff_secs());
                match self.platform_connect(&ssid) {
                    Ok(()) => self.on_connected(reporter),
                    Err(_) => self.with_inner(|w| {
                        // A disable or disconnect may have landed meanwhile.
                        if w.link == link {
                            w.backoff_secs = w.backoff_secs.saturating_mul(2).min(MAX_BACKOFF_SECS);
                            w.link = WifiLink::Reconnecting { attempt: attempt + 1 };
                        }
                    }),
                }
            }
            _ => {}
        }
    }

    fn on_connected(&self, reporter: &dyn StateReporter) {
        self.with_inner(|w| {
            w.link = WifiLink::Connected;
            w.backoff_secs = INITIAL_BACKOFF_SECS;
        });
        info!("WiFi: connected");
        report(reporter, NetworkState::Connected);
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn with_radio<R>(&self, what: &str, f: impl FnOnce(&mut Radio) -> Result<R, EspError>) -> Option<R> {
        let mut guard = self.radio.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(radio) = guard.as_mut() else {
            error!("WiFi(espidf): {} before attach()", what);
            return None;
        };
        match f(radio) {
            Ok(r) => Some(r),
            Err(e) => {
                error!("WiFi(espidf): {} failed: {}", what, e);
                None
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_start(&self) -> Result<(), DriverError> {
        self.with_radio("start", |w| w.start()).ok_or(DriverError::InitFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&self) -> Result<(), DriverError> {
        match self.with_inner(|w| w.sim.enable_error) {
            Some(e) => {
                warn!("WiFi(sim): simulated start failure ({})", e);
                Err(e)
            }
            None => Ok(()),
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&self) {
        if self.with_radio("stop", |w| w.stop()).is_some() {
            info!("WiFi(espidf): STA stopped");
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&self) {
        self.with_inner(|w| w.sim.link_up = false);
        info!("WiFi(sim): radio off");
    }

    /// Blocks until associated and the netif has an address.
    #[cfg(target_os = "espidf")]
    fn platform_connect(&self, ssid: &str) -> Result<(), WifiError> {
        let password = self.with_inner(|w| w.password.clone());
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: heapless::String::try_from(ssid).map_err(|_| WifiError::InvalidSsid)?,
            password,
            auth_method,
            ..Default::default()
        });
        self.with_radio("connect", |w| {
            w.set_configuration(&config)?;
            w.connect()?;
            w.wait_netif_up()
        })
        .ok_or(WifiError::ConnectionFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&self, ssid: &str) -> Result<(), WifiError> {
        self.with_inner(|w| {
            if w.sim.failing_connects > 0 {
                w.sim.failing_connects -= 1;
                warn!("WiFi(sim): simulated auth failure for '{}'", ssid);
                return Err(WifiError::ConnectionFailed);
            }
            w.sim.link_up = true;
            Ok(())
        })
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&self) {
        self.with_radio("disconnect", |w| w.disconnect());
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&self) {
        self.with_inner(|w| w.sim.link_up = false);
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.with_radio("link query", |w| w.is_connected()).unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.with_inner(|w| w.sim.link_up)
    }
}

#[cfg(target_os = "espidf")]
impl WifiDriver {
    /// Hand the STA stack to the driver.  Call once before enabling.
    pub fn attach(&self, wifi: Radio) {
        let mut guard = self.radio.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.replace(wifi).is_some() {
            warn!("WiFi: driver re-attached, previous stack handle dropped");
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiDriver {
    /// Make every `enable` fail with `error` until cleared with `None`.
    pub fn sim_fail_enable(&self, error: Option<DriverError>) {
        self.with_inner(|w| w.sim.enable_error = error);
    }

    /// Fail the next `count` connect attempts.
    pub fn sim_fail_connects(&self, count: u32) {
        self.with_inner(|w| w.sim.failing_connects = count);
    }

    /// Drop the AP association as if the signal was lost.
    pub fn sim_drop_link(&self) {
        self.with_inner(|w| w.sim.link_up = false);
    }
}

impl Default for WifiDriver {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// NetworkDriver
// ───────────────────────────────────────────────────────────────

impl NetworkDriver for WifiDriver {
    fn network_type(&self) -> NetworkType {
        NetworkType::Wifi
    }

    fn enable(&self) -> Result<(), DriverError> {
        self.platform_start()?;
        self.with_inner(|w| {
            if w.link == WifiLink::Off {
                w.link = WifiLink::Idle;
            }
        });
        info!("WiFi: radio up");
        Ok(())
    }

    fn disable(&self) -> Result<(), DriverError> {
        self.platform_stop();
        self.with_inner(|w| {
            w.link = WifiLink::Off;
            w.backoff_secs = INITIAL_BACKOFF_SECS;
        });
        info!("WiFi: radio down");
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn interface(&self) -> Option<&dyn NetworkInterface> {
        Some(&crate::app::ports::NullInterface)
    }

    // TODO: serve a TCP/TLS NetworkInterface over the STA netif via esp_idf_svc::tls.
    #[cfg(target_os = "espidf")]
    fn interface(&self) -> Option<&dyn NetworkInterface> {
        None
    }

    fn endpoint(&self) -> Option<Endpoint> {
        self.with_inner(|w| w.endpoint.clone())
    }

    fn credentials(&self) -> Option<Credentials> {
        self.with_inner(|w| w.tls)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
