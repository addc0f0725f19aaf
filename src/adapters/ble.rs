//! BLE driver and WiFi provisioning service.
//!
//! Implements [`NetworkDriver`] for [`NetworkType::Ble`]: `enable` starts the
//! stack and advertising, `disable` shuts it down.  A phone connects as a
//! central and writes WiFi credentials to the GATT service below; the main
//! loop collects them with [`BleDriver::take_pending_credentials`] and hands
//! them to the WiFi driver.
//!
//! Stack callbacks run in the Bluedroid task and cannot reach the manager,
//! so they only queue a [`GattEvent`].  [`BleDriver::poll`] drains the queue
//! on the application task and reports central connect/disconnect as
//! `Connected`/`Disconnected`.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via `esp_idf_svc::sys`.
//! - **all other targets**: simulation; tests inject events directly.
//!
//! ## GATT Service Layout
//!
//! | Characteristic       | UUID                                    | Perms       |
//! |----------------------|-----------------------------------------|-------------|
//! | WiFi SSID            | `4a650002-…-5f6c9a1d7e3a`               | Write       |
//! | WiFi Password        | `4a650003-…-5f6c9a1d7e3a`               | Write       |

use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use super::utils::is_printable_ascii;
use super::wifi::{MAX_PASSWORD_LEN, MAX_SSID_LEN};
use crate::app::ports::{NetworkDriver, NetworkInterface, StateReporter};
use crate::error::DriverError;
use crate::network::{Credentials, Endpoint, NetworkState, NetworkType};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x4a650001_b7e4_4b91_a032_5f6c9a1d7e3a;
pub const CHAR_WIFI_SSID: u128 = 0x4a650002_b7e4_4b91_a032_5f6c9a1d7e3a;
pub const CHAR_WIFI_PASS: u128 = 0x4a650003_b7e4_4b91_a032_5f6c9a1d7e3a;

const MIN_WPA2_PASSWORD_LEN: usize = 8;

/// GATT events buffered between two polls.
pub const GATT_QUEUE_DEPTH: usize = 8;

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningError {
    DataTooLong,
    InvalidUtf8,
    InvalidSsid,
    InvalidPassword,
    /// Password written before any SSID.
    OutOfOrder,
}

impl fmt::Display for ProvisioningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataTooLong => write!(f, "BLE write exceeds max characteristic length"),
            Self::InvalidUtf8 => write!(f, "BLE write contains invalid UTF-8"),
            Self::InvalidSsid => write!(f, "SSID invalid (1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (8-64 bytes for WPA2 or empty)"),
            Self::OutOfOrder => write!(f, "password written before SSID"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// State and events
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Off,
    Advertising,
    Connected,
}

/// Something the BLE stack observed, queued for the application task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    CentralConnected,
    CentralDisconnected,
    SsidWrite(heapless::Vec<u8, MAX_SSID_LEN>),
    PasswordWrite(heapless::Vec<u8, MAX_PASSWORD_LEN>),
}

// ───────────────────────────────────────────────────────────────
// Validation helpers
// ───────────────────────────────────────────────────────────────

fn sanitize_ble_string(raw: &[u8], max_len: usize) -> Result<&str, ProvisioningError> {
    if raw.len() > max_len {
        return Err(ProvisioningError::DataTooLong);
    }
    core::str::from_utf8(raw).map_err(|_| ProvisioningError::InvalidUtf8)
}

fn validate_ssid(ssid: &str) -> Result<(), ProvisioningError> {
    if ssid.is_empty() || !is_printable_ascii(ssid) {
        return Err(ProvisioningError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ProvisioningError> {
    if !password.is_empty() && password.len() < MIN_WPA2_PASSWORD_LEN {
        return Err(ProvisioningError::InvalidPassword);
    }
    Ok(())
}

fn report(reporter: &dyn StateReporter, state: NetworkState) {
    if let Err(e) = reporter.notify_state_change(NetworkType::Ble, state) {
        warn!("BLE: state report {} rejected: {}", state, e);
    }
}

// ───────────────────────────────────────────────────────────────
// Stack bring-up
// ───────────────────────────────────────────────────────────────

/// Bring-up steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum StackStage {
    ControllerInit,
    ControllerEnabled,
    BluedroidInit,
    BluedroidEnabled,
    Advertising,
}

impl StackStage {
    const ORDER: [Self; 5] = [
        Self::ControllerInit,
        Self::ControllerEnabled,
        Self::BluedroidInit,
        Self::BluedroidEnabled,
        Self::Advertising,
    ];

    /// Steps up to and including `self`, most recent first.
    fn unwind_from(self) -> impl Iterator<Item = Self> {
        Self::ORDER.into_iter().rev().filter(move |s| *s <= self)
    }
}

/// Run every step in order.  If one fails, the steps that already succeeded
/// are undone newest first, so the stack is back to fully off and a later
/// `enable` can start from scratch.
fn bring_up(
    mut step: impl FnMut(StackStage) -> Result<(), DriverError>,
    mut undo: impl FnMut(StackStage),
) -> Result<(), DriverError> {
    let mut reached: Option<StackStage> = None;
    for stage in StackStage::ORDER {
        if let Err(e) = step(stage) {
            warn!("BLE: bring-up failed at {:?}, unwinding", stage);
            for done in reached.into_iter().flat_map(StackStage::unwind_from) {
                undo(done);
            }
            return Err(e);
        }
        reached = Some(stage);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// GATT attribute handles
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProvisioningChar {
    Ssid,
    Password,
}

/// Handles Bluedroid assigned to the provisioning service, filled in as each
/// registration is confirmed.  0 means "not registered".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GattHandles {
    service: u16,
    ssid: u16,
    password: u16,
}

impl GattHandles {
    const NONE: Self = Self {
        service: 0,
        ssid: 0,
        password: 0,
    };

    /// A new service instance has no characteristics yet.
    fn service_created(&mut self, service: u16) {
        *self = Self { service, ..Self::NONE };
    }

    /// Record the characteristic Bluedroid just added.  Returns the UUID of
    /// the characteristic to add next, if any.
    fn char_added(&mut self, handle: u16) -> Option<u128> {
        if self.ssid == 0 {
            self.ssid = handle;
            Some(CHAR_WIFI_PASS)
        } else {
            self.password = handle;
            None
        }
    }

    fn lookup(&self, handle: u16) -> Option<ProvisioningChar> {
        match handle {
            0 => None,
            h if h == self.ssid => Some(ProvisioningChar::Ssid),
            h if h == self.password => Some(ProvisioningChar::Password),
            _ => None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Driver
// ───────────────────────────────────────────────────────────────

type WifiCredentials = (heapless::String<MAX_SSID_LEN>, heapless::String<MAX_PASSWORD_LEN>);

struct BleInner {
    state: BleState,
    pending_ssid: Option<heapless::String<MAX_SSID_LEN>>,
    pending_password: Option<heapless::String<MAX_PASSWORD_LEN>>,
    handles: GattHandles,
    #[cfg(not(target_os = "espidf"))]
    sim_start_error: Option<DriverError>,
}

pub struct BleDriver {
    device_name: &'static str,
    inner: Mutex<CriticalSectionRawMutex, RefCell<BleInner>>,
    events: Channel<CriticalSectionRawMutex, GattEvent, GATT_QUEUE_DEPTH>,
}

impl BleDriver {
    pub const fn new(device_name: &'static str) -> Self {
        Self {
            device_name,
            inner: Mutex::new(RefCell::new(BleInner {
                state: BleState::Off,
                pending_ssid: None,
                pending_password: None,
                handles: GattHandles::NONE,
                #[cfg(not(target_os = "espidf"))]
                sim_start_error: None,
            })),
            events: Channel::new(),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut BleInner) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn state(&self) -> BleState {
        self.with_inner(|b| b.state)
    }

    /// Queue an event from the stack.  Returns `false` (and drops the event)
    /// if the queue is full.
    pub fn push_gatt_event(&self, event: GattEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                warn!("BLE: GATT event queue full, event dropped");
                false
            }
        }
    }

    /// Queue a raw characteristic write from the stack.  Writes to handles
    /// outside the provisioning service, or longer than the characteristic,
    /// are dropped.
    pub fn push_gatt_write(&self, handle: u16, data: &[u8]) -> bool {
        let event = match self.with_inner(|b| b.handles.lookup(handle)) {
            Some(ProvisioningChar::Ssid) => heapless::Vec::from_slice(data).map(GattEvent::SsidWrite),
            Some(ProvisioningChar::Password) => heapless::Vec::from_slice(data).map(GattEvent::PasswordWrite),
            None => return false,
        };
        match event {
            Ok(event) => self.push_gatt_event(event),
            Err(()) => {
                warn!("BLE: write of {} bytes to handle {} too long", data.len(), handle);
                false
            }
        }
    }

    /// Apply queued stack events.  Call from the application task.
    pub fn poll(&self, reporter: &dyn StateReporter) {
        while let Ok(event) = self.events.try_receive() {
            let result = match event {
                GattEvent::CentralConnected => {
                    self.on_central_connected(reporter);
                    Ok(())
                }
                GattEvent::CentralDisconnected => {
                    self.on_central_disconnected(reporter);
                    Ok(())
                }
                GattEvent::SsidWrite(raw) => self.on_ssid_write(&raw),
                GattEvent::PasswordWrite(raw) => self.on_password_write(&raw),
            };
            if let Err(e) = result {
                warn!("BLE: provisioning write rejected: {}", e);
            }
        }
    }

    /// An SSID write starts a new provisioning session.
    pub fn on_ssid_write(&self, raw: &[u8]) -> Result<(), ProvisioningError> {
        let s = sanitize_ble_string(raw, MAX_SSID_LEN)?;
        validate_ssid(s)?;
        let mut ssid = heapless::String::new();
        ssid.push_str(s).map_err(|_| ProvisioningError::InvalidSsid)?;
        self.with_inner(|b| {
            b.pending_ssid = Some(ssid);
            b.pending_password = None;
        });
        info!("BLE: SSID written (len={})", s.len());
        Ok(())
    }

    pub fn on_password_write(&self, raw: &[u8]) -> Result<(), ProvisioningError> {
        let s = sanitize_ble_string(raw, MAX_PASSWORD_LEN)?;
        validate_password(s)?;
        let mut pw = heapless::String::new();
        pw.push_str(s).map_err(|_| ProvisioningError::InvalidPassword)?;
        self.with_inner(|b| {
            if b.pending_ssid.is_none() {
                return Err(ProvisioningError::OutOfOrder);
            }
            b.pending_password = Some(pw);
            Ok(())
        })?;
        info!("BLE: password written (len={})", s.len());
        Ok(())
    }

    /// Complete SSID + password pair, if one was written since the last take.
    pub fn take_pending_credentials(&self) -> Option<WifiCredentials> {
        self.with_inner(|b| {
            if b.pending_ssid.is_none() || b.pending_password.is_none() {
                return None;
            }
            Some((b.pending_ssid.take()?, b.pending_password.take()?))
        })
    }

    pub fn on_central_connected(&self, reporter: &dyn StateReporter) {
        let accepted = self.with_inner(|b| {
            if b.state == BleState::Off {
                return false;
            }
            b.state = BleState::Connected;
            true
        });
        if !accepted {
            warn!("BLE: central connect while stack is off, ignored");
            return;
        }
        info!("BLE: central connected");
        report(reporter, NetworkState::Connected);
    }

    pub fn on_central_disconnected(&self, reporter: &dyn StateReporter) {
        let was_connected = self.with_inner(|b| {
            if b.state != BleState::Connected {
                return false;
            }
            b.state = BleState::Advertising;
            true
        });
        if was_connected {
            info!("BLE: central disconnected");
            report(reporter, NetworkState::Disconnected);
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&self) -> Result<(), DriverError> {
        let fail = self.with_inner(|b| b.sim_start_error);
        bring_up(
            |stage| match fail {
                Some(e) if stage == StackStage::BluedroidEnabled => {
                    warn!("BLE(sim): simulated stack init failure ({})", e);
                    Err(e)
                }
                _ => Ok(()),
            },
            |stage| log::trace!("BLE(sim): undo {:?}", stage),
        )?;
        self.sim_register_service();
        info!("BLE(sim): advertising '{}' (service {:032x})", self.device_name, SERVICE_UUID);
        Ok(())
    }

    /// Replays the registration callbacks Bluedroid delivers after start:
    /// the service handle, then one handle per characteristic.
    #[cfg(not(target_os = "espidf"))]
    fn sim_register_service(&self) {
        const SIM_SERVICE_HANDLE: u16 = 40;
        self.with_inner(|b| {
            b.handles.service_created(SIM_SERVICE_HANDLE);
            let mut handle = SIM_SERVICE_HANDLE;
            let mut next = Some(CHAR_WIFI_SSID);
            while next.is_some() {
                handle += 2;
                next = b.handles.char_added(handle);
            }
        });
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&self) {
        info!("BLE(sim): stopped");
    }

    #[cfg(target_os = "espidf")]
    fn platform_start(&self) -> Result<(), DriverError> {
        esp::start(self.device_name)
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&self) {
        esp::stop();
    }
}

#[cfg(not(target_os = "espidf"))]
impl BleDriver {
    /// Make every `enable` fail with `error` until cleared with `None`.
    pub fn sim_fail_enable(&self, error: Option<DriverError>) {
        self.with_inner(|b| b.sim_start_error = error);
    }
}

#[cfg(target_os = "espidf")]
impl BleDriver {
    /// Route Bluedroid callbacks to this driver.  Call once before enabling.
    pub fn attach(&'static self) {
        if esp::ACTIVE.set(self).is_err() {
            warn!("BLE: driver already attached");
        }
    }
}

// ───────────────────────────────────────────────────────────────
// NetworkDriver
// ───────────────────────────────────────────────────────────────

impl NetworkDriver for BleDriver {
    fn network_type(&self) -> NetworkType {
        NetworkType::Ble
    }

    fn enable(&self) -> Result<(), DriverError> {
        if self.state() != BleState::Off {
            return Ok(());
        }
        self.platform_start()?;
        self.with_inner(|b| b.state = BleState::Advertising);
        info!("BLE: advertising as '{}'", self.device_name);
        Ok(())
    }

    fn disable(&self) -> Result<(), DriverError> {
        self.platform_stop();
        self.with_inner(|b| {
            b.state = BleState::Off;
            b.pending_ssid = None;
            b.pending_password = None;
            b.handles = GattHandles::NONE;
        });
        self.events.clear();
        Ok(())
    }

    /// Provisioning is the only BLE traffic; no socket transport.
    fn interface(&self) -> Option<&dyn NetworkInterface> {
        None
    }

    fn endpoint(&self) -> Option<Endpoint> {
        None
    }

    fn credentials(&self) -> Option<Credentials> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF Bluedroid glue
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use std::sync::OnceLock;

    use esp_idf_svc::sys::*;
    use log::{error, info};

    use super::{BleDriver, CHAR_WIFI_SSID, GattEvent, SERVICE_UUID, StackStage, bring_up};
    use crate::error::DriverError;

    pub(super) static ACTIVE: OnceLock<&'static BleDriver> = OnceLock::new();

    fn check(ret: esp_err_t, what: &str) -> Result<(), DriverError> {
        if ret == ESP_OK as esp_err_t {
            Ok(())
        } else {
            error!("BLE: {} failed ({})", what, ret);
            Err(DriverError::InitFailed)
        }
    }

    fn uuid128(uuid: u128) -> esp_bt_uuid_t {
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = 16;
        t.uuid.uuid128 = uuid.to_le_bytes();
        t
    }

    unsafe fn add_write_char(svc_handle: u16, uuid: u128) {
        let mut char_uuid = uuid128(uuid);
        unsafe {
            esp_ble_gatts_add_char(
                svc_handle,
                &mut char_uuid,
                ESP_GATT_PERM_WRITE as esp_gatt_perm_t,
                ESP_GATT_CHAR_PROP_BIT_WRITE as esp_gatt_char_prop_t,
                core::ptr::null_mut(),
                core::ptr::null_mut(),
            );
        }
    }

    unsafe fn start_advertising() {
        let mut adv_params = esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..unsafe { core::mem::zeroed() }
        };
        unsafe {
            esp_ble_gap_start_advertising(&mut adv_params);
        }
    }

    unsafe fn step(stage: StackStage, name: &[u8]) -> Result<(), DriverError> {
        unsafe {
            match stage {
                StackStage::ControllerInit => {
                    let mut bt_cfg = esp_bt_controller_config_t::default();
                    check(esp_bt_controller_init(&mut bt_cfg), "bt_controller_init")
                }
                StackStage::ControllerEnabled => {
                    check(esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE), "bt_controller_enable")
                }
                StackStage::BluedroidInit => check(esp_bluedroid_init(), "bluedroid_init"),
                StackStage::BluedroidEnabled => check(esp_bluedroid_enable(), "bluedroid_enable"),
                StackStage::Advertising => {
                    check(esp_ble_gap_register_callback(Some(gap_event_handler)), "gap_register")?;
                    check(esp_ble_gatts_register_callback(Some(gatts_event_handler)), "gatts_register")?;
                    check(esp_ble_gatts_app_register(0), "gatts_app_register")?;
                    check(esp_ble_gap_set_device_name(name.as_ptr().cast()), "set_device_name")?;
                    start_advertising();
                    Ok(())
                }
            }
        }
    }

    unsafe fn undo(stage: StackStage) {
        unsafe {
            match stage {
                StackStage::Advertising => esp_ble_gap_stop_advertising(),
                StackStage::BluedroidEnabled => esp_bluedroid_disable(),
                StackStage::BluedroidInit => esp_bluedroid_deinit(),
                StackStage::ControllerEnabled => esp_bt_controller_disable(),
                StackStage::ControllerInit => esp_bt_controller_deinit(),
            };
        }
    }

    pub(super) fn start(device_name: &str) -> Result<(), DriverError> {
        let mut name: heapless::Vec<u8, 32> = heapless::Vec::new();
        name.extend_from_slice(device_name.as_bytes()).map_err(|_| DriverError::InitFailed)?;
        name.push(0).map_err(|_| DriverError::InitFailed)?;

        // Fails harmlessly once the classic-BT memory is already released.
        unsafe { esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT) };
        bring_up(|stage| unsafe { step(stage, &name) }, |stage| unsafe { undo(stage) })?;
        info!("BLE(espidf): Bluedroid up, advertising as '{}'", device_name);
        Ok(())
    }

    pub(super) fn stop() {
        for stage in StackStage::Advertising.unwind_from() {
            unsafe { undo(stage) };
        }
        info!("BLE(espidf): stack shut down");
    }

    unsafe extern "C" fn gap_event_handler(event: esp_gap_ble_cb_event_t, _param: *mut esp_ble_gap_cb_param_t) {
        if event == esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT {
            log::info!("BLE GAP: advertising started");
        }
    }

    unsafe extern "C" fn gatts_event_handler(
        event: esp_gatts_cb_event_t,
        gatts_if: esp_gatt_if_t,
        param: *mut esp_ble_gatts_cb_param_t,
    ) {
        let Some(driver) = ACTIVE.get() else {
            return;
        };
        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                let mut svc_id = esp_gatt_srvc_id_t {
                    id: esp_gatt_id_t {
                        uuid: uuid128(SERVICE_UUID),
                        inst_id: 0,
                    },
                    is_primary: true,
                };
                unsafe {
                    esp_ble_gatts_create_service(gatts_if, &mut svc_id, 6);
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                let svc_handle = unsafe { (*param).create.service_handle };
                driver.with_inner(|b| b.handles.service_created(svc_handle));
                unsafe {
                    esp_ble_gatts_start_service(svc_handle);
                    add_write_char(svc_handle, CHAR_WIFI_SSID);
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                let handle = unsafe { (*param).add_char.attr_handle };
                let (svc_handle, next) = driver.with_inner(|b| (b.handles.service, b.handles.char_added(handle)));
                match next {
                    Some(uuid) => unsafe { add_write_char(svc_handle, uuid) },
                    None => log::info!("BLE GATTS: provisioning characteristics registered"),
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                driver.push_gatt_event(GattEvent::CentralConnected);
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                driver.push_gatt_event(GattEvent::CentralDisconnected);
                unsafe { start_advertising() };
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = unsafe { &(*param).write };
                let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };
                driver.push_gatt_write(p.handle, data);
            }
            _ => {}
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
