//! Dispatch behaviour: delivery order, re-entrant listeners and listener
//! panics.
//!
//! Re-entrant listeners need a reference back to the manager, so those tests
//! keep the manager, its drivers and listeners in statics, the way firmware
//! wires them.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, OnceLock};

use super::mock_drivers::{CountingListener, MockDriver, RecordingListener, TaggedListener, board, build, wifi_ble};

use netmgr::{NetworkManager, NetworkSet, NetworkState, NetworkType, StateChangeListener, SubscriptionHandle};

const WIFI: NetworkSet = NetworkSet::single(NetworkType::Wifi);
const BLE: NetworkSet = NetworkSet::single(NetworkType::Ble);

// ── Ordering ──────────────────────────────────────────────────

#[test]
fn overlapping_subscribers_receive_in_registration_order() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let log = Mutex::new(Vec::new());
    let first = TaggedListener { id: 1, log: &log };
    let second = TaggedListener { id: 2, log: &log };
    let third = TaggedListener { id: 3, log: &log };
    let m = build(board(WIFI), &[&wifi, &ble]);

    m.subscribe(wifi_ble(), &first).unwrap();
    m.subscribe(BLE, &second).unwrap();
    m.subscribe(WIFI, &third).unwrap();

    m.report_state(NetworkType::Wifi, NetworkState::Connected).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![1, 3]);

    log.lock().unwrap().clear();
    m.report_state(NetworkType::Ble, NetworkState::Connected).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![1, 2]);
}

#[test]
fn order_follows_registration_not_slot_reuse() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let log = Mutex::new(Vec::new());
    let a = TaggedListener { id: 1, log: &log };
    let b = TaggedListener { id: 2, log: &log };
    let c = TaggedListener { id: 3, log: &log };
    let m = build(board(WIFI), &[&wifi, &ble]);

    let ha = m.subscribe(WIFI, &a).unwrap();
    m.subscribe(WIFI, &b).unwrap();
    m.unsubscribe(ha).unwrap();
    // Takes the first slot, but registered last.
    m.subscribe(WIFI, &c).unwrap();

    m.report_state(NetworkType::Wifi, NetworkState::Disconnected).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![2, 3]);
}

#[test]
fn closures_carry_their_own_context() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let seen = Mutex::new(None);
    let ctx = "uplink";
    let on_change = |network: NetworkType, state: NetworkState| {
        *seen.lock().unwrap() = Some((ctx, network, state));
    };
    let m = build(board(WIFI), &[&wifi, &ble]);
    m.subscribe(WIFI, &on_change).unwrap();

    m.report_state(NetworkType::Wifi, NetworkState::Provisioned).unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        Some(("uplink", NetworkType::Wifi, NetworkState::Provisioned))
    );
}

// ── Re-entrancy ───────────────────────────────────────────────

/// Subscribes `LATE` for BLE the first time WiFi reports `Provisioned`.
struct SubscribeOnProvisioned;

static RE_WIFI: MockDriver = MockDriver::new(NetworkType::Wifi);
static RE_BLE: MockDriver = MockDriver::new(NetworkType::Ble);
static RE_MANAGER: OnceLock<NetworkManager<'static>> = OnceLock::new();
static RE_HOOK: SubscribeOnProvisioned = SubscribeOnProvisioned;
static LATE: RecordingListener = RecordingListener::new();

impl StateChangeListener for SubscribeOnProvisioned {
    fn on_state_change(&self, network: NetworkType, state: NetworkState) {
        if network == NetworkType::Wifi && state == NetworkState::Provisioned {
            let m = RE_MANAGER.get().expect("manager initialised");
            m.subscribe(BLE, &LATE).unwrap();
            // Queries from inside a callback must not deadlock either.
            assert_eq!(m.get_state(NetworkType::Wifi), Ok(NetworkState::Provisioned));
        }
    }
}

#[test]
fn listener_can_subscribe_from_its_callback() {
    let m = RE_MANAGER.get_or_init(|| build(board(WIFI), &[&RE_WIFI, &RE_BLE]));
    m.subscribe(WIFI, &RE_HOOK).unwrap();

    m.report_state(NetworkType::Wifi, NetworkState::Provisioned).unwrap();
    assert_eq!(m.subscription_count(), 2);
    assert_eq!(LATE.count(), 0, "new subscriber must not see the event that created it");

    m.report_state(NetworkType::Ble, NetworkState::Connected).unwrap();
    assert_eq!(LATE.events(), vec![(NetworkType::Ble, NetworkState::Connected)]);
}

/// Unsubscribes the handle in `VICTIM_HANDLE` when called.
struct Unsubscriber;

static UN_WIFI: MockDriver = MockDriver::new(NetworkType::Wifi);
static UN_BLE: MockDriver = MockDriver::new(NetworkType::Ble);
static UN_MANAGER: OnceLock<NetworkManager<'static>> = OnceLock::new();
static UNSUBSCRIBER: Unsubscriber = Unsubscriber;
static VICTIM: CountingListener = CountingListener::new();
static VICTIM_HANDLE: Mutex<SubscriptionHandle> = Mutex::new(SubscriptionHandle::UNSET);

impl StateChangeListener for Unsubscriber {
    fn on_state_change(&self, _: NetworkType, _: NetworkState) {
        let handle = *VICTIM_HANDLE.lock().unwrap();
        if let Some(m) = UN_MANAGER.get() {
            let _ = m.unsubscribe(handle);
        }
    }
}

#[test]
fn subscriber_removed_mid_dispatch_is_skipped() {
    let m = UN_MANAGER.get_or_init(|| build(board(WIFI), &[&UN_WIFI, &UN_BLE]));
    m.subscribe(WIFI, &UNSUBSCRIBER).unwrap();
    *VICTIM_HANDLE.lock().unwrap() = m.subscribe(WIFI, &VICTIM).unwrap();

    m.report_state(NetworkType::Wifi, NetworkState::Connected).unwrap();
    assert_eq!(VICTIM.get(), 0, "removed before its turn");
    assert_eq!(m.subscription_count(), 1);
}

/// Reports BLE `Disconnected` whenever WiFi connects.
struct Cascade;

static CA_WIFI: MockDriver = MockDriver::new(NetworkType::Wifi);
static CA_BLE: MockDriver = MockDriver::new(NetworkType::Ble);
static CA_MANAGER: OnceLock<NetworkManager<'static>> = OnceLock::new();
static CASCADE: Cascade = Cascade;
static CA_LOG: RecordingListener = RecordingListener::new();

impl StateChangeListener for Cascade {
    fn on_state_change(&self, network: NetworkType, state: NetworkState) {
        if network == NetworkType::Wifi && state == NetworkState::Connected {
            if let Some(m) = CA_MANAGER.get() {
                m.report_state(NetworkType::Ble, NetworkState::Disconnected).unwrap();
            }
        }
    }
}

#[test]
fn listener_can_report_from_its_callback() {
    let m = CA_MANAGER.get_or_init(|| build(board(WIFI), &[&CA_WIFI, &CA_BLE]));
    m.subscribe(WIFI, &CASCADE).unwrap();
    m.subscribe(NetworkSet::ALL, &CA_LOG).unwrap();

    m.report_state(NetworkType::Wifi, NetworkState::Connected).unwrap();
    // The nested report completes before the outer dispatch reaches CA_LOG.
    assert_eq!(
        CA_LOG.events(),
        vec![
            (NetworkType::Ble, NetworkState::Disconnected),
            (NetworkType::Wifi, NetworkState::Connected),
        ]
    );
    assert_eq!(m.get_state(NetworkType::Ble), Ok(NetworkState::Disconnected));
}

/// Reports WiFi `Provisioned` whenever WiFi connects.
struct Reprovision;

static SA_WIFI: MockDriver = MockDriver::new(NetworkType::Wifi);
static SA_BLE: MockDriver = MockDriver::new(NetworkType::Ble);
static SA_MANAGER: OnceLock<NetworkManager<'static>> = OnceLock::new();
static REPROVISION: Reprovision = Reprovision;
static SA_LOG: RecordingListener = RecordingListener::new();

impl StateChangeListener for Reprovision {
    fn on_state_change(&self, network: NetworkType, state: NetworkState) {
        if network == NetworkType::Wifi && state == NetworkState::Connected {
            if let Some(m) = SA_MANAGER.get() {
                m.report_state(NetworkType::Wifi, NetworkState::Provisioned).unwrap();
                assert_eq!(m.get_state(NetworkType::Wifi), Ok(NetworkState::Provisioned));
            }
        }
    }
}

#[test]
fn same_type_report_from_callback_follows_current_event() {
    let m = SA_MANAGER.get_or_init(|| build(board(WIFI), &[&SA_WIFI, &SA_BLE]));
    m.subscribe(WIFI, &REPROVISION).unwrap();
    m.subscribe(WIFI, &SA_LOG).unwrap();

    m.report_state(NetworkType::Wifi, NetworkState::Connected).unwrap();
    // Queued behind `Connected`, and still delivered before the outer report returns.
    assert_eq!(
        SA_LOG.events(),
        vec![
            (NetworkType::Wifi, NetworkState::Connected),
            (NetworkType::Wifi, NetworkState::Provisioned),
        ]
    );
    assert_eq!(m.get_state(NetworkType::Wifi), Ok(NetworkState::Provisioned));
}

// ── Listener failure ──────────────────────────────────────────

struct Panicker;

impl StateChangeListener for Panicker {
    fn on_state_change(&self, _: NetworkType, _: NetworkState) {
        panic!("listener bug");
    }
}

#[test]
fn panicking_listener_leaves_manager_usable() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let panicker = Panicker;
    let rec = RecordingListener::new();
    let m = build(board(WIFI), &[&wifi, &ble]);
    let bad = m.subscribe(WIFI, &panicker).unwrap();
    m.subscribe(WIFI, &rec).unwrap();

    let outcome = catch_unwind(AssertUnwindSafe(|| m.report_state(NetworkType::Wifi, NetworkState::Connected)));
    assert!(outcome.is_err());
    assert_eq!(m.get_state(NetworkType::Wifi), Ok(NetworkState::Connected));

    m.unsubscribe(bad).unwrap();
    m.report_state(NetworkType::Wifi, NetworkState::Disconnected).unwrap();
    assert_eq!(rec.events(), vec![(NetworkType::Wifi, NetworkState::Disconnected)]);
    assert_eq!(m.subscription_count(), 1);
}

#[test]
fn panic_during_enable_keeps_states_consistent_with_enabled_set() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let panicker = Panicker;
    let rec = RecordingListener::new();
    let m = build(board(NetworkSet::EMPTY), &[&wifi, &ble]);
    m.subscribe(WIFI, &panicker).unwrap();
    m.subscribe(BLE, &rec).unwrap();

    let outcome = catch_unwind(AssertUnwindSafe(|| m.enable_network(wifi_ble())));
    assert!(outcome.is_err());

    assert_eq!(m.enabled_networks(), wifi_ble());
    assert!(wifi.is_up() && ble.is_up());
    assert_eq!(m.get_state(NetworkType::Wifi), Ok(NetworkState::Disconnected));
    assert_eq!(m.get_state(NetworkType::Ble), Ok(NetworkState::Disconnected));
    assert_eq!(rec.count(), 0, "BLE was queued behind the panicking WiFi delivery");

    // The next BLE report delivers the queued event first.
    m.report_state(NetworkType::Ble, NetworkState::Connected).unwrap();
    assert_eq!(
        rec.events(),
        vec![
            (NetworkType::Ble, NetworkState::Disconnected),
            (NetworkType::Ble, NetworkState::Connected),
        ]
    );
    // The transition claim was released.
    assert_eq!(m.disable_network(BLE), Ok(()));
}
