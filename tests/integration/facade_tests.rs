//! Integration tests for the `NetworkManager` facade: state queries,
//! subscriptions, enable/disable through drivers, and configuration checks.

use super::mock_drivers::{DriverCall, MockDriver, RecordingListener, board, build, wifi_ble};

use netmgr::app::service::ManagerBuilder;
use netmgr::{
    ConfigError, Credentials, DriverError, Endpoint, NetworkConfig, NetworkManager, NetworkSet, NetworkState,
    NetworkType, NmError, SubscriptionHandle,
};

const WIFI: NetworkSet = NetworkSet::single(NetworkType::Wifi);
const BLE: NetworkSet = NetworkSet::single(NetworkType::Ble);
const UNSUPPORTED: [NetworkType; 3] = [NetworkType::Ethernet, NetworkType::Ieee802154, NetworkType::Cellular];

// ── State table ───────────────────────────────────────────────

#[test]
fn all_states_start_disabled() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let m = build(board(WIFI), &[&wifi, &ble]);
    assert_eq!(m.get_state(NetworkType::Wifi), Ok(NetworkState::Disabled));
    assert_eq!(m.get_state(NetworkType::Ble), Ok(NetworkState::Disabled));
    assert!(m.enabled_networks().is_empty());
    assert!(wifi.calls().is_empty(), "building must not drive hardware");
}

#[test]
fn report_then_get_without_debouncing() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let rec = RecordingListener::new();
    let m = build(board(WIFI), &[&wifi, &ble]);
    m.subscribe(WIFI, &rec).unwrap();

    for state in [
        NetworkState::Connected,
        NetworkState::Connected,
        NetworkState::Provisioned,
        NetworkState::Provisioned,
    ] {
        m.report_state(NetworkType::Wifi, state).unwrap();
        assert_eq!(m.get_state(NetworkType::Wifi), Ok(state));
    }
    assert_eq!(rec.count(), 4, "repeated states must dispatch every time");
}

#[test]
fn unsupported_types_fail_without_side_effects() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let rec = RecordingListener::new();
    let m = build(board(WIFI), &[&wifi, &ble]);
    m.subscribe(NetworkSet::ALL, &rec).unwrap();

    for t in UNSUPPORTED {
        assert_eq!(m.get_state(t), Err(NmError::Invalid));
        assert_eq!(m.report_state(t, NetworkState::Connected), Err(NmError::Invalid));
        assert_eq!(m.notify_state_change(t, NetworkState::Connected), Err(NmError::Invalid));
        assert_eq!(m.enable_network(WIFI | t), Err(NmError::NotSupported));
        assert_eq!(m.disable_network(WIFI | t), Err(NmError::NotSupported));
        assert!(m.get_network_interface(t).is_none());
        assert!(m.get_endpoint(t).is_none());
        assert!(m.get_credentials(t).is_none());
    }

    assert!(rec.events().is_empty());
    assert!(wifi.calls().is_empty());
    assert!(m.enabled_networks().is_empty());
    assert_eq!(m.get_state(NetworkType::Wifi), Ok(NetworkState::Disabled));
}

#[test]
fn available_networks_is_the_supported_set() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let m = build(board(NetworkSet::EMPTY), &[&wifi, &ble]);
    assert_eq!(m.get_available_networks(), wifi_ble());
    assert_eq!(m.get_available_networks().bits(), 0b0110);
}

#[test]
fn report_for_supported_but_disabled_type_still_dispatches() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let rec = RecordingListener::new();
    let m = build(board(WIFI), &[&wifi, &ble]);
    m.subscribe(BLE, &rec).unwrap();

    assert!(!m.enabled_networks().contains(NetworkType::Ble));
    m.report_state(NetworkType::Ble, NetworkState::Connected).unwrap();
    assert_eq!(rec.events(), vec![(NetworkType::Ble, NetworkState::Connected)]);
    assert_eq!(m.get_state(NetworkType::Ble), Ok(NetworkState::Connected));
}

#[test]
fn connected_networks_tracks_reports() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let m = build(board(WIFI), &[&wifi, &ble]);
    m.report_state(NetworkType::Wifi, NetworkState::Connected).unwrap();
    m.report_state(NetworkType::Ble, NetworkState::Connected).unwrap();
    assert_eq!(m.connected_networks(), wifi_ble());
    m.report_state(NetworkType::Ble, NetworkState::Provisioned).unwrap();
    assert_eq!(m.connected_networks(), WIFI);
}

// ── Subscriptions ─────────────────────────────────────────────

#[test]
fn subscriber_sees_exactly_matching_events() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let rec = RecordingListener::new();
    let m = build(board(WIFI), &[&wifi, &ble]);
    m.subscribe(WIFI, &rec).unwrap();

    m.report_state(NetworkType::Wifi, NetworkState::Connected).unwrap();
    m.report_state(NetworkType::Ble, NetworkState::Connected).unwrap();
    assert_eq!(rec.events(), vec![(NetworkType::Wifi, NetworkState::Connected)]);
}

#[test]
fn subscribe_rejects_masks_without_supported_types() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let rec = RecordingListener::new();
    let m = build(board(WIFI), &[&wifi, &ble]);

    assert_eq!(m.subscribe(NetworkSet::EMPTY, &rec), Err(NmError::Invalid));
    assert_eq!(
        m.subscribe(NetworkType::Ethernet | NetworkType::Cellular, &rec),
        Err(NmError::Invalid)
    );
    assert_eq!(m.subscription_count(), 0);

    // Unsupported bits alongside a supported one are dropped, not rejected.
    m.subscribe(NetworkSet::ALL, &rec).unwrap();
    assert_eq!(m.subscription_count(), 1);
}

#[test]
fn unsubscribe_stops_delivery_and_double_unsubscribe_fails() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let rec = RecordingListener::new();
    let m = build(board(WIFI), &[&wifi, &ble]);
    let h = m.subscribe(WIFI, &rec).unwrap();

    m.unsubscribe(h).unwrap();
    m.report_state(NetworkType::Wifi, NetworkState::Connected).unwrap();
    assert_eq!(rec.count(), 0);
    assert_eq!(m.unsubscribe(h), Err(NmError::Invalid));
    assert_eq!(m.unsubscribe(SubscriptionHandle::default()), Err(NmError::Invalid));
}

#[test]
fn pool_exhaustion_returns_no_memory_and_recovers() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let rec = RecordingListener::new();
    let m = build(board(WIFI), &[&wifi, &ble]);

    let handles: Vec<_> = (0..m.subscription_capacity())
        .map(|_| m.subscribe(WIFI, &rec).unwrap())
        .collect();
    assert_eq!(m.subscribe(WIFI, &rec), Err(NmError::NoMemory));
    assert_eq!(m.subscription_count(), m.subscription_capacity());

    m.report_state(NetworkType::Wifi, NetworkState::Connected).unwrap();
    assert_eq!(rec.count(), m.subscription_capacity());

    m.unsubscribe(handles[3]).unwrap();
    let fresh = m.subscribe(BLE, &rec).unwrap();
    assert_ne!(fresh, handles[3], "a reused slot must hand out a new handle");
    assert_eq!(m.unsubscribe(handles[3]), Err(NmError::Invalid));
}

// ── Enable / disable ──────────────────────────────────────────

#[test]
fn start_enables_boot_networks_and_reports_disconnected() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let rec = RecordingListener::new();
    let m = build(board(WIFI), &[&wifi, &ble]);
    m.subscribe(NetworkSet::ALL, &rec).unwrap();

    m.start().unwrap();
    assert_eq!(wifi.calls(), vec![DriverCall::Enable]);
    assert!(ble.calls().is_empty());
    assert_eq!(m.enabled_networks(), WIFI);
    assert_eq!(m.get_state(NetworkType::Wifi), Ok(NetworkState::Disconnected));
    assert_eq!(m.get_state(NetworkType::Ble), Ok(NetworkState::Disabled));
    assert_eq!(rec.events(), vec![(NetworkType::Wifi, NetworkState::Disconnected)]);
}

#[test]
fn start_with_nothing_enabled_drives_nothing() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let m = build(board(NetworkSet::EMPTY), &[&wifi, &ble]);
    m.start().unwrap();
    assert!(wifi.calls().is_empty());
    assert!(ble.calls().is_empty());
}

#[test]
fn enable_and_disable_only_touch_changing_types() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let rec = RecordingListener::new();
    let m = build(board(WIFI), &[&wifi, &ble]);
    m.start().unwrap();
    m.subscribe(NetworkSet::ALL, &rec).unwrap();
    wifi.clear_calls();

    m.enable_network(wifi_ble()).unwrap();
    assert!(wifi.calls().is_empty(), "WiFi was already enabled");
    assert_eq!(ble.calls(), vec![DriverCall::Enable]);
    assert_eq!(rec.events(), vec![(NetworkType::Ble, NetworkState::Disconnected)]);

    rec.clear();
    m.disable_network(WIFI).unwrap();
    m.disable_network(WIFI).unwrap();
    assert_eq!(wifi.calls(), vec![DriverCall::Disable]);
    assert_eq!(rec.events(), vec![(NetworkType::Wifi, NetworkState::Disabled)]);
    assert_eq!(m.enabled_networks(), BLE);
    assert_eq!(m.get_state(NetworkType::Wifi), Ok(NetworkState::Disabled));
}

#[test]
fn empty_mask_is_invalid() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let m = build(board(WIFI), &[&wifi, &ble]);
    assert_eq!(m.enable_network(NetworkSet::EMPTY), Err(NmError::Invalid));
    assert_eq!(m.disable_network(NetworkSet::EMPTY), Err(NmError::Invalid));
}

#[test]
fn enable_failure_rolls_back_and_reports_nothing() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let rec = RecordingListener::new();
    let m = build(board(NetworkSet::EMPTY), &[&wifi, &ble]);
    m.subscribe(NetworkSet::ALL, &rec).unwrap();
    ble.fail_enable(Some(DriverError::InitFailed));

    assert_eq!(m.enable_network(wifi_ble()), Err(NmError::InitFailed));

    // WiFi (lower bit) came up first and was switched back off.
    assert_eq!(wifi.calls(), vec![DriverCall::Enable, DriverCall::Disable]);
    assert!(!wifi.is_up());
    assert!(rec.events().is_empty());
    assert!(m.enabled_networks().is_empty());
    assert_eq!(m.get_state(NetworkType::Wifi), Ok(NetworkState::Disabled));
    assert_eq!(m.get_state(NetworkType::Ble), Ok(NetworkState::Disabled));

    ble.fail_enable(None);
    m.enable_network(wifi_ble()).unwrap();
    assert_eq!(m.enabled_networks(), wifi_ble());
}

#[test]
fn invalid_credentials_propagate() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let m = build(board(NetworkSet::EMPTY), &[&wifi, &ble]);
    wifi.fail_enable(Some(DriverError::InvalidCredentials));
    assert_eq!(m.start(), Ok(()));
    assert_eq!(m.enable_network(WIFI), Err(NmError::InvalidCredentials));
    assert_eq!(NmError::InvalidCredentials.code(), 5);
}

#[test]
fn disable_failure_keeps_type_enabled() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let rec = RecordingListener::new();
    let m = build(board(wifi_ble()), &[&wifi, &ble]);
    m.start().unwrap();
    m.subscribe(NetworkSet::ALL, &rec).unwrap();
    ble.fail_disable(Some(DriverError::InitFailed));

    assert_eq!(m.disable_network(wifi_ble()), Err(NmError::InitFailed));
    assert_eq!(wifi.calls(), vec![DriverCall::Enable, DriverCall::Disable, DriverCall::Enable]);
    assert!(wifi.is_up());
    assert_eq!(m.enabled_networks(), wifi_ble());
    assert!(rec.events().is_empty());
}

// ── Accessors ─────────────────────────────────────────────────

#[test]
fn accessors_reflect_driver_provisioning() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let m = build(board(WIFI), &[&wifi, &ble]);

    assert!(m.get_endpoint(NetworkType::Wifi).is_none());
    assert!(m.get_credentials(NetworkType::Wifi).is_none());
    assert!(m.get_network_interface(NetworkType::Wifi).is_none());

    wifi.provision(
        Endpoint::new("a1b2c3.iot.example.com", 8883).unwrap(),
        Credentials {
            alpn: Some("x-amzn-mqtt-ca"),
            root_ca: Some(b"-----BEGIN CERTIFICATE-----\n\0"),
            ..Credentials::default()
        },
    );

    let ep = m.get_endpoint(NetworkType::Wifi).unwrap();
    assert_eq!(ep.host.as_str(), "a1b2c3.iot.example.com");
    assert_eq!(ep.port, 8883);
    let creds = m.get_credentials(NetworkType::Wifi).unwrap();
    assert!(creds.alpn_is_valid());
    assert!(!creds.has_client_identity());

    let iface = m.get_network_interface(NetworkType::Wifi).unwrap();
    let conn = iface.open(&ep, Some(&creds)).unwrap();
    assert_eq!(iface.send(conn, b"ping"), Ok(4));
    assert!(m.get_endpoint(NetworkType::Ble).is_none());
}

// ── Configuration ─────────────────────────────────────────────

#[test]
fn enabled_must_be_subset_of_supported_at_init() {
    let wifi = MockDriver::new(NetworkType::Wifi);
    let bad = NetworkConfig {
        supported: WIFI,
        enabled: wifi_ble(),
    };
    let r = NetworkManager::builder(bad).driver(&wifi).build();
    assert!(matches!(r, Err(ConfigError::EnabledNotSupported)));
    assert_eq!(NetworkConfig::new(WIFI, wifi_ble()), Err(ConfigError::EnabledNotSupported));
}

#[test]
fn builder_rejects_bad_driver_sets() {
    let wifi = MockDriver::new(NetworkType::Wifi);
    let wifi2 = MockDriver::new(NetworkType::Wifi);
    let eth = MockDriver::new(NetworkType::Ethernet);

    let r = NetworkManager::builder(board(WIFI)).driver(&wifi).build();
    assert!(matches!(r, Err(ConfigError::MissingDriver(NetworkType::Ble))));

    let r = NetworkManager::builder(board(WIFI)).driver(&wifi).driver(&wifi2).build();
    assert!(matches!(r, Err(ConfigError::DuplicateDriver(NetworkType::Wifi))));

    let r = NetworkManager::builder(board(WIFI)).driver(&eth).build();
    assert!(matches!(r, Err(ConfigError::UnsupportedDriver(NetworkType::Ethernet))));
}

#[test]
fn json_board_definition_builds_a_manager() {
    let config = NetworkConfig::from_json(br#"{ "supported": 1, "enabled": 1 }"#).unwrap();
    let eth = MockDriver::new(NetworkType::Ethernet);
    let m: NetworkManager<'_, 2> = ManagerBuilder::new(config).driver(&eth).build().unwrap();
    m.start().unwrap();
    assert_eq!(m.get_state(NetworkType::Ethernet), Ok(NetworkState::Disconnected));
    assert_eq!(m.subscription_capacity(), 2);
}

// ── End-to-end scenario ───────────────────────────────────────

#[test]
fn wifi_ble_scenario() {
    let (wifi, ble) = (MockDriver::new(NetworkType::Wifi), MockDriver::new(NetworkType::Ble));
    let rec = RecordingListener::new();
    let m = build(board(WIFI), &[&wifi, &ble]);

    let h = m.subscribe(wifi_ble(), &rec).unwrap();

    m.report_state(NetworkType::Wifi, NetworkState::Connected).unwrap();
    assert_eq!(rec.events(), vec![(NetworkType::Wifi, NetworkState::Connected)]);

    m.report_state(NetworkType::Ble, NetworkState::Connected).unwrap();
    assert_eq!(
        rec.events(),
        vec![
            (NetworkType::Wifi, NetworkState::Connected),
            (NetworkType::Ble, NetworkState::Connected),
        ]
    );

    m.unsubscribe(h).unwrap();
    m.report_state(NetworkType::Wifi, NetworkState::Disconnected).unwrap();
    assert_eq!(rec.count(), 2);
}
