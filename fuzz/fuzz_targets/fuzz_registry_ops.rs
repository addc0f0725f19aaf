//! Fuzz target: `NetworkManager` operation sequences
//!
//! Decodes arbitrary bytes into subscribe / unsubscribe / report / enable /
//! disable calls against a manager wired to the simulated WiFi and BLE
//! drivers, and asserts that none of them panic and that the manager's
//! bookkeeping stays consistent after every step.
//!
//! cargo fuzz run fuzz_registry_ops

#![no_main]

use std::sync::atomic::{AtomicU32, Ordering};

use libfuzzer_sys::fuzz_target;
use netmgr::adapters::ble::BleDriver;
use netmgr::adapters::wifi::WifiDriver;
use netmgr::{NetworkConfig, NetworkManager, NetworkSet, NetworkState, NetworkType, NmError, SubscriptionHandle};

fuzz_target!(|data: &[u8]| {
    let wifi = WifiDriver::new();
    let ble = BleDriver::new("fuzz");
    let calls = AtomicU32::new(0);
    let listener = |_: NetworkType, _: NetworkState| {
        calls.fetch_add(1, Ordering::Relaxed);
    };
    let Ok(manager) = NetworkManager::builder(NetworkConfig::default())
        .driver(&wifi)
        .driver(&ble)
        .build()
    else {
        return;
    };

    let supported = manager.get_available_networks();
    let mut handles: Vec<SubscriptionHandle> = Vec::new();

    for pair in data.chunks_exact(2) {
        let (op, arg) = (pair[0], pair[1]);
        match op % 6 {
            0 => match manager.subscribe(NetworkSet::from_bits_truncate(arg), &listener) {
                Ok(h) => handles.push(h),
                Err(e) => assert!(matches!(e, NmError::Invalid | NmError::NoMemory)),
            },
            1 => {
                if !handles.is_empty() {
                    let h = handles[arg as usize % handles.len()];
                    let expect_ok = manager.unsubscribe(h).is_ok();
                    if expect_ok {
                        handles.retain(|&x| x != h);
                    }
                    assert_eq!(manager.unsubscribe(h), Err(NmError::Invalid));
                }
            }
            2 => {
                let network = NetworkType::ALL[arg as usize % NetworkType::COUNT];
                let state = NetworkState::try_from(arg % 4).unwrap_or_default();
                let result = manager.report_state(network, state);
                assert_eq!(result.is_ok(), supported.contains(network));
                if result.is_ok() {
                    assert_eq!(manager.get_state(network), Ok(state));
                }
            }
            3 => {
                let _ = manager.enable_network(NetworkSet::from_bits_truncate(arg));
            }
            4 => {
                let _ = manager.disable_network(NetworkSet::from_bits_truncate(arg));
            }
            _ => {
                let network = NetworkType::ALL[arg as usize % NetworkType::COUNT];
                assert_eq!(manager.get_state(network).is_ok(), supported.contains(network));
            }
        }

        assert_eq!(manager.subscription_count(), handles.len());
        assert!(manager.subscription_count() <= manager.subscription_capacity());
        assert!(manager.enabled_networks().is_subset_of(supported));
    }
});
