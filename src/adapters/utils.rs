//! Validation helpers shared by the WiFi and BLE drivers.

/// `true` when every byte is printable ASCII (`' '..='~'`).
///
/// SSIDs and passphrases arriving over the BLE provisioning service are
/// checked with this before they reach the WiFi stack.
pub(super) fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}
