use licensing_core::{DeviceIdSource, DeviceIdentifier, FixedDeviceId, MachineDeviceId};

#[test]
fn machine_id_is_stable() {
    let first = MachineDeviceId.device_identifier();
    let second = MachineDeviceId.device_identifier();
    assert_eq!(first, second);
}

#[test]
fn machine_id_is_hashed_or_fallback() {
    let id = MachineDeviceId.device_identifier();
    assert!(id.is_fallback() || id.as_bytes().len() == 32);
}

#[test]
fn fallback_is_empty() {
    let fallback = DeviceIdentifier::fallback();
    assert!(fallback.is_fallback());
    assert!(fallback.as_bytes().is_empty());
    assert_eq!(fallback, DeviceIdentifier::default());
    assert_eq!(fallback, DeviceIdentifier::new(Vec::new()));
}

#[test]
fn fixed_device_id_returns_its_value() {
    let source = FixedDeviceId(DeviceIdentifier::new(b"aa:bb:cc".to_vec()));
    assert_eq!(source.device_identifier().as_bytes(), b"aa:bb:cc");
}

#[test]
fn debug_does_not_print_bytes() {
    let id = DeviceIdentifier::new(b"secret-mac".to_vec());
    let debug = format!("{id:?}");
    assert!(!debug.contains("secret"));
    assert!(debug.contains("10 bytes"));
}
