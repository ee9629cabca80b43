//! Configuration deserialization and defaults.

use axp_core::config::MboxConfig;

#[test]
fn defaults_are_the_architectural_arrangement() {
    let config = MboxConfig::default();
    assert!(!config.big_endian);
    assert_eq!(config.io_addr_bit, 43);
    assert!(config.bcache.enabled);
    assert_eq!(config.bcache.lines, 32 * 1024);
}

#[test]
fn deserializes_from_json_with_partial_fields() {
    let json = r#"{
        "big_endian": true,
        "bcache": { "lines": 1024 }
    }"#;
    let config: MboxConfig = serde_json::from_str(json).unwrap();
    assert!(config.big_endian);
    assert_eq!(config.io_addr_bit, 43, "defaulted");
    assert!(config.bcache.enabled, "defaulted");
    assert_eq!(config.bcache.lines, 1024);
}

#[test]
fn empty_object_is_all_defaults() {
    let config: MboxConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.bcache.lines, MboxConfig::default().bcache.lines);
}
