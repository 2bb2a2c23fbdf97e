use garrison::GarrisonError;
use garrison::core::cluster::{inbox_topic, parse_server_key, server_key};

#[test]
fn test_server_key_roundtrip() {
    let key = server_key("connector", "c-1");
    assert_eq!(key, "servers/connector/c-1");
    let (server_type, server_id) = parse_server_key(&key).unwrap();
    assert_eq!(server_type, "connector");
    assert_eq!(server_id, "c-1");
}

#[test]
fn test_parse_rejects_extra_segments() {
    // A slash inside the id makes the key unparseable by design.
    let err = parse_server_key("servers/game/id/with/slashes").unwrap_err();
    assert!(matches!(err, GarrisonError::InvalidDiscoveryKey(_)));
}

#[test]
fn test_parse_rejects_wrong_root() {
    assert!(parse_server_key("leases/game/g-1").is_err());
    assert!(parse_server_key("servers/game").is_err());
    assert!(parse_server_key("").is_err());
}

#[test]
fn test_parse_rejects_empty_segments() {
    assert!(parse_server_key("servers//g-1").is_err());
    assert!(parse_server_key("servers/game/").is_err());
}

#[test]
fn test_inbox_topic_convention() {
    assert_eq!(inbox_topic("game", "g-1"), "pitaya/servers/game/g-1");
}
