use garrison::GarrisonError;
use garrison::config::Config;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_defaults() {
    let config = Config::default();
    let etcd = &config.cluster.sd.etcd;
    assert_eq!(etcd.endpoints, vec!["http://127.0.0.1:2379".to_string()]);
    assert_eq!(etcd.prefix, "garrison/");
    assert_eq!(etcd.heartbeat.ttl, Duration::from_secs(60));
    assert!(!etcd.heartbeat.log);
    assert_eq!(etcd.syncservers.interval, Duration::from_secs(120));

    let nats = &config.cluster.rpc.client.nats;
    assert_eq!(nats.connect, "nats://127.0.0.1:4222");
    assert_eq!(nats.requesttimeout, Duration::from_secs(5));

    config.validate().unwrap();
}

#[test]
fn test_empty_connect_string_is_rejected() {
    let mut config = Config::default();
    config.cluster.rpc.client.nats.connect = String::new();
    assert!(matches!(
        config.validate(),
        Err(GarrisonError::MissingNatsConnectString)
    ));
}

#[test]
fn test_zero_request_timeout_is_rejected() {
    let mut config = Config::default();
    config.cluster.rpc.client.nats.requesttimeout = Duration::ZERO;
    assert!(matches!(
        config.validate(),
        Err(GarrisonError::MissingNatsRequestTimeout)
    ));
}

#[test]
fn test_from_file_overrides_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[cluster.sd.etcd]
endpoints = ["http://etcd-a:2379", "http://etcd-b:2379"]
prefix = "t1/"
dialtimeout = "2s"

[cluster.sd.etcd.heartbeat]
ttl = "15s"
log = true

[cluster.sd.etcd.syncservers]
interval = "30s"

[cluster.rpc.client.nats]
connect = "nats://bus:4222"
requesttimeout = "750ms"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    let etcd = &config.cluster.sd.etcd;
    assert_eq!(etcd.endpoints.len(), 2);
    assert_eq!(etcd.prefix, "t1/");
    assert_eq!(etcd.dialtimeout, Duration::from_secs(2));
    assert_eq!(etcd.heartbeat.ttl, Duration::from_secs(15));
    assert!(etcd.heartbeat.log);
    assert_eq!(etcd.syncservers.interval, Duration::from_secs(30));

    let nats = &config.cluster.rpc.client.nats;
    assert_eq!(nats.connect, "nats://bus:4222");
    assert_eq!(nats.requesttimeout, Duration::from_millis(750));
}

#[test]
fn test_from_file_rejects_invalid_cluster_config() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[cluster.rpc.client.nats]
connect = ""
"#
    )
    .unwrap();

    let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(matches!(err, GarrisonError::MissingNatsConnectString));
}
