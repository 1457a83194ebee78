#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use danmaku_client::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
client:
  room_id: 21452505
  heartbeat_interval_msec: 30000 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BAD_CONFIG");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
client:
  room_id: 21452505
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.client.room_id, 21452505);
    assert_eq!(cfg.client.heartbeat_interval_ms, 30000);
    assert_eq!(cfg.client.auth_timeout_ms, 6000);
    assert_eq!(cfg.client.max_backoff_secs, 10);
    assert_eq!(cfg.overlay.style().scroll_duration_ms(), 6000);
    assert!(cfg.upstream.connection_info().hosts.is_empty());
}

#[test]
fn full_config_round_trips_into_runtime_types() {
    let ok = r#"
version: 1
client:
  room_id: 7
  auth_timeout_ms: 3000
upstream:
  token: "abc"
  hosts:
    - { host: "a.example", wss_port: 443 }
    - { host: "b.example", ws_port: 2244 }
overlay:
  speed_level: 10
  coverage: 0.5
  opacity: 0.8
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    let info = cfg.upstream.connection_info();
    assert_eq!(info.token, "abc");
    assert_eq!(info.hosts[0].url(), "wss://a.example:443/sub");
    assert_eq!(info.hosts[1].url(), "ws://b.example:2244/sub");
    assert_eq!(cfg.overlay.style().coverage, 0.5);
}

#[test]
fn rejects_out_of_range_values() {
    let cases = [
        ("version: 2\nclient: { room_id: 1 }\n", "UNSUPPORTED_VERSION"),
        ("version: 1\nclient: { room_id: 0 }\n", "BAD_CONFIG"),
        ("version: 1\nclient: { room_id: 1, heartbeat_interval_ms: 10 }\n", "BAD_CONFIG"),
        ("version: 1\nclient: { room_id: 1 }\noverlay: { speed_level: 11 }\n", "BAD_CONFIG"),
        ("version: 1\nclient: { room_id: 1 }\noverlay: { coverage: 0 }\n", "BAD_CONFIG"),
        ("version: 1\nclient: { room_id: 1 }\nupstream: { hosts: [ { host: x } ] }\n", "BAD_CONFIG"),
    ];
    for (yaml, code) in cases {
        let err = config::load_from_str(yaml).expect_err(yaml);
        assert_eq!(err.kind().as_str(), code, "{yaml}");
    }
}

#[test]
fn client_options_follow_config() {
    let ok = r#"
version: 1
client:
  room_id: 99
  heartbeat_interval_ms: 20000
  referer_origin: "https://live.example/"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    let opts = danmaku_client::ClientOptions::from_config(&cfg);
    assert_eq!(opts.room_id, 99);
    assert_eq!(opts.heartbeat_interval, std::time::Duration::from_secs(20));
    assert_eq!(opts.auth_timeout, std::time::Duration::from_secs(6));
    assert_eq!(opts.referer, "https://live.example/99");
}
