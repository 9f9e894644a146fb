use super::*;

#[test]
fn defaults_match_upstream() {
    let config = Config::default();
    assert_eq!(config.general.connect_retry_timeout, Duration::from_secs(7));
    assert_eq!(
        config.general.connect_retry_interval,
        Duration::from_millis(100)
    );
    assert!(!config.general.connection_sharing);
    assert!(!config.general.router_require_enforce);
    assert!(config.general.wait_for_my_writes);
    assert_eq!(
        config.general.wait_for_my_writes_timeout,
        Duration::from_secs(2)
    );
}

#[test]
fn parse_toml_with_suffixed_durations() {
    let config = Config::from_toml(
        r#"
        [general]
        connect_retry_timeout = "10s"
        connect_retry_interval = 250
        connection_sharing = true
        wait_for_my_writes_timeout = "0ms"
        "#,
    )
    .unwrap();

    assert_eq!(
        config.general.connect_retry_timeout,
        Duration::from_secs(10)
    );
    assert_eq!(
        config.general.connect_retry_interval,
        Duration::from_millis(250)
    );
    assert!(config.general.connection_sharing);
    assert_eq!(
        config.general.wait_for_my_writes_timeout,
        Duration::from_millis(0)
    );
    // Untouched fields keep their defaults.
    assert!(config.general.wait_for_my_writes);
}

#[test]
fn parse_empty_toml_is_all_defaults() {
    assert_eq!(Config::from_toml("").unwrap(), Config::default());
}

#[test]
fn bad_toml_is_an_error() {
    assert!(Config::from_toml("[general]\nconnect_retry_timeout = \"7x\"").is_err());
}
