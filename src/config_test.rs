use super::*;

use std::collections::HashMap;

fn build(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
    let map: HashMap<String, String> =
        vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
    Config::from_lookup(|key| map.get(key).cloned())
}

#[test]
fn development_defaults_the_port() {
    let cfg = build(&[("APP_ENV", "development")]).unwrap();
    assert_eq!(cfg.port, DEFAULT_DEV_PORT);
    assert!(cfg.is_development());
    assert!(cfg.backend_public_key_pem.is_none());
    assert!(cfg.settlement.is_none());
}

#[test]
fn production_requires_port() {
    let err = build(&[]).unwrap_err();
    assert!(matches!(err, ConfigError::MissingVar("PORT")));
}

#[test]
fn unset_app_env_is_strict() {
    let cfg = build(&[("PORT", "8080")]).unwrap();
    assert_eq!(cfg.environment, Environment::Production);
    assert_eq!(cfg.port, 8080);
}

#[test]
fn unrecognized_app_env_is_strict() {
    let err = build(&[("APP_ENV", "staging")]).unwrap_err();
    assert!(matches!(err, ConfigError::MissingVar("PORT")));
}

#[test]
fn invalid_port_is_rejected() {
    let err = build(&[("PORT", "not-a-port")]).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPort(_)));
    assert!(err.to_string().contains("not-a-port"));
}

#[test]
fn full_settlement_config_parses() {
    let cfg = build(&[
        ("PORT", "9000"),
        ("BACKEND_PUBLIC_KEY", "pem-public"),
        ("PRIVATE_KEY", "pem-private"),
        ("PERFORM_TRADE_ENDPOINT", "https://backend.test/performTrade"),
    ])
    .unwrap();

    assert_eq!(cfg.backend_public_key_pem.as_deref(), Some("pem-public"));
    let settlement = cfg.settlement.expect("settlement configured");
    assert_eq!(settlement.endpoint, "https://backend.test/performTrade");
    assert_eq!(settlement.private_key_pem, "pem-private");
}

#[test]
fn private_key_without_endpoint_is_rejected() {
    let err = build(&[
        ("APP_ENV", "development"),
        ("BACKEND_PUBLIC_KEY", "pem"),
        ("PRIVATE_KEY", "pem-private"),
    ])
    .unwrap_err();
    assert!(matches!(err, ConfigError::PartialSettlement { missing: "PERFORM_TRADE_ENDPOINT" }));
}

#[test]
fn endpoint_without_private_key_is_rejected() {
    let err = build(&[
        ("APP_ENV", "development"),
        ("BACKEND_PUBLIC_KEY", "pem"),
        ("PERFORM_TRADE_ENDPOINT", "https://backend.test"),
    ])
    .unwrap_err();
    assert!(matches!(err, ConfigError::PartialSettlement { missing: "PRIVATE_KEY" }));
}

#[test]
fn settlement_without_authentication_refuses_to_boot() {
    let err = build(&[
        ("APP_ENV", "development"),
        ("PRIVATE_KEY", "pem-private"),
        ("PERFORM_TRADE_ENDPOINT", "https://backend.test"),
    ])
    .unwrap_err();
    assert!(matches!(err, ConfigError::SettlementWithoutAuth));
}

#[test]
fn auth_without_settlement_is_fine() {
    let cfg = build(&[("PORT", "8080"), ("BACKEND_PUBLIC_KEY", "pem")]).unwrap();
    assert!(cfg.settlement.is_none());
    assert_eq!(cfg.backend_public_key_pem.as_deref(), Some("pem"));
}
