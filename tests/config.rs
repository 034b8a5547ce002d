use std::fs;

use assert_matches::assert_matches;

use kepler_sync::config::{Config, ConfigLoader, ConverterConfig, DEFAULT_ENDPOINT};
use kepler_sync::domain::{CampaignCode, Dataset};
use kepler_sync::error::SyncError;
use kepler_sync::script::FetchWindow;

#[test]
fn parse_config_with_overrides() {
    let json = r#"{
        "root": "/data/kepler",
        "endpoint": "http://warp10:8080",
        "converter": { "program": "/opt/stilts/stilts", "args": ["-Xmx4G"] },
        "campaigns": { "k2": { "c1": 4, "c19": 2 } }
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();
    let resolved = ConfigLoader::resolve_config(config).unwrap();

    assert_eq!(resolved.root.as_str(), "/data/kepler");
    assert_eq!(resolved.endpoint, "http://warp10:8080");
    assert_eq!(
        resolved.converter,
        ConverterConfig {
            program: "/opt/stilts/stilts".to_string(),
            args: vec!["-Xmx4G".to_string()],
        }
    );

    let k2 = resolved.registry(Dataset::K2);
    let c1: CampaignCode = "c1".parse().unwrap();
    let c19: CampaignCode = "c19".parse().unwrap();
    assert_eq!(k2.segment_count(&c1), Some(4));
    assert_eq!(k2.segment_count(&c19), Some(2));

    let kepler = resolved.registry(Dataset::Kepler);
    assert_eq!(kepler.segment_count(&"Q17".parse().unwrap()), Some(1));
}

#[test]
fn shorthand_converter() {
    let config: Config =
        serde_json::from_str(r#"{ "root": "/tmp/k", "converter": "stilts.sh" }"#).unwrap();
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.converter.program, "stilts.sh");
    assert!(resolved.converter.args.is_empty());
    assert_eq!(resolved.endpoint, DEFAULT_ENDPOINT);
}

#[test]
fn invalid_campaign_override_is_rejected() {
    let config: Config =
        serde_json::from_str(r#"{ "root": "/tmp/k", "campaigns": { "k2": { "../c1": 1 } } }"#)
            .unwrap();
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(SyncError::InvalidCampaign(_))
    );
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(Some(path.to_str().unwrap())),
        Err(SyncError::MissingConfig(_))
    );
}

#[test]
fn malformed_file_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("kepler-sync.json");
    fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(Some(path.to_str().unwrap())),
        Err(SyncError::ConfigParse(_))
    );
}

#[test]
fn fetch_window_from_config() {
    let config: Config = serde_json::from_str(
        r#"{ "root": "/tmp/k", "window": { "end": 1500000000000000, "span": 86400000000 } }"#,
    )
    .unwrap();
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(
        resolved.window,
        FetchWindow {
            end: Some(1_500_000_000_000_000),
            span: 86_400_000_000,
        }
    );

    let partial: Config =
        serde_json::from_str(r#"{ "root": "/tmp/k", "window": { "span": -5 } }"#).unwrap();
    let resolved = ConfigLoader::resolve_config(partial).unwrap();
    assert_eq!(resolved.window, FetchWindow { end: None, span: -5 });

    let absent = ConfigLoader::resolve_config(Config {
        root: Some("/tmp/k".to_string()),
        ..Config::default()
    })
    .unwrap();
    assert_eq!(absent.window, FetchWindow::default());
}
