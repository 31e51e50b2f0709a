//! File-backed configuration resolution.

use ak_config::{
    collect_issues, load_config_with, ConfigError, ConfigSnapshot, ConfigSource, HexConfig,
    KernelConfig,
};
use proptest::prelude::*;
use std::collections::HashMap;
use std::fs;

fn env(pairs: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn cli_path_wins_and_overrides_apply() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kernel.toml");
    fs::write(
        &path,
        "max_workers = 2\nshard_size = 512\n\n[hex]\nhalf_life_ticks = 3.0\n",
    )
    .unwrap();

    let lookup = env(&[("AK_DETECTION_TIMEOUT_MS", "750".to_string())]);
    let resolved = load_config_with(Some(path.as_path()), &lookup).unwrap();

    assert_eq!(resolved.source, ConfigSource::CliArgument);
    assert_eq!(resolved.config.max_workers, 2);
    assert_eq!(resolved.config.shard_size, 512);
    assert_eq!(resolved.config.detection_timeout_ms, 750);
    assert_eq!(resolved.config.hex.half_life_ticks, 3.0);
    assert_eq!(resolved.overrides, vec!["AK_DETECTION_TIMEOUT_MS=750"]);

    let snapshot = ConfigSnapshot::new(&resolved);
    assert_eq!(snapshot.file_hash.as_ref().map(|h| h.len()), Some(64));
    assert_eq!(snapshot.summary.shard_size, 512);
}

#[test]
fn env_path_used_without_cli_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.json");
    fs::write(&path, r#"{"detection_timeout_ms": 100}"#).unwrap();

    let lookup = env(&[("AK_CONFIG", path.display().to_string())]);
    let resolved = load_config_with(None, &lookup).unwrap();
    assert_eq!(resolved.source, ConfigSource::Environment);
    assert_eq!(resolved.config.detection_timeout_ms, 100);
}

#[test]
fn invalid_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kernel.toml");
    fs::write(&path, "[hex]\nyellow_threshold = 2.8\nred_threshold = 2.0\n").unwrap();

    let err = load_config_with(Some(path.as_path()), &env(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));

    fs::write(&path, "shard_size = \"many\"").unwrap();
    let err = load_config_with(Some(path.as_path()), &env(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

proptest! {
    #[test]
    fn in_range_configs_validate(
        workers in 1usize..=256,
        shard in 1usize..100_000,
        timeout in 1u64..1_000_000,
        radius in 0.01f64..1000.0,
        half_life in 0.01f64..1000.0,
        yellow in 1.01f64..2.0,
        gap in 0.01f64..1.0,
    ) {
        let cfg = KernelConfig {
            max_workers: workers,
            shard_size: shard,
            detection_timeout_ms: timeout,
            hex: HexConfig {
                default_radius: radius,
                half_life_ticks: half_life,
                plane_extent: 100.0,
                yellow_threshold: yellow,
                red_threshold: (yellow + gap).min(3.0),
            },
            ..KernelConfig::default()
        };
        prop_assert!(collect_issues(&cfg).is_empty());
    }
}
