use std::fs;
use std::path::Path;

use courier_config::{ConfigError, UploadConfig, load_from_path, prepare_layout};
use courier_test_support::fixtures::TempLayout;
use serde_json::json;

fn write_config(dir: &Path, value: &serde_json::Value) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.join("config.json");
    fs::write(&path, serde_json::to_vec_pretty(value)?)?;
    Ok(path)
}

#[test]
fn loads_and_prepares_a_complete_document() -> anyhow::Result<()> {
    let layout = TempLayout::new()?;
    let path = write_config(
        layout.root(),
        &json!({
            "unprocessed_dir": layout.unprocessed(),
            "done_dir": layout.done(),
            "error_dir": layout.error(),
            "snapshot_path": layout.root().join("persist.json"),
            "quiet_period_secs": 3,
            "date_subdirs": false,
            "postgres": {
                "user": "courier",
                "password": "secret",
                "host": "db.internal",
                "port": 6543,
                "database": "greenhouse"
            },
            "upload": {
                "backend": "http",
                "endpoint": "https://upload.example/api",
                "token": "abc"
            },
            "remote_log": { "log_group": "greenhouse", "stream_name": "scanner-1" },
            "logging": { "level": "debug", "format": "json" }
        }),
    )?;

    let config = load_from_path(&path)?;
    assert_eq!(config.quiet_period_secs, 3);
    assert!(!config.date_subdirs);
    assert_eq!(config.postgres.port, 6543);
    assert!(matches!(config.upload, UploadConfig::Http { .. }));
    assert_eq!(
        config.remote_log.as_ref().map(|remote| remote.send_interval),
        Some(10)
    );

    let prepared = prepare_layout(&config.layout())?;
    assert_eq!(prepared.unprocessed, fs::canonicalize(layout.unprocessed())?);
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let result = load_from_path(Path::new("/nonexistent/courier/config.json"));
    assert!(matches!(
        result,
        Err(ConfigError::Io {
            operation: "read",
            ..
        })
    ));
}

#[test]
fn unrecognized_options_fail_to_parse() -> anyhow::Result<()> {
    let layout = TempLayout::new()?;
    let path = write_config(
        layout.root(),
        &json!({
            "unprocessed_dir": layout.unprocessed(),
            "done_dir": layout.done(),
            "error_dir": layout.error(),
            "cloudwatch": {},
            "postgres": { "user": "u", "password": "p", "host": "h", "database": "d" },
            "upload": { "backend": "directory", "root": layout.root().join("box") }
        }),
    )?;
    assert!(matches!(
        load_from_path(&path),
        Err(ConfigError::Parse { .. })
    ));
    Ok(())
}

#[test]
fn shared_roots_fail_validation() -> anyhow::Result<()> {
    let layout = TempLayout::new()?;
    let path = write_config(
        layout.root(),
        &json!({
            "unprocessed_dir": layout.unprocessed(),
            "done_dir": layout.unprocessed(),
            "error_dir": layout.error(),
            "postgres": { "user": "u", "password": "p", "host": "h", "database": "d" },
            "upload": { "backend": "directory", "root": layout.root().join("box") }
        }),
    )?;
    assert!(matches!(
        load_from_path(&path),
        Err(ConfigError::DuplicateDirectory { .. })
    ));
    Ok(())
}
