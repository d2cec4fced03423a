//! # Settings Round Trip Test
//!
//! Writes settings with temporal values as JSON, converts them to YAML, builds
//! a `Loadable` on top of the YAML file with caller overrides and checks the
//! effective configuration.

use anyhow::{ensure, Context};
use chrono::{FixedOffset, NaiveDate, TimeDelta, TimeZone};
use lib_flotils::loadable::{
    load_file, load_settings, save_file, save_settings, Loadable, SettingValue, Settings, SettingsLoader, Temporal,
};
use lib_flotils::loggers::{LoggerLocal, LoggerLocalOptions, Logger};
use tempfile::tempdir;

fn main() -> anyhow::Result<()> {
    let logger_local = LoggerLocal::new(
        "test_settings_roundtrip",
        Some(LoggerLocalOptions { level: "debug".to_string(), ..Default::default() }),
    )?;
    let dir = tempdir().context("Failed to create temporary directory")?;

    // // Statement: A datetime built in UTC+2 must come back as UTC
    let offset = FixedOffset::east_opt(2 * 3600).context("Invalid offset")?;
    let local = offset
        .with_ymd_and_hms(2023, 10, 17, 3, 4, 36)
        .single()
        .context("Ambiguous local time")?;
    let since = NaiveDate::from_ymd_opt(2023, 10, 17).context("Invalid date")?;

    let mut original = Settings::new();
    original.insert("id".to_string(), "nightly".into());
    original.insert("created".to_string(), Temporal::from_datetime(local).into());
    original.insert("since".to_string(), since.into());
    original.insert("interval".to_string(), TimeDelta::minutes(90).into());
    original.insert("handle".to_string(), "@ops".into());
    original.insert("a".to_string(), 1.into());
    original.insert("b".to_string(), 2.into());

    let json_path = dir.path().join("job.json");
    save_settings(&json_path, &original, true)?;
    let text = std::fs::read_to_string(&json_path)?;
    ensure!(text.contains("\"@datetime:2023-10-17T01:04:36Z\""), "UTC datetime missing:\n{}", text);
    ensure!(text.contains("\"@@ops\""), "Escaped string missing:\n{}", text);
    println!("[*] JSON written:\n{}", text);

    // // Statement: Convert to YAML through the generic tree functions
    let yaml_path = dir.path().join("job.yaml");
    save_file(&yaml_path, &load_file(&json_path)?, false)?;
    let from_yaml = load_settings(&yaml_path)?;
    ensure!(from_yaml == original, "YAML round trip changed the settings: {:?}", from_yaml);

    // // Statement: Caller overrides win over the file, shallowly
    let mut overrides = Settings::new();
    overrides.insert("settings_file".to_string(), "job.yaml".into());
    overrides.insert("path_prefix".to_string(), dir.path().to_string_lossy().into_owned().into());
    overrides.insert("b".to_string(), 3.into());
    let loadable = Loadable::new("Job", overrides, logger_local.sink())?;

    ensure!(loadable.get("a") == Some(&SettingValue::Int(1)), "File value lost");
    ensure!(loadable.get("b") == Some(&SettingValue::Int(3)), "Override did not win");
    ensure!(loadable.get("since") == Some(&since.into()), "Temporal value lost");
    ensure!(loadable.name() == "Job.nightly", "Unexpected logger name {}", loadable.name());

    let missing = loadable.load_settings(std::path::Path::new("absent.json"));
    ensure!(missing.is_err(), "Missing file did not fail");

    println!("[SUCCESS] Settings survive JSON -> YAML -> Loadable");
    Ok(())
}
