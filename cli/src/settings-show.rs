//! # `settings-show`: Effective Settings Viewer
//!
//! Builds the effective configuration exactly like a component would: the
//! settings file is loaded, then every `--set` override is laid over it. The
//! result is printed as readable JSON.
//!
//! ## Usage
//!
//! ```bash
//! settings-show --settings conf/app.yaml --path-prefix /srv/app \
//!     --set id=\"worker-1\" --set retries=5 --set since=@date:2024-01-01
//! ```
//!
//! Override values are parsed as JSON when possible and taken as strings
//! otherwise, so tagged values like `@duration:PT90S` work unquoted.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use lib_flotils::loadable::{
    KEY_PATH_PREFIX, KEY_SETTINGS_FILE, Loadable, SettingValue, Settings, load_json, save_json,
};
use lib_flotils::loggers::{LoggerLocal, LoggerLocalOptions};

/// # Command Line Arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Prints the effective settings of a settings file plus overrides")]
struct Args {
    /// Settings file, resolved against `--path-prefix` when relative.
    #[arg(short, long)]
    settings: PathBuf,

    /// Override as KEY=VALUE; repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
    overrides: Vec<(String, SettingValue)>,

    /// Directory relative paths are resolved against.
    #[arg(long)]
    path_prefix: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `lib_flotils=debug,warn`.
    #[arg(long, env = "FLOTILS_LOG", default_value = "warn")]
    log_level: String,
}

/// Splits `KEY=VALUE`. The value is read as JSON, falling back to a string.
fn parse_override(raw: &str) -> Result<(String, SettingValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let parsed = match load_json::<SettingValue>(value) {
        Ok(parsed) => parsed,
        Err(_) => serde_json::from_value(serde_json::Value::String(value.to_string()))
            .map_err(|e| format!("invalid value for '{}': {}", key, e))?,
    };
    Ok((key.to_string(), parsed))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let logger_local = LoggerLocal::new(
        "settings-show",
        Some(LoggerLocalOptions { level: args.log_level.clone(), ..Default::default() }),
    )?;

    let mut settings: Settings = args.overrides.into_iter().collect();
    settings.insert(
        KEY_SETTINGS_FILE.to_string(),
        args.settings.to_string_lossy().into_owned().into(),
    );
    if let Some(prefix) = &args.path_prefix {
        settings.insert(KEY_PATH_PREFIX.to_string(), prefix.to_string_lossy().into_owned().into());
    }

    let loadable = Loadable::new("settings-show", settings, logger_local.sink())?;

    eprintln!("{} {}", "Effective settings of".cyan(), args.settings.display());
    println!("{}", save_json(loadable.settings(), true)?);
    Ok(())
}
