//! # Settings Formats
//!
//! JSON and YAML (de)serialization, selected by file extension.
//!
//! The string level helpers ([`load_json`], [`save_json`], [`load_yaml`],
//! [`save_yaml`]) work on any serde type. Temporal values are only restored
//! when the target type contains [`SettingValue`](super::value::SettingValue)s.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::SettingsError;

/// # Format
///
/// A supported settings file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// `.json`
    Json,
    /// `.yml` / `.yaml`
    Yaml,
}

impl Format {
    /// Picks the format from the file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self, SettingsError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
            .ok_or_else(|| SettingsError::UnsupportedFormat { path: path.to_path_buf() })
    }

    /// Parses `text` into `T`. `path` is only used for error reporting.
    pub fn parse<T: DeserializeOwned>(self, text: &str, path: &Path) -> Result<T, SettingsError> {
        let parsed = match self {
            Format::Json => load_json(text).map_err(|e| e.to_string()),
            Format::Yaml => load_yaml(text).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| SettingsError::Parse { path: path.to_path_buf(), message })
    }

    /// Renders `value`. `readable` selects indented JSON; YAML is always block style.
    pub fn render<T: Serialize + ?Sized>(self, value: &T, readable: bool, path: &Path) -> Result<String, SettingsError> {
        let rendered = match self {
            Format::Json => save_json(value, readable).map_err(|e| e.to_string()),
            Format::Yaml => save_yaml(value).map_err(|e| e.to_string()),
        };
        rendered.map_err(|message| SettingsError::Encode { path: path.to_path_buf(), message })
    }
}

/// Parses a JSON document.
pub fn load_json<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(text)
}

/// Renders JSON, compact or indented with four spaces when `pretty`.
pub fn save_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String, serde_json::Error> {
    if !pretty {
        return serde_json::to_string(value);
    }
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    // serde_json only ever writes valid UTF-8
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Parses a YAML document.
pub fn load_yaml<T: DeserializeOwned>(text: &str) -> Result<T, serde_yml::Error> {
    serde_yml::from_str(text)
}

/// Renders block style YAML.
pub fn save_yaml<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_yml::Error> {
    serde_yml::to_string(value)
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => f.write_str("json"),
            Format::Yaml => f.write_str("yaml"),
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yml" | "yaml" => Ok(Format::Yaml),
            other => Err(format!("unknown settings format '{}'", other)),
        }
    }
}
