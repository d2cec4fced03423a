//! # Settings Store
//!
//! Reading and writing settings files. The format is picked from the file
//! extension unless given explicitly. Temporal values survive the round trip
//! as long as the data goes through [`Settings`] / [`SettingValue`].

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::SettingsError;
use super::format::Format;
use super::value::{SettingValue, Settings};

/// Reads the whole file as UTF-8 text.
fn read_text(path: &Path) -> Result<String, SettingsError> {
    if !path.is_file() {
        return Err(SettingsError::NotFound { path: path.to_path_buf() });
    }
    let bytes = fs::read(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|e| SettingsError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Loads any deserializable type from `path` in the given format.
pub fn load_file_as<T: DeserializeOwned>(path: &Path, format: Format) -> Result<T, SettingsError> {
    let text = read_text(path)?;
    format.parse(&text, path)
}

/// Loads a settings tree from `path`, format by extension.
pub fn load_file(path: &Path) -> Result<SettingValue, SettingsError> {
    let format = Format::from_path(path)?;
    load_file_as(path, format)
}

/// Loads a settings mapping from `path`, format by extension.
///
/// Fails with [`SettingsError::NotAMapping`] if the document is anything else,
/// including an empty YAML document.
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    match load_file(path)? {
        SettingValue::Map(settings) => Ok(settings),
        _ => Err(SettingsError::NotAMapping { path: path.to_path_buf() }),
    }
}

/// Saves any serializable value to `path` in the given format.
///
/// Missing parent directories are created.
pub fn save_file_as<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    format: Format,
    readable: bool,
) -> Result<(), SettingsError> {
    let text = format.render(value, readable, path)?;
    let write_error = |source: std::io::Error| SettingsError::Write { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, text).map_err(write_error)
}

/// Saves a settings tree to `path`, format by extension.
pub fn save_file(path: &Path, value: &SettingValue, readable: bool) -> Result<(), SettingsError> {
    let format = Format::from_path(path)?;
    save_file_as(path, value, format, readable)
}

/// Saves a settings mapping to `path`, format by extension.
pub fn save_settings(path: &Path, settings: &Settings, readable: bool) -> Result<(), SettingsError> {
    let format = Format::from_path(path)?;
    save_file_as(path, settings, format, readable)
}

/// Overlays `overrides` onto `file` key by key. Values of `overrides` win;
/// nested mappings are replaced, not merged.
pub fn merge_settings(mut file: Settings, overrides: &Settings) -> Settings {
    for (key, value) in overrides {
        file.insert(key.clone(), value.clone());
    }
    file
}
