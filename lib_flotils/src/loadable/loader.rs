//! # Loadable
//!
//! The settings capability ([`SettingsLoader`]) and the plain owner of an
//! effective configuration ([`Loadable`]).
//!
//! A `Loadable` is built from caller settings. If they name a `settings_file`,
//! that file is loaded first and the caller values are laid over it.

use std::path::{Path, PathBuf};

use crate::loggers::{LogSink, Logable, Logger};
use crate::utils::{self, short_type_name};

use super::error::SettingsError;
use super::store;
use super::value::{SettingValue, Settings};

/// Settings key naming the file to load.
pub const KEY_SETTINGS_FILE: &str = "settings_file";
/// Settings key naming the directory relative paths are resolved against.
pub const KEY_PATH_PREFIX: &str = "path_prefix";
/// Settings key naming the instance, appended to the logger name.
pub const KEY_ID: &str = "id";

/// # Settings Loader
///
/// Capability of reading and writing settings files relative to a path
/// prefix. Every operation logs its failure through the implementor's
/// [`Logger`] before returning it.
pub trait SettingsLoader: Logger {
    /// Directory relative paths are resolved against.
    fn path_prefix(&self) -> Option<&Path>;

    /// Resolves `path` against [`path_prefix`](SettingsLoader::path_prefix).
    fn join_path_prefix(&self, path: &Path) -> PathBuf {
        utils::join_path_prefix(path, self.path_prefix())
    }

    /// Loads any settings tree.
    fn load_file(&self, path: &Path) -> Result<SettingValue, SettingsError> {
        let path = self.join_path_prefix(path);
        let result = self.sink().scope(|| store::load_file(&path));
        if let Err(e) = &result {
            self.exception("Failed to load settings", e);
        }
        result
    }

    /// Loads a settings mapping.
    fn load_settings(&self, path: &Path) -> Result<Settings, SettingsError> {
        let path = self.join_path_prefix(path);
        let result = self.sink().scope(|| store::load_settings(&path));
        if let Err(e) = &result {
            self.exception("Failed to load settings", e);
        }
        result
    }

    /// Saves any settings tree.
    fn save_file(&self, path: &Path, value: &SettingValue, readable: bool) -> Result<(), SettingsError> {
        let path = self.join_path_prefix(path);
        let result = store::save_file(&path, value, readable);
        if let Err(e) = &result {
            self.exception("Failed to save settings", e);
        }
        result
    }

    /// Saves a settings mapping.
    fn save_settings(&self, path: &Path, settings: &Settings, readable: bool) -> Result<(), SettingsError> {
        let path = self.join_path_prefix(path);
        let result = store::save_settings(&path, settings, readable);
        if let Err(e) = &result {
            self.exception("Failed to save settings", e);
        }
        result
    }
}

fn id_of(settings: &Settings) -> Option<String> {
    match settings.get(KEY_ID)? {
        SettingValue::String(id) => Some(id.clone()),
        SettingValue::Int(id) => Some(id.to_string()),
        SettingValue::UInt(id) => Some(id.to_string()),
        _ => None,
    }
}

fn prefix_of(settings: &Settings) -> Option<PathBuf> {
    settings.get(KEY_PATH_PREFIX)?.as_str().map(PathBuf::from)
}

/// # Loadable
///
/// An effective configuration together with the logger and path prefix it
/// was built with. Embed it to give a type the [`SettingsLoader`] capability.
#[derive(Debug, Clone)]
pub struct Loadable {
    logable: Logable,
    settings: Settings,
    path_prefix: Option<PathBuf>,
}

impl Loadable {
    /// Builds the effective configuration for an instance of `type_name`.
    ///
    /// - `path_prefix` is taken from `settings`.
    /// - If `settings_file` is set it is resolved against that prefix and
    ///   loaded. A `path_prefix` inside the file replaces the caller's
    ///   (joined onto it when relative).
    /// - Caller settings then overwrite file settings key by key.
    /// - The logger is named `<type_name>.<id>` from the effective settings.
    pub fn new(type_name: &str, settings: Settings, sink: LogSink) -> Result<Self, SettingsError> {
        let mut path_prefix = prefix_of(&settings);
        let mut logable = Logable::with_id(type_name, id_of(&settings).as_deref(), sink.clone());

        let settings_file = settings
            .get(KEY_SETTINGS_FILE)
            .and_then(SettingValue::as_str)
            .map(PathBuf::from);

        let effective = match settings_file {
            None => settings,
            Some(file) => {
                let path = utils::join_path_prefix(&file, path_prefix.as_deref());
                let loaded = sink.scope(|| store::load_settings(&path)).inspect_err(|e| {
                    logable.exception("Failed to load settings", e);
                })?;

                if let Some(file_prefix) = prefix_of(&loaded) {
                    path_prefix = Some(utils::join_path_prefix(&file_prefix, path_prefix.as_deref()));
                }
                let mut merged = store::merge_settings(loaded, &settings);
                if let Some(prefix) = &path_prefix {
                    merged.insert(KEY_PATH_PREFIX.to_string(), prefix.to_string_lossy().into_owned().into());
                }

                logable = Logable::with_id(type_name, id_of(&merged).as_deref(), sink);
                logable.debug(&format!("Loaded settings from {}", path.display()));
                merged
            }
        };

        Ok(Self { logable, settings: effective, path_prefix })
    }

    /// Same as [`new`](Loadable::new), named after the type `T`.
    pub fn for_type<T: ?Sized>(settings: Settings, sink: LogSink) -> Result<Self, SettingsError> {
        Self::new(short_type_name::<T>(), settings, sink)
    }

    /// The effective configuration.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Consumes `self`, returning the effective configuration.
    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// A single value of the effective configuration.
    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.settings.get(key)
    }

    /// The logger, for embedding types that also want to log.
    pub fn logable(&self) -> &Logable {
        &self.logable
    }
}

impl Logger for Loadable {
    fn name(&self) -> &str {
        self.logable.name()
    }

    fn sink(&self) -> &LogSink {
        self.logable.sink()
    }
}

impl SettingsLoader for Loadable {
    fn path_prefix(&self) -> Option<&Path> {
        self.path_prefix.as_deref()
    }
}
