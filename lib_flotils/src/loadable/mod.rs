//! # Loadable Module
//!
//! JSON/YAML settings persistence. Settings trees are held as
//! [`SettingValue`]s, which carry dates, times, datetimes and durations as
//! first class values and store them as tagged strings on disk.
//!
//! ## Contained Modules:
//!
//! - **`temporal`**: The tagged encoding of temporal values, including the
//!   legacy object forms older files still contain.
//! - **`value`**: The dynamic value model and its serde implementations.
//! - **`format`**: JSON/YAML selection by extension and string level helpers.
//! - **`store`**: Loading, saving and shallow merging of settings files.
//! - **`loader`**: The `SettingsLoader` capability and `Loadable`, the owner
//!   of an effective configuration built from caller values and a file.
//! - **`error`**: `SettingsError`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Settings file errors.
pub mod error;
/// JSON/YAML formats.
pub mod format;
/// `SettingsLoader` and `Loadable`.
pub mod loader;
/// File level load/save/merge.
pub mod store;
/// Tagged temporal values.
pub mod temporal;
/// Dynamic settings values.
pub mod value;

pub use error::SettingsError;
pub use format::{load_json, load_yaml, save_json, save_yaml, Format};
pub use loader::{Loadable, SettingsLoader, KEY_ID, KEY_PATH_PREFIX, KEY_SETTINGS_FILE};
pub use store::{load_file, load_file_as, load_settings, merge_settings, save_file, save_file_as, save_settings};
pub use temporal::{decode_legacy, Temporal, TemporalError};
pub use value::{SettingValue, Settings};
