//! # lib_flotils
//!
//! Small building blocks shared by long running tools:
//!
//! - **`loggers`**: named loggers routed into an injected sink, plus the
//!   process-wide console/file sink.
//! - **`loadable`**: JSON/YAML settings files with lossless dates, times,
//!   datetimes and durations.
//! - **`runable`**: start/stop lifecycles and a signal-bound stop.
//! - **`utils`**: path and formatting helpers.
//!
//! Each module sits behind a cargo feature of the same name.

// Declare the modules to re-export
#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "loadable")]
pub mod loadable;
#[cfg(feature = "runable")]
pub mod runable;
#[cfg(feature = "utils")]
pub mod utils;

// Re-export the everyday types
#[cfg(feature = "loggers")]
pub use loggers::{LogLevel, LogSink, Logable, Logger, LoggerLocal, LoggerLocalOptions};
#[cfg(feature = "loadable")]
pub use loadable::{Loadable, SettingValue, Settings, SettingsError, SettingsLoader, Temporal};
#[cfg(feature = "runable")]
pub use runable::{LifecycleError, LifecycleState, Service, SignalStopWrapper, StartStopable, Startable, Stopable};
#[cfg(feature = "utils")]
pub use utils::Printable;
