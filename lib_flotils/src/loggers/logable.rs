//! # Named Loggers
//!
//! Every component of this crate logs through a [`Logger`]: a name plus an
//! injected [`LogSink`]. The name identifies the emitting instance
//! (`Worker.42`), the sink decides where records end up. No logger ever looks
//! up global state on its own; the process-wide sink is built once by
//! [`LoggerLocal`](super::loggerlocal::LoggerLocal) and handed down.

use std::error::Error as StdError;
use std::fmt;

use tracing::Dispatch;

use crate::utils::short_type_name;

/// # Log Level
///
/// Severity of a record emitted through a [`Logger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Detailed internal information.
    Debug,
    /// Normal progress, e.g. a lifecycle transition.
    Info,
    /// Something unexpected that does not stop the caller.
    Warning,
    /// An operation failed.
    Error,
    /// The program cannot go on. `tracing` has no such level, so these are
    /// emitted as errors carrying `critical = true`.
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// # Log Sink
///
/// Destination for log records, wrapping a `tracing` dispatcher.
///
/// Cloning is cheap; all clones feed the same subscriber.
#[derive(Clone)]
pub struct LogSink {
    dispatch: Dispatch,
}

impl LogSink {
    /// Wraps an existing dispatcher.
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// The dispatcher that is currently the default for this thread.
    pub fn current() -> Self {
        tracing::dispatcher::get_default(|dispatch| Self::new(dispatch.clone()))
    }

    /// A sink that drops every record.
    pub fn none() -> Self {
        Self::new(Dispatch::none())
    }

    /// The wrapped dispatcher.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Runs `f` with this sink as the thread's default dispatcher, so that
    /// plain `tracing` macros inside `f` end up here as well.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Emits a single record tagged with the logger name.
    pub fn emit(&self, level: LogLevel, logger: &str, message: &str) {
        self.scope(|| match level {
            LogLevel::Debug => tracing::debug!(logger, "{}", message),
            LogLevel::Info => tracing::info!(logger, "{}", message),
            LogLevel::Warning => tracing::warn!(logger, "{}", message),
            LogLevel::Error => tracing::error!(logger, "{}", message),
            LogLevel::Critical => tracing::error!(logger, critical = true, "{}", message),
        });
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

/// # Logger
///
/// Capability of emitting named, leveled records.
///
/// Implementors only provide [`name`](Logger::name) and [`sink`](Logger::sink);
/// the level helpers come for free. Types embedding a [`Logable`] usually
/// delegate both methods to it.
pub trait Logger {
    /// Name records are tagged with.
    fn name(&self) -> &str;

    /// Sink records are routed to.
    fn sink(&self) -> &LogSink;

    /// Emits `message` at `level`.
    fn log(&self, level: LogLevel, message: &str) {
        self.sink().emit(level, self.name(), message);
    }

    /// Emits at debug level.
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Emits at info level.
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Emits at warning level.
    fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    /// Emits at error level.
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Emits at critical level.
    fn critical(&self, message: &str) {
        self.log(LogLevel::Critical, message);
    }

    /// Same as [`critical`](Logger::critical).
    fn fatal(&self, message: &str) {
        self.critical(message);
    }

    /// Emits at error level, appending the error and its whole `source()` chain.
    fn exception(&self, message: &str, error: &(dyn StdError + 'static)) {
        let mut text = format!("{}: {}", message, error);
        let mut source = error.source();
        while let Some(cause) = source {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        self.log(LogLevel::Error, &text);
    }
}

/// # Logable
///
/// The plain [`Logger`] implementation: a name bound to a sink.
#[derive(Debug, Clone)]
pub struct Logable {
    name: String,
    sink: LogSink,
}

impl Logable {
    /// Creates a logger with an explicit name.
    pub fn new(name: impl Into<String>, sink: LogSink) -> Self {
        Self { name: name.into(), sink }
    }

    /// Creates a logger named `base`, or `base.id` when an instance id is set.
    pub fn with_id(base: &str, id: Option<&str>, sink: LogSink) -> Self {
        match id {
            Some(id) if !id.is_empty() => Self::new(format!("{}.{}", base, id), sink),
            _ => Self::new(base, sink),
        }
    }

    /// Creates a logger named after the type `T`.
    pub fn for_type<T: ?Sized>(id: Option<&str>, sink: LogSink) -> Self {
        Self::with_id(short_type_name::<T>(), id, sink)
    }

    /// Creates a module level logger; pass `module_path!()`.
    pub fn for_module(module_path: &str, sink: LogSink) -> Self {
        Self::new(module_path, sink)
    }
}

impl Logger for Logable {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink(&self) -> &LogSink {
        &self.sink
    }
}
