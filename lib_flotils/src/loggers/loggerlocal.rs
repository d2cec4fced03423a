use std::path::{Path, PathBuf};

use chrono::Local;
use glob::glob;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use super::logable::{LogSink, Logable, Logger};
use crate::utils::Printable;

#[derive(Debug, Error)]
/// # Logger Error
///
/// Failures while building the process-wide log sink.
pub enum LoggerError {
    /// The level directive could not be parsed by `EnvFilter`.
    #[error("Invalid log filter '{directive}': {message}")]
    Filter { directive: String, message: String },

    /// The log directory could not be created.
    #[error("I/O error while preparing log directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
/// # Logger Local Options
///
/// Controls where and how records of the process-wide sink are written.
/// Deserializable, so it can live in a settings file under a `logging` key.
pub struct LoggerLocalOptions {
    /// `EnvFilter` directive, e.g. `"info"` or `"lib_flotils=debug,warn"`.
    pub level: String,
    /// Print records to the terminal (stderr).
    pub use_tty: bool,
    /// Write records to `<log_dir>/<app>-<timestamp>.log`.
    pub use_file: bool,
    /// Write file records as JSON lines instead of plain text.
    pub json_file: bool,
    /// Directory for log files. If `None`, the current directory is used.
    pub log_dir: Option<PathBuf>,
    /// How many log files of this application to keep, including the new one.
    pub keep_files: usize,
}

impl Default for LoggerLocalOptions {
    /// Terminal output at info level, no file output, keep one log file.
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            use_tty: true,
            use_file: false,
            json_file: false,
            log_dir: None,
            keep_files: 1,
        }
    }
}

/// # Logger Local
///
/// Owner of the process-wide [`LogSink`]. Build it once at startup, hand
/// [`sink`](LoggerLocal::sink) clones to every component and keep the
/// `LoggerLocal` alive until shutdown: dropping it flushes the file writer.
pub struct LoggerLocal {
    /// The name of the application, used for log file names.
    app_name: String,
    /// Configuration options determining logging behavior.
    options: LoggerLocalOptions,
    /// The sink all components log into.
    sink: LogSink,
    /// The path to the currently active log file, if file logging is enabled.
    current_log_file: Option<PathBuf>,
    /// Keeps the non-blocking file writer running.
    _guard: Option<WorkerGuard>,
}

impl LoggerLocal {
    /// Deletes old log files of `app_name` in `log_dir` so that, together with
    /// the file about to be created, at most `keep` files remain.
    ///
    /// File names carry a sortable timestamp, so the newest files sort last.
    fn rotate_logs(app_name: &str, log_dir: &Path, keep: usize) {
        let pattern = format!("{}/{}-*.log", log_dir.display(), app_name);
        let mut log_files: Vec<PathBuf> = match glob(&pattern) {
            Ok(paths) => paths.filter_map(Result::ok).collect(),
            Err(e) => {
                eprintln!("Invalid log rotation pattern {}: {}", pattern, e);
                return;
            }
        };

        // Newest first
        log_files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

        let survivors = keep.max(1) - 1;
        for old_file in log_files.iter().skip(survivors) {
            if let Err(e) = std::fs::remove_file(old_file) {
                eprintln!("Error deleting old log file {}: {}", old_file.display(), e);
            }
        }
    }

    /// Creates the logger and its sink.
    ///
    /// If file logging is enabled, the log directory is created, old logs are
    /// rotated and a new timestamped log file is opened.
    ///
    /// # Arguments
    /// * `app_name` - The name of the application, prefix of the log file names.
    /// * `options` - Optional `LoggerLocalOptions`; defaults to terminal output only.
    pub fn new(app_name: impl Into<String>, options: Option<LoggerLocalOptions>) -> Result<Self, LoggerError> {
        let app_name = app_name.into();
        let options = options.unwrap_or_default();

        let filter = EnvFilter::try_new(&options.level).map_err(|e| LoggerError::Filter {
            directive: options.level.clone(),
            message: e.to_string(),
        })?;

        let tty_layer = options
            .use_tty
            .then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

        let mut current_log_file = None;
        let mut guard = None;
        let mut text_file_layer = None;
        let mut json_file_layer = None;

        if options.use_file {
            let log_dir = options.log_dir.clone().unwrap_or_else(|| PathBuf::from("."));
            std::fs::create_dir_all(&log_dir).map_err(|source| LoggerError::Io {
                path: log_dir.clone(),
                source,
            })?;

            LoggerLocal::rotate_logs(&app_name, &log_dir, options.keep_files);

            let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
            let file_name = format!("{}-{}.log", app_name, timestamp);
            let appender = tracing_appender::rolling::never(&log_dir, &file_name);
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);

            if options.json_file {
                json_file_layer = Some(fmt::layer().json().with_writer(writer));
            } else {
                text_file_layer = Some(fmt::layer().with_ansi(false).with_writer(writer));
            }
            current_log_file = Some(log_dir.join(file_name));
            guard = Some(worker_guard);
        }

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(tty_layer)
            .with(text_file_layer)
            .with(json_file_layer);

        let logger_local = Self {
            app_name,
            options,
            sink: LogSink::new(Dispatch::new(subscriber)),
            current_log_file,
            _guard: guard,
        };
        logger_local
            .logger()
            .debug(&format!("Logging initialized: {}", Printable(&logger_local.options)));
        Ok(logger_local)
    }

    /// A handle to the sink; clone freely.
    pub fn sink(&self) -> LogSink {
        self.sink.clone()
    }

    /// A logger named after the application, feeding this sink.
    pub fn logger(&self) -> Logable {
        Logable::new(self.app_name.clone(), self.sink())
    }

    /// The name of the application.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// The options this logger was built with.
    pub fn options(&self) -> &LoggerLocalOptions {
        &self.options
    }

    /// The log file currently written to, if file logging is enabled.
    pub fn current_log_file(&self) -> Option<&Path> {
        self.current_log_file.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn file_options(dir: &Path) -> LoggerLocalOptions {
        LoggerLocalOptions {
            level: "debug".to_string(),
            use_tty: false,
            use_file: true,
            log_dir: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn writes_records_to_log_file() {
        let temp_dir = tempdir().expect("Failed to create temporary directory");
        let logger_local = LoggerLocal::new("test_app", Some(file_options(temp_dir.path()))).unwrap();
        let log_file = logger_local.current_log_file().unwrap().to_path_buf();

        let logger = Logable::with_id("Worker", Some("1"), logger_local.sink());
        logger.info("This is an info message");
        logger.debug("This is a debug message");

        // Dropping flushes the non-blocking writer.
        drop(logger);
        drop(logger_local);

        let contents = fs::read_to_string(&log_file).expect("Failed to read log file");
        assert!(contents.contains("This is an info message"));
        assert!(contents.contains("This is a debug message"));
        assert!(contents.contains("Worker.1"));
        assert!(contents.contains("Logging initialized: <LoggerLocalOptions>("));
        assert!(contents.contains("level=debug"));
    }

    #[test]
    fn json_file_records_are_json_lines() {
        let temp_dir = tempdir().unwrap();
        let options = LoggerLocalOptions { json_file: true, ..file_options(temp_dir.path()) };
        let logger_local = LoggerLocal::new("json_app", Some(options)).unwrap();
        let log_file = logger_local.current_log_file().unwrap().to_path_buf();

        logger_local.logger().warning("disk almost full");
        drop(logger_local);

        let contents = fs::read_to_string(&log_file).unwrap();
        let line = contents
            .lines()
            .find(|line| line.contains("disk almost full"))
            .expect("Expected the warning record");
        let record: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(record["level"], "WARN");
        assert_eq!(record["fields"]["message"], "disk almost full");
        assert_eq!(record["fields"]["logger"], "json_app");
    }

    #[test]
    fn rotation_keeps_newest_files() {
        let temp_dir = tempdir().unwrap();
        for stamp in ["20200101_000000", "20210101_000000", "20220101_000000"] {
            fs::write(temp_dir.path().join(format!("rot_app-{}.log", stamp)), "old").unwrap();
        }
        fs::write(temp_dir.path().join("other_app-20200101_000000.log"), "keep").unwrap();

        let options = LoggerLocalOptions { keep_files: 2, ..file_options(temp_dir.path()) };
        let logger_local = LoggerLocal::new("rot_app", Some(options)).unwrap();
        logger_local.logger().info("fresh");
        drop(logger_local);

        let mut remaining: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("rot_app-"))
            .collect();
        remaining.sort();

        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0], "rot_app-20220101_000000.log");
        assert!(temp_dir.path().join("other_app-20200101_000000.log").exists());
    }

    #[test]
    fn invalid_filter_is_rejected() {
        let options = LoggerLocalOptions { level: "lib_flotils=loud".to_string(), ..Default::default() };
        let result = LoggerLocal::new("bad_app", Some(options));
        assert!(matches!(result, Err(LoggerError::Filter { .. })));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: LoggerLocalOptions = serde_json::from_str(r#"{"level": "warn", "use_file": true}"#).unwrap();
        assert_eq!(options.level, "warn");
        assert!(options.use_file);
        assert!(options.use_tty);
        assert_eq!(options.keep_files, 1);
    }
}
