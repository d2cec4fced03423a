/// Named loggers, the `Logger` capability and the injectable `LogSink`.
pub mod logable;
/// Builds the process-wide sink with console and rotating file output.
pub mod loggerlocal;

pub use logable::{LogLevel, LogSink, Logable, Logger};
pub use loggerlocal::{LoggerError, LoggerLocal, LoggerLocalOptions};
