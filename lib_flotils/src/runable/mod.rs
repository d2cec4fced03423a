//! # Runable Module
//!
//! Start/stop lifecycles for long running components.
//!
//! ## Contained Modules:
//!
//! - **`lifecycle`**: The `Startable` and `Stopable` capabilities, the
//!   `Service` hooks and `StartStopable`, an atomic Stopped/Running state
//!   machine with a stop token for blocking waits.
//! - **`signals`**: `SignalStopWrapper`, which maps SIGINT/SIGTERM onto a
//!   single `stop()`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Lifecycle state machine and capabilities.
pub mod lifecycle;
/// Signal-bound stop.
pub mod signals;

pub use lifecycle::{
    HookError, LifecycleError, LifecycleState, RunableOptions, Service, StartStopable, Startable, Stopable,
    KEY_START_BLOCKING_TIMEOUT, KEY_STRICT_LIFECYCLE,
};
pub use signals::{SignalStopWrapper, StopSignal};
