//! # Lifecycle Controller
//!
//! [`StartStopable`] is a thread-safe Stopped/Running state machine that runs a
//! [`Service`]'s startup and teardown hooks. State changes are atomic
//! compare-and-swap transitions, so concurrent `stop()` calls (e.g. one from a
//! signal listener, one from application code) run teardown at most once.
//!
//! Blocking operations observe a [`CancellationToken`] that is cancelled as
//! soon as a stop begins.

use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::loggers::{LogSink, Logable, Logger};
#[cfg(feature = "loadable")]
use crate::loadable::Settings;

/// Error type returned by service hooks.
pub type HookError = Box<dyn StdError + Send + Sync + 'static>;

const STOPPED: u8 = 0;
const STARTING: u8 = 1;
const RUNNING: u8 = 2;
const STOPPING: u8 = 3;
// Starting, with a stop requested that runs once startup finishes.
const STOP_PENDING: u8 = 4;

/// Settings key for [`RunableOptions::start_blocking_timeout`], in seconds.
pub const KEY_START_BLOCKING_TIMEOUT: &str = "start_blocking_timeout";
/// Settings key for [`RunableOptions::strict`].
pub const KEY_STRICT_LIFECYCLE: &str = "strict_lifecycle";

/// # Lifecycle State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Not running; `start()` is allowed.
    Stopped,
    /// Startup hook in progress.
    Starting,
    /// Running; `stop()` is allowed.
    Running,
    /// Teardown hook in progress.
    Stopping,
}

impl LifecycleState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STARTING | STOP_PENDING => LifecycleState::Starting,
            RUNNING => LifecycleState::Running,
            STOPPING => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
/// # Lifecycle Error
pub enum LifecycleError {
    /// The operation is not allowed in the current state (strict mode only).
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    /// The startup hook failed; the controller is back to stopped.
    #[error("Startup failed: {0}")]
    Start(#[source] HookError),

    /// The teardown hook failed; the controller is stopped regardless.
    #[error("Teardown failed: {0}")]
    Teardown(#[source] HookError),
}

/// Capability of being started.
pub trait Startable {
    /// Runs startup work and transitions to running.
    fn start(&self) -> Result<(), LifecycleError>;
}

/// Capability of being stopped.
pub trait Stopable {
    /// Runs teardown work and transitions to stopped.
    fn stop(&self) -> Result<(), LifecycleError>;

    /// Like [`stop`](Stopable::stop), but reports whether this call began the
    /// stop. A stop with nothing to do returns `Ok(false)` instead of failing.
    ///
    /// The default assumes every call stops.
    fn request_stop(&self) -> Result<bool, LifecycleError> {
        self.stop().map(|()| true)
    }
}

/// # Service
///
/// Caller defined work run by a [`StartStopable`] on transitions. Both hooks
/// default to doing nothing.
pub trait Service: Send + 'static {
    /// Called while starting. An error aborts the start.
    fn on_start(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// Called while stopping, after the stop token was cancelled.
    fn on_stop(&mut self) -> Result<(), HookError> {
        Ok(())
    }
}

impl Service for () {}

/// # Runable Options
#[derive(Debug, Clone, PartialEq)]
pub struct RunableOptions {
    /// Poll interval of [`StartStopable::start_blocking`].
    pub start_blocking_timeout: Duration,
    /// Reject `start()` while not stopped and `stop()` while not running with
    /// [`LifecycleError::InvalidState`] instead of ignoring them.
    pub strict: bool,
}

impl Default for RunableOptions {
    fn default() -> Self {
        Self {
            start_blocking_timeout: Duration::from_secs(1),
            strict: false,
        }
    }
}

#[cfg(feature = "loadable")]
impl RunableOptions {
    /// Reads `start_blocking_timeout` (seconds) and `strict_lifecycle` from
    /// settings. Missing or unusable values keep their defaults.
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        let start_blocking_timeout = settings
            .get(KEY_START_BLOCKING_TIMEOUT)
            .and_then(|value| value.as_f64())
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(defaults.start_blocking_timeout);
        let strict = settings
            .get(KEY_STRICT_LIFECYCLE)
            .and_then(|value| value.as_bool())
            .unwrap_or(defaults.strict);
        Self { start_blocking_timeout, strict }
    }
}

struct Inner<S> {
    logable: Logable,
    options: RunableOptions,
    state: AtomicU8,
    stop_token: Mutex<CancellationToken>,
    service: Mutex<S>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Poison only means a hook panicked, and `run_hook` reports that.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs a hook, turning a panic into a [`HookError`].
fn run_hook(hook: impl FnOnce() -> Result<(), HookError>) -> Result<(), HookError> {
    panic::catch_unwind(AssertUnwindSafe(hook)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown payload".to_string());
        Err(format!("hook panicked: {}", message).into())
    })
}

/// # Start Stopable
///
/// The lifecycle controller. Cheap to clone; clones share state, so one clone
/// can be handed to a signal listener while another drives the service.
pub struct StartStopable<S = ()> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for StartStopable<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S> fmt::Debug for StartStopable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartStopable")
            .field("name", &self.inner.logable.name())
            .field("state", &LifecycleState::from_raw(self.inner.state.load(Ordering::Acquire)))
            .finish_non_exhaustive()
    }
}

impl<S: Service> StartStopable<S> {
    /// Creates a stopped controller around `service`.
    pub fn new(service: S, options: RunableOptions, logable: Logable) -> Self {
        let stop_token = CancellationToken::new();
        // Nothing is running yet
        stop_token.cancel();
        Self {
            inner: Arc::new(Inner {
                logable,
                options,
                state: AtomicU8::new(STOPPED),
                stop_token: Mutex::new(stop_token),
                service: Mutex::new(service),
            }),
        }
    }

    /// Creates a stopped controller with a logger named after `S`.
    pub fn for_service(service: S, options: RunableOptions, sink: LogSink) -> Self {
        Self::new(service, options, Logable::for_type::<S>(None, sink))
    }

    /// Current state. Safe to call at any time.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_raw(self.inner.state.load(Ordering::Acquire))
    }

    /// Whether the controller is running.
    pub fn is_running(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == RUNNING
    }

    /// Token of the current run; cancelled as soon as a stop begins. While
    /// stopped, this is an already cancelled token.
    pub fn stop_token(&self) -> CancellationToken {
        lock(&self.inner.stop_token).clone()
    }

    /// The options the controller was built with.
    pub fn options(&self) -> &RunableOptions {
        &self.inner.options
    }

    /// Runs `f` with exclusive access to the service.
    ///
    /// Must not be called from inside a hook of the same controller.
    pub fn with_service<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut lock(&self.inner.service))
    }

    /// Starts, then blocks the calling thread until stopped, checking the stop
    /// token every `start_blocking_timeout`.
    pub fn start_blocking(&self) -> Result<(), LifecycleError> {
        self.start()?;
        let token = self.stop_token();
        let interval = self.inner.options.start_blocking_timeout;
        while !token.is_cancelled() {
            std::thread::sleep(interval);
        }
        while self.inner.state.load(Ordering::Acquire) == STOPPING {
            std::thread::sleep(interval.min(Duration::from_millis(10)));
        }
        Ok(())
    }

    /// Starts, then waits until a stop begins.
    pub async fn run_until_stopped(&self) -> Result<(), LifecycleError> {
        self.start()?;
        self.stop_token().cancelled().await;
        Ok(())
    }

    fn refuse(&self, operation: &'static str, raw: u8) -> Result<(), LifecycleError> {
        let state = LifecycleState::from_raw(raw);
        if self.inner.options.strict {
            return Err(LifecycleError::InvalidState { operation, state });
        }
        self.debug(&format!("Ignoring {} while {}", operation, state));
        Ok(())
    }

    /// Moves Running to Stopping or Starting to pending stop. Returns the new
    /// raw state, or the current one when no stop can begin.
    fn claim_stop(&self) -> Result<u8, u8> {
        let state = &self.inner.state;
        let mut current = state.load(Ordering::Acquire);
        loop {
            let next = match current {
                RUNNING => STOPPING,
                STARTING => STOP_PENDING,
                _ => return Err(current),
            };
            match state.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(next),
                Err(actual) => current = actual,
            }
        }
    }

    fn finish_stop(&self, claimed: u8) -> Result<(), LifecycleError> {
        if claimed == STOP_PENDING {
            lock(&self.inner.stop_token).cancel();
            self.debug("Stop requested during startup, deferring");
            return Ok(());
        }
        self.teardown()
    }

    /// Runs teardown. The state must already be `STOPPING`.
    fn teardown(&self) -> Result<(), LifecycleError> {
        self.debug("Stopping");
        lock(&self.inner.stop_token).cancel();
        let result = run_hook(|| lock(&self.inner.service).on_stop());
        self.inner.state.store(STOPPED, Ordering::Release);

        match result {
            Ok(()) => {
                self.info("Stopped");
                Ok(())
            }
            Err(e) => {
                let error = LifecycleError::Teardown(e);
                self.exception("Stopped with errors", &error);
                Err(error)
            }
        }
    }
}

impl<S: Service> Startable for StartStopable<S> {
    /// Idempotent: while not stopped this is a no-op, unless strict.
    ///
    /// A `stop()` arriving during startup is executed right after it.
    fn start(&self) -> Result<(), LifecycleError> {
        let inner = &self.inner;
        if let Err(current) = inner
            .state
            .compare_exchange(STOPPED, STARTING, Ordering::AcqRel, Ordering::Acquire)
        {
            return self.refuse("start", current);
        }

        self.debug("Starting");
        *lock(&inner.stop_token) = CancellationToken::new();

        if let Err(e) = run_hook(|| lock(&inner.service).on_start()) {
            lock(&inner.stop_token).cancel();
            inner.state.store(STOPPED, Ordering::Release);
            let error = LifecycleError::Start(e);
            self.exception("Failed to start", &error);
            return Err(error);
        }

        match inner
            .state
            .compare_exchange(STARTING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.info("Started");
                Ok(())
            }
            Err(_) => {
                inner.state.store(STOPPING, Ordering::Release);
                self.info("Started, running stop requested during startup");
                self.teardown()
            }
        }
    }
}

impl<S: Service> Stopable for StartStopable<S> {
    /// Cancels the stop token, runs teardown and ends stopped, even if
    /// teardown fails. A no-op while stopped or stopping, unless strict.
    fn stop(&self) -> Result<(), LifecycleError> {
        match self.claim_stop() {
            Ok(claimed) => self.finish_stop(claimed),
            Err(current) => self.refuse("stop", current),
        }
    }

    /// `Ok(true)` when this call ran teardown, or scheduled it because
    /// startup was still in progress. Never `InvalidState`, even when strict.
    fn request_stop(&self) -> Result<bool, LifecycleError> {
        match self.claim_stop() {
            Ok(claimed) => self.finish_stop(claimed).map(|()| true),
            Err(current) => {
                self.debug(&format!("Nothing to stop while {}", LifecycleState::from_raw(current)));
                Ok(false)
            }
        }
    }
}

impl<S> Logger for StartStopable<S> {
    fn name(&self) -> &str {
        self.inner.logable.name()
    }

    fn sink(&self) -> &LogSink {
        self.inner.logable.sink()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loggers::testing::CaptureSink;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;

    #[derive(Default, Clone)]
    struct Counters {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    struct Pump {
        counters: Counters,
        fail_start: bool,
        fail_stop: bool,
    }

    impl Pump {
        fn new(counters: &Counters) -> Self {
            Self { counters: counters.clone(), fail_start: false, fail_stop: false }
        }
    }

    impl Service for Pump {
        fn on_start(&mut self) -> Result<(), HookError> {
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err("valve stuck".into());
            }
            Ok(())
        }

        fn on_stop(&mut self) -> Result<(), HookError> {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop {
                return Err("pressure remains".into());
            }
            Ok(())
        }
    }

    fn controller(service: Pump, options: RunableOptions) -> StartStopable<Pump> {
        StartStopable::for_service(service, options, LogSink::none())
    }

    #[test]
    fn start_then_stop() {
        let counters = Counters::default();
        let pump = controller(Pump::new(&counters), RunableOptions::default());
        assert_eq!(pump.state(), LifecycleState::Stopped);
        assert!(!pump.is_running());
        assert!(pump.stop_token().is_cancelled());

        pump.start().unwrap();
        assert!(pump.is_running());
        let token = pump.stop_token();
        assert!(!token.is_cancelled());

        pump.stop().unwrap();
        assert_eq!(pump.state(), LifecycleState::Stopped);
        assert!(token.is_cancelled());
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn repeated_calls_are_ignored() {
        let counters = Counters::default();
        let pump = controller(Pump::new(&counters), RunableOptions::default());

        pump.stop().unwrap();
        pump.start().unwrap();
        pump.start().unwrap();
        pump.stop().unwrap();
        pump.stop().unwrap();

        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn strict_mode_rejects_invalid_transitions() {
        let counters = Counters::default();
        let options = RunableOptions { strict: true, ..Default::default() };
        let pump = controller(Pump::new(&counters), options);

        assert!(matches!(
            pump.stop(),
            Err(LifecycleError::InvalidState { operation: "stop", state: LifecycleState::Stopped })
        ));
        pump.start().unwrap();
        assert!(matches!(
            pump.start(),
            Err(LifecycleError::InvalidState { operation: "start", state: LifecycleState::Running })
        ));
        assert!(pump.is_running());
    }

    #[test]
    fn failed_start_returns_to_stopped() {
        let counters = Counters::default();
        let pump = controller(Pump { fail_start: true, ..Pump::new(&counters) }, RunableOptions::default());

        let error = pump.start().unwrap_err();
        assert!(matches!(error, LifecycleError::Start(_)));
        assert_eq!(error.to_string(), "Startup failed: valve stuck");
        assert_eq!(pump.state(), LifecycleState::Stopped);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_teardown_still_stops() {
        let counters = Counters::default();
        let capture = CaptureSink::new();
        let pump = StartStopable::new(
            Pump { fail_stop: true, ..Pump::new(&counters) },
            RunableOptions::default(),
            Logable::new("Pump", capture.sink()),
        );

        pump.start().unwrap();
        let error = pump.stop().unwrap_err();

        assert!(matches!(error, LifecycleError::Teardown(_)));
        assert!(!pump.is_running());
        assert_eq!(pump.state(), LifecycleState::Stopped);
        assert!(capture.contents().contains("pressure remains"));

        // Restartable afterwards
        pump.start().unwrap();
        assert!(pump.is_running());
    }

    #[test]
    fn restart_gets_fresh_token() {
        let pump = StartStopable::for_service((), RunableOptions::default(), LogSink::none());
        pump.start().unwrap();
        let first = pump.stop_token();
        pump.stop().unwrap();
        pump.start().unwrap();
        let second = pump.stop_token();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    struct SlowStart {
        started: mpsc::Sender<()>,
        proceed: mpsc::Receiver<()>,
        counters: Counters,
    }

    impl Service for SlowStart {
        fn on_start(&mut self) -> Result<(), HookError> {
            self.started.send(())?;
            self.proceed.recv()?;
            Ok(())
        }

        fn on_stop(&mut self) -> Result<(), HookError> {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn stop_during_startup_is_deferred() {
        let (started_tx, started_rx) = mpsc::channel();
        let (proceed_tx, proceed_rx) = mpsc::channel();
        let counters = Counters::default();
        let service = SlowStart { started: started_tx, proceed: proceed_rx, counters: counters.clone() };
        let controller = StartStopable::for_service(service, RunableOptions::default(), LogSink::none());

        let starter = {
            let controller = controller.clone();
            thread::spawn(move || controller.start())
        };

        started_rx.recv().unwrap();
        assert_eq!(controller.state(), LifecycleState::Starting);
        controller.stop().unwrap();
        assert_eq!(controller.state(), LifecycleState::Starting);
        assert!(controller.stop_token().is_cancelled());
        assert_eq!(counters.stops.load(Ordering::SeqCst), 0);

        proceed_tx.send(()).unwrap();
        starter.join().unwrap().unwrap();

        assert_eq!(controller.state(), LifecycleState::Stopped);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_stops_tear_down_once() {
        let counters = Counters::default();
        let pump = controller(Pump::new(&counters), RunableOptions::default());
        pump.start().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pump = pump.clone();
                thread::spawn(move || pump.stop())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        assert!(!pump.is_running());
    }

    struct Brittle {
        panic_on_start: bool,
    }

    impl Service for Brittle {
        fn on_start(&mut self) -> Result<(), HookError> {
            if self.panic_on_start {
                panic!("gasket blew");
            }
            Ok(())
        }

        fn on_stop(&mut self) -> Result<(), HookError> {
            panic!("seal torn")
        }
    }

    #[test]
    fn panicking_hooks_leave_controller_stopped() {
        let service = Brittle { panic_on_start: false };
        let controller = StartStopable::for_service(service, RunableOptions::default(), LogSink::none());
        controller.start().unwrap();

        match controller.stop() {
            Err(LifecycleError::Teardown(e)) => assert!(e.to_string().contains("seal torn")),
            other => panic!("Expected teardown error, got {:?}", other),
        }
        assert_eq!(controller.state(), LifecycleState::Stopped);
        assert!(controller.stop_token().is_cancelled());

        controller.with_service(|service| service.panic_on_start = true);
        match controller.start() {
            Err(LifecycleError::Start(e)) => assert!(e.to_string().contains("gasket blew")),
            other => panic!("Expected start error, got {:?}", other),
        }
        assert_eq!(controller.state(), LifecycleState::Stopped);

        controller.with_service(|service| service.panic_on_start = false);
        controller.start().unwrap();
        assert!(controller.is_running());
    }

    #[test]
    fn request_stop_reports_whether_it_stopped() {
        let counters = Counters::default();
        let strict = RunableOptions { strict: true, ..Default::default() };
        let pump = controller(Pump::new(&counters), strict);

        assert!(!pump.request_stop().unwrap());
        pump.start().unwrap();
        assert!(pump.request_stop().unwrap());
        assert!(!pump.request_stop().unwrap());
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_blocking_returns_after_stop() {
        let options = RunableOptions { start_blocking_timeout: Duration::from_millis(5), ..Default::default() };
        let controller = StartStopable::for_service((), options, LogSink::none());

        let stopper = {
            let controller = controller.clone();
            thread::spawn(move || {
                while !controller.is_running() {
                    thread::sleep(Duration::from_millis(1));
                }
                controller.stop()
            })
        };

        controller.start_blocking().unwrap();
        stopper.join().unwrap().unwrap();
        assert_eq!(controller.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn run_until_stopped_wakes_on_stop() {
        let controller = StartStopable::for_service((), RunableOptions::default(), LogSink::none());
        let waiter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run_until_stopped().await })
        };

        while !controller.is_running() {
            tokio::task::yield_now().await;
        }
        controller.stop().unwrap();

        waiter.await.unwrap().unwrap();
        assert!(!controller.is_running());
    }

    #[cfg(feature = "loadable")]
    #[test]
    fn options_from_settings() {
        let mut settings = Settings::new();
        settings.insert(KEY_START_BLOCKING_TIMEOUT.to_string(), 0.25.into());
        settings.insert(KEY_STRICT_LIFECYCLE.to_string(), true.into());
        let options = RunableOptions::from_settings(&settings);
        assert_eq!(options.start_blocking_timeout, Duration::from_millis(250));
        assert!(options.strict);

        settings.insert(KEY_START_BLOCKING_TIMEOUT.to_string(), 2.into());
        assert_eq!(RunableOptions::from_settings(&settings).start_blocking_timeout, Duration::from_secs(2));

        settings.insert(KEY_START_BLOCKING_TIMEOUT.to_string(), (-1).into());
        assert_eq!(
            RunableOptions::from_settings(&settings).start_blocking_timeout,
            Duration::from_secs(1)
        );
        assert_eq!(RunableOptions::from_settings(&Settings::new()), RunableOptions::default());
    }
}
