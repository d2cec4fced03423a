//! # Signal Stop Wrapper
//!
//! Binds SIGINT and SIGTERM (Ctrl-C on non-unix platforms) to the `stop()` of
//! any [`Stopable`]. Every delivered signal is forwarded as a stop request;
//! the target decides whether there is anything to stop, so a signal that
//! arrives while it is stopped is ignored and one after a restart stops it
//! again.
//!
//! The listener runs as a task on the caller's tokio runtime; the stop it
//! triggers runs on the blocking pool so slow teardown does not stall the
//! runtime. Once installed, the signals no longer terminate the process by
//! themselves, for the lifetime of the process.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::lifecycle::{LifecycleError, Stopable};
use crate::loggers::{LogSink, Logable, Logger};

/// A process signal that requests a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopSignal {
    /// SIGINT / Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopSignal::Interrupt => f.write_str("SIGINT"),
            StopSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

struct Shared {
    logable: Logable,
    received: AtomicUsize,
    target: Arc<dyn Stopable + Send + Sync>,
}

impl Shared {
    fn deliver(&self, signal: StopSignal) -> Result<bool, LifecycleError> {
        self.logable.warning(&format!("Signal {} caught", signal));
        self.received.fetch_add(1, Ordering::AcqRel);
        let stopped = self.target.request_stop()?;
        if !stopped {
            self.logable.debug("Nothing to stop, ignoring signal");
        }
        Ok(stopped)
    }

    fn deliver_in_background(self: &Arc<Self>, signal: StopSignal) {
        let shared = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = shared.deliver(signal) {
                shared.logable.exception("Stop after signal failed", &e);
            }
        });
    }
}

/// # Signal Stop Wrapper
///
/// Keeps the signal listener alive; dropping the wrapper (or calling
/// [`shutdown`](SignalStopWrapper::shutdown)) ends it.
pub struct SignalStopWrapper {
    shared: Arc<Shared>,
    listener: CancellationToken,
}

impl SignalStopWrapper {
    /// Installs the listener on the current tokio runtime.
    ///
    /// Fails if called outside a runtime or if the OS handlers cannot be
    /// registered.
    pub fn install<T>(target: T, sink: LogSink) -> io::Result<Self>
    where
        T: Stopable + Send + Sync + 'static,
    {
        let handle = Handle::try_current().map_err(io::Error::other)?;
        let _entered = handle.enter();

        let shared = Arc::new(Shared {
            logable: Logable::for_type::<Self>(None, sink),
            received: AtomicUsize::new(0),
            target: Arc::new(target),
        });
        let listener = CancellationToken::new();
        spawn_listener(&handle, Arc::clone(&shared), listener.clone())?;
        shared.logable.debug("Listening for SIGINT/SIGTERM");

        Ok(Self { shared, listener })
    }

    /// Delivers `signal` as if the OS had sent it, synchronously.
    ///
    /// Returns `Ok(true)` if this delivery stopped the target, `Ok(false)` if
    /// it was not running (already stopped, or stopped by someone else).
    pub fn handle_signal(&self, signal: StopSignal) -> Result<bool, LifecycleError> {
        self.shared.deliver(signal)
    }

    /// Number of signals delivered so far.
    pub fn received(&self) -> usize {
        self.shared.received.load(Ordering::Acquire)
    }

    /// Ends the listener. Already dispatched stops still complete.
    pub fn shutdown(&self) {
        self.listener.cancel();
    }
}

impl Drop for SignalStopWrapper {
    fn drop(&mut self) {
        self.listener.cancel();
    }
}

impl fmt::Debug for SignalStopWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalStopWrapper")
            .field("received", &self.received())
            .field("listening", &!self.listener.is_cancelled())
            .finish()
    }
}

#[cfg(unix)]
fn spawn_listener(handle: &Handle, shared: Arc<Shared>, listener: CancellationToken) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    // Registered before returning, so no signal is lost after `install`.
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    handle.spawn(async move {
        loop {
            let caught = tokio::select! {
                _ = listener.cancelled() => break,
                Some(()) = interrupt.recv() => StopSignal::Interrupt,
                Some(()) = terminate.recv() => StopSignal::Terminate,
                else => break,
            };
            shared.deliver_in_background(caught);
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_listener(handle: &Handle, shared: Arc<Shared>, listener: CancellationToken) -> io::Result<()> {
    handle.spawn(async move {
        loop {
            tokio::select! {
                _ = listener.cancelled() => break,
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => shared.deliver_in_background(StopSignal::Interrupt),
                    Err(e) => {
                        shared.logable.exception("Ctrl-C listener failed", &e);
                        break;
                    }
                },
            }
        }
    });
    Ok(())
}
