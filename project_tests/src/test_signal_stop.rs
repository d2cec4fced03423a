//! # Signal Stop Test
//!
//! Starts a controller bound to SIGINT/SIGTERM, sends SIGTERM to its own
//! process twice and verifies that teardown ran exactly once. The controller is
//! then restarted and one more SIGTERM must stop it again.

#![cfg_attr(not(unix), allow(dead_code, unused_imports))]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lib_flotils::loggers::{LoggerLocal, LoggerLocalOptions};
use lib_flotils::runable::{HookError, Service};

/// Counts teardowns.
struct Recorder {
    teardowns: Arc<AtomicUsize>,
}

impl Service for Recorder {
    fn on_stop(&mut self) -> Result<(), HookError> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(unix)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::{ensure, Context};
    use lib_flotils::runable::{LifecycleState, RunableOptions, SignalStopWrapper, StartStopable, Startable};
    use std::process::Command;
    use tokio::time::{sleep, timeout, Duration};

    // // Statement: Debug output on the terminal shows every transition
    let logger_local = LoggerLocal::new(
        "test_signal_stop",
        Some(LoggerLocalOptions { level: "debug".to_string(), ..Default::default() }),
    )?;

    let teardowns = Arc::new(AtomicUsize::new(0));
    let controller = StartStopable::for_service(
        Recorder { teardowns: Arc::clone(&teardowns) },
        RunableOptions::default(),
        logger_local.sink(),
    );
    controller.start()?;
    let token = controller.stop_token();
    let wrapper = SignalStopWrapper::install(controller.clone(), logger_local.sink())?;

    let pid = std::process::id().to_string();
    println!("[*] Sending SIGTERM twice to {}", pid);
    for _ in 0..2 {
        let status = Command::new("kill").args(["-TERM", &pid]).status()?;
        ensure!(status.success(), "kill exited with {}", status);
    }

    timeout(Duration::from_secs(5), token.cancelled())
        .await
        .context("Controller was not stopped after SIGTERM")?;
    timeout(Duration::from_secs(5), async {
        while controller.state() != LifecycleState::Stopped {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("Teardown did not finish")?;

    // // Statement: Give a late second delivery time to arrive
    sleep(Duration::from_millis(200)).await;

    ensure!(wrapper.received() >= 1, "Wrapper did not record the signal");
    ensure!(!controller.is_running(), "Controller still running");
    let count = teardowns.load(Ordering::SeqCst);
    ensure!(count == 1, "Expected exactly one teardown, got {}", count);
    println!("[*] One teardown for two signals");

    // // Statement: A restarted controller is stopped by the next signal
    controller.start()?;
    let token = controller.stop_token();
    let status = Command::new("kill").args(["-TERM", &pid]).status()?;
    ensure!(status.success(), "kill exited with {}", status);
    timeout(Duration::from_secs(5), token.cancelled())
        .await
        .context("Restarted controller was not stopped after SIGTERM")?;
    timeout(Duration::from_secs(5), async {
        while controller.state() != LifecycleState::Stopped {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("Second teardown did not finish")?;
    let count = teardowns.load(Ordering::SeqCst);
    ensure!(count == 2, "Expected two teardowns after restart, got {}", count);

    println!("[SUCCESS] Signals stop the controller once per run");
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    println!("[SKIP] SIGTERM delivery is only tested on unix");
}
