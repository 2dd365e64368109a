//! Interrupt Relay
//!
//! Bridges OS termination signals to the shutdown controller in two layers:
//!
//! 1. The signal handler (installed through `signal-hook`) only stores
//!    `true` into the controller's interrupt flag.
//! 2. A relay thread polls that flag and, once raised, logs and calls
//!    `request_stop` from ordinary thread context.
//!
//! Repeated signals only set the flag again. Nothing here terminates the
//! process, so the single CSV flush always runs to completion.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use signal_hook::SigId;
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;

use crate::application::services::ShutdownController;

/// Name of the relay thread.
pub const RELAY_THREAD_NAME: &str = "interrupt-relay";

/// Installed signal handlers plus the thread relaying them.
#[derive(Debug)]
pub struct InterruptRelay {
    signal_ids: Vec<SigId>,
    handle: Option<JoinHandle<()>>,
    halt: Arc<AtomicBool>,
}

impl InterruptRelay {
    /// Register SIGINT, SIGTERM and SIGQUIT and start the relay thread.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler cannot be registered or the thread
    /// cannot be spawned.
    pub fn install(shutdown: Arc<ShutdownController>, poll: Duration) -> io::Result<Self> {
        let interrupted = shutdown.interrupt_flag();
        let signal_ids = TERM_SIGNALS
            .iter()
            .map(|signal| flag::register(*signal, Arc::clone(&interrupted)))
            .collect::<io::Result<Vec<SigId>>>()?;

        let mut relay = Self::spawn(shutdown, poll)?;
        relay.signal_ids = signal_ids;
        tracing::debug!(signals = ?TERM_SIGNALS, "Interrupt handlers installed");
        Ok(relay)
    }

    /// Start only the relay thread, watching the controller's interrupt flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(shutdown: Arc<ShutdownController>, poll: Duration) -> io::Result<Self> {
        let halt = Arc::new(AtomicBool::new(false));
        let thread_halt = Arc::clone(&halt);

        let handle = thread::Builder::new()
            .name(RELAY_THREAD_NAME.to_string())
            .spawn(move || relay(&shutdown, &thread_halt, poll))?;

        Ok(Self {
            signal_ids: Vec::new(),
            handle: Some(handle),
            halt,
        })
    }

    /// Unregister the handlers and stop the relay thread.
    pub fn uninstall(mut self) {
        self.shutdown_relay();
    }

    fn shutdown_relay(&mut self) {
        for id in self.signal_ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
        self.halt.store(true, Ordering::Release);
        let panicked = self
            .handle
            .take()
            .is_some_and(|handle| handle.join().is_err());
        if panicked {
            tracing::warn!("Interrupt relay thread panicked");
        }
    }
}

impl Drop for InterruptRelay {
    fn drop(&mut self) {
        self.shutdown_relay();
    }
}

fn relay(shutdown: &ShutdownController, halt: &AtomicBool, poll: Duration) {
    let interrupted = shutdown.interrupt_flag();
    loop {
        if interrupted.load(Ordering::Acquire) {
            tracing::info!("Interrupt received, stopping");
            shutdown.request_stop();
            return;
        }
        if shutdown.is_stop_broadcast() || halt.load(Ordering::Acquire) {
            return;
        }
        thread::sleep(poll);
    }
}
