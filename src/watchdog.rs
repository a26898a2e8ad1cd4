//! Cancellable idle timer owned by a tracking session.
//!
//! Fires a callback when no [`rearm`](IdleWatchdog::rearm) arrives within the
//! timeout, then stays quiet until the next rearm. Cancelling (or dropping)
//! the watchdog stops and joins its thread.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

enum Signal {
    Rearm,
    Stop,
}

#[derive(Debug)]
pub struct IdleWatchdog {
    control: Option<Sender<Signal>>,
    handle: Option<JoinHandle<()>>,
}

impl IdleWatchdog {
    /// Start the timer. The first period begins immediately.
    pub fn spawn<F>(name: &str, timeout: Duration, on_idle: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (control, signals) = mpsc::channel::<Signal>();
        let handle = thread::Builder::new()
            .name(format!("watchdog-{}", name))
            .spawn(move || {
                let mut armed = true;
                loop {
                    let signal = if armed {
                        signals.recv_timeout(timeout)
                    } else {
                        signals.recv().map_err(|_| RecvTimeoutError::Disconnected)
                    };
                    match signal {
                        Ok(Signal::Rearm) => armed = true,
                        Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            on_idle();
                            armed = false;
                        }
                    }
                }
            })?;

        Ok(Self {
            control: Some(control),
            handle: Some(handle),
        })
    }

    /// Restart the idle period.
    pub fn rearm(&self) {
        if let Some(control) = &self.control {
            let _ = control.send(Signal::Rearm);
        }
    }

    /// Stop the timer and wait for its thread to exit.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(Signal::Stop);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IdleWatchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}
