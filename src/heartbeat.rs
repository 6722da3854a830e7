//! Heartbeat monitor for the current lock holder.
//!
//! The monitor is a background thread that rewrites `last_heartbeat_at` in
//! the lock record at a fixed interval. It communicates with the holder
//! only through a bounded shutdown channel, and with other engines only
//! through the record store, so it never blocks (and is never blocked by)
//! the holder's primary work.
//!
//! A single failed write is a warning, not an error: staleness is judged by
//! accumulated heartbeat age, so one missed beat within the threshold is
//! harmless. The monitor is stopped as the first act of termination, before
//! the prepare phase, so no heartbeat write can race the record's removal.

use crate::context::WorkspaceContext;
use crate::lock::{self, LockToken};
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

/// Handle to the background heartbeat thread.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    handle: Option<JoinHandle<()>>,
    shutdown: Sender<()>,
}

impl HeartbeatMonitor {
    /// Start heartbeating for `token` every `interval`.
    pub fn start(ctx: WorkspaceContext, token: LockToken, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let handle = std::thread::spawn(move || {
            loop {
                match shutdown_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = lock::heartbeat(&ctx, &token) {
                            eprintln!("Warning: heartbeat write failed: {}", e);
                        }
                    }
                }
            }
        });

        Self {
            handle: Some(handle),
            shutdown: shutdown_tx,
        }
    }

    /// Signal the thread to stop and wait for it to exit.
    ///
    /// After this returns, no further heartbeat write can occur.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.shutdown.try_send(());
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
