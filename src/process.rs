//! Process liveness and termination for baton.
//!
//! Platform-specific process control is isolated here so the rest of the
//! protocol stays platform-agnostic. On unix, liveness is a signal-0 probe
//! and termination escalates SIGTERM -> SIGKILL after a bounded grace
//! period. On other platforms the probe conservatively reports the process
//! alive, which biases the stale detector toward heartbeat age rather than
//! false force-breaks.

use crate::error::{BatonError, Result};
use std::thread;
use std::time::{Duration, Instant};

/// Check whether a process with the given pid is alive.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    // kill(pid, 0) probes existence without delivering a signal.
    // EPERM means the process exists but belongs to another user.
    let rc = unsafe { libc::kill(pid as i32, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn is_alive(_pid: u32) -> bool {
    true
}

/// Terminate a process: graceful signal first, forceful after `grace`.
///
/// Returns once the process is gone. The wait is bounded: `grace` for the
/// graceful phase, then one more `grace` after the forceful signal before
/// giving up with an error.
#[cfg(unix)]
pub fn terminate(pid: u32, grace: Duration) -> Result<()> {
    if !is_alive(pid) {
        return Ok(());
    }

    send_signal(pid, libc::SIGTERM)?;
    if wait_for_exit(pid, grace) {
        return Ok(());
    }

    send_signal(pid, libc::SIGKILL)?;
    if wait_for_exit(pid, grace) {
        return Ok(());
    }

    Err(BatonError::UserError(format!(
        "process {} survived SIGKILL; cannot safely break its lock",
        pid
    )))
}

#[cfg(not(unix))]
pub fn terminate(pid: u32, _grace: Duration) -> Result<()> {
    Err(BatonError::UserError(format!(
        "terminating process {} is not supported on this platform; \
         stop the holder manually and re-run",
        pid
    )))
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> Result<()> {
    let rc = unsafe { libc::kill(pid as i32, signal) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: already gone, which is what we wanted.
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(BatonError::UserError(format!(
            "failed to send signal {} to process {}: {}",
            signal, pid, err
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn wait_for_exit(pid: u32, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        thread::sleep(Duration::from_millis(100));
    }
    !is_alive(pid)
}
