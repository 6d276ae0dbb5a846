//! POSIX signal delivery. ESRCH means the process is already gone and is not an error.

use crate::error::{SupervisorError, SupervisorResult};

#[cfg(unix)]
pub use nix::sys::signal::Signal;

#[cfg(unix)]
pub fn send(pid: u32, signal: Signal) -> SupervisorResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| SupervisorError::Signal {
        pid,
        reason: "pid out of range".to_string(),
    })?;
    if raw <= 0 {
        return Err(SupervisorError::Signal {
            pid,
            reason: "refusing to signal a process group".to_string(),
        });
    }

    match kill(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(SupervisorError::Signal {
            pid,
            reason: format!("{}: {}", signal, e),
        }),
    }
}

/// Send to every pid, logging failures. Returns how many were rejected.
#[cfg(unix)]
pub fn send_all<'a>(pids: impl IntoIterator<Item = &'a u32>, signal: Signal) -> usize {
    let mut rejected = 0;
    for &pid in pids {
        if let Err(e) = send(pid, signal) {
            tracing::warn!("{}", e);
            rejected += 1;
        }
    }
    rejected
}
