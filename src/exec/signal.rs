//! Stop-signal delivery that tolerates processes which no longer exist.

use std::io;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::debug;

/// Graceful (`SIGTERM`) or immediate (`SIGKILL`) stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Terminate,
    Kill,
}

impl StopSignal {
    fn as_nix(self) -> Signal {
        match self {
            StopSignal::Terminate => Signal::SIGTERM,
            StopSignal::Kill => Signal::SIGKILL,
        }
    }
}

/// Send `signal` to `pid`.
///
/// Returns `Ok(false)` if the process no longer exists.
pub fn send(pid: u32, signal: StopSignal) -> io::Result<bool> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    match kill(Pid::from_raw(raw), signal.as_nix()) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// Best-effort delivery to each pid independently. Never fails.
///
/// Returns how many processes were actually signalled.
pub fn send_each(pids: &[u32], signal: StopSignal) -> usize {
    let mut delivered = 0;
    for &pid in pids {
        match send(pid, signal) {
            Ok(true) => delivered += 1,
            Ok(false) => debug!(pid, ?signal, "child already exited"),
            Err(e) => debug!(pid, ?signal, error = %e, "failed to signal child"),
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signalling_a_missing_process_is_not_an_error() {
        assert!(!send(i32::MAX as u32 - 11, StopSignal::Kill).unwrap());
        assert_eq!(send_each(&[i32::MAX as u32 - 12, u32::MAX], StopSignal::Terminate), 0);
    }
}
