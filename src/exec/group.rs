// src/exec/group.rs

use std::process::ExitStatus;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Send SIGKILL to every process in the group led by `pgid`.
///
/// Returns `false` if the group no longer exists or could not be signalled.
pub fn kill_process_group(pgid: u32) -> bool {
    let Ok(raw) = i32::try_from(pgid) else {
        warn!(pgid, "process group id out of range; not signalling");
        return false;
    };

    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => {
            debug!(pgid, "sent SIGKILL to process group");
            true
        }
        Err(Errno::ESRCH) => {
            debug!(pgid, "process group already gone");
            false
        }
        Err(e) => {
            warn!(pgid, error = %e, "failed to signal process group");
            false
        }
    }
}

/// Map an exit status to a shell-style integer code.
///
/// Signal terminations become `128 + signal`, like `sh` reports them.
pub fn status_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}
