//! Process-group handling so a timed out workload takes its descendants with it

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::models::WorkloadType;

/// Start the child as the leader of a new process group.
///
/// Descendants inherit the group unless they explicitly leave it.
pub fn isolate_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    cmd.process_group(0);
    #[cfg(not(unix))]
    let _ = cmd;
}

/// Kill the child and every process in its group, then reap the child.
pub async fn kill_process_tree(child: &mut Child, workload: WorkloadType) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // The child leads its own group, so its pid is the group id.
            let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
            if rc == 0 {
                debug!("Sent SIGKILL to process group {} (workload={})", pid, workload);
            } else {
                warn!(
                    "Failed to signal process group {} (workload={}): {}",
                    pid,
                    workload,
                    std::io::Error::last_os_error()
                );
            }
        }
    }

    // Covers non-unix targets and a failed killpg; harmless if already dead.
    if let Err(e) = child.start_kill() {
        debug!("Direct kill of workload {} child skipped: {}", workload, e);
    }

    if let Err(e) = child.wait().await {
        warn!("Failed to reap killed workload {} child: {}", workload, e);
    }
}
