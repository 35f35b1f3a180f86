//! Process lookup and termination helpers.
//!
//! Reconcile loops unconditionally kill known auxiliary daemons by name
//! before spawning their own instance, so a worker replacement can never
//! leak a child from the previous worker.

use std::fs;
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::time::sleep;

/// Send SIGTERM to every process whose name starts with the prefix.
///
/// Process names come from `/proc/<pid>/comm` (truncated to 15 characters
/// by the kernel, which still covers `wpa_supplicant`, `hostapd` and
/// `pppd`).
pub fn terminate_by_name(prefix: &str) {
    for pid in pids_by_name(prefix) {
        let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
    }
}

/// As [`terminate_by_name`], then wait up to `timeout` for the processes to
/// disappear.
pub async fn terminate_by_name_wait(prefix: &str, timeout: Duration) {
    terminate_by_name(prefix);

    let deadline = tokio::time::Instant::now() + timeout;
    while !pids_by_name(prefix).is_empty() && tokio::time::Instant::now() < deadline {
        sleep(Duration::from_millis(200)).await;
    }
}

/// SIGTERM a child we spawned ourselves and reap it.
pub async fn terminate_child(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    let _ = child.wait().await;
}

fn pids_by_name(prefix: &str) -> Vec<i32> {
    let mut pids = Vec::new();
    let Ok(entries) = fs::read_dir("/proc") else {
        return pids;
    };
    for entry in entries.filter_map(std::result::Result::ok) {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|n| n.parse::<i32>().ok()) else {
            continue;
        };
        let Ok(comm) = fs::read_to_string(entry.path().join("comm")) else {
            continue;
        };
        if comm.trim_end().starts_with(prefix) {
            pids.push(pid);
        }
    }
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_no_bogus_name() {
        assert!(pids_by_name("netconnect-no-such-process").is_empty());
    }
}
