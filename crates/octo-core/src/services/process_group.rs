//! Process-group bookkeeping for spawned children.
//!
//! Children lead their own process group on Unix, so a terminal interrupt
//! reaches only the orchestrator. Teardown must then signal each group
//! explicitly, which also reaches anything the children forked.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Start the child of `cmd` as the leader of a new process group.
pub fn lead_own_group(cmd: &mut Command) {
    #[cfg(unix)]
    cmd.process_group(0);
    #[cfg(not(unix))]
    let _ = cmd;
}

/// Shared set of process groups started during a run.
#[derive(Debug, Clone, Default)]
pub struct ProcessGroups {
    leaders: Arc<Mutex<BTreeSet<u32>>>,
}

impl ProcessGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the group led by the child with `pid`.
    pub fn register(&self, pid: Option<u32>) {
        // pid 0 would address our own group.
        if let Some(pid) = pid.filter(|&pid| pid != 0) {
            self.lock().insert(pid);
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<u32>> {
        self.leaders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// SIGTERM every registered group, wait up to `grace` for the groups to
    /// empty, then SIGKILL whatever is left.
    pub async fn terminate(&self, grace: Duration) {
        let leaders: Vec<u32> = std::mem::take(&mut *self.lock()).into_iter().collect();
        if leaders.is_empty() {
            return;
        }

        for &pgid in &leaders {
            signal_group(pgid, Signal::Terminate);
        }

        let deadline = Instant::now() + grace;
        loop {
            let alive: Vec<u32> = leaders
                .iter()
                .copied()
                .filter(|&pgid| signal_group(pgid, Signal::Probe))
                .collect();
            if alive.is_empty() {
                tracing::debug!(groups = leaders.len(), "process groups terminated");
                return;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    groups = ?alive,
                    "process groups outlived the grace period; killing"
                );
                for pgid in alive {
                    signal_group(pgid, Signal::Kill);
                }
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Probe,
    Terminate,
    Kill,
}

/// Send `signal` to every member of group `pgid`. Returns whether any
/// member received it.
#[cfg(unix)]
fn signal_group(pgid: u32, signal: Signal) -> bool {
    let signal = match signal {
        Signal::Probe => 0,
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return false;
    };
    // A negative pid addresses the whole group.
    unsafe { libc::kill(-pgid, signal) == 0 }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _signal: Signal) -> bool {
    false
}
