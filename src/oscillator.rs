//! Oscillating allocations driven by short-lived child processes.
//!
//! Each cycle starts a fresh copy of this executable with `-m <mib>`, lets it
//! allocate, then terminates it. Tearing down the whole process is the only
//! dependable way to hand memory back: drivers are free to keep freed or
//! invalidated buffers reserved for the lifetime of a context.
//!
//! The child is terminated on a timer, not on a readiness signal. A child
//! that is slow to allocate may be killed before its memory shows up.

use crate::config::OscillationPlan;
use crate::error::ProcessError;
use crate::stats::OscillationStats;
use crate::traits::ChildLauncher;
use log::{debug, info, warn};
use std::path::Path;
use std::process::{Child, Command};
use std::sync::Arc;
use std::time::Duration;

/// Launches real child processes and stops them with SIGTERM.
///
/// Terminated children are reaped lazily on the next launch.
#[derive(Default)]
pub struct SystemLauncher {
    terminated: Vec<Child>,
}

impl SystemLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects exit statuses of terminated children without blocking.
    fn reap(&mut self) {
        self.terminated.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Child {} exited: {}", child.id(), status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!("Failed to poll child {}: {}", child.id(), e);
                false
            }
        });
    }
}

impl ChildLauncher for SystemLauncher {
    type Handle = Child;

    fn launch(&mut self, program: &Path, args: &[String]) -> Result<Child, ProcessError> {
        self.reap();
        Command::new(program)
            .args(args)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.display().to_string(),
                source,
            })
    }

    fn terminate(&mut self, mut child: Child) -> Result<(), ProcessError> {
        let pid = child.id();
        let result = request_exit(&mut child).map_err(|source| ProcessError::Signal { pid, source });
        self.terminated.push(child);
        result
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| std::io::Error::from_raw_os_error(libc::ESRCH))?;
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}

/// Repeatedly allocates and frees GPU memory through child processes.
pub struct Oscillator<L: ChildLauncher> {
    plan: OscillationPlan,
    launcher: L,
    stats: Arc<OscillationStats>,
}

impl<L: ChildLauncher> Oscillator<L> {
    pub fn new(plan: OscillationPlan, launcher: L) -> Self {
        Self {
            plan,
            launcher,
            stats: Arc::new(OscillationStats::new()),
        }
    }

    pub fn plan(&self) -> &OscillationPlan {
        &self.plan
    }

    pub fn stats(&self) -> Arc<OscillationStats> {
        Arc::clone(&self.stats)
    }

    /// Runs cycles until the process is killed.
    pub fn run(&mut self) -> ! {
        let stats = self.stats();
        loop {
            if let Err(e) = self.run_cycle(std::thread::sleep) {
                warn!("{}", e);
            }
            debug!(
                "{} cycles, {} spawn failures, {} signal failures",
                stats.get_cycles(),
                stats.get_spawn_failures(),
                stats.get_signal_failures()
            );
        }
    }

    /// Runs one allocate/free cycle, using `sleep` for both waits.
    ///
    /// A cycle always spends `hold_time() + period` in `sleep`, even when the
    /// child could not be started, so the oscillation keeps its cadence.
    ///
    /// # Errors
    ///
    /// Returns the spawn or signal failure. Both are counted in
    /// [`OscillationStats`]; the caller may keep cycling.
    pub fn run_cycle(&mut self, mut sleep: impl FnMut(Duration)) -> Result<(), ProcessError> {
        info!("Oscillating memory allocating...");
        let args = self.plan.child_args();
        let launched = self.launcher.launch(&self.plan.program, &args);

        sleep(self.plan.hold_time());

        let result = match launched {
            Ok(handle) => match self.launcher.terminate(handle) {
                Ok(()) => {
                    info!("Oscillating memory freed");
                    Ok(())
                }
                Err(e) => {
                    self.stats.add_signal_failure();
                    Err(e)
                }
            },
            Err(e) => {
                self.stats.add_spawn_failure();
                Err(e)
            }
        };

        sleep(self.plan.period);
        self.stats.add_cycle();
        result
    }
}
