//! Process-control seam used by the oscillator.
//!
//! The oscillator only needs to start a child and later ask it to exit.
//! Keeping that behind a trait lets the cycle logic run against a recording
//! launcher in tests instead of real processes.

use crate::error::ProcessError;
use std::path::Path;

/// Starts and stops oscillation children.
pub trait ChildLauncher {
    /// Handle to a running child.
    type Handle;

    /// Starts `program` with `args`.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Spawn` if the process could not be started.
    fn launch(&mut self, program: &Path, args: &[String]) -> Result<Self::Handle, ProcessError>;

    /// Asks the child to exit. The child's GPU memory is released by the
    /// driver once the process is torn down.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Signal` if the request could not be delivered.
    fn terminate(&mut self, handle: Self::Handle) -> Result<(), ProcessError>;
}
