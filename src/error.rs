//! Error types for gpu-pressure.
//!
//! Validation, GPU and child-process failures each get their own enum and
//! are folded into [`GpuPressureError`] at the entry point.

use thiserror::Error;

/// Exit status for CLI validation failures.
pub const EXIT_VALIDATION: i32 = 255;

/// Exit status for GPU, process and I/O failures.
pub const EXIT_FAILURE: i32 = 1;

/// Unified error type for gpu-pressure operations.
#[derive(Error, Debug)]
pub enum GpuPressureError {
    /// Invalid command-line values.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Graphics context or allocation failure.
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// Child process management failure.
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GpuPressureError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            GpuPressureError::Config(_) => EXIT_VALIDATION,
            _ => EXIT_FAILURE,
        }
    }
}

/// CLI validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Base allocation does not exceed the reserved context overhead.
    #[error("Allocation must be larger than {floor_mib}MiB (got {requested_mib}MiB)")]
    BaseTooSmall { requested_mib: u32, floor_mib: u32 },

    /// Oscillating allocation is enabled but does not exceed the overhead.
    #[error("Oscillation allocation must be larger than {floor_mib}MiB (got {requested_mib}MiB)")]
    OscillationTooSmall { requested_mib: u32, floor_mib: u32 },
}

/// GPU-specific errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// No GPU adapter found.
    #[error("No GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(String),

    /// Buffer allocation failed.
    #[error("Buffer allocation of {requested} failed: {reason}")]
    BufferAllocation { requested: String, reason: String },

    /// Device limits rule out the requested allocation.
    #[error("Device reports a max buffer size of {0} bytes, too small to allocate from")]
    UnusableBufferLimit(u64),

    /// GPU operation timed out.
    #[error("GPU operation timed out after {0} seconds")]
    Timeout(u64),
}

/// Errors from launching or signalling oscillation children.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The child executable could not be started.
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The termination signal could not be delivered.
    #[error("Failed to signal child {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}
