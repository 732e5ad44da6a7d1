//! Validated allocation settings derived from the command line.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

/// Bytes in one mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// MiB already consumed by a bare graphics context, subtracted from the
/// base request so the process total matches what the user asked for.
pub const RESERVED_OVERHEAD_MIB: u32 = 12;

/// Extra time given to a child to open its context and allocate.
pub const CHILD_BOOT_SLACK: Duration = Duration::from_millis(300);

/// Default oscillation half-period in milliseconds.
pub const DEFAULT_OSCILLATE_TIME_MS: u64 = 500;

/// What the process should allocate, checked against the overhead floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    /// MiB the user asked for, before the overhead is subtracted.
    pub requested_mib: u32,
    /// Bytes the base buffer will actually occupy.
    pub base_bytes: u64,
    /// Oscillation settings, `None` when disabled.
    pub oscillation: Option<OscillationSettings>,
}

/// Oscillation parameters before the child executable is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OscillationSettings {
    /// MiB each child requests via `-m`.
    pub mib: u32,
    /// Half-period of the oscillation.
    pub period: Duration,
}

impl AllocationPlan {
    /// Validates raw flag values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::BaseTooSmall` if `mib` does not exceed the
    /// reserved overhead, or `ConfigError::OscillationTooSmall` if a non-zero
    /// `oscillate_mib` does not.
    pub fn from_args(mib: u32, oscillate_mib: u32, oscillate_time_ms: u64) -> Result<Self, ConfigError> {
        if mib <= RESERVED_OVERHEAD_MIB {
            return Err(ConfigError::BaseTooSmall {
                requested_mib: mib,
                floor_mib: RESERVED_OVERHEAD_MIB,
            });
        }

        let oscillation = match oscillate_mib {
            0 => None,
            m if m <= RESERVED_OVERHEAD_MIB => {
                return Err(ConfigError::OscillationTooSmall {
                    requested_mib: m,
                    floor_mib: RESERVED_OVERHEAD_MIB,
                });
            }
            m => Some(OscillationSettings {
                mib: m,
                period: Duration::from_millis(oscillate_time_ms),
            }),
        };

        Ok(Self {
            requested_mib: mib,
            base_bytes: u64::from(mib - RESERVED_OVERHEAD_MIB) * MIB,
            oscillation,
        })
    }
}

/// Everything the oscillator needs, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscillationPlan {
    /// Absolute path of the executable each child runs.
    pub program: PathBuf,
    /// MiB each child requests.
    pub mib: u32,
    /// Half-period of the oscillation.
    pub period: Duration,
}

impl OscillationPlan {
    pub fn new(program: PathBuf, settings: OscillationSettings) -> Self {
        Self {
            program,
            mib: settings.mib,
            period: settings.period,
        }
    }

    /// Resolves the running executable as the child program.
    pub fn for_current_exe(settings: OscillationSettings) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, settings))
    }

    /// Arguments passed to every child: `-m <mib>`.
    pub fn child_args(&self) -> Vec<String> {
        vec!["-m".to_string(), self.mib.to_string()]
    }

    /// How long a child is kept alive.
    pub fn hold_time(&self) -> Duration {
        self.period + CHILD_BOOT_SLACK
    }

    /// Full length of one allocate/free cycle.
    pub fn cycle_time(&self) -> Duration {
        self.hold_time() + self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_at_or_below_floor_rejected() {
        for mib in [0, 1, 10, 12] {
            let err = AllocationPlan::from_args(mib, 0, 500).unwrap_err();
            assert_eq!(
                err,
                ConfigError::BaseTooSmall {
                    requested_mib: mib,
                    floor_mib: 12
                }
            );
        }
    }

    #[test]
    fn test_effective_base_bytes() {
        let plan = AllocationPlan::from_args(20, 0, 500).unwrap();
        assert_eq!(plan.base_bytes, 8 * MIB);
        assert_eq!(plan.requested_mib, 20);

        let plan = AllocationPlan::from_args(13, 0, 500).unwrap();
        assert_eq!(plan.base_bytes, MIB);
    }

    #[test]
    fn test_large_request_does_not_overflow() {
        let plan = AllocationPlan::from_args(u32::MAX, 0, 500).unwrap();
        assert_eq!(plan.base_bytes, u64::from(u32::MAX - 12) * MIB);
    }

    #[test]
    fn test_zero_oscillation_disabled() {
        let plan = AllocationPlan::from_args(20, 0, 100).unwrap();
        assert!(plan.oscillation.is_none());
    }

    #[test]
    fn test_small_oscillation_rejected() {
        let err = AllocationPlan::from_args(20, 12, 500).unwrap_err();
        assert!(matches!(err, ConfigError::OscillationTooSmall { requested_mib: 12, .. }));
    }

    #[test]
    fn test_base_checked_before_oscillation() {
        let err = AllocationPlan::from_args(10, 5, 500).unwrap_err();
        assert!(matches!(err, ConfigError::BaseTooSmall { .. }));
    }

    #[test]
    fn test_oscillation_settings() {
        let plan = AllocationPlan::from_args(20, 15, 100).unwrap();
        assert_eq!(
            plan.oscillation,
            Some(OscillationSettings {
                mib: 15,
                period: Duration::from_millis(100)
            })
        );
    }

    #[test]
    fn test_oscillation_plan_timing() {
        let settings = OscillationSettings {
            mib: 15,
            period: Duration::from_millis(100),
        };
        let plan = OscillationPlan::new(PathBuf::from("/usr/bin/gpu-pressure"), settings);
        assert_eq!(plan.hold_time(), Duration::from_millis(400));
        assert_eq!(plan.cycle_time(), Duration::from_millis(500));
        assert_eq!(plan.child_args(), vec!["-m", "15"]);
    }

    #[test]
    fn test_current_exe_is_absolute() {
        let settings = OscillationSettings {
            mib: 20,
            period: Duration::from_millis(DEFAULT_OSCILLATE_TIME_MS),
        };
        let plan = OscillationPlan::for_current_exe(settings).unwrap();
        assert!(plan.program.is_absolute());
    }
}
