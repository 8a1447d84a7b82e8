//! Scheduler configuration and its startup validation.
//!
//! The allocation pass never validates configuration at run time; a bad
//! configuration is a setup error and must be rejected before the first
//! hour runs. The app binary calls [`SchedulerConfig::validate`] right
//! after loading a scenario, and scenario application does the same for
//! overrides embedded in scenario files.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum amount of water considered worth transferring. Deficits,
/// surpluses, and transfer amounts at or below this are treated as zero.
pub const DEFAULT_EPSILON: f32 = 1e-3;

/// Fraction of a donor region's capacity kept as an untouchable buffer so
/// that donating never creates a new deficit relative to its need.
pub const DEFAULT_SAFETY_MARGIN: f32 = 0.10;

/// Cap on transfer-loop iterations per hour, guarding against thrashing
/// when a need is re-popped forever with no eligible donor.
pub const DEFAULT_MAX_TRANSFER_LOOPS: u32 = 1000;

/// Default hour budget for a run (one simulated week).
pub const DEFAULT_MAX_HOURS: u64 = 168;

/// Tunable parameters of the allocation scheduler.
///
/// Defaults match the constants above; scenario files may override any of
/// them via their `scheduler` block.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Negligibility threshold for deficits, surpluses, and transfers.
    pub epsilon: f32,
    /// Donor safety buffer as a fraction of region capacity.
    pub safety_margin: f32,
    /// Maximum transfer-loop iterations per hour.
    pub max_transfer_loops: u32,
    /// Maximum number of hours the driver will simulate.
    pub max_hours: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            max_transfer_loops: DEFAULT_MAX_TRANSFER_LOOPS,
            max_hours: DEFAULT_MAX_HOURS,
        }
    }
}

impl SchedulerConfig {
    /// Check the configuration invariants: the loop cap and hour budget must
    /// be positive, the threshold and safety margin non-negative and finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(ConfigError::NegativeEpsilon(self.epsilon));
        }
        if !self.safety_margin.is_finite() || self.safety_margin < 0.0 {
            return Err(ConfigError::NegativeSafetyMargin(self.safety_margin));
        }
        if self.max_transfer_loops == 0 {
            return Err(ConfigError::ZeroLoopCap);
        }
        if self.max_hours == 0 {
            return Err(ConfigError::ZeroHourBudget);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Configuration invariant violations, rejected at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The negligibility threshold is negative or not finite.
    NegativeEpsilon(f32),
    /// The safety margin fraction is negative or not finite.
    NegativeSafetyMargin(f32),
    /// The transfer-loop cap is zero.
    ZeroLoopCap,
    /// The hour budget is zero.
    ZeroHourBudget,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NegativeEpsilon(v) => {
                write!(f, "epsilon must be a non-negative finite number, got {v}")
            }
            ConfigError::NegativeSafetyMargin(v) => {
                write!(
                    f,
                    "safety margin must be a non-negative finite fraction, got {v}"
                )
            }
            ConfigError::ZeroLoopCap => write!(f, "max_transfer_loops must be at least 1"),
            ConfigError::ZeroHourBudget => write!(f, "max_hours must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = SchedulerConfig::default();
        assert!((config.epsilon - 1e-3).abs() < f32::EPSILON);
        assert!((config.safety_margin - 0.10).abs() < f32::EPSILON);
        assert_eq!(config.max_transfer_loops, 1000);
        assert_eq!(config.max_hours, 168);
    }

    #[test]
    fn test_negative_epsilon_rejected() {
        let config = SchedulerConfig {
            epsilon: -1.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NegativeEpsilon(-1.0)));
    }

    #[test]
    fn test_nan_epsilon_rejected() {
        let config = SchedulerConfig {
            epsilon: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NegativeEpsilon(_))
        ));
    }

    #[test]
    fn test_negative_margin_rejected() {
        let config = SchedulerConfig {
            safety_margin: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NegativeSafetyMargin(_))
        ));
    }

    #[test]
    fn test_zero_loop_cap_rejected() {
        let config = SchedulerConfig {
            max_transfer_loops: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroLoopCap));
    }

    #[test]
    fn test_zero_hour_budget_rejected() {
        let config = SchedulerConfig {
            max_hours: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroHourBudget));
    }

    #[test]
    fn test_zero_epsilon_and_margin_allowed() {
        let config = SchedulerConfig {
            epsilon: 0.0,
            safety_margin: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::ZeroLoopCap;
        assert_eq!(err.to_string(), "max_transfer_loops must be at least 1");
    }

    #[test]
    fn test_partial_json_override_keeps_defaults() {
        let config: SchedulerConfig = serde_json::from_str(r#"{"max_hours": 24}"#)
            .expect("partial scheduler block should deserialize");
        assert_eq!(config.max_hours, 24);
        assert!((config.epsilon - DEFAULT_EPSILON).abs() < f32::EPSILON);
        assert_eq!(config.max_transfer_loops, DEFAULT_MAX_TRANSFER_LOOPS);
    }
}
