//! Execution unit configuration and validation.
//!
//! [`UnitConfig`] is supplied when a unit is spawned.
//! [`validate()`](UnitConfig::validate) rejects values that would make the
//! tick loop spin, stall, or never start.

use std::time::Duration;

use thiserror::Error;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by [`UnitConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// `tick_rate_hz` is NaN, infinite, zero, or negative.
    #[error("tick_rate_hz must be finite and positive, got {value}")]
    InvalidTickRate {
        /// The invalid value.
        value: f64,
    },
    /// `max_dt` is zero.
    #[error("max_dt must be greater than zero")]
    ZeroMaxDt,
    /// `inbox_capacity` is zero.
    #[error("inbox_capacity must be greater than zero")]
    ZeroInbox,
    /// `max_consecutive_failures` is zero.
    #[error("max_consecutive_failures must be greater than zero")]
    ZeroFailureBudget,
    /// The thread name is empty or contains a NUL byte.
    #[error("invalid unit name {name:?}")]
    InvalidName {
        /// The offending name.
        name: String,
    },
}

// ── UnitConfig ─────────────────────────────────────────────────────

/// Configuration of one execution unit.
#[derive(Clone, Debug)]
pub struct UnitConfig {
    /// Thread and span name. Default: `"trine-unit"`.
    pub name: String,
    /// Target tick rate. Default: 60.
    pub tick_rate_hz: f64,
    /// Upper clamp on the per-tick `dt`. Default: 250 ms.
    pub max_dt: Duration,
    /// Subtracted from the sleep remainder after each tick. Default: 4 ms.
    pub tick_slack: Duration,
    /// Capacity of the bounded inbox. Default: 1024.
    pub inbox_capacity: usize,
    /// Longest a `block_on` during module init may wait. Default: 5 s.
    pub init_timeout: Duration,
    /// Consecutive failed ticks tolerated before the unit fails. Default: 3.
    pub max_consecutive_failures: u32,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            name: "trine-unit".to_string(),
            tick_rate_hz: 60.0,
            max_dt: Duration::from_millis(250),
            tick_slack: Duration::from_millis(4),
            inbox_capacity: 1024,
            init_timeout: Duration::from_secs(5),
            max_consecutive_failures: 3,
        }
    }
}

impl UnitConfig {
    /// Default configuration with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tick_rate_hz.is_finite() || self.tick_rate_hz <= 0.0 {
            return Err(ConfigError::InvalidTickRate {
                value: self.tick_rate_hz,
            });
        }
        if self.max_dt.is_zero() {
            return Err(ConfigError::ZeroMaxDt);
        }
        if self.inbox_capacity == 0 {
            return Err(ConfigError::ZeroInbox);
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::ZeroFailureBudget);
        }
        if self.name.is_empty() || self.name.contains('\0') {
            return Err(ConfigError::InvalidName {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Wall-clock budget of one tick.
    pub fn tick_budget(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz)
    }

    /// Sleep after a tick that took `frame`:
    /// `max(budget - frame - tick_slack, 0)`.
    pub fn remainder(&self, frame: Duration) -> Duration {
        self.tick_budget()
            .saturating_sub(frame)
            .saturating_sub(self.tick_slack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(UnitConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_tick_rates() {
        for value in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let cfg = UnitConfig {
                tick_rate_hz: value,
                ..UnitConfig::default()
            };
            assert!(matches!(
                cfg.validate(),
                Err(ConfigError::InvalidTickRate { .. })
            ));
        }
    }

    #[test]
    fn rejects_zero_sizes() {
        let cfg = UnitConfig {
            inbox_capacity: 0,
            ..UnitConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroInbox));

        let cfg = UnitConfig {
            max_dt: Duration::ZERO,
            ..UnitConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroMaxDt));

        let cfg = UnitConfig {
            max_consecutive_failures: 0,
            ..UnitConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroFailureBudget));
    }

    #[test]
    fn rejects_nul_in_name() {
        let cfg = UnitConfig::named("game\0");
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidName { .. })));
    }

    #[test]
    fn remainder_saturates_at_zero() {
        let cfg = UnitConfig {
            tick_rate_hz: 50.0,
            tick_slack: Duration::from_millis(4),
            ..UnitConfig::default()
        };
        assert_eq!(cfg.remainder(Duration::from_millis(6)), Duration::from_millis(10));
        assert_eq!(cfg.remainder(Duration::from_millis(30)), Duration::ZERO);
    }
}
