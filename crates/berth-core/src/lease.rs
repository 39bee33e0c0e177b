//! TTL lease policy.

use std::time::Duration;

use crate::config::ConfigError;

/// Machine presence TTL.
pub const MACHINE_TTL: Duration = Duration::from_secs(600);
/// Container record TTL.
pub const CONTAINER_TTL: Duration = Duration::from_secs(60);
/// Time subtracted from a TTL to get the re-assertion cadence.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(10);

/// A TTL and the margin by which re-assertion precedes expiry.
///
/// Construction guarantees `0 < safety_margin < ttl`, so the re-assertion
/// interval is always strictly shorter than the lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasePolicy {
    ttl: Duration,
    safety_margin: Duration,
}

impl LeasePolicy {
    pub fn new(ttl: Duration, safety_margin: Duration) -> Result<Self, ConfigError> {
        if safety_margin.is_zero() {
            return Err(ConfigError::Invalid(
                "lease safety margin must be greater than zero".to_string(),
            ));
        }
        if safety_margin >= ttl {
            return Err(ConfigError::Invalid(format!(
                "lease safety margin {safety_margin:?} must be shorter than ttl {ttl:?}"
            )));
        }
        Ok(Self { ttl, safety_margin })
    }

    pub fn machine() -> Self {
        Self {
            ttl: MACHINE_TTL,
            safety_margin: SAFETY_MARGIN,
        }
    }

    pub fn container() -> Self {
        Self {
            ttl: CONTAINER_TTL,
            safety_margin: SAFETY_MARGIN,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Sleep between two writes of the same record.
    pub fn reassert_interval(&self) -> Duration {
        self.ttl - self.safety_margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_policies() {
        assert_eq!(LeasePolicy::machine().reassert_interval(), Duration::from_secs(590));
        assert_eq!(LeasePolicy::container().reassert_interval(), Duration::from_secs(50));
    }

    #[test]
    fn interval_is_always_shorter_than_ttl() {
        for (ttl, margin) in [(60, 10), (600, 10), (2, 1), (3600, 3599)] {
            let policy =
                LeasePolicy::new(Duration::from_secs(ttl), Duration::from_secs(margin)).unwrap();
            assert!(policy.reassert_interval() < policy.ttl());
            assert!(!policy.reassert_interval().is_zero());
        }
    }

    #[test]
    fn zero_margin_is_rejected() {
        let err = LeasePolicy::new(Duration::from_secs(60), Duration::ZERO).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn margin_not_shorter_than_ttl_is_rejected() {
        assert!(LeasePolicy::new(Duration::from_secs(60), Duration::from_secs(60)).is_err());
        assert!(LeasePolicy::new(Duration::from_secs(10), Duration::from_secs(30)).is_err());
    }
}
