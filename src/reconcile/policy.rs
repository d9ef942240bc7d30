use std::time::Duration;

/// Tuning knobs for the reconciliation loop.
///
/// The defaults (poll every 5 s, fall back to direct verification after 3
/// attempts, give up after 12) are product-tuned starting points, not
/// load-bearing constants; deployments override them per environment.
#[derive(Debug, Clone)]
pub struct ReconcilePolicy {
    /// Interval between poll ticks against the record store.
    pub poll_interval: Duration,
    /// Attempt number from which each still-pending tick also performs a
    /// direct gateway verification.
    pub fallback_after_attempts: u32,
    /// Hard cap on attempts; crossing it yields `TimedOut` regardless of the
    /// pending state. Bounds the interactive wall-clock wait, not the
    /// payment itself.
    pub max_attempts: u32,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            fallback_after_attempts: 3,
            max_attempts: 12,
        }
    }
}

impl ReconcilePolicy {
    pub fn from_env() -> Self {
        let mut policy = Self::default();
        policy.poll_interval = Duration::from_secs(
            std::env::var("RECONCILE_POLL_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(policy.poll_interval.as_secs()),
        );
        policy.fallback_after_attempts = std::env::var("RECONCILE_FALLBACK_AFTER_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(policy.fallback_after_attempts);
        policy.max_attempts = std::env::var("RECONCILE_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(policy.max_attempts);
        policy
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("RECONCILE_POLL_INTERVAL_SECONDS cannot be 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("RECONCILE_MAX_ATTEMPTS cannot be 0".to_string());
        }
        if self.fallback_after_attempts > self.max_attempts {
            return Err(
                "RECONCILE_FALLBACK_AFTER_ATTEMPTS must be <= RECONCILE_MAX_ATTEMPTS".to_string(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_validates() {
        let policy = ReconcilePolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.poll_interval, Duration::from_secs(5));
        assert_eq!(policy.fallback_after_attempts, 3);
        assert_eq!(policy.max_attempts, 12);
    }

    #[test]
    fn fallback_threshold_past_the_cap_is_rejected() {
        let policy = ReconcilePolicy {
            poll_interval: Duration::from_secs(5),
            fallback_after_attempts: 20,
            max_attempts: 12,
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let policy = ReconcilePolicy {
            poll_interval: Duration::ZERO,
            ..ReconcilePolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
