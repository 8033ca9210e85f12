//! Retry settings for the transport that carries tickets and batches.
//!
//! Nothing in this crate retries on its own. A [`RetryPolicy`] is a plain
//! value handed to whatever builds the channel; with the `serde` feature,
//! [`RetryPolicy::service_config`] renders it as a gRPC service config.

use crate::TransportCode;
use core::time::Duration;

/// Reasons a [`RetryPolicy`] is not usable.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RetryPolicyError {
    #[error("max_attempts must be at least 2, got {0}")]
    TooFewAttempts(u32),

    #[error("{0} must be greater than zero")]
    ZeroBackoff(&'static str),

    #[error("initial_backoff {initial:?} exceeds max_backoff {max:?}")]
    InvertedBackoff { initial: Duration, max: Duration },

    #[error("backoff_multiplier must be finite and positive, got {0}")]
    InvalidMultiplier(f64),

    #[error("no retryable codes")]
    NoRetryableCodes,
}

/// Exponential backoff retry policy.
///
/// Retry `n` (zero-based) waits `initial_backoff * backoff_multiplier^n`,
/// capped at `max_backoff`. `max_attempts` counts the original call.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub retryable_codes: Vec<TransportCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            retryable_codes: vec![TransportCode::Unavailable],
        }
    }
}

impl RetryPolicy {
    /// Same as [`RetryPolicy::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Total attempts including the first call.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the initial and maximum backoff.
    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Replaces the retryable set.
    #[must_use]
    pub fn with_retryable_codes(mut self, codes: impl IntoIterator<Item = TransportCode>) -> Self {
        self.retryable_codes = codes.into_iter().collect();
        self
    }

    /// Checks the policy against the limits gRPC enforces on service configs.
    ///
    /// # Errors
    ///
    /// Returns the first [`RetryPolicyError`] found.
    pub fn validate(&self) -> Result<(), RetryPolicyError> {
        if self.max_attempts < 2 {
            return Err(RetryPolicyError::TooFewAttempts(self.max_attempts));
        }
        if self.initial_backoff.is_zero() {
            return Err(RetryPolicyError::ZeroBackoff("initial_backoff"));
        }
        if self.max_backoff.is_zero() {
            return Err(RetryPolicyError::ZeroBackoff("max_backoff"));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(RetryPolicyError::InvertedBackoff {
                initial: self.initial_backoff,
                max: self.max_backoff,
            });
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier > 0.0) {
            return Err(RetryPolicyError::InvalidMultiplier(self.backoff_multiplier));
        }
        if self.retryable_codes.is_empty() {
            return Err(RetryPolicyError::NoRetryableCodes);
        }
        Ok(())
    }

    /// Whether `code` is in the retryable set.
    pub fn is_retryable(&self, code: TransportCode) -> bool {
        self.retryable_codes.contains(&code)
    }

    /// Whether a call that has already been attempted `attempts` times and
    /// failed with `code` may go again.
    pub fn should_retry(&self, attempts: u32, code: TransportCode) -> bool {
        attempts < self.max_attempts && self.is_retryable(code)
    }

    /// Upper bound on the wait before zero-based retry `retry`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exp);
        // Infinite, NaN and past-`Duration::MAX` waits all cap at `max_backoff`.
        Duration::try_from_secs_f64(secs.max(0.0))
            .map_or(self.max_backoff, |wait| wait.min(self.max_backoff))
    }

    /// Renders the policy as a gRPC service config applying to every method.
    #[cfg(feature = "serde")]
    pub fn service_config(&self) -> serde_json::Value {
        let codes: Vec<&str> = self
            .retryable_codes
            .iter()
            .map(|code| grpc_code_name(*code))
            .collect();

        serde_json::json!({
            "methodConfig": [{
                "name": [{}],
                "retryPolicy": {
                    "maxAttempts": self.max_attempts,
                    "initialBackoff": grpc_duration(self.initial_backoff),
                    "maxBackoff": grpc_duration(self.max_backoff),
                    "backoffMultiplier": self.backoff_multiplier,
                    "retryableStatusCodes": codes,
                }
            }]
        })
    }
}

/// Status code name matching the `tonic::Status` each [`TransportCode`] is
/// converted into.
#[cfg(feature = "serde")]
fn grpc_code_name(code: TransportCode) -> &'static str {
    match code {
        TransportCode::Unavailable => "UNAVAILABLE",
        TransportCode::Interrupted => "ABORTED",
        TransportCode::NotFound => "NOT_FOUND",
        TransportCode::Upstream => "INTERNAL",
    }
}

#[cfg(feature = "serde")]
fn grpc_duration(d: Duration) -> String {
    format!("{}s", d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.retryable_codes, vec![TransportCode::Unavailable]);
        assert_eq!(policy.validate(), Ok(()));
    }

    #[test]
    fn backoff_grows_then_caps() {
        let policy = RetryPolicy::default();
        let waits: Vec<u64> = (0..6).map(|n| policy.backoff(n).as_secs()).collect();
        assert_eq!(waits, vec![1, 2, 4, 8, 10, 10]);
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn backoff_never_panics_near_duration_max() {
        let policy = RetryPolicy::default().with_backoff(Duration::from_secs(1), Duration::MAX);
        assert_eq!(policy.validate(), Ok(()));
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(100), Duration::MAX);
        assert_eq!(policy.backoff(u32::MAX), Duration::MAX);
    }

    #[test]
    fn only_listed_codes_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1, TransportCode::Unavailable));
        assert!(policy.should_retry(4, TransportCode::Unavailable));
        assert!(!policy.should_retry(5, TransportCode::Unavailable));
        assert!(!policy.should_retry(1, TransportCode::NotFound));

        let policy = policy.with_retryable_codes([TransportCode::Interrupted]);
        assert!(policy.should_retry(1, TransportCode::Interrupted));
        assert!(!policy.should_retry(1, TransportCode::Unavailable));
    }

    #[test]
    fn validate_rejects_unusable_policies() {
        let base = RetryPolicy::default();
        assert_eq!(
            base.clone().with_max_attempts(1).validate(),
            Err(RetryPolicyError::TooFewAttempts(1))
        );
        assert_eq!(
            base.clone()
                .with_backoff(Duration::ZERO, Duration::from_secs(1))
                .validate(),
            Err(RetryPolicyError::ZeroBackoff("initial_backoff"))
        );
        assert!(matches!(
            base.clone()
                .with_backoff(Duration::from_secs(5), Duration::from_secs(1))
                .validate(),
            Err(RetryPolicyError::InvertedBackoff { .. })
        ));
        assert!(matches!(
            base.clone().with_backoff_multiplier(f64::NAN).validate(),
            Err(RetryPolicyError::InvalidMultiplier(_))
        ));
        assert_eq!(
            base.with_retryable_codes([]).validate(),
            Err(RetryPolicyError::NoRetryableCodes)
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn service_config_matches_grpc_layout() {
        let config = RetryPolicy::default().service_config();
        let retry = &config["methodConfig"][0]["retryPolicy"];
        assert_eq!(retry["maxAttempts"], 5);
        assert_eq!(retry["initialBackoff"], "1s");
        assert_eq!(retry["maxBackoff"], "10s");
        assert_eq!(retry["backoffMultiplier"], 2.0);
        assert_eq!(retry["retryableStatusCodes"], serde_json::json!(["UNAVAILABLE"]));
        assert_eq!(config["methodConfig"][0]["name"], serde_json::json!([{}]));

        let fast = RetryPolicy::default()
            .with_backoff(Duration::from_millis(250), Duration::from_secs(2));
        assert_eq!(
            fast.service_config()["methodConfig"][0]["retryPolicy"]["initialBackoff"],
            "0.25s"
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_attempts":3,"retryable_codes":["interrupted"]}"#)
                .unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.retryable_codes, vec![TransportCode::Interrupted]);
        assert_eq!(policy.max_backoff, Duration::from_secs(10));
    }
}
