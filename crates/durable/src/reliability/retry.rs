//! Retry policy implementation

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the delay between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles with every retry
    Exponential,
}

impl std::fmt::Display for BackoffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Exponential => write!(f, "exponential"),
        }
    }
}

impl std::str::FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!("unknown backoff kind: {other}")),
        }
    }
}

/// Retry policy attached to every enqueued job
///
/// Declared once per job type and carried with the job, so the queue can
/// decide on its own whether a failed attempt is requeued or terminal.
///
/// # Example
///
/// ```
/// use placecrawl_durable::{BackoffKind, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential(4, Duration::from_secs(1));
/// assert_eq!(policy.backoff, BackoffKind::Exponential);
///
/// // Delay before the second attempt is the base delay, then it doubles
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including initial)
    pub max_attempts: u32,

    /// Backoff growth
    pub backoff: BackoffKind,

    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,

    /// Upper bound for any single delay; unbounded when unset
    #[serde(default, with = "option_duration_millis")]
    pub max_delay: Option<Duration>,

    /// Jitter factor (0.0-1.0). Zero keeps exponential delays strictly increasing.
    #[serde(default)]
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Exponential backoff starting at `base_delay`
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: BackoffKind::Exponential,
            base_delay,
            max_delay: None,
            jitter: 0.0,
        }
    }

    /// Same delay before every retry
    pub fn fixed(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: BackoffKind::Fixed,
            base_delay,
            max_delay: None,
            jitter: 0.0,
        }
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffKind::Fixed,
            base_delay: Duration::ZERO,
            max_delay: None,
            jitter: 0.0,
        }
    }

    /// Build a policy from its three named parts
    pub fn new(max_attempts: u32, backoff: BackoffKind, base_delay: Duration) -> Self {
        match backoff {
            BackoffKind::Exponential => Self::exponential(max_attempts, base_delay),
            BackoffKind::Fixed => Self::fixed(base_delay, max_attempts),
        }
    }

    /// Set the maximum number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Cap every single delay at `delay`
    ///
    /// Exponential delays stop growing once they reach the cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the jitter factor (0.0-1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Calculate delay for a given attempt number (1-based)
    ///
    /// Returns the duration to wait before that attempt starts. The first
    /// attempt never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let retry_num = attempt - 1;
        let base = match self.backoff {
            BackoffKind::Fixed => self.base_delay.as_secs_f64(),
            BackoffKind::Exponential => {
                let exponent = i32::try_from(retry_num - 1).unwrap_or(i32::MAX);
                self.base_delay.as_secs_f64() * 2f64.powi(exponent)
            }
        };
        let capped = match self.max_delay {
            Some(max) => base.min(max.as_secs_f64()),
            None => base,
        };

        let jittered = if self.jitter > 0.0 && capped > 0.0 && capped.is_finite() {
            let mut rng = rand::thread_rng();
            let jitter_range = capped * self.jitter;
            let jitter_offset = rng.gen_range(-jitter_range..jitter_range);
            (capped + jitter_offset).max(0.0)
        } else {
            capped
        };

        Duration::try_from_secs_f64(jittered).unwrap_or(Duration::MAX)
    }

    /// Check if there are remaining attempts
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde support for an optional Duration as milliseconds
pub(crate) mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, BackoffKind::Exponential);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.jitter, 0.0);
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.has_attempts_remaining(1));
    }

    #[test]
    fn test_fixed_interval() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5), 3);

        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_delays_strictly_increase() {
        let policy = RetryPolicy::exponential(6, Duration::from_millis(100));

        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        let delays: Vec<_> = (2..=6).map(|a| policy.delay_for_attempt(a)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_exponential_is_uncapped_by_default() {
        let policy = RetryPolicy::exponential(8, Duration::from_secs(60));

        assert_eq!(policy.max_delay, None);
        let delays: Vec<_> = (2..=8).map(|a| policy.delay_for_attempt(a)).collect();
        assert_eq!(delays[6], Duration::from_secs(3840));
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = RetryPolicy::exponential(u32::MAX, Duration::from_secs(1));

        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy::exponential(20, Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));

        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::fixed(Duration::from_secs(10), 3).with_jitter(0.1);

        for _ in 0..50 {
            let delay = policy.delay_for_attempt(2);
            assert!(delay >= Duration::from_secs(9));
            assert!(delay <= Duration::from_secs(11));
        }
    }

    #[test]
    fn test_has_attempts_remaining() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1));

        assert!(policy.has_attempts_remaining(1));
        assert!(policy.has_attempts_remaining(2));
        assert!(!policy.has_attempts_remaining(3));
    }

    #[test]
    fn test_backoff_kind_parse() {
        assert_eq!("Fixed".parse::<BackoffKind>(), Ok(BackoffKind::Fixed));
        assert_eq!(
            "exponential".parse::<BackoffKind>(),
            Ok(BackoffKind::Exponential)
        );
        assert!("linear".parse::<BackoffKind>().is_err());
    }

    #[test]
    fn test_serialization() {
        let policy = RetryPolicy::fixed(Duration::from_millis(250), 4);

        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["backoff"], "fixed");
        assert_eq!(json["base_delay"], 250);
        assert_eq!(json["max_delay"], serde_json::Value::Null);

        let capped = RetryPolicy::exponential(5, Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(30));
        let json = serde_json::to_value(&capped).unwrap();
        assert_eq!(json["max_delay"], 30_000);
        let parsed: RetryPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(capped, parsed);

        let json = serde_json::to_value(&policy).unwrap();

        let parsed: RetryPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(policy, parsed);
    }
}
