//! Retry delays for the `*Error` states.
//!
//! The delay ramps linearly from the minimum to the maximum delay over the configured
//! number of iterations and stays at the maximum afterwards. Retries stop once the
//! iteration count reaches `maxIterations` or the `until` deadline has passed.
use crate::apis::backup_types::{BackoffSpec, BackoffStatus, MAX_BACKOFF_DELAY_SECONDS};
use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_MIN_DELAY: i64 = 30;
pub const DEFAULT_MAX_DELAY: i64 = 600;
pub const DEFAULT_ITERATIONS: i64 = 5;

impl BackoffSpec {
    /// Maximum delay in seconds
    pub fn get_max_delay(&self) -> i64 {
        self.max_delay
            .unwrap_or(DEFAULT_MAX_DELAY)
            .clamp(0, MAX_BACKOFF_DELAY_SECONDS)
    }

    /// Minimum delay in seconds, never above the maximum delay
    pub fn get_min_delay(&self) -> i64 {
        self.min_delay
            .unwrap_or(DEFAULT_MIN_DELAY)
            .max(0)
            .min(self.get_max_delay())
    }

    pub fn get_iterations(&self) -> i64 {
        self.iterations.unwrap_or(DEFAULT_ITERATIONS).max(1)
    }

    /// Delay before the retry following `iteration` failed attempts.
    pub fn backoff(&self, iteration: i64) -> Duration {
        let iterations = self.get_iterations();
        let max = self.get_max_delay();
        if iteration >= iterations {
            return Duration::seconds(max);
        }
        let min = self.get_min_delay();
        let iteration = i128::from(iteration.max(0));
        let ramp = i128::from(max - min) * iteration / i128::from(iterations);
        Duration::seconds(min + ramp as i64)
    }
}

impl BackoffStatus {
    /// Whether another attempt may be scheduled
    pub fn should_backoff(&self, spec: Option<&BackoffSpec>) -> bool {
        self.should_backoff_at(spec, Utc::now())
    }

    pub fn should_backoff_at(&self, spec: Option<&BackoffSpec>, now: DateTime<Utc>) -> bool {
        let Some(spec) = spec else {
            return true;
        };
        if let Some(until) = spec.until {
            if now > until {
                return false;
            }
        }
        match spec.max_iterations {
            Some(max) => self.iterations < max,
            None => true,
        }
    }

    /// Whether the next retry is due
    pub fn should_retry(&self) -> bool {
        self.should_retry_at(Utc::now())
    }

    pub fn should_retry_at(&self, now: DateTime<Utc>) -> bool {
        self.next.map_or(true, |next| now >= next)
    }

    /// Records one more failed attempt and schedules the next retry.
    pub fn backoff(&self, spec: Option<&BackoffSpec>) -> BackoffStatus {
        self.backoff_at(spec, Utc::now())
    }

    pub fn backoff_at(&self, spec: Option<&BackoffSpec>, now: DateTime<Utc>) -> BackoffStatus {
        if !self.should_backoff_at(spec, now) {
            return self.clone();
        }
        let defaults = BackoffSpec::default();
        let policy = spec.unwrap_or(&defaults);
        let mut next = match now.checked_add_signed(policy.backoff(self.iterations)) {
            Some(next) => next,
            None => policy.until.unwrap_or(now),
        };
        if let Some(until) = policy.until {
            next = next.min(until);
        }
        BackoffStatus {
            iterations: self.iterations.saturating_add(1),
            next: Some(next),
        }
    }
}
