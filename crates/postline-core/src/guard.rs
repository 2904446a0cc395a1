use crate::state::RotationState;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

pub const DEFAULT_MIN_INTERVAL_HOURS: u32 = 6;

/// Result of a guard check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    Allowed,
    TooEarly { remaining_hours: f64 },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allowed)
    }

    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GuardDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardDecision::Allowed => f.write_str("OK"),
            GuardDecision::TooEarly { remaining_hours } => {
                write!(f, "Too early: wait another {remaining_hours:.1} hours")
            }
        }
    }
}

/// Minimum real-time interval between two publications.
#[derive(Debug, Clone, Copy)]
pub struct PublishGuard {
    min_interval: Duration,
}

impl Default for PublishGuard {
    fn default() -> Self {
        Self::from_hours(DEFAULT_MIN_INTERVAL_HOURS)
    }
}

impl PublishGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn from_hours(hours: u32) -> Self {
        Self::new(Duration::hours(i64::from(hours)))
    }

    pub fn can_publish(&self, state: &RotationState, now: DateTime<Utc>) -> GuardDecision {
        let Some(last) = state.last_published_at else {
            return GuardDecision::Allowed;
        };
        let elapsed = now - last;
        if elapsed < self.min_interval {
            let remaining = self.min_interval - elapsed;
            GuardDecision::TooEarly {
                remaining_hours: remaining.num_seconds() as f64 / 3600.0,
            }
        } else {
            GuardDecision::Allowed
        }
    }
}
