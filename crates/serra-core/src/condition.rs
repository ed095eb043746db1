//! # Condition Evaluation
//!
//! Checks a rule condition against the latest readings of a zone.
//!
//! - Every outcome carries the value it was decided on
//! - Missing readings never satisfy a condition
//! - Readings older than the staleness window are treated as missing
//! - Readings dated ahead of the clock are never trusted

use crate::model::Metric;
use crate::scene::Condition;
use crate::{SensorId, Timestamp};
use serde::{Deserialize, Serialize};

/// Default age after which a reading no longer counts, in seconds.
pub const DEFAULT_STALE_AFTER_SECS: u64 = 600;

/// How far ahead of the server clock a reading may be dated, in seconds.
pub const MAX_CLOCK_SKEW_SECS: u64 = 60;

/// The most recent value of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub value: f64,
    pub observed_at: Timestamp,
    pub sensor: SensorId,
}

impl MetricReading {
    /// The outcome that rules this reading out at `now`, if any.
    #[must_use]
    pub fn rejection(
        &self,
        metric: Metric,
        now: Timestamp,
        stale_after_secs: u64,
    ) -> Option<ConditionOutcome> {
        let ahead_secs = self.observed_at.saturating_secs_since(now);
        if ahead_secs > MAX_CLOCK_SKEW_SECS {
            return Some(ConditionOutcome::Future { metric, ahead_secs });
        }
        let age_secs = now.saturating_secs_since(self.observed_at);
        (age_secs > stale_after_secs).then_some(ConditionOutcome::Stale { metric, age_secs })
    }
}

/// Latest readings of a zone, one per metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub temperature: Option<MetricReading>,
    pub humidity: Option<MetricReading>,
}

impl SensorSnapshot {
    /// Reading for a metric, if any.
    #[must_use]
    pub fn get(&self, metric: Metric) -> Option<MetricReading> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
        }
    }

    /// Store a reading, keeping whichever is newer.
    pub fn offer(&mut self, metric: Metric, reading: MetricReading) {
        let slot = match metric {
            Metric::Temperature => &mut self.temperature,
            Metric::Humidity => &mut self.humidity,
        };
        match slot {
            Some(existing) if existing.observed_at > reading.observed_at => {}
            _ => *slot = Some(reading),
        }
    }

    /// True when no metric has a reading.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none()
    }
}

/// Result of checking one condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConditionOutcome {
    /// The reading satisfies the condition.
    Met { observed: f64 },
    /// The reading does not satisfy the condition.
    NotMet { observed: f64 },
    /// No reading exists for the metric.
    Missing { metric: Metric },
    /// The latest reading is too old to act on.
    Stale { metric: Metric, age_secs: u64 },
    /// The latest reading is dated after `now`, beyond the allowed skew.
    Future { metric: Metric, ahead_secs: u64 },
}

impl ConditionOutcome {
    /// Whether the rule should fire.
    #[must_use]
    pub fn is_met(&self) -> bool {
        matches!(self, Self::Met { .. })
    }

    /// The value the decision was made on, if one was usable.
    #[must_use]
    pub fn observed(&self) -> Option<f64> {
        match self {
            Self::Met { observed } | Self::NotMet { observed } => Some(*observed),
            Self::Missing { .. } | Self::Stale { .. } | Self::Future { .. } => None,
        }
    }
}

/// Evaluate `condition` against `snapshot` at `now`.
///
/// A reading is stale when it is more than `stale_after_secs` old. A
/// reading dated more than [`MAX_CLOCK_SKEW_SECS`] ahead of `now` fails the
/// same way.
#[must_use]
pub fn evaluate_condition(
    condition: &Condition,
    snapshot: &SensorSnapshot,
    now: Timestamp,
    stale_after_secs: u64,
) -> ConditionOutcome {
    let Some(reading) = snapshot.get(condition.metric) else {
        return ConditionOutcome::Missing {
            metric: condition.metric,
        };
    };

    if let Some(rejected) = reading.rejection(condition.metric, now, stale_after_secs) {
        return rejected;
    }

    if condition.operator.compare(reading.value, condition.value) {
        ConditionOutcome::Met {
            observed: reading.value,
        }
    } else {
        ConditionOutcome::NotMet {
            observed: reading.value,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
