//! # Serra Core
//!
//! The deterministic scene engine for Serra.
//!
//! This crate holds everything that can be decided without touching the
//! network or the wall clock:
//! - The home model (zones, devices, outlets, sensors, readings)
//! - Scenes and their threshold rules
//! - The rule evaluator that turns readings into outlet decisions
//! - Automation sessions and the kill switch
//! - Snapshot formats and redb persistence
//!
//! Time is always passed in as a [`Timestamp`]. The app layer owns the clock.

pub mod condition;
pub mod engine;
pub mod formats;
pub mod home;
pub mod model;
pub mod report;
pub mod scene;
pub mod session;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use condition::{ConditionOutcome, MetricReading, SensorSnapshot, evaluate_condition};
pub use engine::{PlanInput, plan_scene};
pub use home::HomeState;
pub use model::{AuditEntry, Device, KillSwitch, Metric, Outlet, Reading, Sensor, Zone, ZoneMode};
pub use report::{
    DecisionKind, EvaluationReport, OutletDecision, OutletReport, RangeCheck, RuleTrace,
    ScenePlan, SwitchOutcome,
};
pub use scene::{
    Condition, Operator, RangePosition, RuleAction, Scene, SceneRule, SceneSettings, TargetRange,
};
pub use session::{AutomationSession, SessionStatus, SessionView};

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", $label, self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a physical zone (greenhouse, terrarium).
    ZoneId,
    "zone"
);
id_type!(
    /// Identifier of a power strip or other switchable device.
    DeviceId,
    "device"
);
id_type!(
    /// Identifier of a single switchable outlet on a device.
    OutletId,
    "outlet"
);
id_type!(SensorId, "sensor");
id_type!(ReadingId, "reading");
id_type!(
    /// Identifier of a scene (a named set of rules for one zone).
    SceneId,
    "scene"
);
id_type!(RuleId, "rule");
id_type!(SessionId, "session");
id_type!(AuditId, "audit entry");

// =============================================================================
// TIME
// =============================================================================

/// Whole seconds since the Unix epoch.
///
/// The core never reads the clock; callers pass the current time in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a timestamp from Unix seconds.
    #[must_use]
    pub const fn from_unix_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Unix seconds.
    #[must_use]
    pub const fn as_unix_secs(self) -> u64 {
        self.0
    }

    /// This timestamp moved forward by `secs`, saturating.
    #[must_use]
    pub const fn plus_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Seconds elapsed from `earlier` to `self`, or 0 if `earlier` is later.
    #[must_use]
    pub const fn saturating_secs_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Errors produced by the Serra core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerraError {
    /// A referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind ("zone", "scene", ...).
        kind: &'static str,
        /// The missing identifier.
        id: u64,
    },

    /// Input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The request conflicts with current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The kill switch is engaged; automation and switching are refused.
    #[error("kill switch is active, all operations are disabled")]
    KillSwitchActive,

    /// The scene exists but is not the active scene of its zone.
    #[error("scene {0} is not active")]
    SceneInactive(SceneId),

    /// No reading of any metric exists for the zone.
    #[error("no sensor data available for {0}")]
    NoSensorData(ZoneId),

    /// Snapshot encoding or decoding failed.
    #[error("format error: {0}")]
    Format(String),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl SerraError {
    pub(crate) fn not_found(kind: &'static str, id: u64) -> Self {
        Self::NotFound { kind, id }
    }
}

/// Result alias used across the core.
pub type Result<T> = std::result::Result<T, SerraError>;

// =============================================================================
// TESTS
// =============================================================================
