//! # Evaluation Reports
//!
//! Structured, explainable output of a scene evaluation.
//!
//! - Every rule is traced with the value it was decided on
//! - Every outlet of the zone gets exactly one decision and an explanation
//! - Metrics that could not be used are listed as unknowns

use crate::condition::{ConditionOutcome, SensorSnapshot};
use crate::model::Metric;
use crate::scene::{Condition, RangePosition, TargetRange};
use crate::{OutletId, RuleId, SceneId, Timestamp, ZoneId};
use serde::{Deserialize, Serialize};

// =============================================================================
// RULE TRACE
// =============================================================================

/// How one rule was evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTrace {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub priority: i32,
    pub condition: Condition,
    pub outcome: ConditionOutcome,
    /// Outlets this rule decided.
    pub claimed_outlets: Vec<OutletId>,
    /// Targets already decided by a higher-priority rule.
    pub shadowed_outlets: Vec<OutletId>,
    /// Targets that do not belong to the scene's zone.
    pub ignored_outlets: Vec<OutletId>,
}

impl RuleTrace {
    /// Whether the rule's condition held.
    #[must_use]
    pub fn matched(&self) -> bool {
        self.outcome.is_met()
    }
}

// =============================================================================
// OUTLET DECISIONS
// =============================================================================

/// What the engine decided for one outlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionKind {
    /// Switch the outlet to `to`.
    Switch { to: bool, rule: RuleId },
    /// A rule wants `state`, and the outlet is already there.
    Unchanged { state: bool, rule: RuleId },
    /// No matching rule targets this outlet.
    NoRule,
    /// The outlet is disabled and never switched by automation.
    Disabled,
    /// A manual override holds the outlet.
    ManualOverride { until: Option<Timestamp> },
}

impl DecisionKind {
    /// The state a rule asked for, if any rule decided this outlet.
    #[must_use]
    pub fn desired_state(&self) -> Option<bool> {
        match self {
            Self::Switch { to, .. } => Some(*to),
            Self::Unchanged { state, .. } => Some(*state),
            Self::NoRule | Self::Disabled | Self::ManualOverride { .. } => None,
        }
    }

    /// Whether the decision needs a command sent to the device.
    #[must_use]
    pub fn requires_switch(&self) -> bool {
        matches!(self, Self::Switch { .. })
    }
}

/// Decision for one outlet, with a readable explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutletDecision {
    pub outlet_id: OutletId,
    pub outlet_name: String,
    pub current_state: bool,
    pub decision: DecisionKind,
    pub explanation: String,
}

/// A metric compared against the scene's target range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeCheck {
    pub metric: Metric,
    pub observed: f64,
    pub range: TargetRange,
    pub position: RangePosition,
}

/// Pure result of planning a scene: nothing has been switched yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePlan {
    pub scene_id: SceneId,
    pub scene_name: String,
    pub zone: ZoneId,
    pub planned_at: Timestamp,
    pub snapshot: SensorSnapshot,
    pub rules: Vec<RuleTrace>,
    pub decisions: Vec<OutletDecision>,
    pub range_checks: Vec<RangeCheck>,
    /// Metrics that could not be used, with the reason.
    pub unknowns: Vec<String>,
}

impl ScenePlan {
    /// Decisions that need a device command.
    pub fn switches(&self) -> impl Iterator<Item = &OutletDecision> {
        self.decisions
            .iter()
            .filter(|d| d.decision.requires_switch())
    }

    /// Decision for a specific outlet.
    #[must_use]
    pub fn decision_for(&self, outlet: OutletId) -> Option<&OutletDecision> {
        self.decisions.iter().find(|d| d.outlet_id == outlet)
    }
}

// =============================================================================
// APPLIED REPORT
// =============================================================================

/// What happened when a decision was carried out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SwitchOutcome {
    /// The device accepted the command.
    Applied,
    /// The device refused or could not be reached.
    Failed { error: String },
    /// Nothing to send (no change, or a dry run).
    Skipped,
}

/// A decision together with its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutletReport {
    #[serde(flatten)]
    pub decision: OutletDecision,
    pub outcome: SwitchOutcome,
}

/// Full account of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub scene_id: SceneId,
    pub scene_name: String,
    pub zone: ZoneId,
    pub evaluated_at: Timestamp,
    pub dry_run: bool,
    pub snapshot: SensorSnapshot,
    pub rules: Vec<RuleTrace>,
    pub outlets: Vec<OutletReport>,
    pub range_checks: Vec<RangeCheck>,
    pub unknowns: Vec<String>,
}

impl EvaluationReport {
    /// Build a report from a plan, pairing each decision with its outcome.
    ///
    /// `outcome_for` is only consulted for switch decisions outside a dry run;
    /// everything else is reported as skipped.
    #[must_use]
    pub fn from_plan(
        plan: ScenePlan,
        dry_run: bool,
        mut outcome_for: impl FnMut(&OutletDecision) -> SwitchOutcome,
    ) -> Self {
        let outlets = plan
            .decisions
            .into_iter()
            .map(|decision| {
                let outcome = if dry_run || !decision.decision.requires_switch() {
                    SwitchOutcome::Skipped
                } else {
                    outcome_for(&decision)
                };
                OutletReport { decision, outcome }
            })
            .collect();

        Self {
            scene_id: plan.scene_id,
            scene_name: plan.scene_name,
            zone: plan.zone,
            evaluated_at: plan.planned_at,
            dry_run,
            snapshot: plan.snapshot,
            rules: plan.rules,
            outlets,
            range_checks: plan.range_checks,
            unknowns: plan.unknowns,
        }
    }

    /// Number of outlets actually switched.
    #[must_use]
    pub fn switched_count(&self) -> usize {
        self.outlets
            .iter()
            .filter(|o| o.outcome == SwitchOutcome::Applied)
            .count()
    }

    /// Number of switch commands that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outlets
            .iter()
            .filter(|o| matches!(o.outcome, SwitchOutcome::Failed { .. }))
            .count()
    }
}

// =============================================================================
// TESTS
// =============================================================================
