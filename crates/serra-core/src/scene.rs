//! # Scenes and Rules
//!
//! A scene is a named profile for one zone ("tropical day", "winter rest").
//! Each scene owns threshold rules of the form
//! `IF <metric> <operator> <value> THEN switch outlets on/off`.
//!
//! The wire format of conditions and actions matches what the dashboard
//! sends:
//!
//! ```json
//! {"condition": "temperature", "operator": ">=", "value": 28.0}
//! {"on": {"3": true}, "off": {"4": true}}
//! ```

use crate::model::Metric;
use crate::{OutletId, Result, RuleId, SceneId, SerraError, ZoneId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// SCENE
// =============================================================================

/// Target band for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRange {
    pub min: f64,
    pub max: f64,
}

/// Where a value falls relative to a [`TargetRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePosition {
    Below,
    Within,
    Above,
}

impl TargetRange {
    /// Classify a value against the inclusive range.
    #[must_use]
    pub fn classify(&self, value: f64) -> RangePosition {
        if value < self.min {
            RangePosition::Below
        } else if value > self.max {
            RangePosition::Above
        } else {
            RangePosition::Within
        }
    }

    fn validate(&self, label: &str) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(SerraError::Validation(format!(
                "{label} bounds must be finite numbers"
            )));
        }
        if self.min > self.max {
            return Err(SerraError::Validation(format!(
                "{label} min {} is greater than max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Descriptive settings of a scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSettings {
    #[serde(default)]
    pub temperature_range: Option<TargetRange>,
    #[serde(default)]
    pub humidity_range: Option<TargetRange>,
    /// Species kept in the zone while this scene runs.
    #[serde(default)]
    pub plants_animals: Vec<String>,
    #[serde(default)]
    pub habitat_type: Option<String>,
}

impl SceneSettings {
    /// Target range configured for a metric, if any.
    #[must_use]
    pub fn range_for(&self, metric: Metric) -> Option<TargetRange> {
        match metric {
            Metric::Temperature => self.temperature_range,
            Metric::Humidity => self.humidity_range,
        }
    }
}

/// A named rule set for one zone. At most one scene per zone is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    pub zone: ZoneId,
    pub name: String,
    pub slug: String,
    pub settings: SceneSettings,
    pub active: bool,
}

/// Validate the user-editable fields of a scene.
pub fn validate_scene_fields(name: &str, slug: &str, settings: &SceneSettings) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SerraError::Validation("scene name must not be empty".into()));
    }
    if slug.trim().is_empty() {
        return Err(SerraError::Validation("scene slug must not be empty".into()));
    }
    if let Some(range) = &settings.temperature_range {
        range.validate("temperature_range")?;
    }
    if let Some(range) = &settings.humidity_range {
        range.validate("humidity_range")?;
    }
    Ok(())
}

// =============================================================================
// CONDITION
// =============================================================================

/// Comparison operator, serialized as its symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "==")]
    Equal,
}

impl Operator {
    /// Apply the operator as `observed <op> threshold`.
    ///
    /// `Equal` is exact; NaN never compares true.
    #[must_use]
    pub fn compare(self, observed: f64, threshold: f64) -> bool {
        match self {
            Self::LessOrEqual => observed <= threshold,
            Self::GreaterOrEqual => observed >= threshold,
            Self::Less => observed < threshold,
            Self::Greater => observed > threshold,
            Self::Equal => observed == threshold,
        }
    }

    /// The operator symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::LessOrEqual => "<=",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::Greater => ">",
            Self::Equal => "==",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `metric operator value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "condition")]
    pub metric: Metric,
    pub operator: Operator,
    pub value: f64,
}

impl Condition {
    #[must_use]
    pub fn new(metric: Metric, operator: Operator, value: f64) -> Self {
        Self {
            metric,
            operator,
            value,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}{}",
            self.metric,
            self.operator,
            self.value,
            self.metric.unit()
        )
    }
}

// =============================================================================
// ACTION
// =============================================================================

/// Outlets to switch when a rule matches.
///
/// Only entries set to `true` are targets; `false` entries are kept so the
/// dashboard can round-trip its checkboxes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(default)]
    pub on: BTreeMap<OutletId, bool>,
    #[serde(default)]
    pub off: BTreeMap<OutletId, bool>,
}

impl RuleAction {
    /// Build an action from explicit on/off target lists.
    #[must_use]
    pub fn switching(on: &[OutletId], off: &[OutletId]) -> Self {
        Self {
            on: on.iter().map(|id| (*id, true)).collect(),
            off: off.iter().map(|id| (*id, true)).collect(),
        }
    }

    /// Every targeted outlet with its desired state, `on` targets first.
    pub fn targets(&self) -> impl Iterator<Item = (OutletId, bool)> + '_ {
        let on = self
            .on
            .iter()
            .filter(|(_, wanted)| **wanted)
            .map(|(id, _)| (*id, true));
        let off = self
            .off
            .iter()
            .filter(|(_, wanted)| **wanted)
            .map(|(id, _)| (*id, false));
        on.chain(off)
    }

    /// Whether the action targets nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets().next().is_none()
    }
}

// =============================================================================
// RULE
// =============================================================================

/// A threshold rule belonging to a scene. Higher priority wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRule {
    pub id: RuleId,
    pub scene: SceneId,
    pub name: String,
    pub condition: Condition,
    pub action: RuleAction,
    pub priority: i32,
}

/// Validate the user-editable fields of a rule.
pub fn validate_rule_fields(name: &str, condition: &Condition, action: &RuleAction) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SerraError::Validation("rule name must not be empty".into()));
    }
    if !condition.value.is_finite() {
        return Err(SerraError::Validation(
            "condition value must be a finite number".into(),
        ));
    }
    if action.is_empty() {
        return Err(SerraError::Validation(format!(
            "rule '{name}' does not switch any outlet"
        )));
    }
    let both: Vec<String> = action
        .on
        .iter()
        .filter(|(id, on)| **on && action.off.get(*id).copied().unwrap_or(false))
        .map(|(id, _)| id.0.to_string())
        .collect();
    if !both.is_empty() {
        return Err(SerraError::Validation(format!(
            "rule '{name}' turns outlet(s) {} both on and off",
            both.join(", ")
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
