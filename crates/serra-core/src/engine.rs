//! # Scene Engine
//!
//! Turns a scene's rules and the zone's latest readings into one decision
//! per outlet.
//!
//! Planning is pure: it never switches anything. The app layer carries the
//! plan out and records the outcome in an [`EvaluationReport`].
//!
//! ## Ordering
//!
//! Rules are visited by descending priority, ties broken by ascending rule
//! id. The first matching rule to target an outlet decides it; later
//! matches on the same outlet are recorded as shadowed.
//!
//! [`EvaluationReport`]: crate::report::EvaluationReport

use crate::condition::{ConditionOutcome, SensorSnapshot, evaluate_condition};
use crate::model::{Metric, Outlet};
use crate::report::{DecisionKind, OutletDecision, RangeCheck, RuleTrace, ScenePlan};
use crate::scene::{Scene, SceneRule};
use crate::{OutletId, Result, RuleId, SerraError, Timestamp};
use std::collections::BTreeMap;

/// Everything the engine needs to plan one scene.
#[derive(Debug, Clone)]
pub struct PlanInput<'a> {
    pub scene: &'a Scene,
    /// Rules of the scene, in any order.
    pub rules: Vec<&'a SceneRule>,
    /// Every outlet of the scene's zone.
    pub outlets: Vec<&'a Outlet>,
    pub snapshot: SensorSnapshot,
    pub now: Timestamp,
    pub stale_after_secs: u64,
}

/// A rule's claim on an outlet.
#[derive(Debug, Clone, Copy)]
struct Claim {
    rule: RuleId,
    state: bool,
}

/// Plan a scene.
///
/// Fails with [`SerraError::SceneInactive`] for an inactive scene and with
/// [`SerraError::NoSensorData`] when the zone has no reading at all.
pub fn plan_scene(input: &PlanInput<'_>) -> Result<ScenePlan> {
    let scene = input.scene;
    if !scene.active {
        return Err(SerraError::SceneInactive(scene.id));
    }
    if input.snapshot.is_empty() {
        return Err(SerraError::NoSensorData(scene.zone));
    }

    // Rules are walked best first and each outlet goes to the first matching
    // rule that names it. Later matches never overwrite that claim, so a
    // lower priority rule cannot undo a higher one by running after it.
    let mut rules = input.rules.clone();
    rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

    let zone_outlets: BTreeMap<OutletId, &Outlet> =
        input.outlets.iter().map(|o| (o.id, *o)).collect();

    let mut claims: BTreeMap<OutletId, Claim> = BTreeMap::new();
    let mut traces = Vec::with_capacity(rules.len());
    let mut names: BTreeMap<RuleId, String> = BTreeMap::new();

    for rule in rules {
        let outcome = evaluate_condition(
            &rule.condition,
            &input.snapshot,
            input.now,
            input.stale_after_secs,
        );
        let mut trace = RuleTrace {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            priority: rule.priority,
            condition: rule.condition,
            outcome,
            claimed_outlets: Vec::new(),
            shadowed_outlets: Vec::new(),
            ignored_outlets: Vec::new(),
        };

        if outcome.is_met() {
            names.insert(rule.id, describe_match(rule, &outcome));
            for (outlet, state) in rule.action.targets() {
                if !zone_outlets.contains_key(&outlet) {
                    trace.ignored_outlets.push(outlet);
                } else if claims.contains_key(&outlet) {
                    trace.shadowed_outlets.push(outlet);
                } else {
                    claims.insert(
                        outlet,
                        Claim {
                            rule: rule.id,
                            state,
                        },
                    );
                    trace.claimed_outlets.push(outlet);
                }
            }
        }
        traces.push(trace);
    }

    let decisions = zone_outlets
        .values()
        .map(|outlet| decide(outlet, claims.get(&outlet.id), &names, input.now))
        .collect();

    Ok(ScenePlan {
        scene_id: scene.id,
        scene_name: scene.name.clone(),
        zone: scene.zone,
        planned_at: input.now,
        snapshot: input.snapshot,
        rules: traces,
        decisions,
        range_checks: range_checks(input),
        unknowns: unknowns(input),
    })
}

fn decide(
    outlet: &Outlet,
    claim: Option<&Claim>,
    reasons: &BTreeMap<RuleId, String>,
    now: Timestamp,
) -> OutletDecision {
    let (decision, explanation) = if !outlet.enabled {
        (DecisionKind::Disabled, "outlet is disabled".to_string())
    } else if outlet.override_active(now) {
        let until = outlet.manual_override_until;
        let explanation = match until {
            Some(t) => format!("manual override holds the outlet until {t}"),
            None => "manual override holds the outlet until cleared".to_string(),
        };
        (DecisionKind::ManualOverride { until }, explanation)
    } else {
        match claim {
            None => (
                DecisionKind::NoRule,
                "no matching rule targets this outlet".to_string(),
            ),
            Some(claim) => {
                let reason = reasons
                    .get(&claim.rule)
                    .map(String::as_str)
                    .unwrap_or("matching rule");
                if outlet.last_state == claim.state {
                    (
                        DecisionKind::Unchanged {
                            state: claim.state,
                            rule: claim.rule,
                        },
                        format!("{reason}; already {}", on_off(claim.state)),
                    )
                } else {
                    (
                        DecisionKind::Switch {
                            to: claim.state,
                            rule: claim.rule,
                        },
                        format!("{reason}; switching {}", on_off(claim.state)),
                    )
                }
            }
        }
    };

    OutletDecision {
        outlet_id: outlet.id,
        outlet_name: outlet.display_name().to_string(),
        current_state: outlet.last_state,
        decision,
        explanation,
    }
}

fn describe_match(rule: &SceneRule, outcome: &ConditionOutcome) -> String {
    match outcome.observed() {
        Some(observed) => format!(
            "rule '{}' (priority {}) matched: {} with {}{}",
            rule.name,
            rule.priority,
            rule.condition,
            observed,
            rule.condition.metric.unit()
        ),
        None => format!("rule '{}' (priority {}) matched", rule.name, rule.priority),
    }
}

fn on_off(state: bool) -> &'static str {
    if state { "ON" } else { "OFF" }
}

fn range_checks(input: &PlanInput<'_>) -> Vec<RangeCheck> {
    Metric::ALL
        .iter()
        .filter_map(|metric| {
            let range = input.scene.settings.range_for(*metric)?;
            let reading = input.snapshot.get(*metric)?;
            if reading
                .rejection(*metric, input.now, input.stale_after_secs)
                .is_some()
            {
                return None;
            }
            Some(RangeCheck {
                metric: *metric,
                observed: reading.value,
                range,
                position: range.classify(reading.value),
            })
        })
        .collect()
}

fn unknowns(input: &PlanInput<'_>) -> Vec<String> {
    Metric::ALL
        .iter()
        .filter_map(|metric| match input.snapshot.get(*metric) {
            None => Some(format!("no {metric} reading for this zone")),
            Some(reading) => match reading.rejection(*metric, input.now, input.stale_after_secs)
            {
                Some(ConditionOutcome::Stale { age_secs, .. }) => Some(format!(
                    "{metric} reading is {age_secs}s old (limit {}s) and was ignored",
                    input.stale_after_secs
                )),
                Some(ConditionOutcome::Future { ahead_secs, .. }) => Some(format!(
                    "{metric} reading is dated {ahead_secs}s ahead of the clock and was ignored"
                )),
                _ => None,
            },
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
