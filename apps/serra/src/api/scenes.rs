//! Scene and rule handlers.

use super::ApiResult;
use crate::executor;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serra_core::{
    Condition, EvaluationReport, RuleAction, RuleId, Scene, SceneId, SceneRule, SceneSettings,
    ZoneId,
};

#[derive(Debug, Deserialize)]
pub struct SceneRequest {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub settings: SceneSettings,
    #[serde(default, alias = "is_active")]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct RuleRequest {
    pub name: String,
    pub condition: Condition,
    pub action: RuleAction,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct EvaluateQuery {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct SceneSummary {
    #[serde(flatten)]
    pub scene: Scene,
    pub rule_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SceneDetail {
    #[serde(flatten)]
    pub scene: Scene,
    pub rules: Vec<SceneRule>,
}

// =============================================================================
// SCENES
// =============================================================================

pub async fn list_scenes(
    State(state): State<AppState>,
    Path(zone): Path<ZoneId>,
) -> ApiResult<Json<Vec<SceneSummary>>> {
    let home = state.home().await;
    home.zone(zone)?;
    let scenes = home
        .scenes_in_zone(zone)
        .into_iter()
        .map(|s| SceneSummary {
            scene: s.clone(),
            rule_count: home.rules_for_scene(s.id).len(),
        })
        .collect();
    Ok(Json(scenes))
}

pub async fn create_scene(
    State(state): State<AppState>,
    Path(zone): Path<ZoneId>,
    Json(req): Json<SceneRequest>,
) -> ApiResult<(StatusCode, Json<Scene>)> {
    let scene = state
        .commit(|home| {
            let id = home.create_scene(zone, &req.name, &req.slug, req.settings, req.active)?;
            Ok(home.scene(id)?.clone())
        })
        .await?;
    Ok((StatusCode::CREATED, Json(scene)))
}

pub async fn get_scene(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
) -> ApiResult<Json<SceneDetail>> {
    let home = state.home().await;
    let scene = home.scene(id)?.clone();
    let rules = home.rules_for_scene(id).into_iter().cloned().collect();
    Ok(Json(SceneDetail { scene, rules }))
}

pub async fn update_scene(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
    Json(req): Json<SceneRequest>,
) -> ApiResult<Json<Scene>> {
    let scene = state
        .commit(|home| {
            Ok(home
                .update_scene(id, &req.name, &req.slug, req.settings, req.active)?
                .clone())
        })
        .await?;
    Ok(Json(scene))
}

pub async fn delete_scene(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
) -> ApiResult<StatusCode> {
    state.commit(|home| home.delete_scene(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activate_scene(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
) -> ApiResult<Json<Scene>> {
    let scene = state
        .commit(|home| Ok(home.activate_scene(id)?.clone()))
        .await?;
    Ok(Json(scene))
}

pub async fn deactivate_scene(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
) -> ApiResult<Json<Scene>> {
    let scene = state
        .commit(|home| Ok(home.deactivate_scene(id)?.clone()))
        .await?;
    Ok(Json(scene))
}

/// Evaluate a scene now. `?dry_run=true` plans without switching.
pub async fn evaluate_scene(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
    Query(query): Query<EvaluateQuery>,
) -> ApiResult<Json<EvaluationReport>> {
    Ok(Json(
        executor::evaluate_scene(&state, id, query.dry_run).await?,
    ))
}

// =============================================================================
// RULES
// =============================================================================

pub async fn list_rules(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
) -> ApiResult<Json<Vec<SceneRule>>> {
    let home = state.home().await;
    home.scene(id)?;
    Ok(Json(home.rules_for_scene(id).into_iter().cloned().collect()))
}

pub async fn create_rule(
    State(state): State<AppState>,
    Path(id): Path<SceneId>,
    Json(req): Json<RuleRequest>,
) -> ApiResult<(StatusCode, Json<SceneRule>)> {
    let rule = state
        .commit(|home| {
            let rule = home.add_rule(id, &req.name, req.condition, req.action, req.priority)?;
            Ok(home.rule(rule)?.clone())
        })
        .await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<RuleId>,
    Json(req): Json<RuleRequest>,
) -> ApiResult<Json<SceneRule>> {
    let rule = state
        .commit(|home| {
            Ok(home
                .update_rule(id, &req.name, req.condition, req.action, req.priority)?
                .clone())
        })
        .await?;
    Ok(Json(rule))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<RuleId>,
) -> ApiResult<StatusCode> {
    state.commit(|home| home.delete_rule(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
