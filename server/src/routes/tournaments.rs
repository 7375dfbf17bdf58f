//! Tournament endpoints: CRUD, lifecycle, bracket and standings reads.

use crate::{
    error::ApiResult,
    principal::Caller,
    routes::AppState,
    views::{DeploymentView, MatchView, ParticipantView, StandingView, TournamentView},
};
use app_core::{
    EffectiveTenant, MatchState, NewTournament, TournamentOptions, TournamentPatch,
    TournamentState, TournamentType, compute_standings, round_label,
};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use uuid::Uuid;

pub async fn list(State(state): State<AppState>, caller: Caller) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let buckets = state.core.list_tournaments(&tenant).await?;
    let views = |list: &[app_core::Tournament]| -> Vec<TournamentView> {
        list.iter().map(TournamentView::from).collect()
    };
    Ok(Json(json!({
        "success": true,
        "pending": views(&buckets.pending),
        "inProgress": views(&buckets.underway),
        "completed": views(&buckets.complete),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
    pub name: String,
    #[serde(default)]
    pub game_name: Option<String>,
    #[serde(default)]
    pub tournament_type: Option<TournamentType>,
    #[serde(default)]
    pub options: Option<TournamentOptions>,
}

pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<CreateBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let tournament = state
        .core
        .create_tournament(
            &tenant,
            NewTournament {
                name: body.name,
                game_name: body.game_name,
                tournament_type: body.tournament_type.unwrap_or_default(),
                options: body.options.unwrap_or_default(),
            },
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "tournament": TournamentView::from(&tournament),
    })))
}

pub async fn details(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let tournament = state.core.find_tournament(&tenant, &reference).await?;
    let participants = state.core.list_participants(&tenant, &reference).await?;
    let matches = state.core.list_matches(&tenant, &reference).await?;
    let completed = matches
        .iter()
        .filter(|m| m.state == MatchState::Complete)
        .count();
    let can_start = state.core.can_start(&tenant, &reference).await?;
    let can_reset = state.core.can_reset(&tenant, &reference).await?;
    Ok(Json(json!({
        "success": true,
        "tournament": TournamentView::from(&tournament),
        "canStart": can_start,
        "canReset": can_reset,
        "stats": {
            "participantCount": participants.len(),
            "activeParticipantCount": participants.iter().filter(|p| p.active).count(),
            "matchCount": matches.len(),
            "completedMatchCount": completed,
            "progressPercent": if matches.is_empty() { 0 } else { completed * 100 / matches.len() },
        },
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub game_name: Option<Option<String>>,
    #[serde(default)]
    pub tournament_type: Option<TournamentType>,
    #[serde(default)]
    pub options: Option<TournamentOptions>,
}

pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
    Json(body): Json<UpdateBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let tournament = state
        .core
        .update_tournament(
            &tenant,
            &reference,
            TournamentPatch {
                name: body.name,
                game_name: body.game_name,
                tournament_type: body.tournament_type,
                options: body.options,
            },
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "tournament": TournamentView::from(&tournament),
    })))
}

#[derive(Debug, Deserialize)]
pub struct StateBody {
    pub state: TournamentState,
}

pub async fn set_state(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
    Json(body): Json<StateBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let tournament = state
        .core
        .update_tournament_state(&tenant, &reference, body.state)
        .await?;
    Ok(Json(json!({
        "success": true,
        "tournament": TournamentView::from(&tournament),
    })))
}

pub async fn start(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let outcome = state.core.start_tournament(&tenant, &reference).await?;
    Ok(Json(json!({
        "success": true,
        "tournament": TournamentView::from(&outcome.tournament),
        "matchCount": outcome.stats.total_matches,
        "stats": {
            "totalMatches": outcome.stats.total_matches,
            "byeMatches": outcome.stats.bye_matches,
            "roundCount": outcome.stats.round_count,
            "formatRounds": outcome.stats.format_rounds,
        },
    })))
}

pub async fn reset(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let tournament = state.core.reset_tournament(&tenant, &reference).await?;
    Ok(Json(json!({
        "success": true,
        "tournament": TournamentView::from(&tournament),
    })))
}

pub async fn complete(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let tournament = state.core.complete_tournament(&tenant, &reference).await?;
    Ok(Json(json!({
        "success": true,
        "tournament": TournamentView::from(&tournament),
    })))
}

pub async fn destroy(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    state.core.delete_tournament(&tenant, &reference).await?;
    Ok(Json(json!({ "success": true })))
}

/// Visualization data: matches grouped per round with display labels, plus
/// the roster for name lookups.
pub async fn bracket(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let tournament = state.core.find_tournament(&tenant, &reference).await?;
    let participants = state.core.list_participants(&tenant, &reference).await?;
    let matches = state.core.list_matches(&tenant, &reference).await?;

    let max_round = matches.iter().map(|m| m.round).max().unwrap_or(0);
    let mut rounds: BTreeMap<i32, Vec<MatchView>> = BTreeMap::new();
    for m in &matches {
        rounds.entry(m.round).or_default().push(MatchView::from(m));
    }
    let round_views: Vec<Value> = rounds
        .into_iter()
        .map(|(round, games)| {
            let label = if round < 0 {
                format!("Losers Round {}", -round)
            } else {
                round_label(round, max_round)
            };
            json!({ "round": round, "label": label, "matches": games })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "tournament": TournamentView::from(&tournament),
        "rounds": round_views,
        "participants": participants.iter().map(ParticipantView::from).collect::<Vec<_>>(),
    })))
}

pub async fn standings(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let tournament = state.core.find_tournament(&tenant, &reference).await?;
    let participants = state.core.list_participants(&tenant, &reference).await?;
    let matches = state.core.list_matches(&tenant, &reference).await?;
    let rows = compute_standings(&tournament, &participants, &matches);
    Ok(Json(json!({
        "success": true,
        "standings": rows.iter().map(StandingView::from).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployBody {
    #[serde(default)]
    pub tournament_id: Option<Uuid>,
}

pub async fn deploy_flyer(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<DeployBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let deployment = state.core.deploy_flyer(&tenant, body.tournament_id).await?;
    Ok(Json(json!({
        "success": true,
        "deployment": DeploymentView::from(&deployment),
    })))
}

pub async fn get_deployment(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let deployment = state.core.get_deployment(&tenant).await?;
    Ok(Json(json!({
        "success": true,
        "deployment": deployment.as_ref().map(DeploymentView::from),
    })))
}
