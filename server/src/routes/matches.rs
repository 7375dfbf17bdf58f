//! Match endpoints: reads, scoring, progression control, stations, undo.

use crate::{error::ApiResult, principal::Caller, routes::AppState, views::MatchView};
use app_core::{BatchScoreEntry, EffectiveTenant, MatchState, UndoOutcome};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

pub async fn overview(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let overview = state.core.matches_overview(&tenant, &reference).await?;
    let next_players: Vec<Uuid> = overview
        .next_match
        .iter()
        .flat_map(|m| [m.player1_id, m.player2_id])
        .flatten()
        .collect();
    Ok(Json(json!({
        "success": true,
        "matches": overview.matches.iter().map(MatchView::from).collect::<Vec<_>>(),
        "completedCount": overview.completed_count,
        "totalCount": overview.total_count,
        "progressPercent": overview.progress_percent,
        "nextMatchId": overview.next_match.as_ref().map(|m| m.id),
        "nextMatchPlayers": next_players,
    })))
}

pub async fn stats(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let overview = state.core.matches_overview(&tenant, &reference).await?;
    let count_state = |s: MatchState| {
        overview
            .matches
            .iter()
            .filter(|m| m.state == s)
            .count()
    };
    Ok(Json(json!({
        "success": true,
        "stats": {
            "total": overview.total_count,
            "pending": count_state(MatchState::Pending),
            "open": count_state(MatchState::Open),
            "underway": count_state(MatchState::Underway),
            "complete": overview.completed_count,
            "byes": overview.matches.iter().filter(|m| m.is_bye).count(),
            "progressPercent": overview.progress_percent,
        },
    })))
}

pub async fn get_match(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, match_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let m = state.core.get_match(&tenant, &reference, match_id).await?;
    Ok(Json(json!({ "success": true, "match": MatchView::from(&m) })))
}

pub async fn mark_underway(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, match_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let m = state.core.mark_underway(&tenant, &reference, match_id).await?;
    Ok(Json(json!({ "success": true, "match": MatchView::from(&m) })))
}

pub async fn unmark_underway(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, match_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let m = state
        .core
        .unmark_underway(&tenant, &reference, match_id)
        .await?;
    Ok(Json(json!({ "success": true, "match": MatchView::from(&m) })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBody {
    pub player1_score: i32,
    pub player2_score: i32,
    #[serde(default)]
    pub winner_id: Option<Uuid>,
}

pub async fn score(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, match_id)): Path<(String, Uuid)>,
    Json(body): Json<ScoreBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let m = state
        .core
        .set_score(
            &tenant,
            &reference,
            match_id,
            body.player1_score,
            body.player2_score,
            body.winner_id,
        )
        .await?;
    Ok(Json(json!({ "success": true, "match": MatchView::from(&m) })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerBody {
    pub winner_id: Uuid,
    #[serde(default)]
    pub player1_score: Option<i32>,
    #[serde(default)]
    pub player2_score: Option<i32>,
}

pub async fn winner(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, match_id)): Path<(String, Uuid)>,
    Json(body): Json<WinnerBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let scores = (
        body.player1_score.unwrap_or(0),
        body.player2_score.unwrap_or(0),
    );
    let m = state
        .core
        .set_winner(&tenant, &reference, match_id, body.winner_id, scores)
        .await?;
    Ok(Json(json!({ "success": true, "match": MatchView::from(&m) })))
}

pub async fn reopen(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, match_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let m = state.core.reopen_match(&tenant, &reference, match_id).await?;
    Ok(Json(json!({ "success": true, "match": MatchView::from(&m) })))
}

pub async fn clear_scores(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, match_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let m = state
        .core
        .clear_scores(&tenant, &reference, match_id)
        .await?;
    Ok(Json(json!({ "success": true, "match": MatchView::from(&m) })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DqBody {
    pub participant_id: Uuid,
}

pub async fn dq(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, match_id)): Path<(String, Uuid)>,
    Json(body): Json<DqBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let m = state
        .core
        .disqualify(&tenant, &reference, match_id, body.participant_id)
        .await?;
    Ok(Json(json!({ "success": true, "match": MatchView::from(&m) })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationBody {
    #[serde(default)]
    pub station_id: Option<Uuid>,
}

pub async fn station(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, match_id)): Path<(String, Uuid)>,
    Json(body): Json<StationBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let m = state
        .core
        .set_station(&tenant, &reference, match_id, body.station_id)
        .await?;
    Ok(Json(json!({ "success": true, "match": MatchView::from(&m) })))
}

pub async fn auto_assign(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let assigned = state
        .core
        .auto_assign_stations(&tenant, &reference)
        .await?;
    Ok(Json(json!({
        "success": true,
        "assigned": assigned.iter().map(MatchView::from).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchScoresBody {
    pub scores: Vec<BatchScoreItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchScoreItem {
    pub match_id: Uuid,
    pub winner_id: Uuid,
    pub score1: i32,
    pub score2: i32,
}

/// Partial-success batch: per-item outcomes plus an aggregate summary so
/// callers can retry only the failed entries.
pub async fn batch_scores(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
    Json(body): Json<BatchScoresBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let entries: Vec<BatchScoreEntry> = body
        .scores
        .into_iter()
        .map(|item| BatchScoreEntry {
            match_id: item.match_id,
            winner_id: item.winner_id,
            player1_score: item.score1,
            player2_score: item.score2,
        })
        .collect();
    let outcomes = state.core.batch_scores(&tenant, &reference, entries).await?;

    let mut succeeded = 0;
    let items: Vec<Value> = outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(()) => {
                succeeded += 1;
                json!({ "matchId": o.match_id, "success": true })
            }
            Err(e) => json!({
                "matchId": o.match_id,
                "success": false,
                "error": { "code": e.code(), "message": e.to_string() },
            }),
        })
        .collect();
    let total = items.len();
    Ok(Json(json!({
        "success": true,
        "results": items,
        "summary": {
            "total": total,
            "succeeded": succeeded,
            "failed": total - succeeded,
        },
    })))
}

pub async fn undo(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    match state.core.undo_last(&tenant, &reference).await? {
        UndoOutcome::Undone { match_id } => Ok(Json(json!({
            "success": true,
            "undone": true,
            "matchId": match_id,
        }))),
        UndoOutcome::NothingToUndo => Ok(Json(json!({
            "success": true,
            "undone": false,
            "message": "nothing to undo",
        }))),
    }
}

pub async fn history(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let changes = state
        .core
        .list_match_changes(&tenant, &reference, 50)
        .await?;
    let items: Vec<Value> = changes
        .iter()
        .map(|c| {
            json!({
                "matchId": c.match_id,
                "action": c.action.to_string(),
                "priorState": c.prior_state.to_string(),
                "undone": c.undone,
                "createdAt": c.created_at.to_rfc3339(),
            })
        })
        .collect();
    Ok(Json(json!({ "success": true, "history": items })))
}

pub async fn swiss_next_round(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let new_matches = state.core.swiss_next_round(&tenant, &reference).await?;
    Ok(Json(json!({
        "success": true,
        "matches": new_matches.iter().map(MatchView::from).collect::<Vec<_>>(),
    })))
}
