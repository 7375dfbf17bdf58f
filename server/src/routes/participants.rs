//! Roster, public signup, waitlist and station endpoints.

use crate::{
    error::ApiResult,
    principal::Caller,
    routes::AppState,
    views::{ParticipantView, StationView, WaitlistView},
};
use app_core::{
    EffectiveTenant, NewParticipant, ParticipantPatch, SignupOutcome,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let roster = state.core.list_participants(&tenant, &reference).await?;
    Ok(Json(json!({
        "success": true,
        "participants": roster.iter().map(ParticipantView::from).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBody {
    pub name: String,
    #[serde(default)]
    pub seed: Option<u32>,
    #[serde(default)]
    pub misc: Option<String>,
}

pub async fn add(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
    Json(body): Json<AddBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let participant = state
        .core
        .add_participant(
            &tenant,
            &reference,
            NewParticipant {
                name: body.name,
                seed: body.seed,
                misc: body.misc,
            },
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "participant": ParticipantView::from(&participant),
    })))
}

#[derive(Debug, Deserialize)]
pub struct BulkBody {
    pub names: Vec<String>,
}

pub async fn bulk_add(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
    Json(body): Json<BulkBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let added = state
        .core
        .bulk_add_participants(&tenant, &reference, body.names)
        .await?;
    Ok(Json(json!({
        "success": true,
        "participants": added.iter().map(ParticipantView::from).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub seed: Option<u32>,
    #[serde(default)]
    pub misc: Option<Option<String>>,
    #[serde(default)]
    pub checked_in: Option<bool>,
}

pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, participant_id)): Path<(String, Uuid)>,
    Json(body): Json<UpdateBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let participant = state
        .core
        .update_participant(
            &tenant,
            &reference,
            participant_id,
            ParticipantPatch {
                name: body.name,
                seed: body.seed,
                misc: body.misc,
                checked_in: body.checked_in,
            },
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "participant": ParticipantView::from(&participant),
    })))
}

pub async fn remove(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, participant_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    state
        .core
        .remove_participant(&tenant, &reference, participant_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinBody {
    pub checked_in: bool,
}

pub async fn checkin(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, participant_id)): Path<(String, Uuid)>,
    Json(body): Json<CheckinBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let participant = state
        .core
        .set_checked_in(&tenant, &reference, participant_id, body.checked_in)
        .await?;
    Ok(Json(json!({
        "success": true,
        "participant": ParticipantView::from(&participant),
    })))
}

pub async fn randomize(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let roster = state.core.randomize_seeds(&tenant, &reference).await?;
    Ok(Json(json!({
        "success": true,
        "participants": roster.iter().map(ParticipantView::from).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub name: String,
}

pub async fn lookup(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
    Query(query): Query<LookupQuery>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let found = state
        .core
        .lookup_participant(&tenant, &reference, &query.name)
        .await?;
    Ok(Json(json!({
        "success": true,
        "participant": found.as_ref().map(ParticipantView::from),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupBody {
    pub name: String,
    #[serde(default)]
    pub misc: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Public signup contract: roster while there is room, waitlist once full.
pub async fn signup(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
    Json(body): Json<SignupBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let outcome = state
        .core
        .signup_or_waitlist(&tenant, &reference, body.name, body.misc, body.email)
        .await?;
    Ok(Json(match outcome {
        SignupOutcome::Registered(p) => json!({
            "success": true,
            "registered": true,
            "participant": ParticipantView::from(&p),
        }),
        SignupOutcome::Waitlisted(e) => json!({
            "success": true,
            "registered": false,
            "waitlistEntry": WaitlistView::from(&e),
        }),
    }))
}

pub async fn waitlist_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let entries = state.core.waitlist_status(&tenant, &reference).await?;
    Ok(Json(json!({
        "success": true,
        "waitlist": entries.iter().map(WaitlistView::from).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistJoinBody {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

pub async fn waitlist_join(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
    Json(body): Json<WaitlistJoinBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let entry = state
        .core
        .waitlist_join(&tenant, &reference, body.name, body.email)
        .await?;
    Ok(Json(json!({
        "success": true,
        "waitlistEntry": WaitlistView::from(&entry),
    })))
}

pub async fn waitlist_leave(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, entry_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    state
        .core
        .waitlist_leave(&tenant, &reference, entry_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn waitlist_promote(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, entry_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let entry = state
        .core
        .waitlist_promote(&tenant, &reference, entry_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "waitlistEntry": WaitlistView::from(&entry),
    })))
}

pub async fn stations(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let stations = state.core.list_stations(&tenant, &reference).await?;
    Ok(Json(json!({
        "success": true,
        "stations": stations.iter().map(StationView::from).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateStationBody {
    pub name: String,
}

pub async fn create_station(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
    Json(body): Json<CreateStationBody>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    let station = state
        .core
        .create_station(&tenant, &reference, body.name)
        .await?;
    Ok(Json(json!({
        "success": true,
        "station": StationView::from(&station),
    })))
}

pub async fn delete_station(
    State(state): State<AppState>,
    caller: Caller,
    Path((reference, station_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Value>> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    state
        .core
        .delete_station(&tenant, &reference, station_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}
