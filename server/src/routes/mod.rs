// route table of the HTTP surface

pub mod matches;
pub mod participants;
pub mod tournaments;
pub mod ws;

use app_core::CoreHandle;
use axum::{
    Router,
    routing::{delete, get, post, put},
};

#[derive(Clone)]
pub struct AppState {
    pub core: CoreHandle,
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        // tournaments
        .route("/api/tournaments", get(tournaments::list))
        .route("/api/tournaments/create", post(tournaments::create))
        .route(
            "/api/tournaments/{reference}",
            get(tournaments::details)
                .put(tournaments::update)
                .delete(tournaments::destroy),
        )
        .route("/api/tournaments/{reference}/start", post(tournaments::start))
        .route("/api/tournaments/{reference}/reset", post(tournaments::reset))
        .route(
            "/api/tournaments/{reference}/complete",
            post(tournaments::complete),
        )
        .route("/api/tournaments/{reference}/state", post(tournaments::set_state))
        .route("/api/tournaments/{reference}/bracket", get(tournaments::bracket))
        .route(
            "/api/tournaments/{reference}/standings",
            get(tournaments::standings),
        )
        .route(
            "/api/tournaments/{reference}/swiss/next-round",
            post(matches::swiss_next_round),
        )
        // roster and public signup
        .route(
            "/api/tournaments/{reference}/participants",
            get(participants::list).post(participants::add),
        )
        .route(
            "/api/tournaments/{reference}/participants/bulk",
            post(participants::bulk_add),
        )
        .route(
            "/api/tournaments/{reference}/participants/randomize",
            post(participants::randomize),
        )
        .route(
            "/api/tournaments/{reference}/participants/lookup",
            get(participants::lookup),
        )
        .route(
            "/api/tournaments/{reference}/participants/{participant_id}",
            put(participants::update).delete(participants::remove),
        )
        .route(
            "/api/tournaments/{reference}/participants/{participant_id}/checkin",
            post(participants::checkin),
        )
        .route("/api/tournaments/{reference}/signup", post(participants::signup))
        .route(
            "/api/tournaments/{reference}/waitlist",
            get(participants::waitlist_status).post(participants::waitlist_join),
        )
        .route(
            "/api/tournaments/{reference}/waitlist/{entry_id}",
            delete(participants::waitlist_leave),
        )
        .route(
            "/api/tournaments/{reference}/waitlist/{entry_id}/promote",
            post(participants::waitlist_promote),
        )
        // stations
        .route(
            "/api/tournaments/{reference}/stations",
            get(participants::stations).post(participants::create_station),
        )
        .route(
            "/api/tournaments/{reference}/stations/{station_id}",
            delete(participants::delete_station),
        )
        // matches
        .route("/api/matches/{reference}", get(matches::overview))
        .route("/api/matches/{reference}/stats", get(matches::stats))
        .route(
            "/api/matches/{reference}/batch-scores",
            post(matches::batch_scores),
        )
        .route(
            "/api/matches/{reference}/auto-assign",
            post(matches::auto_assign),
        )
        .route("/api/matches/{reference}/undo", post(matches::undo))
        .route("/api/matches/{reference}/history", get(matches::history))
        .route("/api/matches/{reference}/{match_id}", get(matches::get_match))
        .route(
            "/api/matches/{reference}/{match_id}/underway",
            post(matches::mark_underway),
        )
        .route(
            "/api/matches/{reference}/{match_id}/unmark-underway",
            post(matches::unmark_underway),
        )
        .route("/api/matches/{reference}/{match_id}/score", post(matches::score))
        .route("/api/matches/{reference}/{match_id}/winner", post(matches::winner))
        .route("/api/matches/{reference}/{match_id}/reopen", post(matches::reopen))
        .route(
            "/api/matches/{reference}/{match_id}/clear-scores",
            post(matches::clear_scores),
        )
        .route("/api/matches/{reference}/{match_id}/dq", post(matches::dq))
        .route(
            "/api/matches/{reference}/{match_id}/station",
            post(matches::station),
        )
        // display deployment
        .route(
            "/api/flyer",
            get(tournaments::get_deployment).post(tournaments::deploy_flyer),
        )
        // realtime subscriptions
        .route("/ws", get(ws::subscribe))
}
