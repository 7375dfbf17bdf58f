//! Wire views: one canonical in-memory record per entity lives in core;
//! the camelCase JSON shape is produced here and nowhere else.

use app_core::{
    Deployment, Match, Participant, StandingRow, Station, Tournament, WaitlistEntry,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentView {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub game_name: Option<String>,
    pub tournament_type: String,
    pub state: String,
    pub hold_third_place_match: bool,
    pub grand_finals_modifier: String,
    pub swiss_rounds: u32,
    pub ranked_by: String,
    pub sequential_pairings: bool,
    pub bye_strategy: String,
    pub signup_cap: Option<u32>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<&Tournament> for TournamentView {
    fn from(t: &Tournament) -> Self {
        TournamentView {
            id: t.id,
            name: t.name.clone(),
            slug: t.slug.clone(),
            game_name: t.game_name.clone(),
            tournament_type: t.tournament_type.to_string(),
            state: t.state.to_string(),
            hold_third_place_match: t.options.hold_third_place_match,
            grand_finals_modifier: t.options.grand_finals_modifier.to_string(),
            swiss_rounds: t.options.swiss_rounds,
            ranked_by: t.options.ranked_by.to_string(),
            sequential_pairings: t.options.sequential_pairings,
            bye_strategy: t.options.bye_strategy.to_string(),
            signup_cap: t.options.signup_cap,
            created_at: t.created_at.to_rfc3339(),
            started_at: t.started_at.map(|d| d.to_rfc3339()),
            completed_at: t.completed_at.map(|d| d.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub id: Uuid,
    pub identifier: String,
    pub round: i32,
    pub suggested_play_order: u32,
    pub losers_bracket: bool,
    pub player1_id: Option<Uuid>,
    pub player2_id: Option<Uuid>,
    pub player1_prereq_match_id: Option<Uuid>,
    pub player2_prereq_match_id: Option<Uuid>,
    pub player1_is_prereq_loser: bool,
    pub player2_is_prereq_loser: bool,
    pub winner_id: Option<Uuid>,
    pub loser_id: Option<Uuid>,
    pub player1_score: i32,
    pub player2_score: i32,
    pub score_text: Option<String>,
    pub forfeited: bool,
    pub station_id: Option<Uuid>,
    pub underway_at: Option<String>,
    pub completed_at: Option<String>,
    pub state: String,
    pub is_bye: bool,
}

impl From<&Match> for MatchView {
    fn from(m: &Match) -> Self {
        MatchView {
            id: m.id,
            identifier: m.identifier.clone(),
            round: m.round,
            suggested_play_order: m.suggested_play_order,
            losers_bracket: m.losers_bracket,
            player1_id: m.player1_id,
            player2_id: m.player2_id,
            player1_prereq_match_id: m.player1_prereq_match_id,
            player2_prereq_match_id: m.player2_prereq_match_id,
            player1_is_prereq_loser: m.player1_is_prereq_loser,
            player2_is_prereq_loser: m.player2_is_prereq_loser,
            winner_id: m.winner_id,
            loser_id: m.loser_id,
            player1_score: m.player1_score,
            player2_score: m.player2_score,
            score_text: m.score_text.clone(),
            forfeited: m.forfeited,
            station_id: m.station_id,
            underway_at: m.underway_at.map(|d| d.to_rfc3339()),
            completed_at: m.completed_at.map(|d| d.to_rfc3339()),
            state: m.state.to_string(),
            is_bye: m.is_bye,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: Uuid,
    pub name: String,
    pub seed: u32,
    pub active: bool,
    pub checked_in: bool,
    pub misc: Option<String>,
    pub final_rank: Option<u32>,
}

impl From<&Participant> for ParticipantView {
    fn from(p: &Participant) -> Self {
        ParticipantView {
            id: p.id,
            name: p.name.clone(),
            seed: p.seed,
            active: p.active,
            checked_in: p.checked_in,
            misc: p.misc.clone(),
            final_rank: p.final_rank,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationView {
    pub id: Uuid,
    pub name: String,
    pub current_match_id: Option<Uuid>,
}

impl From<&Station> for StationView {
    fn from(s: &Station) -> Self {
        StationView {
            id: s.id,
            name: s.name.clone(),
            current_match_id: s.current_match_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingView {
    pub participant_id: Uuid,
    pub name: String,
    pub seed: u32,
    pub rank: u32,
    pub wins: u32,
    pub losses: u32,
    pub points_scored: i64,
    pub points_against: i64,
}

impl From<&StandingRow> for StandingView {
    fn from(r: &StandingRow) -> Self {
        StandingView {
            participant_id: r.participant_id,
            name: r.name.clone(),
            seed: r.seed,
            rank: r.rank,
            wins: r.wins,
            losses: r.losses,
            points_scored: r.points_scored,
            points_against: r.points_against,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistView {
    pub id: Uuid,
    pub name: String,
    pub position: u32,
    pub status: String,
}

impl From<&WaitlistEntry> for WaitlistView {
    fn from(e: &WaitlistEntry) -> Self {
        WaitlistView {
            id: e.id,
            name: e.name.clone(),
            position: e.position,
            status: e.status.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentView {
    pub tournament_id: Option<Uuid>,
    pub deployed_at: String,
}

impl From<&Deployment> for DeploymentView {
    fn from(d: &Deployment) -> Self {
        DeploymentView {
            tournament_id: d.tournament_id,
            deployed_at: d.deployed_at.to_rfc3339(),
        }
    }
}
