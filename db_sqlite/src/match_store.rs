//! implementation of the match read port; match writes go through `commit`

use crate::{
    helpers::*,
    map_db_err,
    schema::{tcc_matches, tcc_matches::dsl::*},
};
use app_core::{DbError, DbResult, DbpMatch, Match};
use async_trait::async_trait;
use diesel::prelude::{
    AsChangeset, ExpressionMethods, Insertable, OptionalExtension, QueryDsl, Queryable, RunQueryDsl,
};
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Queryable)]
pub(crate) struct MatchRow {
    pub id: String,
    pub tournament_id: String,
    pub user_id: i64,
    pub identifier: String,
    pub round: i32,
    pub suggested_play_order: i32,
    pub bracket_position: i32,
    pub losers_bracket: bool,
    pub player1_id: Option<String>,
    pub player2_id: Option<String>,
    pub player1_prereq_match_id: Option<String>,
    pub player2_prereq_match_id: Option<String>,
    pub player1_is_prereq_loser: bool,
    pub player2_is_prereq_loser: bool,
    pub winner_id: Option<String>,
    pub loser_id: Option<String>,
    pub player1_score: i32,
    pub player2_score: i32,
    pub score_text: Option<String>,
    pub forfeited: bool,
    pub forfeited_participant_id: Option<String>,
    pub station_id: Option<String>,
    pub underway_at: Option<String>,
    pub completed_at: Option<String>,
    pub state: String,
    pub is_bye: bool,
}

impl TryFrom<MatchRow> for Match {
    type Error = DbError;

    fn try_from(r: MatchRow) -> Result<Self, Self::Error> {
        Ok(Match {
            id: parse_uid(&r.id)?,
            tournament_id: parse_uid(&r.tournament_id)?,
            user_id: r.user_id,
            identifier: r.identifier,
            round: r.round,
            suggested_play_order: r.suggested_play_order.max(0) as u32,
            bracket_position: r.bracket_position.max(0) as u32,
            losers_bracket: r.losers_bracket,
            player1_id: parse_opt_uid(r.player1_id.as_deref())?,
            player2_id: parse_opt_uid(r.player2_id.as_deref())?,
            player1_prereq_match_id: parse_opt_uid(r.player1_prereq_match_id.as_deref())?,
            player2_prereq_match_id: parse_opt_uid(r.player2_prereq_match_id.as_deref())?,
            player1_is_prereq_loser: r.player1_is_prereq_loser,
            player2_is_prereq_loser: r.player2_is_prereq_loser,
            winner_id: parse_opt_uid(r.winner_id.as_deref())?,
            loser_id: parse_opt_uid(r.loser_id.as_deref())?,
            player1_score: r.player1_score,
            player2_score: r.player2_score,
            score_text: r.score_text,
            forfeited: r.forfeited,
            forfeited_participant_id: parse_opt_uid(r.forfeited_participant_id.as_deref())?,
            station_id: parse_opt_uid(r.station_id.as_deref())?,
            underway_at: parse_opt_ts(r.underway_at.as_deref())?,
            completed_at: parse_opt_ts(r.completed_at.as_deref())?,
            state: parse_enum(&r.state)?,
            is_bye: r.is_bye,
        })
    }
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = tcc_matches, treat_none_as_null = true)]
pub(crate) struct MatchWrite {
    pub id: String,
    pub tournament_id: String,
    pub user_id: i64,
    pub identifier: String,
    pub round: i32,
    pub suggested_play_order: i32,
    pub bracket_position: i32,
    pub losers_bracket: bool,
    pub player1_id: Option<String>,
    pub player2_id: Option<String>,
    pub player1_prereq_match_id: Option<String>,
    pub player2_prereq_match_id: Option<String>,
    pub player1_is_prereq_loser: bool,
    pub player2_is_prereq_loser: bool,
    pub winner_id: Option<String>,
    pub loser_id: Option<String>,
    pub player1_score: i32,
    pub player2_score: i32,
    pub score_text: Option<String>,
    pub forfeited: bool,
    pub forfeited_participant_id: Option<String>,
    pub station_id: Option<String>,
    pub underway_at: Option<String>,
    pub completed_at: Option<String>,
    pub state: String,
    pub is_bye: bool,
}

impl From<&Match> for MatchWrite {
    fn from(m: &Match) -> Self {
        MatchWrite {
            id: m.id.to_string(),
            tournament_id: m.tournament_id.to_string(),
            user_id: m.user_id,
            identifier: m.identifier.clone(),
            round: m.round,
            suggested_play_order: m.suggested_play_order as i32,
            bracket_position: m.bracket_position as i32,
            losers_bracket: m.losers_bracket,
            player1_id: opt_uid(m.player1_id),
            player2_id: opt_uid(m.player2_id),
            player1_prereq_match_id: opt_uid(m.player1_prereq_match_id),
            player2_prereq_match_id: opt_uid(m.player2_prereq_match_id),
            player1_is_prereq_loser: m.player1_is_prereq_loser,
            player2_is_prereq_loser: m.player2_is_prereq_loser,
            winner_id: opt_uid(m.winner_id),
            loser_id: opt_uid(m.loser_id),
            player1_score: m.player1_score,
            player2_score: m.player2_score,
            score_text: m.score_text.clone(),
            forfeited: m.forfeited,
            forfeited_participant_id: opt_uid(m.forfeited_participant_id),
            station_id: opt_uid(m.station_id),
            underway_at: opt_ts(m.underway_at),
            completed_at: opt_ts(m.completed_at),
            state: m.state.to_string(),
            is_bye: m.is_bye,
        }
    }
}

#[async_trait]
impl DbpMatch for crate::SqliteDb {
    #[instrument(name = "db.match.get", skip(self), fields(id = %m_id))]
    async fn get_match(&self, m_id: Uuid) -> DbResult<Option<Match>> {
        self.with_conn(move |conn| {
            let row = tcc_matches
                .find(m_id.to_string())
                .first::<MatchRow>(conn)
                .optional()
                .map_err(map_db_err)?;
            row.map(Match::try_from).transpose()
        })
        .await
    }

    #[instrument(name = "db.match.list", skip(self), fields(tournament = %t_id))]
    async fn list_matches(&self, t_id: Uuid) -> DbResult<Vec<Match>> {
        self.with_conn(move |conn| {
            let rows = tcc_matches
                .filter(tournament_id.eq(t_id.to_string()))
                .order(suggested_play_order.asc())
                .load::<MatchRow>(conn)
                .map_err(map_db_err)?;
            rows.into_iter().map(Match::try_from).collect()
        })
        .await
    }
}
