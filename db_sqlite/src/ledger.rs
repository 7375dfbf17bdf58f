//! implementation of the match-history ledger read port; appends, undo
//! marks and pruning happen inside `commit`

use crate::{
    helpers::*,
    map_db_err,
    schema::{tcc_match_history, tcc_match_history::dsl::*},
};
use app_core::{DbError, DbResult, DbpLedger, MatchChange};
use async_trait::async_trait;
use diesel::prelude::{
    AsChangeset, ExpressionMethods, Insertable, OptionalExtension, QueryDsl, Queryable, RunQueryDsl,
};
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Queryable)]
pub(crate) struct ChangeRow {
    pub id: String,
    pub tournament_id: String,
    pub user_id: i64,
    pub match_id: String,
    pub action: String,
    pub prior_state: String,
    pub prior_winner_id: Option<String>,
    pub prior_loser_id: Option<String>,
    pub prior_player1_score: i32,
    pub prior_player2_score: i32,
    pub actor: Option<String>,
    pub undone: bool,
    pub created_at: String,
}

impl TryFrom<ChangeRow> for MatchChange {
    type Error = DbError;

    fn try_from(r: ChangeRow) -> Result<Self, Self::Error> {
        Ok(MatchChange {
            id: parse_uid(&r.id)?,
            tournament_id: parse_uid(&r.tournament_id)?,
            user_id: r.user_id,
            match_id: parse_uid(&r.match_id)?,
            action: parse_enum(&r.action)?,
            prior_state: parse_enum(&r.prior_state)?,
            prior_winner_id: parse_opt_uid(r.prior_winner_id.as_deref())?,
            prior_loser_id: parse_opt_uid(r.prior_loser_id.as_deref())?,
            prior_player1_score: r.prior_player1_score,
            prior_player2_score: r.prior_player2_score,
            actor: r.actor,
            undone: r.undone,
            created_at: parse_ts(&r.created_at)?,
        })
    }
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = tcc_match_history, treat_none_as_null = true)]
pub(crate) struct ChangeWrite {
    pub id: String,
    pub tournament_id: String,
    pub user_id: i64,
    pub match_id: String,
    pub action: String,
    pub prior_state: String,
    pub prior_winner_id: Option<String>,
    pub prior_loser_id: Option<String>,
    pub prior_player1_score: i32,
    pub prior_player2_score: i32,
    pub actor: Option<String>,
    pub undone: bool,
    pub created_at: String,
}

impl From<&MatchChange> for ChangeWrite {
    fn from(c: &MatchChange) -> Self {
        ChangeWrite {
            id: c.id.to_string(),
            tournament_id: c.tournament_id.to_string(),
            user_id: c.user_id,
            match_id: c.match_id.to_string(),
            action: c.action.to_string(),
            prior_state: c.prior_state.to_string(),
            prior_winner_id: opt_uid(c.prior_winner_id),
            prior_loser_id: opt_uid(c.prior_loser_id),
            prior_player1_score: c.prior_player1_score,
            prior_player2_score: c.prior_player2_score,
            actor: c.actor.clone(),
            undone: c.undone,
            created_at: ts(c.created_at),
        }
    }
}

#[async_trait]
impl DbpLedger for crate::SqliteDb {
    #[instrument(name = "db.ledger.latest", skip(self), fields(tournament = %t_id))]
    async fn latest_change(&self, t_id: Uuid) -> DbResult<Option<MatchChange>> {
        self.with_conn(move |conn| {
            let row = tcc_match_history
                .filter(tournament_id.eq(t_id.to_string()))
                .order(created_at.desc())
                .first::<ChangeRow>(conn)
                .optional()
                .map_err(map_db_err)?;
            row.map(MatchChange::try_from).transpose()
        })
        .await
    }

    #[instrument(name = "db.ledger.list", skip(self), fields(tournament = %t_id))]
    async fn list_changes(&self, t_id: Uuid, limit: usize) -> DbResult<Vec<MatchChange>> {
        self.with_conn(move |conn| {
            let rows = tcc_match_history
                .filter(tournament_id.eq(t_id.to_string()))
                .order(created_at.desc())
                .limit(limit as i64)
                .load::<ChangeRow>(conn)
                .map_err(map_db_err)?;
            rows.into_iter().map(MatchChange::try_from).collect()
        })
        .await
    }
}
