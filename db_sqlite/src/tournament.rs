//! implementation of the tournament port

use crate::{
    helpers::*,
    map_db_err,
    schema::{tcc_tournaments, tcc_tournaments::dsl::*},
};
use app_core::{
    DbError, DbResult, DbpTournament, TenantScope, Tournament, TournamentOptions,
};
use async_trait::async_trait;
use diesel::prelude::{
    AsChangeset, ExpressionMethods, Insertable, OptionalExtension, QueryDsl, Queryable, RunQueryDsl,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

// ------------------- DB row (SELECT) -------------------
#[derive(Debug, Queryable)]
pub(crate) struct TournamentRow {
    pub id: String,
    pub user_id: i64,
    pub name: String,
    pub slug: String,
    pub game_name: Option<String>,
    pub tournament_type: String,
    pub state: String,
    pub hold_third_place_match: bool,
    pub grand_finals_modifier: String,
    pub swiss_rounds: i32,
    pub ranked_by: String,
    pub sequential_pairings: bool,
    pub bye_strategy: String,
    pub signup_cap: Option<i32>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

// Mapping DB -> Core
impl TryFrom<TournamentRow> for Tournament {
    type Error = DbError;

    fn try_from(r: TournamentRow) -> Result<Self, Self::Error> {
        Ok(Tournament {
            id: parse_uid(&r.id)?,
            user_id: r.user_id,
            name: r.name,
            slug: r.slug,
            game_name: r.game_name,
            tournament_type: parse_enum(&r.tournament_type)?,
            state: parse_enum(&r.state)?,
            options: TournamentOptions {
                hold_third_place_match: r.hold_third_place_match,
                grand_finals_modifier: parse_enum(&r.grand_finals_modifier)?,
                swiss_rounds: r.swiss_rounds.max(0) as u32,
                ranked_by: parse_enum(&r.ranked_by)?,
                sequential_pairings: r.sequential_pairings,
                bye_strategy: parse_enum(&r.bye_strategy)?,
                signup_cap: r.signup_cap.and_then(|c| u32::try_from(c).ok()),
            },
            created_at: parse_ts(&r.created_at)?,
            started_at: parse_opt_ts(r.started_at.as_deref())?,
            completed_at: parse_opt_ts(r.completed_at.as_deref())?,
        })
    }
}

// ------------------- INSERT / UPDATE -------------------
#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = tcc_tournaments, treat_none_as_null = true)]
pub(crate) struct TournamentWrite {
    pub id: String,
    pub user_id: i64,
    pub name: String,
    pub slug: String,
    pub game_name: Option<String>,
    pub tournament_type: String,
    pub state: String,
    pub hold_third_place_match: bool,
    pub grand_finals_modifier: String,
    pub swiss_rounds: i32,
    pub ranked_by: String,
    pub sequential_pairings: bool,
    pub bye_strategy: String,
    pub signup_cap: Option<i32>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

// Mapping Core -> DB
impl From<&Tournament> for TournamentWrite {
    fn from(t: &Tournament) -> Self {
        TournamentWrite {
            id: t.id.to_string(),
            user_id: t.user_id,
            name: t.name.clone(),
            slug: t.slug.clone(),
            game_name: t.game_name.clone(),
            tournament_type: t.tournament_type.to_string(),
            state: t.state.to_string(),
            hold_third_place_match: t.options.hold_third_place_match,
            grand_finals_modifier: t.options.grand_finals_modifier.to_string(),
            swiss_rounds: t.options.swiss_rounds as i32,
            ranked_by: t.options.ranked_by.to_string(),
            sequential_pairings: t.options.sequential_pairings,
            bye_strategy: t.options.bye_strategy.to_string(),
            signup_cap: t.options.signup_cap.map(|c| c as i32),
            created_at: ts(t.created_at),
            started_at: opt_ts(t.started_at),
            completed_at: opt_ts(t.completed_at),
        }
    }
}

// ------------------- Impl trait --------------------

#[async_trait]
impl DbpTournament for crate::SqliteDb {
    #[instrument(name = "db.tournament.get", skip(self), fields(id = %t_id))]
    async fn get_tournament(
        &self,
        scope: TenantScope,
        t_id: Uuid,
    ) -> DbResult<Option<Tournament>> {
        self.with_conn(move |conn| {
            let mut query = tcc_tournaments.into_boxed::<diesel::sqlite::Sqlite>();
            if let TenantScope::Only(tenant) = scope {
                query = query.filter(user_id.eq(tenant));
            }
            let row = query
                .filter(id.eq(t_id.to_string()))
                .first::<TournamentRow>(conn)
                .optional()
                .map_err(map_db_err)?;
            match row {
                Some(row) => {
                    debug!("found_tournament");
                    Ok(Some(Tournament::try_from(row)?))
                }
                None => Ok(None),
            }
        })
        .await
    }

    #[instrument(name = "db.tournament.get_by_slug", skip(self, t_slug))]
    async fn get_tournament_by_slug(
        &self,
        scope: TenantScope,
        t_slug: &str,
    ) -> DbResult<Option<Tournament>> {
        let t_slug = t_slug.to_string();
        self.with_conn(move |conn| {
            let mut query = tcc_tournaments.into_boxed::<diesel::sqlite::Sqlite>();
            if let TenantScope::Only(tenant) = scope {
                query = query.filter(user_id.eq(tenant));
            }
            let row = query
                .filter(slug.eq(t_slug))
                .first::<TournamentRow>(conn)
                .optional()
                .map_err(map_db_err)?;
            row.map(Tournament::try_from).transpose()
        })
        .await
    }

    #[instrument(name = "db.tournament.list", skip(self))]
    async fn list_tournaments(&self, scope: TenantScope) -> DbResult<Vec<Tournament>> {
        self.with_conn(move |conn| {
            let mut query = tcc_tournaments.into_boxed::<diesel::sqlite::Sqlite>();
            if let TenantScope::Only(tenant) = scope {
                query = query.filter(user_id.eq(tenant));
            }
            let rows = query
                .order(created_at.desc())
                .load::<TournamentRow>(conn)
                .map_err(map_db_err)?;
            info!(count = rows.len(), "list_ok");
            rows.into_iter().map(Tournament::try_from).collect()
        })
        .await
    }

    #[instrument(name = "db.tournament.insert", skip(self, t), fields(id = %t.id))]
    async fn insert_tournament(&self, t: &Tournament) -> DbResult<()> {
        let row = TournamentWrite::from(t);
        self.with_conn(move |conn| {
            diesel::insert_into(tcc_tournaments)
                .values(&row)
                .execute(conn)
                .map_err(map_db_err)?;
            info!("insert_ok");
            Ok(())
        })
        .await
    }

    #[instrument(name = "db.tournament.update", skip(self, t), fields(id = %t.id))]
    async fn update_tournament(&self, t: &Tournament) -> DbResult<()> {
        let row = TournamentWrite::from(t);
        let t_id = t.id.to_string();
        self.with_conn(move |conn| {
            let n = diesel::update(tcc_tournaments.find(t_id))
                .set(&row)
                .execute(conn)
                .map_err(map_db_err)?;
            if n == 0 {
                return Err(DbError::NotFound);
            }
            Ok(())
        })
        .await
    }

    #[instrument(name = "db.tournament.delete", skip(self), fields(id = %t_id))]
    async fn delete_tournament(&self, t_id: Uuid) -> DbResult<()> {
        self.with_conn(move |conn| {
            let n = diesel::delete(tcc_tournaments.find(t_id.to_string()))
                .execute(conn)
                .map_err(map_db_err)?;
            if n == 0 {
                return Err(DbError::NotFound);
            }
            info!("delete_ok");
            Ok(())
        })
        .await
    }

    #[instrument(name = "db.tournament.slug_exists", skip(self, candidate))]
    async fn slug_exists(&self, tenant: i64, candidate: &str) -> DbResult<bool> {
        let candidate = candidate.to_string();
        self.with_conn(move |conn| {
            diesel::select(diesel::dsl::exists(
                tcc_tournaments
                    .filter(user_id.eq(tenant))
                    .filter(slug.eq(candidate)),
            ))
            .get_result::<bool>(conn)
            .map_err(map_db_err)
        })
        .await
    }
}
