//! implementation of the waitlist read port; writes go through `commit`

use crate::{
    helpers::*,
    map_db_err,
    schema::{tcc_waitlist, tcc_waitlist::dsl::*},
};
use app_core::{DbError, DbResult, DbpWaitlist, WaitlistEntry};
use async_trait::async_trait;
use diesel::prelude::{
    AsChangeset, ExpressionMethods, Insertable, QueryDsl, Queryable, RunQueryDsl,
};
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Queryable)]
pub(crate) struct WaitlistRow {
    pub id: String,
    pub tournament_id: String,
    pub user_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub position: i32,
    pub status: String,
    pub created_at: String,
    pub promoted_at: Option<String>,
}

impl TryFrom<WaitlistRow> for WaitlistEntry {
    type Error = DbError;

    fn try_from(r: WaitlistRow) -> Result<Self, Self::Error> {
        Ok(WaitlistEntry {
            id: parse_uid(&r.id)?,
            tournament_id: parse_uid(&r.tournament_id)?,
            user_id: r.user_id,
            name: r.name,
            email: r.email,
            position: r.position.max(0) as u32,
            status: parse_enum(&r.status)?,
            created_at: parse_ts(&r.created_at)?,
            promoted_at: parse_opt_ts(r.promoted_at.as_deref())?,
        })
    }
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = tcc_waitlist, treat_none_as_null = true)]
pub(crate) struct WaitlistWrite {
    pub id: String,
    pub tournament_id: String,
    pub user_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub position: i32,
    pub status: String,
    pub created_at: String,
    pub promoted_at: Option<String>,
}

impl From<&WaitlistEntry> for WaitlistWrite {
    fn from(e: &WaitlistEntry) -> Self {
        WaitlistWrite {
            id: e.id.to_string(),
            tournament_id: e.tournament_id.to_string(),
            user_id: e.user_id,
            name: e.name.clone(),
            email: e.email.clone(),
            position: e.position as i32,
            status: e.status.to_string(),
            created_at: ts(e.created_at),
            promoted_at: opt_ts(e.promoted_at),
        }
    }
}

#[async_trait]
impl DbpWaitlist for crate::SqliteDb {
    #[instrument(name = "db.waitlist.list", skip(self), fields(tournament = %t_id))]
    async fn list_waitlist(&self, t_id: Uuid) -> DbResult<Vec<WaitlistEntry>> {
        self.with_conn(move |conn| {
            let rows = tcc_waitlist
                .filter(tournament_id.eq(t_id.to_string()))
                .order(position.asc())
                .load::<WaitlistRow>(conn)
                .map_err(map_db_err)?;
            rows.into_iter().map(WaitlistEntry::try_from).collect()
        })
        .await
    }
}
