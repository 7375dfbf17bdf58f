//! implementation of the participant port

use crate::{
    helpers::*,
    map_db_err,
    schema::{tcc_participants, tcc_participants::dsl::*},
};
use app_core::{DbError, DbResult, DbpParticipant, Participant};
use async_trait::async_trait;
use diesel::prelude::{
    AsChangeset, ExpressionMethods, Insertable, OptionalExtension, QueryDsl, Queryable, RunQueryDsl,
};
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Queryable)]
pub(crate) struct ParticipantRow {
    pub id: String,
    pub tournament_id: String,
    pub user_id: i64,
    pub name: String,
    pub seed: i32,
    pub active: bool,
    pub checked_in: bool,
    pub misc: Option<String>,
    pub final_rank: Option<i32>,
    pub created_at: String,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = DbError;

    fn try_from(r: ParticipantRow) -> Result<Self, Self::Error> {
        Ok(Participant {
            id: parse_uid(&r.id)?,
            tournament_id: parse_uid(&r.tournament_id)?,
            user_id: r.user_id,
            name: r.name,
            seed: r.seed.max(0) as u32,
            active: r.active,
            checked_in: r.checked_in,
            misc: r.misc,
            final_rank: r.final_rank.and_then(|v| u32::try_from(v).ok()),
            created_at: parse_ts(&r.created_at)?,
        })
    }
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = tcc_participants, treat_none_as_null = true)]
pub(crate) struct ParticipantWrite {
    pub id: String,
    pub tournament_id: String,
    pub user_id: i64,
    pub name: String,
    pub seed: i32,
    pub active: bool,
    pub checked_in: bool,
    pub misc: Option<String>,
    pub final_rank: Option<i32>,
    pub created_at: String,
}

impl From<&Participant> for ParticipantWrite {
    fn from(p: &Participant) -> Self {
        ParticipantWrite {
            id: p.id.to_string(),
            tournament_id: p.tournament_id.to_string(),
            user_id: p.user_id,
            name: p.name.clone(),
            seed: p.seed as i32,
            active: p.active,
            checked_in: p.checked_in,
            misc: p.misc.clone(),
            final_rank: p.final_rank.map(|v| v as i32),
            created_at: ts(p.created_at),
        }
    }
}

#[async_trait]
impl DbpParticipant for crate::SqliteDb {
    #[instrument(name = "db.participant.get", skip(self), fields(id = %p_id))]
    async fn get_participant(&self, p_id: Uuid) -> DbResult<Option<Participant>> {
        self.with_conn(move |conn| {
            let row = tcc_participants
                .find(p_id.to_string())
                .first::<ParticipantRow>(conn)
                .optional()
                .map_err(map_db_err)?;
            row.map(Participant::try_from).transpose()
        })
        .await
    }

    #[instrument(name = "db.participant.list", skip(self), fields(tournament = %t_id))]
    async fn list_participants(&self, t_id: Uuid) -> DbResult<Vec<Participant>> {
        self.with_conn(move |conn| {
            let rows = tcc_participants
                .filter(tournament_id.eq(t_id.to_string()))
                .order(seed.asc())
                .load::<ParticipantRow>(conn)
                .map_err(map_db_err)?;
            rows.into_iter().map(Participant::try_from).collect()
        })
        .await
    }

    #[instrument(name = "db.participant.insert", skip(self, participants), fields(count = participants.len()))]
    async fn insert_participants(&self, participants: &[Participant]) -> DbResult<()> {
        let rows: Vec<ParticipantWrite> = participants.iter().map(Into::into).collect();
        self.with_conn(move |conn| {
            diesel::insert_into(tcc_participants)
                .values(&rows)
                .execute(conn)
                .map_err(map_db_err)?;
            Ok(())
        })
        .await
    }

    #[instrument(name = "db.participant.update", skip(self, participants), fields(count = participants.len()))]
    async fn update_participants(&self, participants: &[Participant]) -> DbResult<()> {
        let rows: Vec<ParticipantWrite> = participants.iter().map(Into::into).collect();
        self.with_conn(move |conn| {
            for row in rows {
                let key = row.id.clone();
                diesel::update(tcc_participants.find(key))
                    .set(&row)
                    .execute(conn)
                    .map_err(map_db_err)?;
            }
            Ok(())
        })
        .await
    }

    #[instrument(name = "db.participant.delete", skip(self), fields(id = %p_id))]
    async fn delete_participant(&self, p_id: Uuid) -> DbResult<()> {
        self.with_conn(move |conn| {
            let n = diesel::delete(tcc_participants.find(p_id.to_string()))
                .execute(conn)
                .map_err(map_db_err)?;
            if n == 0 {
                return Err(DbError::NotFound);
            }
            Ok(())
        })
        .await
    }
}
