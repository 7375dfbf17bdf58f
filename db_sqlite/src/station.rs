//! implementation of the station port

use crate::{
    helpers::*,
    map_db_err,
    schema::{tcc_stations, tcc_stations::dsl::*},
};
use app_core::{DbError, DbResult, DbpStation, Station};
use async_trait::async_trait;
use diesel::prelude::{
    AsChangeset, ExpressionMethods, Insertable, QueryDsl, Queryable, RunQueryDsl,
};
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Queryable)]
pub(crate) struct StationRow {
    pub id: String,
    pub tournament_id: String,
    pub user_id: i64,
    pub name: String,
    pub current_match_id: Option<String>,
}

impl TryFrom<StationRow> for Station {
    type Error = DbError;

    fn try_from(r: StationRow) -> Result<Self, Self::Error> {
        Ok(Station {
            id: parse_uid(&r.id)?,
            tournament_id: parse_uid(&r.tournament_id)?,
            user_id: r.user_id,
            name: r.name,
            current_match_id: parse_opt_uid(r.current_match_id.as_deref())?,
        })
    }
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = tcc_stations, treat_none_as_null = true)]
pub(crate) struct StationWrite {
    pub id: String,
    pub tournament_id: String,
    pub user_id: i64,
    pub name: String,
    pub current_match_id: Option<String>,
}

impl From<&Station> for StationWrite {
    fn from(s: &Station) -> Self {
        StationWrite {
            id: s.id.to_string(),
            tournament_id: s.tournament_id.to_string(),
            user_id: s.user_id,
            name: s.name.clone(),
            current_match_id: opt_uid(s.current_match_id),
        }
    }
}

#[async_trait]
impl DbpStation for crate::SqliteDb {
    #[instrument(name = "db.station.list", skip(self), fields(tournament = %t_id))]
    async fn list_stations(&self, t_id: Uuid) -> DbResult<Vec<Station>> {
        self.with_conn(move |conn| {
            let rows = tcc_stations
                .filter(tournament_id.eq(t_id.to_string()))
                .order(name.asc())
                .load::<StationRow>(conn)
                .map_err(map_db_err)?;
            rows.into_iter().map(Station::try_from).collect()
        })
        .await
    }

    #[instrument(name = "db.station.insert", skip(self, station), fields(id = %station.id))]
    async fn insert_station(&self, station: &Station) -> DbResult<()> {
        let row = StationWrite::from(station);
        self.with_conn(move |conn| {
            diesel::insert_into(tcc_stations)
                .values(&row)
                .execute(conn)
                .map_err(map_db_err)?;
            Ok(())
        })
        .await
    }

    #[instrument(name = "db.station.delete", skip(self), fields(id = %s_id))]
    async fn delete_station(&self, s_id: Uuid) -> DbResult<()> {
        self.with_conn(move |conn| {
            let n = diesel::delete(tcc_stations.find(s_id.to_string()))
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
