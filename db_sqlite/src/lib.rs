// diesel sqlite implementation of the database port
//
// The store is the single source of truth and intentionally single-writer:
// synchronous diesel connections come out of a small r2d2 pool and all work
// runs on the blocking pool; multi-row mutations arrive as one WriteBatch
// and commit inside one transaction.

pub mod helpers;
mod deployment;
mod ledger;
mod match_store;
mod participant;
pub mod schema;
mod station;
mod tournament;
mod waitlist;

pub use helpers::*;

use crate::schema::{
    tcc_match_history, tcc_matches, tcc_participants, tcc_stations, tcc_tournaments, tcc_waitlist,
};
use anyhow::anyhow;
use app_core::{DatabasePort, DbError, DbResult, LEDGER_RETENTION, WriteBatch};
use async_trait::async_trait;
use diesel::{
    ExpressionMethods, QueryDsl, RunQueryDsl, SqliteConnection,
    connection::SimpleConnection,
    r2d2::{ConnectionManager, CustomizeConnection, Pool},
    sql_query,
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{info, instrument, warn};

/// embed migrations
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub struct SqliteDb {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl SqliteDb {
    /// Open (or create) the database file.
    pub fn new(database_path: &str) -> anyhow::Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_path);
        let pool = Pool::builder()
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)?;
        Ok(SqliteDb { pool })
    }

    /// Private in-memory database; the pool is capped at one connection so
    /// every caller sees the same data. Test support.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)?;
        Ok(SqliteDb { pool })
    }

    #[instrument(name = "db.migration", skip(self))]
    pub async fn run_migration(&self) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.run_pending_migrations(MIGRATIONS)
                .map_err(|e| DbError::Other(anyhow!("migration failed: {e}")))?;
            Ok(())
        })
        .await?;
        info!("Migrations applied successfully");
        Ok(())
    }

    /// Run a blocking closure with a pooled connection on the blocking pool.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> DbResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = match pool.get() {
                Ok(conn) => conn,
                Err(e) => {
                    // Pool exhausted or database unavailable
                    warn!(error = %e, "pool_get_failed");
                    return Err(DbError::Other(e.into()));
                }
            };
            f(&mut conn)
        })
        .await
        .map_err(|e| DbError::Other(anyhow!("join error while running db work: {e}")))?
    }
}

#[async_trait]
impl DatabasePort for SqliteDb {
    #[instrument(name = "db.ping", skip(self))]
    async fn ping_db(&self) -> DbResult<()> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map_err(map_db_err)?;
            Ok(())
        })
        .await
    }

    #[instrument(
        name = "db.commit",
        skip(self, batch),
        fields(
            match_inserts = batch.insert_matches.len(),
            match_updates = batch.update_matches.len(),
        )
    )]
    async fn commit(&self, batch: &WriteBatch) -> DbResult<()> {
        let batch = batch.clone();
        self.with_conn(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                if let Some(t) = &batch.update_tournament {
                    let row = tournament::TournamentWrite::from(t);
                    diesel::update(tcc_tournaments::table.find(t.id.to_string()))
                        .set(&row)
                        .execute(conn)?;
                }
                if !batch.insert_matches.is_empty() {
                    let rows: Vec<match_store::MatchWrite> =
                        batch.insert_matches.iter().map(Into::into).collect();
                    diesel::insert_into(tcc_matches::table)
                        .values(&rows)
                        .execute(conn)?;
                }
                for m in &batch.update_matches {
                    let row = match_store::MatchWrite::from(m);
                    diesel::update(tcc_matches::table.find(m.id.to_string()))
                        .set(&row)
                        .execute(conn)?;
                }
                if let Some(tid) = batch.delete_matches_of {
                    diesel::delete(
                        tcc_matches::table
                            .filter(tcc_matches::tournament_id.eq(tid.to_string())),
                    )
                    .execute(conn)?;
                }
                if !batch.insert_participants.is_empty() {
                    let rows: Vec<participant::ParticipantWrite> =
                        batch.insert_participants.iter().map(Into::into).collect();
                    diesel::insert_into(tcc_participants::table)
                        .values(&rows)
                        .execute(conn)?;
                }
                for p in &batch.update_participants {
                    let row = participant::ParticipantWrite::from(p);
                    diesel::update(tcc_participants::table.find(p.id.to_string()))
                        .set(&row)
                        .execute(conn)?;
                }
                for s in &batch.update_stations {
                    let row = station::StationWrite::from(s);
                    diesel::update(tcc_stations::table.find(s.id.to_string()))
                        .set(&row)
                        .execute(conn)?;
                }
                if !batch.insert_waitlist.is_empty() {
                    let rows: Vec<waitlist::WaitlistWrite> =
                        batch.insert_waitlist.iter().map(Into::into).collect();
                    diesel::insert_into(tcc_waitlist::table)
                        .values(&rows)
                        .execute(conn)?;
                }
                for w in &batch.update_waitlist {
                    let row = waitlist::WaitlistWrite::from(w);
                    diesel::update(tcc_waitlist::table.find(w.id.to_string()))
                        .set(&row)
                        .execute(conn)?;
                }
                if let Some(entry) = &batch.ledger_append {
                    let row = ledger::ChangeWrite::from(entry);
                    diesel::insert_into(tcc_match_history::table)
                        .values(&row)
                        .execute(conn)?;
                    // retention: prune entries beyond the window, oldest first
                    let stale: Vec<String> = tcc_match_history::table
                        .filter(
                            tcc_match_history::tournament_id
                                .eq(entry.tournament_id.to_string()),
                        )
                        .order(tcc_match_history::created_at.desc())
                        .limit(1024)
                        .offset(LEDGER_RETENTION as i64)
                        .select(tcc_match_history::id)
                        .load::<String>(conn)?;
                    if !stale.is_empty() {
                        diesel::delete(
                            tcc_match_history::table
                                .filter(tcc_match_history::id.eq_any(stale)),
                        )
                        .execute(conn)?;
                    }
                }
                if let Some(change_id) = batch.ledger_mark_undone {
                    diesel::update(tcc_match_history::table.find(change_id.to_string()))
                        .set(tcc_match_history::undone.eq(true))
                        .execute(conn)?;
                }
                if let Some(tid) = batch.clear_ledger_of {
                    diesel::delete(
                        tcc_match_history::table
                            .filter(tcc_match_history::tournament_id.eq(tid.to_string())),
                    )
                    .execute(conn)?;
                }
                Ok(())
            })
            .map_err(map_db_err)
        })
        .await
    }
}

use diesel::Connection;
use diesel::result::{DatabaseErrorKind as K, Error as DE};

pub fn map_db_err(e: DE) -> DbError {
    match &e {
        DE::NotFound => DbError::NotFound,
        DE::DatabaseError(kind, info) => {
            let c = info.constraint_name().map(|s| s.to_string());
            match kind {
                K::UniqueViolation => DbError::UniqueViolation(c),
                K::ForeignKeyViolation => DbError::ForeignKeyViolation(c),
                K::CheckViolation => DbError::CheckViolation(c),
                _ if info.message().contains("database is locked") => DbError::Busy,
                _ => DbError::Other(anyhow::anyhow!(e)),
            }
        }
        _ => DbError::Other(anyhow::anyhow!(e)),
    }
}
