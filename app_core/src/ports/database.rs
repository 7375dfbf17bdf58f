// database port

use crate::{
    Deployment, Match, MatchChange, Participant, Station, TenantScope, Tournament, WaitlistEntry,
};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// database port trait
#[async_trait]
pub trait DatabasePort:
    DbpTournament + DbpParticipant + DbpMatch + DbpStation + DbpWaitlist + DbpLedger + DbpDeployment
{
    async fn ping_db(&self) -> DbResult<()>;

    /// Apply one write batch atomically. Every mutating core operation that
    /// touches more than a single row goes through here so that matches,
    /// stations, participants and the change ledger move together or not at
    /// all. Borrowed so that callers can retry transient failures.
    async fn commit(&self, batch: &WriteBatch) -> DbResult<()>;
}

/// database port trait for tournaments
#[async_trait]
pub trait DbpTournament: Send + Sync {
    async fn get_tournament(&self, scope: TenantScope, id: Uuid) -> DbResult<Option<Tournament>>;
    async fn get_tournament_by_slug(
        &self,
        scope: TenantScope,
        slug: &str,
    ) -> DbResult<Option<Tournament>>;
    async fn list_tournaments(&self, scope: TenantScope) -> DbResult<Vec<Tournament>>;
    async fn insert_tournament(&self, tournament: &Tournament) -> DbResult<()>;
    async fn update_tournament(&self, tournament: &Tournament) -> DbResult<()>;
    /// Cascades to participants, matches, stations, waitlist and ledger.
    async fn delete_tournament(&self, id: Uuid) -> DbResult<()>;
    async fn slug_exists(&self, user_id: i64, slug: &str) -> DbResult<bool>;
}

/// database port trait for participants
#[async_trait]
pub trait DbpParticipant: Send + Sync {
    async fn get_participant(&self, id: Uuid) -> DbResult<Option<Participant>>;
    async fn list_participants(&self, tournament_id: Uuid) -> DbResult<Vec<Participant>>;
    async fn insert_participants(&self, participants: &[Participant]) -> DbResult<()>;
    async fn update_participants(&self, participants: &[Participant]) -> DbResult<()>;
    async fn delete_participant(&self, id: Uuid) -> DbResult<()>;
}

/// database port trait for matches (reads; writes go through `commit`)
#[async_trait]
pub trait DbpMatch: Send + Sync {
    async fn get_match(&self, id: Uuid) -> DbResult<Option<Match>>;
    async fn list_matches(&self, tournament_id: Uuid) -> DbResult<Vec<Match>>;
}

/// database port trait for stations
#[async_trait]
pub trait DbpStation: Send + Sync {
    async fn list_stations(&self, tournament_id: Uuid) -> DbResult<Vec<Station>>;
    async fn insert_station(&self, station: &Station) -> DbResult<()>;
    async fn delete_station(&self, id: Uuid) -> DbResult<()>;
}

/// database port trait for the waitlist
#[async_trait]
pub trait DbpWaitlist: Send + Sync {
    async fn list_waitlist(&self, tournament_id: Uuid) -> DbResult<Vec<WaitlistEntry>>;
}

/// database port trait for the match change ledger
#[async_trait]
pub trait DbpLedger: Send + Sync {
    async fn latest_change(&self, tournament_id: Uuid) -> DbResult<Option<MatchChange>>;
    async fn list_changes(&self, tournament_id: Uuid, limit: usize) -> DbResult<Vec<MatchChange>>;
}

/// database port trait for the per-tenant display deployment pointer
#[async_trait]
pub trait DbpDeployment: Send + Sync {
    async fn get_deployment(&self, user_id: i64) -> DbResult<Option<Deployment>>;
    async fn set_deployment(&self, deployment: &Deployment) -> DbResult<()>;
}

/// One transactional unit of writes. Fields are applied in declaration order
/// inside a single store transaction; empty fields are skipped.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub update_tournament: Option<Tournament>,
    pub insert_matches: Vec<Match>,
    pub update_matches: Vec<Match>,
    /// delete all matches of this tournament (reset)
    pub delete_matches_of: Option<Uuid>,
    pub insert_participants: Vec<Participant>,
    pub update_participants: Vec<Participant>,
    pub update_stations: Vec<Station>,
    pub insert_waitlist: Vec<WaitlistEntry>,
    pub update_waitlist: Vec<WaitlistEntry>,
    /// append one ledger entry; the adapter prunes entries beyond the
    /// retention window in the same transaction
    pub ledger_append: Option<MatchChange>,
    /// mark this ledger entry as consumed by undo
    pub ledger_mark_undone: Option<Uuid>,
    /// drop the whole ledger of this tournament (reset)
    pub clear_ledger_of: Option<Uuid>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.update_tournament.is_none()
            && self.insert_matches.is_empty()
            && self.update_matches.is_empty()
            && self.delete_matches_of.is_none()
            && self.insert_participants.is_empty()
            && self.update_participants.is_empty()
            && self.update_stations.is_empty()
            && self.insert_waitlist.is_empty()
            && self.update_waitlist.is_empty()
            && self.ledger_append.is_none()
            && self.ledger_mark_undone.is_none()
            && self.clear_ledger_of.is_none()
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    /// ID does not exist
    #[error("entity not found")]
    NotFound,

    /// constraint name if it is returned from db
    #[error("unique violation{0:?}")]
    UniqueViolation(Option<String>),

    /// constraint name if it is returned from db
    #[error("foreign key violation{0:?}")]
    ForeignKeyViolation(Option<String>),

    /// constraint name if it is returned from db
    #[error("check violation{0:?}")]
    CheckViolation(Option<String>),

    /// transient lock contention (retry may work)
    #[error("database busy")]
    Busy,

    /// stored row could not be mapped to a core record
    #[error("row decode error: {0}")]
    Decode(String),

    // connection, pool, or other DB errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    /// Mutations are retried once on transient errors.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Busy)
    }
}

pub type DbResult<T> = Result<T, DbError>;
