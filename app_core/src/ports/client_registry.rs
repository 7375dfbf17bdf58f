// client registry port types

use crate::{Match, MatchState};
use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Framework-agnostic event stream (boxed + pinned trait object).
/// Dropping the stream ends the subscription. A subscriber that falls behind
/// the bounded room buffer observes end-of-stream and must resubscribe and
/// reconcile via a fetch.
pub type CrEventStream = Pin<Box<dyn Stream<Item = CrEvent> + Send + 'static>>;

/// Rooms a client can subscribe to. Rooms never span tenants.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum CrTopic {
    /// tournament CRUD and lifecycle of one tenant
    TenantTournaments(i64),
    /// participant edits, match lifecycle, standings changes of one tournament
    Tournament { user_id: i64, tournament_id: Uuid },
    /// display deployment of one tenant
    Flyer(i64),
}

impl CrTopic {
    pub fn user_id(&self) -> i64 {
        match self {
            CrTopic::TenantTournaments(user_id) => *user_id,
            CrTopic::Tournament { user_id, .. } => *user_id,
            CrTopic::Flyer(user_id) => *user_id,
        }
    }

    /// Wire name of the room.
    pub fn room_name(&self) -> String {
        match self {
            CrTopic::TenantTournaments(user_id) => format!("tenant:{user_id}:tournaments"),
            CrTopic::Tournament {
                user_id,
                tournament_id,
            } => format!("tenant:{user_id}:tournament:{tournament_id}"),
            CrTopic::Flyer(user_id) => format!("tenant:{user_id}:flyer"),
        }
    }
}

/// Reduced match record carried in `matches:update` snapshots so that a late
/// subscriber can resync from a single message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub id: Uuid,
    pub identifier: String,
    pub round: i32,
    pub state: MatchState,
    pub player1_id: Option<Uuid>,
    pub player2_id: Option<Uuid>,
    pub winner_id: Option<Uuid>,
    pub player1_score: i32,
    pub player2_score: i32,
    pub suggested_play_order: u32,
    pub station_id: Option<Uuid>,
    pub is_bye: bool,
}

impl From<&Match> for MatchSnapshot {
    fn from(m: &Match) -> Self {
        MatchSnapshot {
            id: m.id,
            identifier: m.identifier.clone(),
            round: m.round,
            state: m.state,
            player1_id: m.player1_id,
            player2_id: m.player2_id,
            winner_id: m.winner_id,
            player1_score: m.player1_score,
            player2_score: m.player2_score,
            suggested_play_order: m.suggested_play_order,
            station_id: m.station_id,
            is_bye: m.is_bye,
        }
    }
}

/// Domain events sent to subscribed clients; the serialized shape is the wire
/// record `{event, tournamentId, …payload}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum CrEvent {
    #[serde(rename = "tournament:created")]
    TournamentCreated {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
    },
    #[serde(rename = "tournament:updated")]
    TournamentUpdated {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
    },
    #[serde(rename = "tournament:deleted")]
    TournamentDeleted {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
    },
    #[serde(rename = "tournament:started")]
    TournamentStarted {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
        #[serde(rename = "gameName")]
        game_name: Option<String>,
        #[serde(rename = "matchCount")]
        match_count: u32,
    },
    #[serde(rename = "tournament:reset")]
    TournamentReset {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
    },
    #[serde(rename = "tournament:completed")]
    TournamentCompleted {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
    },
    #[serde(rename = "match:updated")]
    MatchUpdated {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
        #[serde(rename = "matchId")]
        match_id: Uuid,
    },
    #[serde(rename = "match:completed")]
    MatchCompleted {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
        #[serde(rename = "matchId")]
        match_id: Uuid,
        #[serde(rename = "winnerId")]
        winner_id: Option<Uuid>,
    },
    /// whole-array snapshot, published alongside any `match:*` event
    #[serde(rename = "matches:update")]
    MatchesUpdate {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
        matches: Vec<MatchSnapshot>,
    },
    #[serde(rename = "participant:added")]
    ParticipantAdded {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
        #[serde(rename = "participantId")]
        participant_id: Uuid,
    },
    #[serde(rename = "participant:updated")]
    ParticipantUpdated {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
        #[serde(rename = "participantId")]
        participant_id: Uuid,
    },
    #[serde(rename = "participant:deleted")]
    ParticipantDeleted {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
        #[serde(rename = "participantId")]
        participant_id: Uuid,
    },
    #[serde(rename = "participant:checkin")]
    ParticipantCheckin {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
        #[serde(rename = "participantId")]
        participant_id: Uuid,
        #[serde(rename = "checkedIn")]
        checked_in: bool,
    },
    #[serde(rename = "participant:bulk")]
    ParticipantBulk {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
        count: u32,
    },
    #[serde(rename = "participant:seeded")]
    ParticipantSeeded {
        #[serde(rename = "tournamentId")]
        tournament_id: Uuid,
    },
    /// emitted by the external game-config collaborator
    #[serde(rename = "games:created")]
    GamesCreated { name: String },
    #[serde(rename = "games:updated")]
    GamesUpdated { name: String },
    #[serde(rename = "games:deleted")]
    GamesDeleted { name: String },
    /// emitted by the external command-center collaborator
    #[serde(rename = "emergency:activated")]
    EmergencyActivated { message: Option<String> },
    #[serde(rename = "emergency:deactivated")]
    EmergencyDeactivated {},
    /// display deployment pointer changed (flyer room)
    #[serde(rename = "flyer:deployed")]
    FlyerDeployed {
        #[serde(rename = "tournamentId")]
        tournament_id: Option<Uuid>,
    },
}

#[derive(Debug, Error)]
pub enum CrError {
    /// topic rejected by the registry
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    // registry internals
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CrResult<T> = Result<T, CrError>;

/// client registry port trait
#[async_trait]
pub trait ClientRegistryPort: Send + Sync {
    /// Subscribe to a room; dropping the returned stream ends the
    /// subscription (RAII).
    async fn subscribe(&self, topic: CrTopic) -> CrResult<CrEventStream>;

    /// Publish an event to current listeners of the room (no room is created
    /// if none exist). Fire-and-forget: delivery to lagging subscribers is
    /// not guaranteed.
    async fn publish(&self, topic: CrTopic, event: CrEvent) -> CrResult<()>;
}
