//! Tournament entity, lifecycle state machine and registry operations.

use crate::{
    Core, CoreError, CoreResult, CrEvent, CrTopic, EffectiveTenant, Match, MatchSnapshot,
    MatchState, TenantScope, WriteBatch,
    bracket::{self, BracketPlan, BracketStats},
    standings,
    utils::{normalize_opt, normalize_ws, slugify},
};
use chrono::{DateTime, Utc};
use displaydoc::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// bracket format of a tournament
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum TournamentType {
    /// single_elim
    #[default]
    SingleElim,
    /// double_elim
    DoubleElim,
    /// round_robin
    RoundRobin,
    /// swiss
    Swiss,
}

impl FromStr for TournamentType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_elim" => Ok(TournamentType::SingleElim),
            "double_elim" => Ok(TournamentType::DoubleElim),
            "round_robin" => Ok(TournamentType::RoundRobin),
            "swiss" => Ok(TournamentType::Swiss),
            other => Err(format!("unknown tournament type: {other}")),
        }
    }
}

/// lifecycle state of a tournament
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum TournamentState {
    /// pending
    #[default]
    Pending,
    /// checking_in
    CheckingIn,
    /// underway
    Underway,
    /// awaiting_review
    AwaitingReview,
    /// complete
    Complete,
}

impl FromStr for TournamentState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TournamentState::Pending),
            "checking_in" => Ok(TournamentState::CheckingIn),
            "underway" => Ok(TournamentState::Underway),
            "awaiting_review" => Ok(TournamentState::AwaitingReview),
            "complete" => Ok(TournamentState::Complete),
            other => Err(format!("unknown tournament state: {other}")),
        }
    }
}

impl TournamentState {
    /// True before the bracket exists.
    pub fn is_pre_start(self) -> bool {
        matches!(self, TournamentState::Pending | TournamentState::CheckingIn)
    }

    /// Allowed edges of the lifecycle state machine. Reset edges
    /// (underway/awaiting_review back to pending) are additionally guarded by
    /// `can_reset`.
    pub fn can_transition(self, new: TournamentState) -> bool {
        use TournamentState::*;
        matches!(
            (self, new),
            (Pending, CheckingIn)
                | (CheckingIn, Pending)
                | (Pending, Underway)
                | (CheckingIn, Underway)
                | (Underway, AwaitingReview)
                | (AwaitingReview, Underway)
                | (Underway, Complete)
                | (AwaitingReview, Complete)
                | (Underway, Pending)
                | (AwaitingReview, Pending)
        )
    }
}

/// behaviour of the double-elimination grand final
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum GrandFinalsModifier {
    /// none
    #[default]
    None,
    /// skip
    Skip,
    /// bracket_reset
    BracketReset,
}

impl FromStr for GrandFinalsModifier {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(GrandFinalsModifier::None),
            "skip" => Ok(GrandFinalsModifier::Skip),
            "bracket_reset" => Ok(GrandFinalsModifier::BracketReset),
            other => Err(format!("unknown grand finals modifier: {other}")),
        }
    }
}

/// placement of byes in elimination brackets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ByeStrategy {
    /// traditional
    #[default]
    Traditional,
    /// balanced
    Balanced,
    /// compact_bracket
    CompactBracket,
}

impl FromStr for ByeStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "traditional" => Ok(ByeStrategy::Traditional),
            "balanced" => Ok(ByeStrategy::Balanced),
            "compact_bracket" => Ok(ByeStrategy::CompactBracket),
            other => Err(format!("unknown bye strategy: {other}")),
        }
    }
}

/// primary ranking metric for round-robin and Swiss standings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum RankedBy {
    /// match_wins
    #[default]
    MatchWins,
    /// game_wins
    GameWins,
    /// points_scored
    PointsScored,
    /// points_difference
    PointsDifference,
}

impl FromStr for RankedBy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "match_wins" => Ok(RankedBy::MatchWins),
            "game_wins" => Ok(RankedBy::GameWins),
            "points_scored" => Ok(RankedBy::PointsScored),
            "points_difference" => Ok(RankedBy::PointsDifference),
            other => Err(format!("unknown ranking metric: {other}")),
        }
    }
}

/// Format-specific options. Unknown option keys are rejected at
/// deserialization time (`deny_unknown_fields`), not silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TournamentOptions {
    pub hold_third_place_match: bool,
    pub grand_finals_modifier: GrandFinalsModifier,
    pub swiss_rounds: u32,
    pub ranked_by: RankedBy,
    pub sequential_pairings: bool,
    pub bye_strategy: ByeStrategy,
    pub signup_cap: Option<u32>,
}

impl Default for TournamentOptions {
    fn default() -> Self {
        TournamentOptions {
            hold_third_place_match: false,
            grand_finals_modifier: GrandFinalsModifier::None,
            swiss_rounds: 0,
            ranked_by: RankedBy::MatchWins,
            sequential_pairings: false,
            bye_strategy: ByeStrategy::Traditional,
            signup_cap: None,
        }
    }
}

/// a contest owned by exactly one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    /// id of tournament
    pub id: Uuid,
    /// owning tenant
    pub user_id: i64,
    /// human name
    pub name: String,
    /// URL slug, unique per tenant
    pub slug: String,
    /// name of the game played
    pub game_name: Option<String>,
    pub tournament_type: TournamentType,
    pub state: TournamentState,
    pub options: TournamentOptions,
    pub created_at: DateTime<Utc>,
    /// set iff state is underway, awaiting_review or complete
    pub started_at: Option<DateTime<Utc>>,
    /// set iff state is complete
    pub completed_at: Option<DateTime<Utc>>,
}

impl Tournament {
    pub fn has_started(&self) -> bool {
        !self.state.is_pre_start()
    }

    /// Sort key for "most recent activity" listings.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.completed_at
            .or(self.started_at)
            .unwrap_or(self.created_at)
    }
}

/// attributes for creating a tournament
#[derive(Debug, Clone, Default)]
pub struct NewTournament {
    pub name: String,
    pub game_name: Option<String>,
    pub tournament_type: TournamentType,
    pub options: TournamentOptions,
}

/// patch for a pending tournament; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct TournamentPatch {
    pub name: Option<String>,
    pub game_name: Option<Option<String>>,
    pub tournament_type: Option<TournamentType>,
    pub options: Option<TournamentOptions>,
}

/// listing grouped by lifecycle bucket, each sorted by most recent activity
#[derive(Debug, Clone, Default)]
pub struct TournamentBuckets {
    /// pending or checking_in
    pub pending: Vec<Tournament>,
    /// underway or awaiting_review
    pub underway: Vec<Tournament>,
    pub complete: Vec<Tournament>,
}

/// outcome of a successful start
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub tournament: Tournament,
    pub matches: Vec<Match>,
    pub stats: BracketStats,
}

/// per-tenant display deployment pointer (replaces the legacy state file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub user_id: i64,
    pub tournament_id: Option<Uuid>,
    pub deployed_at: DateTime<Utc>,
}

/// Format-specific start guard. `Ok(())` means the tournament may start.
pub fn start_eligibility(tournament: &Tournament, active_participants: usize) -> Result<(), String> {
    if !tournament.state.is_pre_start() {
        return Err("tournament has already started".into());
    }
    if active_participants < 2 {
        return Err("at least 2 active participants required".into());
    }
    match tournament.tournament_type {
        TournamentType::Swiss if tournament.options.swiss_rounds == 0 => {
            Err("swiss_rounds must be greater than 0".into())
        }
        TournamentType::DoubleElim if active_participants < 4 => {
            Err("double elimination requires at least 4 participants".into())
        }
        _ => Ok(()),
    }
}

impl Core {
    /// Publish to one room; publication is fire-and-forget after commit, so a
    /// registry failure is logged, never surfaced to the caller.
    pub(crate) async fn publish_room(&self, topic: CrTopic, event: CrEvent) {
        if let Err(e) = self.client_registry.publish(topic, event).await {
            warn!(error = %e, "event_publish_failed");
        }
    }

    /// Tournament lifecycle events go to the tenant listing room and to the
    /// per-tournament room.
    pub(crate) async fn publish_lifecycle(
        &self,
        user_id: i64,
        tournament_id: Uuid,
        event: CrEvent,
    ) {
        self.publish_room(CrTopic::TenantTournaments(user_id), event.clone())
            .await;
        self.publish_room(
            CrTopic::Tournament {
                user_id,
                tournament_id,
            },
            event,
        )
        .await;
    }

    /// `matches:update` snapshot for one-message resync of late subscribers.
    pub(crate) async fn publish_matches_snapshot(
        &self,
        user_id: i64,
        tournament_id: Uuid,
        matches: &[Match],
    ) {
        let snapshot: Vec<MatchSnapshot> = matches.iter().map(MatchSnapshot::from).collect();
        self.publish_room(
            CrTopic::Tournament {
                user_id,
                tournament_id,
            },
            CrEvent::MatchesUpdate {
                tournament_id,
                matches: snapshot,
            },
        )
        .await;
    }

    /// Resolve an id-or-slug reference within the tenant scope (read path).
    pub async fn find_tournament(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<Tournament> {
        let found = match Uuid::parse_str(reference) {
            Ok(id) => self.database.get_tournament(tenant.scope, id).await?,
            Err(_) => {
                self.database
                    .get_tournament_by_slug(tenant.scope, reference)
                    .await?
            }
        };
        found.ok_or_else(|| CoreError::NotFound(format!("tournament: {reference}")))
    }

    /// Resolve a reference for a mutation: requires a concrete write tenant
    /// and distinguishes foreign rows (`Forbidden`) from missing ones.
    pub(crate) async fn find_tournament_for_write(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<Tournament> {
        let write_id = tenant.write_id()?;
        match Uuid::parse_str(reference) {
            Ok(id) => {
                let t = self
                    .database
                    .get_tournament(TenantScope::All, id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("tournament: {reference}")))?;
                tenant.check_owns(t.user_id)?;
                Ok(t)
            }
            Err(_) => self
                .database
                .get_tournament_by_slug(TenantScope::Only(write_id), reference)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("tournament: {reference}"))),
        }
    }

    #[instrument(name = "core.tournament.create", skip(self, tenant, new))]
    pub async fn create_tournament(
        &self,
        tenant: &EffectiveTenant,
        new: NewTournament,
    ) -> CoreResult<Tournament> {
        let user_id = tenant.write_id()?;
        let name = normalize_ws(new.name);
        if name.is_empty() {
            return Err(CoreError::Validation("name is required".into()));
        }
        if let Some(cap) = new.options.signup_cap
            && cap < 2
        {
            return Err(CoreError::Validation("signup_cap must be at least 2".into()));
        }

        let slug = self.derive_slug(user_id, &name).await?;
        let tournament = Tournament {
            id: Uuid::new_v4(),
            user_id,
            name,
            slug,
            game_name: normalize_opt(new.game_name),
            tournament_type: new.tournament_type,
            state: TournamentState::Pending,
            options: new.options,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.database.insert_tournament(&tournament).await?;
        info!(id = %tournament.id, slug = %tournament.slug, "tournament_created");
        self.publish_lifecycle(
            user_id,
            tournament.id,
            CrEvent::TournamentCreated {
                tournament_id: tournament.id,
            },
        )
        .await;
        Ok(tournament)
    }

    /// Lowercased `[a-z0-9_]` slug; collisions within the tenant get a
    /// `-2`, `-3`, ... suffix until unique.
    async fn derive_slug(&self, user_id: i64, name: &str) -> CoreResult<String> {
        let base = slugify(name);
        if !self.database.slug_exists(user_id, &base).await? {
            return Ok(base);
        }
        for n in 2.. {
            let candidate = format!("{base}-{n}");
            if !self.database.slug_exists(user_id, &candidate).await? {
                return Ok(candidate);
            }
        }
        unreachable!("slug counter is unbounded")
    }

    pub async fn list_tournaments(&self, tenant: &EffectiveTenant) -> CoreResult<TournamentBuckets> {
        let mut all = self.database.list_tournaments(tenant.scope).await?;
        all.sort_by_key(|t| std::cmp::Reverse(t.last_activity()));
        let mut buckets = TournamentBuckets::default();
        for t in all {
            match t.state {
                TournamentState::Pending | TournamentState::CheckingIn => buckets.pending.push(t),
                TournamentState::Underway | TournamentState::AwaitingReview => {
                    buckets.underway.push(t)
                }
                TournamentState::Complete => buckets.complete.push(t),
            }
        }
        Ok(buckets)
    }

    #[instrument(name = "core.tournament.update", skip(self, tenant, patch))]
    pub async fn update_tournament(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        patch: TournamentPatch,
    ) -> CoreResult<Tournament> {
        let mut tournament = self.find_tournament_for_write(tenant, reference).await?;
        if tournament.has_started() {
            return Err(CoreError::Conflict(
                "tournament can only be edited while pending".into(),
            ));
        }

        if let Some(name) = patch.name {
            let name = normalize_ws(name);
            if name.is_empty() {
                return Err(CoreError::Validation("name is required".into()));
            }
            tournament.name = name;
        }
        if let Some(game_name) = patch.game_name {
            tournament.game_name = normalize_opt(game_name);
        }
        if let Some(t_type) = patch.tournament_type {
            tournament.tournament_type = t_type;
        }
        if let Some(options) = patch.options {
            if let Some(cap) = options.signup_cap
                && cap < 2
            {
                return Err(CoreError::Validation("signup_cap must be at least 2".into()));
            }
            tournament.options = options;
        }

        self.database.update_tournament(&tournament).await?;
        self.publish_lifecycle(
            tournament.user_id,
            tournament.id,
            CrEvent::TournamentUpdated {
                tournament_id: tournament.id,
            },
        )
        .await;
        Ok(tournament)
    }

    /// Internal transition used for pending↔checking_in and
    /// underway↔awaiting_review edges; start/reset/complete have dedicated
    /// operations.
    pub async fn update_tournament_state(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        new_state: TournamentState,
    ) -> CoreResult<Tournament> {
        let mut tournament = self.find_tournament_for_write(tenant, reference).await?;
        if !tournament.state.can_transition(new_state) {
            return Err(CoreError::Conflict(format!(
                "cannot transition from {} to {}",
                tournament.state, new_state
            )));
        }
        // start, reset and complete own their edges; this path only toggles
        // check-in and review
        let manual_edge = matches!(
            (tournament.state, new_state),
            (TournamentState::Pending, TournamentState::CheckingIn)
                | (TournamentState::CheckingIn, TournamentState::Pending)
                | (TournamentState::Underway, TournamentState::AwaitingReview)
                | (TournamentState::AwaitingReview, TournamentState::Underway)
        );
        if !manual_edge {
            return Err(CoreError::Conflict(format!(
                "transition to {new_state} has a dedicated operation"
            )));
        }
        tournament.state = new_state;
        self.database.update_tournament(&tournament).await?;
        self.publish_lifecycle(
            tournament.user_id,
            tournament.id,
            CrEvent::TournamentUpdated {
                tournament_id: tournament.id,
            },
        )
        .await;
        Ok(tournament)
    }

    #[instrument(name = "core.tournament.delete", skip(self, tenant))]
    pub async fn delete_tournament(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<()> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        self.database.delete_tournament(tournament.id).await?;
        self.forget_lock(tournament.id);
        info!(id = %tournament.id, "tournament_deleted");
        self.publish_lifecycle(
            tournament.user_id,
            tournament.id,
            CrEvent::TournamentDeleted {
                tournament_id: tournament.id,
            },
        )
        .await;
        Ok(())
    }

    /// True when the tournament may start: at least two active participants
    /// and format-specific minima are met.
    pub async fn can_start(&self, tenant: &EffectiveTenant, reference: &str) -> CoreResult<bool> {
        let tournament = self.find_tournament(tenant, reference).await?;
        let participants = self.database.list_participants(tournament.id).await?;
        let active = participants.iter().filter(|p| p.active).count();
        Ok(start_eligibility(&tournament, active).is_ok())
    }

    /// True when no non-bye match has completed. Byes auto-complete at
    /// generation time and never block a reset.
    pub async fn can_reset(&self, tenant: &EffectiveTenant, reference: &str) -> CoreResult<bool> {
        let tournament = self.find_tournament(tenant, reference).await?;
        if tournament.state.is_pre_start() {
            return Ok(false);
        }
        let matches = self.database.list_matches(tournament.id).await?;
        Ok(matches
            .iter()
            .all(|m| m.is_bye || m.state != MatchState::Complete))
    }

    /// Generate the bracket and move the tournament to `underway`, atomically.
    #[instrument(name = "core.tournament.start", skip(self, tenant))]
    pub async fn start_tournament(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<StartOutcome> {
        let mut tournament = self.find_tournament_for_write(tenant, reference).await?;
        let lock = self.tournament_lock(tournament.id);
        let _guard = lock.lock().await;

        let participants = self.database.list_participants(tournament.id).await?;
        let mut active: Vec<_> = participants.into_iter().filter(|p| p.active).collect();
        active.sort_by_key(|p| p.seed);
        if let Err(reason) = start_eligibility(&tournament, active.len()) {
            return Err(CoreError::Conflict(reason));
        }

        let roster: Vec<Uuid> = active.iter().map(|p| p.id).collect();
        let plan = bracket::generate(tournament.tournament_type, &roster, &tournament.options)?;
        let now = Utc::now();
        let matches = materialize_plan(&tournament, &plan, now);

        tournament.state = TournamentState::Underway;
        tournament.started_at = Some(now);

        // Degenerate brackets (every generated match a bye) finish on the spot.
        let finished = matches
            .iter()
            .all(|m| m.state == MatchState::Complete);
        let mut ranked_participants = Vec::new();
        if finished {
            tournament.state = TournamentState::Complete;
            tournament.completed_at = Some(now);
            for (id, rank) in standings::final_ranks(&tournament, &active, &matches) {
                if let Some(p) = active.iter().find(|p| p.id == id) {
                    let mut p = p.clone();
                    p.final_rank = Some(rank);
                    ranked_participants.push(p);
                }
            }
        }

        let batch = WriteBatch {
            update_tournament: Some(tournament.clone()),
            insert_matches: matches.clone(),
            update_participants: ranked_participants,
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;

        info!(
            id = %tournament.id,
            match_count = matches.len(),
            byes = plan.stats.bye_matches,
            "tournament_started"
        );
        self.publish_lifecycle(
            tournament.user_id,
            tournament.id,
            CrEvent::TournamentStarted {
                tournament_id: tournament.id,
                game_name: tournament.game_name.clone(),
                match_count: matches.len() as u32,
            },
        )
        .await;
        self.publish_matches_snapshot(tournament.user_id, tournament.id, &matches)
            .await;
        if finished {
            self.publish_lifecycle(
                tournament.user_id,
                tournament.id,
                CrEvent::TournamentCompleted {
                    tournament_id: tournament.id,
                },
            )
            .await;
        }

        Ok(StartOutcome {
            tournament,
            matches,
            stats: plan.stats,
        })
    }

    /// Delete all matches and the ledger, free stations and return to
    /// `pending`. Rejected once any non-bye match has completed.
    #[instrument(name = "core.tournament.reset", skip(self, tenant))]
    pub async fn reset_tournament(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<Tournament> {
        let mut tournament = self.find_tournament_for_write(tenant, reference).await?;
        let lock = self.tournament_lock(tournament.id);
        let _guard = lock.lock().await;

        if tournament.state.is_pre_start() {
            return Err(CoreError::Conflict("tournament has not started".into()));
        }
        let matches = self.database.list_matches(tournament.id).await?;
        if matches
            .iter()
            .any(|m| !m.is_bye && m.state == MatchState::Complete)
        {
            return Err(CoreError::Conflict(
                "cannot reset after a match has completed".into(),
            ));
        }

        tournament.state = TournamentState::Pending;
        tournament.started_at = None;
        tournament.completed_at = None;

        let mut stations = self.database.list_stations(tournament.id).await?;
        stations.retain(|s| s.current_match_id.is_some());
        for s in &mut stations {
            s.current_match_id = None;
        }

        // Final ranks from a previous run are stale after a reset.
        let mut participants = self.database.list_participants(tournament.id).await?;
        participants.retain(|p| p.final_rank.is_some());
        for p in &mut participants {
            p.final_rank = None;
        }

        let batch = WriteBatch {
            update_tournament: Some(tournament.clone()),
            delete_matches_of: Some(tournament.id),
            clear_ledger_of: Some(tournament.id),
            update_stations: stations,
            update_participants: participants,
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;

        info!(id = %tournament.id, "tournament_reset");
        self.publish_lifecycle(
            tournament.user_id,
            tournament.id,
            CrEvent::TournamentReset {
                tournament_id: tournament.id,
            },
        )
        .await;
        Ok(tournament)
    }

    /// Verify completion, write final ranks and transition to `complete`.
    #[instrument(name = "core.tournament.complete", skip(self, tenant))]
    pub async fn complete_tournament(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<Tournament> {
        let mut tournament = self.find_tournament_for_write(tenant, reference).await?;
        let lock = self.tournament_lock(tournament.id);
        let _guard = lock.lock().await;

        if !tournament.state.can_transition(TournamentState::Complete) {
            return Err(CoreError::Conflict(format!(
                "cannot complete a {} tournament",
                tournament.state
            )));
        }
        let matches = self.database.list_matches(tournament.id).await?;
        if matches
            .iter()
            .any(|m| !m.is_bye && m.state != MatchState::Complete)
        {
            return Err(CoreError::Conflict(
                "not all matches have been completed".into(),
            ));
        }
        if tournament.tournament_type == TournamentType::Swiss {
            let played = matches.iter().map(|m| m.round).max().unwrap_or(0);
            if (played as u32) < tournament.options.swiss_rounds {
                return Err(CoreError::Conflict(format!(
                    "swiss round {played} of {} played",
                    tournament.options.swiss_rounds
                )));
            }
        }

        let participants = self.database.list_participants(tournament.id).await?;
        tournament.state = TournamentState::Complete;
        tournament.completed_at = Some(Utc::now());

        let ranks = standings::final_ranks(&tournament, &participants, &matches);
        let mut ranked = Vec::new();
        for (id, rank) in ranks {
            if let Some(p) = participants.iter().find(|p| p.id == id) {
                let mut p = p.clone();
                p.final_rank = Some(rank);
                ranked.push(p);
            }
        }

        let batch = WriteBatch {
            update_tournament: Some(tournament.clone()),
            update_participants: ranked,
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;

        info!(id = %tournament.id, "tournament_completed");
        self.publish_lifecycle(
            tournament.user_id,
            tournament.id,
            CrEvent::TournamentCompleted {
                tournament_id: tournament.id,
            },
        )
        .await;
        Ok(tournament)
    }

    /// Point the tenant's display at a tournament (or clear it) and notify
    /// the flyer room. The display service decides what to render.
    pub async fn deploy_flyer(
        &self,
        tenant: &EffectiveTenant,
        tournament_id: Option<Uuid>,
    ) -> CoreResult<Deployment> {
        let user_id = tenant.write_id()?;
        if let Some(id) = tournament_id {
            // reject dangling or foreign pointers
            let t = self
                .database
                .get_tournament(TenantScope::All, id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("tournament: {id}")))?;
            tenant.check_owns(t.user_id)?;
        }
        let deployment = Deployment {
            user_id,
            tournament_id,
            deployed_at: Utc::now(),
        };
        self.database.set_deployment(&deployment).await?;
        self.publish_room(
            CrTopic::Flyer(user_id),
            CrEvent::FlyerDeployed { tournament_id },
        )
        .await;
        Ok(deployment)
    }

    pub async fn get_deployment(&self, tenant: &EffectiveTenant) -> CoreResult<Option<Deployment>> {
        let user_id = tenant.write_id()?;
        Ok(self.database.get_deployment(user_id).await?)
    }

    /// One retry on transient store errors; persistent errors surface.
    pub(crate) async fn commit_with_retry(&self, batch: WriteBatch) -> CoreResult<()> {
        match self.database.commit(&batch).await {
            Err(e) if e.is_transient() => {
                warn!(error = %e, "transient_commit_error_retrying");
                self.database.commit(&batch).await.map_err(CoreError::from)
            }
            other => other.map_err(CoreError::from),
        }
    }
}

/// Turn engine descriptors into persistable match records: permanent ids are
/// assigned here and temporary prerequisite indices are replaced in the same
/// pass, so the insert order of `bulk_create` matches descriptor order.
pub(crate) fn materialize_plan(
    tournament: &Tournament,
    plan: &BracketPlan,
    now: DateTime<Utc>,
) -> Vec<Match> {
    let ids: Vec<Uuid> = plan.matches.iter().map(|_| Uuid::new_v4()).collect();
    plan.matches
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let (p1_prereq, p1_loser) = match d.player1_prereq {
                Some(p) => (Some(ids[p.match_index]), p.takes_loser),
                None => (None, false),
            };
            let (p2_prereq, p2_loser) = match d.player2_prereq {
                Some(p) => (Some(ids[p.match_index]), p.takes_loser),
                None => (None, false),
            };
            Match {
                id: ids[i],
                tournament_id: tournament.id,
                user_id: tournament.user_id,
                identifier: d.identifier.clone(),
                round: d.round,
                suggested_play_order: d.suggested_play_order,
                bracket_position: d.bracket_position,
                losers_bracket: d.losers_bracket,
                player1_id: d.player1_id,
                player2_id: d.player2_id,
                player1_prereq_match_id: p1_prereq,
                player2_prereq_match_id: p2_prereq,
                player1_is_prereq_loser: p1_loser,
                player2_is_prereq_loser: p2_loser,
                winner_id: d.winner_id,
                loser_id: d.loser_id,
                player1_score: d.player1_score,
                player2_score: d.player2_score,
                score_text: None,
                forfeited: false,
                forfeited_participant_id: None,
                station_id: None,
                underway_at: None,
                completed_at: (d.state == MatchState::Complete).then_some(now),
                state: d.state,
                is_bye: d.is_bye,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tournament(t_type: TournamentType, options: TournamentOptions) -> Tournament {
        Tournament {
            id: Uuid::new_v4(),
            user_id: 1,
            name: "Test".into(),
            slug: "test".into(),
            game_name: None,
            tournament_type: t_type,
            state: TournamentState::Pending,
            options,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn state_machine_allows_checkin_round_trip() {
        use TournamentState::*;
        assert!(Pending.can_transition(CheckingIn));
        assert!(CheckingIn.can_transition(Pending));
        assert!(Pending.can_transition(Underway));
        assert!(CheckingIn.can_transition(Underway));
        assert!(Underway.can_transition(AwaitingReview));
        assert!(AwaitingReview.can_transition(Complete));
        assert!(Underway.can_transition(Pending));
    }

    #[test]
    fn state_machine_rejects_backwards_edges() {
        use TournamentState::*;
        assert!(!Complete.can_transition(Underway));
        assert!(!Complete.can_transition(Pending));
        assert!(!Pending.can_transition(Complete));
        assert!(!Pending.can_transition(AwaitingReview));
    }

    #[test]
    fn start_guard_enforces_format_minima() {
        let t = tournament(TournamentType::SingleElim, TournamentOptions::default());
        assert!(start_eligibility(&t, 2).is_ok());
        assert!(start_eligibility(&t, 1).is_err());

        let t = tournament(TournamentType::DoubleElim, TournamentOptions::default());
        assert!(start_eligibility(&t, 3).is_err());
        assert!(start_eligibility(&t, 4).is_ok());

        let t = tournament(TournamentType::Swiss, TournamentOptions::default());
        assert!(start_eligibility(&t, 8).is_err(), "swiss_rounds = 0");
        let t = tournament(
            TournamentType::Swiss,
            TournamentOptions {
                swiss_rounds: 3,
                ..TournamentOptions::default()
            },
        );
        assert!(start_eligibility(&t, 8).is_ok());
    }

    #[test]
    fn start_guard_rejects_started_tournaments() {
        let mut t = tournament(TournamentType::SingleElim, TournamentOptions::default());
        t.state = TournamentState::Underway;
        assert!(start_eligibility(&t, 8).is_err());
    }

    #[test]
    fn options_reject_unknown_keys() {
        let res: Result<TournamentOptions, _> =
            serde_json::from_str(r#"{"hold_third_place_match": true, "bogus_option": 1}"#);
        assert!(res.is_err(), "unknown options must be rejected");
    }

    #[test]
    fn enum_wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_value(TournamentType::DoubleElim).unwrap(),
            "double_elim"
        );
        assert_eq!(
            serde_json::to_value(TournamentState::AwaitingReview).unwrap(),
            "awaiting_review"
        );
        assert_eq!(
            serde_json::to_value(GrandFinalsModifier::BracketReset).unwrap(),
            "bracket_reset"
        );
        assert_eq!(
            "compact_bracket".parse::<ByeStrategy>().unwrap(),
            ByeStrategy::CompactBracket
        );
    }
}
