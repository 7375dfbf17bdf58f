//! Match store & progression: the pending→open→underway→complete state
//! machine, transactional bracket advancement, station coordination and
//! single-step undo.
//!
//! Mutations follow one shape: load a snapshot of the tournament's matches
//! under the per-tournament lock, plan the change purely in memory, commit
//! the touched rows as one write batch, then publish. `matches:update`
//! accompanies every `match:*` event so late subscribers resync from one
//! message.

use crate::{
    ChangeAction, Core, CoreError, CoreResult, CrEvent, CrTopic, EffectiveTenant, Match,
    MatchChange, MatchState, Station, Tournament, TournamentState, TournamentType, WriteBatch,
    bracket::swiss,
    tournament::materialize_plan,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

/// listing payload of `GET /api/matches/{tournament}`
#[derive(Debug, Clone)]
pub struct MatchesOverview {
    pub tournament: Tournament,
    pub matches: Vec<Match>,
    pub completed_count: u32,
    pub total_count: u32,
    pub progress_percent: u32,
    pub next_match: Option<Match>,
}

/// outcome of `undo_last`
#[derive(Debug, Clone, PartialEq)]
pub enum UndoOutcome {
    /// ledger empty or already consumed
    NothingToUndo,
    Undone { match_id: Uuid },
}

/// one entry of a batch score submission
#[derive(Debug, Clone)]
pub struct BatchScoreEntry {
    pub match_id: Uuid,
    pub winner_id: Uuid,
    pub player1_score: i32,
    pub player2_score: i32,
}

/// per-item outcome of a batch score submission
#[derive(Debug)]
pub struct BatchScoreResult {
    pub match_id: Uuid,
    pub result: CoreResult<()>,
}

/// The open, not-underway match to call next: lowest suggested play order,
/// then shallowest round, then lowest id.
pub fn find_next_match(matches: &[Match]) -> Option<&Match> {
    matches
        .iter()
        .filter(|m| m.state == MatchState::Open && m.underway_at.is_none())
        .min_by_key(|m| (m.suggested_play_order, m.round.unsigned_abs(), m.id))
}

fn index_of(matches: &[Match], id: Uuid) -> CoreResult<usize> {
    matches
        .iter()
        .position(|m| m.id == id)
        .ok_or_else(|| CoreError::NotFound(format!("match: {id}")))
}

fn prereqs_complete(matches: &[Match], index: usize) -> bool {
    for prereq in [
        matches[index].player1_prereq_match_id,
        matches[index].player2_prereq_match_id,
    ] {
        if let Some(pid) = prereq
            && let Some(src) = matches.iter().find(|m| m.id == pid)
            && src.state != MatchState::Complete
        {
            return false;
        }
    }
    true
}

/// Manual completions carry a display score; auto-completions (byes, voided
/// grand-final resets) never do. Only manual completions pin the bracket
/// against rollback.
fn manually_completed(m: &Match) -> bool {
    m.state == MatchState::Complete && m.score_text.is_some()
}

/// Ids of all matches transitively downstream of `id`.
fn downstream_ids(matches: &[Match], id: Uuid) -> Vec<Uuid> {
    let mut out = Vec::new();
    let mut queue = vec![id];
    while let Some(current) = queue.pop() {
        for m in matches {
            if m.depends_on(current) && !out.contains(&m.id) {
                out.push(m.id);
                queue.push(m.id);
            }
        }
    }
    out
}

/// Complete a match and advance winner and loser through the prerequisite
/// DAG. Returns the ids of every touched match.
pub(crate) fn apply_completion(
    matches: &mut [Match],
    match_id: Uuid,
    winner_id: Uuid,
    scores: (i32, i32),
    forfeited_by: Option<Uuid>,
    now: DateTime<Utc>,
) -> CoreResult<Vec<Uuid>> {
    let i = index_of(matches, match_id)?;
    if !matches[i].is_scorable() {
        return Err(CoreError::Conflict(format!(
            "match {} is {}, not open or underway",
            matches[i].identifier, matches[i].state
        )));
    }
    if !matches[i].has_participant(winner_id) {
        return Err(CoreError::Validation(
            "winner must be one of the match participants".into(),
        ));
    }

    let loser = matches[i].opponent_of(winner_id);
    let mut touched = vec![match_id];
    {
        let m = &mut matches[i];
        m.winner_id = Some(winner_id);
        m.loser_id = loser;
        m.player1_score = scores.0;
        m.player2_score = scores.1;
        m.score_text = Some(Match::format_score(scores.0, scores.1));
        m.forfeited = forfeited_by.is_some();
        m.forfeited_participant_id = forfeited_by;
        m.state = MatchState::Complete;
        m.completed_at = Some(now);
        m.station_id = None;
    }
    propagate(matches, match_id, now, &mut touched);
    Ok(touched)
}

/// Push results from a completed match into its dependents, opening fully
/// seated matches and auto-completing byes, recursively.
fn propagate(matches: &mut [Match], from: Uuid, now: DateTime<Utc>, touched: &mut Vec<Uuid>) {
    let mut queue = vec![from];
    while let Some(src_id) = queue.pop() {
        let Ok(src_idx) = index_of(matches, src_id) else {
            continue;
        };
        let src_winner = matches[src_idx].winner_id;
        let src_loser = matches[src_idx].loser_id;
        let src_player1 = matches[src_idx].player1_id;

        for j in 0..matches.len() {
            if j == src_idx
                || !matches[j].depends_on(src_id)
                || matches[j].state == MatchState::Complete
            {
                continue;
            }

            // a grand-final reset voids itself when the winners champion
            // (slot 1 of the first final) takes the first match
            if matches[j].is_reset_of(src_id) && src_winner == src_player1 {
                let mj = &mut matches[j];
                mj.player1_id = src_winner;
                mj.player2_id = src_loser;
                mj.winner_id = src_winner;
                mj.loser_id = src_loser;
                mj.state = MatchState::Complete;
                mj.completed_at = Some(now);
                touched.push(mj.id);
                continue;
            }

            let mut changed = false;
            if matches[j].player1_prereq_match_id == Some(src_id) && matches[j].player1_id.is_none()
            {
                let advanced = if matches[j].player1_is_prereq_loser {
                    src_loser
                } else {
                    src_winner
                };
                if advanced.is_some() {
                    matches[j].player1_id = advanced;
                    changed = true;
                }
            }
            if matches[j].player2_prereq_match_id == Some(src_id) && matches[j].player2_id.is_none()
            {
                let advanced = if matches[j].player2_is_prereq_loser {
                    src_loser
                } else {
                    src_winner
                };
                if advanced.is_some() {
                    matches[j].player2_id = advanced;
                    changed = true;
                }
            }

            if matches[j].state == MatchState::Pending {
                if matches[j].is_fully_seated() {
                    matches[j].state = MatchState::Open;
                    changed = true;
                } else if prereqs_complete(matches, j) {
                    // no second player can ever arrive: complete as a bye
                    let lone = matches[j].player1_id.or(matches[j].player2_id);
                    let mj = &mut matches[j];
                    mj.state = MatchState::Complete;
                    mj.completed_at = Some(now);
                    mj.winner_id = lone;
                    mj.is_bye = true;
                    changed = true;
                    queue.push(mj.id);
                }
            }
            if changed {
                let id = matches[j].id;
                if !touched.contains(&id) {
                    touched.push(id);
                }
            }
        }
    }
}

/// before-image used when undo restores a match
#[derive(Debug, Clone, Copy)]
pub(crate) struct PriorImage {
    pub state: MatchState,
    pub winner_id: Option<Uuid>,
    pub loser_id: Option<Uuid>,
    pub player1_score: i32,
    pub player2_score: i32,
}

impl From<&MatchChange> for PriorImage {
    fn from(c: &MatchChange) -> Self {
        PriorImage {
            state: c.prior_state,
            winner_id: c.prior_winner_id,
            loser_id: c.prior_loser_id,
            player1_score: c.prior_player1_score,
            player2_score: c.prior_player2_score,
        }
    }
}

/// Reopen a completed match: roll advanced players back out of every
/// dependent, recursively, and restore the match itself (to the given prior
/// image, or to a clean open state). Fails while any downstream match holds
/// a manually entered result.
pub(crate) fn apply_rollback(
    matches: &mut [Match],
    match_id: Uuid,
    restore: Option<PriorImage>,
    touched: &mut Vec<Uuid>,
) -> CoreResult<()> {
    let i = index_of(matches, match_id)?;
    if matches[i].state != MatchState::Complete {
        return Err(CoreError::Conflict(format!(
            "match {} is not complete",
            matches[i].identifier
        )));
    }
    for id in downstream_ids(matches, match_id) {
        let idx = index_of(matches, id)?;
        if manually_completed(&matches[idx]) {
            return Err(CoreError::Conflict(format!(
                "downstream match {} has completed",
                matches[idx].identifier
            )));
        }
    }

    rollback_dependents(matches, match_id, touched);

    let m = &mut matches[i];
    m.winner_id = None;
    m.loser_id = None;
    m.player1_score = 0;
    m.player2_score = 0;
    m.score_text = None;
    m.forfeited = false;
    m.forfeited_participant_id = None;
    m.completed_at = None;
    m.state = if m.is_fully_seated() {
        MatchState::Open
    } else {
        MatchState::Pending
    };
    if let Some(prior) = restore {
        m.state = prior.state;
        m.winner_id = prior.winner_id;
        m.loser_id = prior.loser_id;
        m.player1_score = prior.player1_score;
        m.player2_score = prior.player2_score;
    }
    if !touched.contains(&match_id) {
        touched.push(match_id);
    }
    Ok(())
}

/// Clear every slot fed by `src_id` in its dependents and demote their
/// state, recursing through auto-completed dependents first.
fn rollback_dependents(matches: &mut [Match], src_id: Uuid, touched: &mut Vec<Uuid>) {
    let dependents: Vec<usize> = (0..matches.len())
        .filter(|&j| matches[j].depends_on(src_id))
        .collect();
    for j in dependents {
        let id = matches[j].id;
        if matches[j].state == MatchState::Complete {
            // auto-completed (bye or voided reset): unwind its own dependents
            rollback_dependents(matches, id, touched);
            let mj = &mut matches[j];
            mj.winner_id = None;
            mj.loser_id = None;
            mj.completed_at = None;
            mj.state = MatchState::Pending;
        }
        let mj = &mut matches[j];
        if mj.player1_prereq_match_id == Some(src_id) {
            mj.player1_id = None;
        }
        if mj.player2_prereq_match_id == Some(src_id) {
            mj.player2_id = None;
        }
        if !mj.is_fully_seated() && mj.state != MatchState::Pending {
            mj.state = MatchState::Pending;
        }
        if mj.state == MatchState::Pending {
            mj.underway_at = None;
            mj.station_id = None;
        }
        if !touched.contains(&id) {
            touched.push(id);
        }
    }
}

impl Core {
    pub async fn list_matches(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<Vec<Match>> {
        let tournament = self.find_tournament(tenant, reference).await?;
        let mut matches = self.database.list_matches(tournament.id).await?;
        matches.sort_by_key(|m| m.suggested_play_order);
        Ok(matches)
    }

    pub async fn matches_overview(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<MatchesOverview> {
        let tournament = self.find_tournament(tenant, reference).await?;
        let mut matches = self.database.list_matches(tournament.id).await?;
        matches.sort_by_key(|m| m.suggested_play_order);
        let total_count = matches.len() as u32;
        let completed_count = matches
            .iter()
            .filter(|m| m.state == MatchState::Complete)
            .count() as u32;
        let progress_percent = if total_count == 0 {
            0
        } else {
            completed_count * 100 / total_count
        };
        let next_match = find_next_match(&matches).cloned();
        Ok(MatchesOverview {
            tournament,
            matches,
            completed_count,
            total_count,
            progress_percent,
            next_match,
        })
    }

    pub async fn get_match(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
    ) -> CoreResult<Match> {
        let tournament = self.find_tournament(tenant, reference).await?;
        self.database
            .get_match(match_id)
            .await?
            .filter(|m| m.tournament_id == tournament.id)
            .ok_or_else(|| CoreError::NotFound(format!("match: {match_id}")))
    }

    /// Manually seat a participant; used by operators to fix up slots.
    /// Opens the match when both slots are filled.
    #[instrument(name = "core.match.set_player", skip(self, tenant))]
    pub async fn set_player(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
        slot: u8,
        participant_id: Uuid,
    ) -> CoreResult<Match> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let lock = self.tournament_lock(tournament.id);
        let _guard = lock.lock().await;

        let participants = self.database.list_participants(tournament.id).await?;
        if !participants.iter().any(|p| p.id == participant_id) {
            return Err(CoreError::NotFound(format!(
                "participant: {participant_id}"
            )));
        }
        let mut matches = self.database.list_matches(tournament.id).await?;
        let i = index_of(&matches, match_id)?;
        if matches[i].state != MatchState::Pending {
            return Err(CoreError::Conflict(
                "players can only be set on pending matches".into(),
            ));
        }
        match slot {
            1 => matches[i].player1_id = Some(participant_id),
            2 => matches[i].player2_id = Some(participant_id),
            _ => return Err(CoreError::Validation("slot must be 1 or 2".into())),
        }
        if matches[i].is_fully_seated() {
            matches[i].state = MatchState::Open;
        }

        let updated = matches[i].clone();
        let batch = WriteBatch {
            update_matches: vec![updated.clone()],
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;
        self.publish_match_update(&tournament, &matches, match_id).await;
        Ok(updated)
    }

    /// Record the result of an open or underway match and advance the
    /// bracket (§4.4 `set_winner`).
    #[instrument(name = "core.match.set_winner", skip(self, tenant))]
    pub async fn set_winner(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
        winner_id: Uuid,
        scores: (i32, i32),
    ) -> CoreResult<Match> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        self.complete_match(&tournament, match_id, winner_id, scores, None)
            .await
    }

    /// Score submission without an explicit winner: the higher score wins,
    /// ties require a winner.
    pub async fn set_score(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
        player1_score: i32,
        player2_score: i32,
        winner_id: Option<Uuid>,
    ) -> CoreResult<Match> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let winner = match winner_id {
            Some(w) => w,
            None => {
                let m = self
                    .database
                    .get_match(match_id)
                    .await?
                    .filter(|m| m.tournament_id == tournament.id)
                    .ok_or_else(|| CoreError::NotFound(format!("match: {match_id}")))?;
                let side = match player1_score.cmp(&player2_score) {
                    std::cmp::Ordering::Greater => m.player1_id,
                    std::cmp::Ordering::Less => m.player2_id,
                    std::cmp::Ordering::Equal => {
                        return Err(CoreError::Validation(
                            "tied score requires an explicit winner".into(),
                        ));
                    }
                };
                side.ok_or_else(|| {
                    CoreError::Conflict("match is not fully seated".into())
                })?
            }
        };
        self.complete_match(
            &tournament,
            match_id,
            winner,
            (player1_score, player2_score),
            None,
        )
        .await
    }

    /// Forfeit: the other participant wins 0-0 (§4.4 `set_forfeit`).
    #[instrument(name = "core.match.forfeit", skip(self, tenant))]
    pub async fn set_forfeit(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
        forfeiting_participant_id: Uuid,
    ) -> CoreResult<Match> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let m = self
            .database
            .get_match(match_id)
            .await?
            .filter(|m| m.tournament_id == tournament.id)
            .ok_or_else(|| CoreError::NotFound(format!("match: {match_id}")))?;
        let winner = m.opponent_of(forfeiting_participant_id).ok_or_else(|| {
            CoreError::Conflict("forfeit requires a fully seated match".into())
        })?;
        self.complete_match(
            &tournament,
            match_id,
            winner,
            (0, 0),
            Some(forfeiting_participant_id),
        )
        .await
    }

    /// Disqualification: forfeit the match and clear the participant's
    /// active flag for the record.
    #[instrument(name = "core.match.dq", skip(self, tenant))]
    pub async fn disqualify(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
        participant_id: Uuid,
    ) -> CoreResult<Match> {
        let result = self
            .set_forfeit(tenant, reference, match_id, participant_id)
            .await?;
        if let Some(mut p) = self.database.get_participant(participant_id).await?
            && p.active
        {
            p.active = false;
            self.database
                .update_participants(std::slice::from_ref(&p))
                .await?;
        }
        Ok(result)
    }

    async fn complete_match(
        &self,
        tournament: &Tournament,
        match_id: Uuid,
        winner_id: Uuid,
        scores: (i32, i32),
        forfeited_by: Option<Uuid>,
    ) -> CoreResult<Match> {
        let lock = self.tournament_lock(tournament.id);
        let _guard = lock.lock().await;

        let before = self.database.list_matches(tournament.id).await?;
        let mut matches = before.clone();
        let i = index_of(&matches, match_id)?;

        let action = if forfeited_by.is_some() {
            ChangeAction::SetForfeit
        } else {
            ChangeAction::SetWinner
        };
        let ledger = self.change_entry(tournament, &matches[i], action);

        let now = Utc::now();
        let touched = apply_completion(
            &mut matches,
            match_id,
            winner_id,
            scores,
            forfeited_by,
            now,
        )?;

        let updates = collect_updates(&matches, &touched);
        let stations = self
            .freed_station_updates(tournament.id, &before, &matches)
            .await?;
        let batch = WriteBatch {
            update_matches: updates,
            update_stations: stations,
            ledger_append: Some(ledger),
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;

        let updated = matches[i].clone();
        info!(
            match_id = %match_id,
            winner = %winner_id,
            cascade = touched.len(),
            "match_completed"
        );
        self.publish_room(
            CrTopic::Tournament {
                user_id: tournament.user_id,
                tournament_id: tournament.id,
            },
            CrEvent::MatchCompleted {
                tournament_id: tournament.id,
                match_id,
                winner_id: Some(winner_id),
            },
        )
        .await;
        self.publish_matches_snapshot(tournament.user_id, tournament.id, &matches)
            .await;
        Ok(updated)
    }

    /// Reopen a completed match (§4.4): allowed while no downstream match
    /// has completed; advanced slots are cleared all the way down.
    #[instrument(name = "core.match.reopen", skip(self, tenant))]
    pub async fn reopen_match(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
    ) -> CoreResult<Match> {
        self.rollback_match(tenant, reference, match_id, ChangeAction::Reopen)
            .await
    }

    /// Clear a recorded result. Completed matches roll back like a reopen;
    /// open matches just drop any interim score.
    pub async fn clear_scores(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
    ) -> CoreResult<Match> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let m = self
            .database
            .get_match(match_id)
            .await?
            .filter(|m| m.tournament_id == tournament.id)
            .ok_or_else(|| CoreError::NotFound(format!("match: {match_id}")))?;
        if m.state == MatchState::Complete {
            return self
                .rollback_match(tenant, reference, match_id, ChangeAction::ClearScores)
                .await;
        }
        let lock = self.tournament_lock(tournament.id);
        let _guard = lock.lock().await;
        let mut m = m;
        m.player1_score = 0;
        m.player2_score = 0;
        m.score_text = None;
        let batch = WriteBatch {
            update_matches: vec![m.clone()],
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;
        let matches = self.database.list_matches(tournament.id).await?;
        self.publish_match_update(&tournament, &matches, match_id).await;
        Ok(m)
    }

    async fn rollback_match(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
        action: ChangeAction,
    ) -> CoreResult<Match> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let lock = self.tournament_lock(tournament.id);
        let _guard = lock.lock().await;

        let before = self.database.list_matches(tournament.id).await?;
        let mut matches = before.clone();
        let i = index_of(&matches, match_id)?;
        let ledger = self.change_entry(&tournament, &matches[i], action);

        let mut touched = Vec::new();
        apply_rollback(&mut matches, match_id, None, &mut touched)?;

        let updates = collect_updates(&matches, &touched);
        let stations = self
            .freed_station_updates(tournament.id, &before, &matches)
            .await?;
        let batch = WriteBatch {
            update_matches: updates,
            update_stations: stations,
            ledger_append: Some(ledger),
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;

        info!(match_id = %match_id, "match_reopened");
        self.publish_match_update(&tournament, &matches, match_id).await;
        Ok(matches[i].clone())
    }

    /// Apply the inverse of the latest ledger entry. Idempotent: a second
    /// undo without intervening writes reports nothing to undo.
    #[instrument(name = "core.match.undo", skip(self, tenant))]
    pub async fn undo_last(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<UndoOutcome> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let lock = self.tournament_lock(tournament.id);
        let _guard = lock.lock().await;

        let Some(entry) = self.database.latest_change(tournament.id).await? else {
            return Ok(UndoOutcome::NothingToUndo);
        };
        if entry.undone {
            return Ok(UndoOutcome::NothingToUndo);
        }

        let before = self.database.list_matches(tournament.id).await?;
        let mut matches = before.clone();
        let prior = PriorImage::from(&entry);
        let mut touched = Vec::new();

        if prior.state == MatchState::Complete {
            // inverse of a reopen: put the recorded result back and advance
            let winner = prior.winner_id.ok_or_else(|| {
                CoreError::Conflict("ledger entry has no winner to restore".into())
            })?;
            touched = apply_completion(
                &mut matches,
                entry.match_id,
                winner,
                (prior.player1_score, prior.player2_score),
                None,
                Utc::now(),
            )?;
        } else {
            // inverse of a completion: roll the bracket back to the image
            apply_rollback(&mut matches, entry.match_id, Some(prior), &mut touched)?;
        }

        let updates = collect_updates(&matches, &touched);
        let stations = self
            .freed_station_updates(tournament.id, &before, &matches)
            .await?;
        let batch = WriteBatch {
            update_matches: updates,
            update_stations: stations,
            ledger_mark_undone: Some(entry.id),
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;

        info!(match_id = %entry.match_id, action = %entry.action, "change_undone");
        self.publish_match_update(&tournament, &matches, entry.match_id)
            .await;
        Ok(UndoOutcome::Undone {
            match_id: entry.match_id,
        })
    }

    /// Mark an open match underway.
    pub async fn mark_underway(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
    ) -> CoreResult<Match> {
        self.set_underway(tenant, reference, match_id, true).await
    }

    /// Clear the underway mark of a match.
    pub async fn unmark_underway(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
    ) -> CoreResult<Match> {
        self.set_underway(tenant, reference, match_id, false).await
    }

    async fn set_underway(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
        underway: bool,
    ) -> CoreResult<Match> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let lock = self.tournament_lock(tournament.id);
        let _guard = lock.lock().await;

        let matches = self.database.list_matches(tournament.id).await?;
        let i = index_of(&matches, match_id)?;
        let mut m = matches[i].clone();
        if underway {
            if m.state != MatchState::Open {
                return Err(CoreError::Conflict(
                    "only open matches can be marked underway".into(),
                ));
            }
            if let Some(station) = m.station_id
                && matches.iter().any(|o| {
                    o.id != m.id && o.station_id == Some(station) && o.state == MatchState::Underway
                })
            {
                return Err(CoreError::Conflict(
                    "station already hosts an underway match".into(),
                ));
            }
            m.underway_at = Some(Utc::now());
            m.state = MatchState::Underway;
        } else {
            if m.state != MatchState::Underway {
                return Err(CoreError::Conflict("match is not underway".into()));
            }
            m.underway_at = None;
            m.state = MatchState::Open;
        }

        let batch = WriteBatch {
            update_matches: vec![m.clone()],
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;
        let mut after = matches;
        after[i] = m.clone();
        self.publish_match_update(&tournament, &after, match_id).await;
        Ok(m)
    }

    /// Assign or clear a station (§4.4 `set_station`). Station and match
    /// sides of the link move in one batch; assigning to an open match also
    /// marks it underway.
    #[instrument(name = "core.match.set_station", skip(self, tenant))]
    pub async fn set_station(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
        station_id: Option<Uuid>,
    ) -> CoreResult<Match> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let lock = self.tournament_lock(tournament.id);
        let _guard = lock.lock().await;

        let matches = self.database.list_matches(tournament.id).await?;
        let stations = self.database.list_stations(tournament.id).await?;
        let i = index_of(&matches, match_id)?;
        let mut m = matches[i].clone();
        let mut station_updates: HashMap<Uuid, Station> = HashMap::new();

        // free the station the match currently occupies
        if let Some(old) = m.station_id
            && let Some(s) = stations.iter().find(|s| s.id == old)
            && s.current_match_id == Some(m.id)
        {
            let mut s = s.clone();
            s.current_match_id = None;
            station_updates.insert(s.id, s);
        }
        m.station_id = None;

        if let Some(new_station) = station_id {
            if !m.is_scorable() {
                return Err(CoreError::Conflict(
                    "stations can only host open or underway matches".into(),
                ));
            }
            let Some(target) = stations.iter().find(|s| s.id == new_station) else {
                return Err(CoreError::NotFound(format!("station: {new_station}")));
            };
            if target
                .current_match_id
                .map(|other| other != m.id)
                .unwrap_or(false)
            {
                return Err(CoreError::Conflict(format!(
                    "station {} already hosts a match",
                    target.name
                )));
            }
            let mut s = target.clone();
            s.current_match_id = Some(m.id);
            station_updates.insert(s.id, s);
            m.station_id = Some(new_station);
            if m.state == MatchState::Open && m.underway_at.is_none() {
                m.underway_at = Some(Utc::now());
                m.state = MatchState::Underway;
            }
        }

        let batch = WriteBatch {
            update_matches: vec![m.clone()],
            update_stations: station_updates.into_values().collect(),
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;
        let mut after = matches;
        after[i] = m.clone();
        self.publish_match_update(&tournament, &after, match_id).await;
        Ok(m)
    }

    pub async fn clear_station(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        match_id: Uuid,
    ) -> CoreResult<Match> {
        self.set_station(tenant, reference, match_id, None).await
    }

    /// Greedily pair free stations with open, not-underway matches by play
    /// order. Returns the matches that received a station.
    #[instrument(name = "core.match.auto_assign", skip(self, tenant))]
    pub async fn auto_assign_stations(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<Vec<Match>> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let lock = self.tournament_lock(tournament.id);
        let _guard = lock.lock().await;

        let matches = self.database.list_matches(tournament.id).await?;
        let stations = self.database.list_stations(tournament.id).await?;

        let mut free: Vec<Station> = stations
            .into_iter()
            .filter(|s| s.current_match_id.is_none())
            .collect();
        free.sort_by(|a, b| a.name.cmp(&b.name));

        let mut candidates: Vec<Match> = matches
            .iter()
            .filter(|m| {
                m.state == MatchState::Open && m.underway_at.is_none() && m.station_id.is_none()
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|m| m.suggested_play_order);

        let now = Utc::now();
        let mut assigned_matches = Vec::new();
        let mut assigned_stations = Vec::new();
        for (mut station, mut m) in free.into_iter().zip(candidates.into_iter()) {
            station.current_match_id = Some(m.id);
            m.station_id = Some(station.id);
            m.underway_at = Some(now);
            m.state = MatchState::Underway;
            assigned_stations.push(station);
            assigned_matches.push(m);
        }
        if assigned_matches.is_empty() {
            return Ok(Vec::new());
        }

        let batch = WriteBatch {
            update_matches: assigned_matches.clone(),
            update_stations: assigned_stations,
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;

        let mut after = matches;
        for m in &assigned_matches {
            if let Some(slot) = after.iter_mut().find(|o| o.id == m.id) {
                *slot = m.clone();
            }
        }
        info!(count = assigned_matches.len(), "stations_auto_assigned");
        self.publish_matches_snapshot(tournament.user_id, tournament.id, &after)
            .await;
        Ok(assigned_matches)
    }

    /// The next match to call, or None when nothing is waiting.
    pub async fn next_match(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<Option<Match>> {
        let matches = self.list_matches(tenant, reference).await?;
        Ok(find_next_match(&matches).cloned())
    }

    /// Batch score submission with per-item outcomes (§6 `batch-scores`).
    pub async fn batch_scores(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        entries: Vec<BatchScoreEntry>,
    ) -> CoreResult<Vec<BatchScoreResult>> {
        // resolve once so an unknown tournament fails the whole request
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let result = self
                .complete_match(
                    &tournament,
                    entry.match_id,
                    entry.winner_id,
                    (entry.player1_score, entry.player2_score),
                    None,
                )
                .await
                .map(|_| ());
            results.push(BatchScoreResult {
                match_id: entry.match_id,
                result,
            });
        }
        Ok(results)
    }

    /// Pair the next Swiss round once the current one has finished.
    #[instrument(name = "core.match.swiss_next_round", skip(self, tenant))]
    pub async fn swiss_next_round(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<Vec<Match>> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        if tournament.tournament_type != TournamentType::Swiss {
            return Err(CoreError::Conflict(
                "next-round pairing is a swiss operation".into(),
            ));
        }
        if tournament.state != TournamentState::Underway {
            return Err(CoreError::Conflict("tournament is not underway".into()));
        }
        let lock = self.tournament_lock(tournament.id);
        let _guard = lock.lock().await;

        let matches = self.database.list_matches(tournament.id).await?;
        let mut roster: Vec<_> = self
            .database
            .list_participants(tournament.id)
            .await?
            .into_iter()
            .filter(|p| p.active)
            .collect();
        roster.sort_by_key(|p| p.seed);
        let roster_ids: Vec<Uuid> = roster.iter().map(|p| p.id).collect();

        let current = matches.iter().map(|m| m.round).max().unwrap_or(0);
        let next = current + 1;
        if next as u32 > tournament.options.swiss_rounds {
            return Err(CoreError::Conflict("all swiss rounds have been paired".into()));
        }

        let plan = swiss::next_round_pairings(&roster_ids, &matches, next, matches.len())?;
        let new_matches = materialize_plan(&tournament, &plan, Utc::now());

        let batch = WriteBatch {
            insert_matches: new_matches.clone(),
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;

        let mut after = matches;
        after.extend(new_matches.iter().cloned());
        info!(round = next, count = new_matches.len(), "swiss_round_paired");
        self.publish_matches_snapshot(tournament.user_id, tournament.id, &after)
            .await;
        Ok(new_matches)
    }

    /// `match:updated` plus the accompanying snapshot.
    async fn publish_match_update(
        &self,
        tournament: &Tournament,
        matches: &[Match],
        match_id: Uuid,
    ) {
        self.publish_room(
            CrTopic::Tournament {
                user_id: tournament.user_id,
                tournament_id: tournament.id,
            },
            CrEvent::MatchUpdated {
                tournament_id: tournament.id,
                match_id,
            },
        )
        .await;
        self.publish_matches_snapshot(tournament.user_id, tournament.id, matches)
            .await;
    }

    fn change_entry(
        &self,
        tournament: &Tournament,
        m: &Match,
        action: ChangeAction,
    ) -> MatchChange {
        MatchChange {
            id: Uuid::new_v4(),
            tournament_id: tournament.id,
            user_id: tournament.user_id,
            match_id: m.id,
            action,
            prior_state: m.state,
            prior_winner_id: m.winner_id,
            prior_loser_id: m.loser_id,
            prior_player1_score: m.player1_score,
            prior_player2_score: m.player2_score,
            actor: None,
            undone: false,
            created_at: Utc::now(),
        }
    }

    /// Station rows to clear for matches whose station assignment vanished
    /// during planning.
    async fn freed_station_updates(
        &self,
        tournament_id: Uuid,
        before: &[Match],
        after: &[Match],
    ) -> CoreResult<Vec<Station>> {
        let freed: Vec<Uuid> = before
            .iter()
            .filter(|b| {
                b.station_id.is_some()
                    && after
                        .iter()
                        .find(|a| a.id == b.id)
                        .map(|a| a.station_id.is_none())
                        .unwrap_or(false)
            })
            .filter_map(|b| b.station_id)
            .collect();
        if freed.is_empty() {
            return Ok(Vec::new());
        }
        let stations = self.database.list_stations(tournament_id).await?;
        Ok(stations
            .into_iter()
            .filter(|s| freed.contains(&s.id))
            .map(|mut s| {
                s.current_match_id = None;
                s
            })
            .collect())
    }
}

fn collect_updates(matches: &[Match], touched: &[Uuid]) -> Vec<Match> {
    matches
        .iter()
        .filter(|m| touched.contains(&m.id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        GrandFinalsModifier, TournamentOptions, TournamentType, bracket,
        tournament::materialize_plan,
    };

    fn tournament(t_type: TournamentType, options: TournamentOptions) -> Tournament {
        Tournament {
            id: Uuid::new_v4(),
            user_id: 1,
            name: "T".into(),
            slug: "t".into(),
            game_name: None,
            tournament_type: t_type,
            state: TournamentState::Underway,
            options,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }

    fn bracket_fixture(
        t_type: TournamentType,
        n: usize,
        options: TournamentOptions,
    ) -> (Tournament, Vec<Uuid>, Vec<Match>) {
        let t = tournament(t_type, options);
        let roster: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        let plan = bracket::generate(t.tournament_type, &roster, &t.options).unwrap();
        let matches = materialize_plan(&t, &plan, Utc::now());
        (t, roster, matches)
    }

    fn by_identifier<'a>(matches: &'a [Match], ident: &str) -> &'a Match {
        matches.iter().find(|m| m.identifier == ident).unwrap()
    }

    #[test]
    fn winner_advances_into_the_next_round_slot() {
        let (_, roster, mut ms) =
            bracket_fixture(TournamentType::SingleElim, 4, TournamentOptions::default());
        let m1 = by_identifier(&ms, "A").id;
        apply_completion(&mut ms, m1, roster[0], (2, 0), None, Utc::now()).unwrap();

        let final_match = by_identifier(&ms, "C");
        assert_eq!(final_match.player1_id, Some(roster[0]));
        assert_eq!(final_match.state, MatchState::Pending, "one slot still empty");
    }

    #[test]
    fn both_prereqs_complete_opens_the_match() {
        let (_, roster, mut ms) =
            bracket_fixture(TournamentType::SingleElim, 4, TournamentOptions::default());
        let a = by_identifier(&ms, "A").id;
        let b = by_identifier(&ms, "B").id;
        apply_completion(&mut ms, a, roster[0], (2, 0), None, Utc::now()).unwrap();
        apply_completion(&mut ms, b, roster[1], (2, 1), None, Utc::now()).unwrap();

        let final_match = by_identifier(&ms, "C");
        assert_eq!(final_match.state, MatchState::Open);
        assert_eq!(final_match.player1_id, Some(roster[0]));
        assert_eq!(final_match.player2_id, Some(roster[1]));
    }

    #[test]
    fn completing_a_non_open_match_conflicts() {
        let (_, roster, mut ms) =
            bracket_fixture(TournamentType::SingleElim, 4, TournamentOptions::default());
        let final_id = by_identifier(&ms, "C").id;
        let err = apply_completion(&mut ms, final_id, roster[0], (2, 0), None, Utc::now())
            .expect_err("final is pending");
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn winner_must_be_a_participant_of_the_match() {
        let (_, _, mut ms) =
            bracket_fixture(TournamentType::SingleElim, 4, TournamentOptions::default());
        let a = by_identifier(&ms, "A").id;
        let stranger = Uuid::new_v4();
        let err = apply_completion(&mut ms, a, stranger, (2, 0), None, Utc::now())
            .expect_err("stranger cannot win");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn byes_cascade_when_their_player_arrives() {
        // 3 players double elim: the losers round 1 match is a structural bye
        let (_, roster, mut ms) = bracket_fixture(
            TournamentType::DoubleElim,
            3,
            TournamentOptions::default(),
        );
        // WB round 1 real match is seed 2 vs seed 3
        let wb1 = ms
            .iter()
            .find(|m| m.round == 1 && !m.is_bye)
            .unwrap()
            .clone();
        apply_completion(&mut ms, wb1.id, roster[1], (2, 0), None, Utc::now()).unwrap();

        // the loser drops into the LB bye, which auto-completes and forwards
        let lb1 = ms.iter().find(|m| m.round == -1).unwrap();
        assert_eq!(lb1.state, MatchState::Complete);
        assert!(lb1.is_bye);
        assert_eq!(lb1.winner_id, Some(roster[2]));
        let lb_final = ms.iter().find(|m| m.round == -2).unwrap();
        assert_eq!(lb_final.player1_id, Some(roster[2]));
    }

    #[test]
    fn forfeit_records_zero_scores_and_the_forfeiter_as_loser() {
        let (_, roster, mut ms) =
            bracket_fixture(TournamentType::SingleElim, 4, TournamentOptions::default());
        let a = by_identifier(&ms, "A").id;
        // roster[3] forfeits against roster[0]
        apply_completion(&mut ms, a, roster[0], (0, 0), Some(roster[3]), Utc::now()).unwrap();
        let m = by_identifier(&ms, "A");
        assert!(m.forfeited);
        assert_eq!(m.forfeited_participant_id, Some(roster[3]));
        assert_eq!(m.loser_id, Some(roster[3]));
        assert_eq!((m.player1_score, m.player2_score), (0, 0));
    }

    #[test]
    fn grand_final_reset_voids_when_winners_champion_wins() {
        let (_, roster, mut ms) = bracket_fixture(
            TournamentType::DoubleElim,
            4,
            TournamentOptions {
                grand_finals_modifier: GrandFinalsModifier::BracketReset,
                ..TournamentOptions::default()
            },
        );
        let now = Utc::now();
        // WB: r0 beats r3, r1 beats r2, r0 beats r1
        let a = by_identifier(&ms, "A").id;
        let b = by_identifier(&ms, "B").id;
        apply_completion(&mut ms, a, roster[0], (2, 0), None, now).unwrap();
        apply_completion(&mut ms, b, roster[1], (2, 0), None, now).unwrap();
        let wb_final = ms.iter().find(|m| m.round == 2).unwrap().id;
        apply_completion(&mut ms, wb_final, roster[0], (2, 0), None, now).unwrap();
        // LB: r2 beats r3, then r1 beats r2
        let lb1 = ms.iter().find(|m| m.round == -1).unwrap().id;
        apply_completion(&mut ms, lb1, roster[2], (2, 0), None, now).unwrap();
        let lb_final = ms.iter().find(|m| m.round == -2).unwrap().id;
        apply_completion(&mut ms, lb_final, roster[1], (2, 0), None, now).unwrap();
        // grand final: winners champion r0 wins outright
        let gf = ms.iter().find(|m| m.round == 3).unwrap().id;
        apply_completion(&mut ms, gf, roster[0], (3, 1), None, now).unwrap();

        let reset = ms.iter().find(|m| m.round == 4).unwrap();
        assert_eq!(reset.state, MatchState::Complete, "reset auto-voided");
        assert_eq!(reset.winner_id, Some(roster[0]));
        assert!(reset.score_text.is_none(), "voided, not played");
    }

    #[test]
    fn grand_final_reset_plays_out_when_losers_champion_wins() {
        let (_, roster, mut ms) = bracket_fixture(
            TournamentType::DoubleElim,
            4,
            TournamentOptions {
                grand_finals_modifier: GrandFinalsModifier::BracketReset,
                ..TournamentOptions::default()
            },
        );
        let now = Utc::now();
        let a = by_identifier(&ms, "A").id;
        let b = by_identifier(&ms, "B").id;
        apply_completion(&mut ms, a, roster[0], (2, 0), None, now).unwrap();
        apply_completion(&mut ms, b, roster[1], (2, 0), None, now).unwrap();
        let wb_final = ms.iter().find(|m| m.round == 2).unwrap().id;
        apply_completion(&mut ms, wb_final, roster[0], (2, 0), None, now).unwrap();
        let lb1 = ms.iter().find(|m| m.round == -1).unwrap().id;
        apply_completion(&mut ms, lb1, roster[2], (2, 0), None, now).unwrap();
        let lb_final = ms.iter().find(|m| m.round == -2).unwrap().id;
        apply_completion(&mut ms, lb_final, roster[1], (2, 0), None, now).unwrap();
        // losers champion r1 takes the first final: the reset goes live
        let gf = ms.iter().find(|m| m.round == 3).unwrap().id;
        apply_completion(&mut ms, gf, roster[1], (1, 3), None, now).unwrap();

        let reset = ms.iter().find(|m| m.round == 4).unwrap();
        assert_eq!(reset.state, MatchState::Open);
        assert_eq!(reset.player1_id, Some(roster[1]), "gf winner in slot 1");
        assert_eq!(reset.player2_id, Some(roster[0]));
    }

    #[test]
    fn reopen_rolls_back_advanced_slots() {
        let (_, roster, mut ms) =
            bracket_fixture(TournamentType::SingleElim, 4, TournamentOptions::default());
        let a = by_identifier(&ms, "A").id;
        apply_completion(&mut ms, a, roster[0], (2, 0), None, Utc::now()).unwrap();
        assert_eq!(by_identifier(&ms, "C").player1_id, Some(roster[0]));

        let mut touched = Vec::new();
        apply_rollback(&mut ms, a, None, &mut touched).unwrap();
        let m = by_identifier(&ms, "A");
        assert_eq!(m.state, MatchState::Open);
        assert_eq!(m.winner_id, None);
        assert_eq!(m.score_text, None);
        assert_eq!(by_identifier(&ms, "C").player1_id, None, "slot cleared");
    }

    #[test]
    fn reopen_blocked_once_downstream_completed() {
        let (_, roster, mut ms) =
            bracket_fixture(TournamentType::SingleElim, 4, TournamentOptions::default());
        let a = by_identifier(&ms, "A").id;
        let b = by_identifier(&ms, "B").id;
        let c = by_identifier(&ms, "C").id;
        let now = Utc::now();
        apply_completion(&mut ms, a, roster[0], (2, 0), None, now).unwrap();
        apply_completion(&mut ms, b, roster[1], (2, 0), None, now).unwrap();
        apply_completion(&mut ms, c, roster[0], (2, 0), None, now).unwrap();

        let mut touched = Vec::new();
        let err = apply_rollback(&mut ms, a, None, &mut touched).expect_err("final completed");
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn set_winner_reopen_set_winner_is_idempotent() {
        let (_, roster, mut ms) =
            bracket_fixture(TournamentType::SingleElim, 4, TournamentOptions::default());
        let a = by_identifier(&ms, "A").id;
        let now = Utc::now();
        apply_completion(&mut ms, a, roster[0], (2, 0), None, now).unwrap();
        let first = ms.clone();

        let mut touched = Vec::new();
        apply_rollback(&mut ms, a, None, &mut touched).unwrap();
        apply_completion(&mut ms, a, roster[0], (2, 0), None, now).unwrap();

        for (x, y) in first.iter().zip(ms.iter()) {
            assert_eq!(x, y, "replaying the same result restores the state");
        }
    }

    #[test]
    fn next_match_prefers_lowest_play_order() {
        let (_, _, mut ms) =
            bracket_fixture(TournamentType::SingleElim, 8, TournamentOptions::default());
        let next = find_next_match(&ms).unwrap();
        assert_eq!(next.identifier, "A");
        // mark A underway: B becomes next
        ms[0].underway_at = Some(Utc::now());
        let next = find_next_match(&ms).unwrap();
        assert_eq!(next.identifier, "B");
    }
}
