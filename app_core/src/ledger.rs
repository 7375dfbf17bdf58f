//! Append-only record of match mutations per tournament, backing single-step
//! undo. Durable across restarts and observable across request handlers.

use crate::{Core, CoreResult, EffectiveTenant, MatchState};
use chrono::{DateTime, Utc};
use displaydoc::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// ledger retention floor per tournament; older entries are pruned inside
/// the appending transaction
pub const LEDGER_RETENTION: usize = 50;

/// mutation kind recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// set_winner
    SetWinner,
    /// set_forfeit
    SetForfeit,
    /// reopen
    Reopen,
    /// clear_scores
    ClearScores,
}

impl FromStr for ChangeAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set_winner" => Ok(ChangeAction::SetWinner),
            "set_forfeit" => Ok(ChangeAction::SetForfeit),
            "reopen" => Ok(ChangeAction::Reopen),
            "clear_scores" => Ok(ChangeAction::ClearScores),
            other => Err(format!("unknown change action: {other}")),
        }
    }
}

/// before-image of a single match mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchChange {
    pub id: Uuid,
    pub tournament_id: Uuid,
    /// owning tenant
    pub user_id: i64,
    pub match_id: Uuid,
    pub action: ChangeAction,
    /// match state before the mutation
    pub prior_state: MatchState,
    pub prior_winner_id: Option<Uuid>,
    pub prior_loser_id: Option<Uuid>,
    pub prior_player1_score: i32,
    pub prior_player2_score: i32,
    /// acting principal, for the audit trail
    pub actor: Option<String>,
    /// set once this entry has been consumed by undo
    pub undone: bool,
    pub created_at: DateTime<Utc>,
}

impl Core {
    /// Recent change history of a tournament, newest first.
    pub async fn list_match_changes(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        limit: usize,
    ) -> CoreResult<Vec<MatchChange>> {
        let tournament = self.find_tournament(tenant, reference).await?;
        Ok(self
            .database
            .list_changes(tournament.id, limit.min(LEDGER_RETENTION))
            .await?)
    }
}
