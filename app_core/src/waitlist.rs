//! Waitlist for pending-and-full tournaments. Positions among waiting
//! entries stay a contiguous 1..M permutation; every removal compacts.

use crate::{
    Core, CoreError, CoreResult, EffectiveTenant, WriteBatch,
    utils::{normalize_opt, normalize_ws},
};
use chrono::{DateTime, Utc};
use displaydoc::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, instrument};
use uuid::Uuid;

/// lifecycle of a waitlist entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    /// waiting
    #[default]
    Waiting,
    /// promoted
    Promoted,
    /// removed
    Removed,
}

impl FromStr for WaitlistStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(WaitlistStatus::Waiting),
            "promoted" => Ok(WaitlistStatus::Promoted),
            "removed" => Ok(WaitlistStatus::Removed),
            other => Err(format!("unknown waitlist status: {other}")),
        }
    }
}

/// overflow signup of a pending tournament
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub tournament_id: Uuid,
    /// owning tenant
    pub user_id: i64,
    pub name: String,
    pub email: Option<String>,
    /// 1..M contiguous among waiting entries
    pub position: u32,
    pub status: WaitlistStatus,
    pub created_at: DateTime<Utc>,
    pub promoted_at: Option<DateTime<Utc>>,
}

/// Rewrite positions 1..M over the waiting entries, in current order.
/// Returns the entries whose position changed.
pub(crate) fn compact_positions(entries: &mut [WaitlistEntry]) -> Vec<WaitlistEntry> {
    let mut changed = Vec::new();
    let mut next = 1u32;
    for e in entries.iter_mut() {
        if e.status != WaitlistStatus::Waiting {
            continue;
        }
        if e.position != next {
            e.position = next;
            changed.push(e.clone());
        }
        next += 1;
    }
    changed
}

fn waiting_sorted(mut entries: Vec<WaitlistEntry>) -> Vec<WaitlistEntry> {
    entries.retain(|e| e.status == WaitlistStatus::Waiting);
    entries.sort_by_key(|e| e.position);
    entries
}

impl Core {
    /// Current waiting entries, in position order.
    pub async fn waitlist_status(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<Vec<WaitlistEntry>> {
        let tournament = self.find_tournament(tenant, reference).await?;
        Ok(waiting_sorted(
            self.database.list_waitlist(tournament.id).await?,
        ))
    }

    #[instrument(name = "core.waitlist.join", skip(self, tenant, email))]
    pub async fn waitlist_join(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        name: String,
        email: Option<String>,
    ) -> CoreResult<WaitlistEntry> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        if tournament.has_started() {
            return Err(CoreError::Conflict(
                "signups are closed once the tournament has started".into(),
            ));
        }
        let name = normalize_ws(name);
        if name.is_empty() {
            return Err(CoreError::Validation("name is required".into()));
        }
        let waiting = waiting_sorted(self.database.list_waitlist(tournament.id).await?);
        if waiting.iter().any(|e| e.name.eq_ignore_ascii_case(&name)) {
            return Err(CoreError::Conflict(format!(
                "already on the waitlist: {name}"
            )));
        }

        let entry = WaitlistEntry {
            id: Uuid::new_v4(),
            tournament_id: tournament.id,
            user_id: tournament.user_id,
            name,
            email: normalize_opt(email),
            position: waiting.len() as u32 + 1,
            status: WaitlistStatus::Waiting,
            created_at: Utc::now(),
            promoted_at: None,
        };
        let batch = WriteBatch {
            insert_waitlist: vec![entry.clone()],
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;
        info!(id = %entry.id, position = entry.position, "waitlist_joined");
        Ok(entry)
    }

    #[instrument(name = "core.waitlist.leave", skip(self, tenant))]
    pub async fn waitlist_leave(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        entry_id: Uuid,
    ) -> CoreResult<()> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let mut waiting = waiting_sorted(self.database.list_waitlist(tournament.id).await?);
        let Some(entry) = waiting.iter_mut().find(|e| e.id == entry_id) else {
            return Err(CoreError::NotFound(format!("waitlist entry: {entry_id}")));
        };
        entry.status = WaitlistStatus::Removed;
        let removed = entry.clone();

        let mut updates = compact_positions(&mut waiting);
        updates.push(removed);

        let batch = WriteBatch {
            update_waitlist: updates,
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;
        Ok(())
    }

    /// Move the head of the waitlist onto the roster: inserts an active
    /// participant with the next seed, marks the entry promoted and compacts
    /// the remaining positions, all in one transaction.
    #[instrument(name = "core.waitlist.promote", skip(self, tenant))]
    pub async fn waitlist_promote(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        entry_id: Uuid,
    ) -> CoreResult<WaitlistEntry> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        if tournament.has_started() {
            return Err(CoreError::Conflict(
                "roster is frozen once the tournament has started".into(),
            ));
        }
        let mut waiting = waiting_sorted(self.database.list_waitlist(tournament.id).await?);
        let Some(entry) = waiting.iter_mut().find(|e| e.id == entry_id) else {
            return Err(CoreError::NotFound(format!("waitlist entry: {entry_id}")));
        };

        let roster = self.database.list_participants(tournament.id).await?;
        if let Some(cap) = tournament.options.signup_cap
            && roster.len() as u32 >= cap
        {
            return Err(CoreError::Conflict("tournament is still full".into()));
        }
        if roster.iter().any(|p| p.name.eq_ignore_ascii_case(&entry.name)) {
            return Err(CoreError::Conflict(format!(
                "participant name already taken: {}",
                entry.name
            )));
        }

        entry.status = WaitlistStatus::Promoted;
        entry.promoted_at = Some(Utc::now());
        let promoted = entry.clone();

        let participant = crate::Participant {
            id: Uuid::new_v4(),
            tournament_id: tournament.id,
            user_id: tournament.user_id,
            name: promoted.name.clone(),
            seed: roster.len() as u32 + 1,
            active: true,
            checked_in: false,
            misc: None,
            final_rank: None,
            created_at: Utc::now(),
        };

        let mut updates = compact_positions(&mut waiting);
        updates.push(promoted.clone());

        let batch = WriteBatch {
            insert_participants: vec![participant.clone()],
            update_waitlist: updates,
            ..WriteBatch::default()
        };
        self.commit_with_retry(batch).await?;

        info!(id = %promoted.id, participant = %participant.id, "waitlist_promoted");
        self.publish_room(
            crate::CrTopic::Tournament {
                user_id: tournament.user_id,
                tournament_id: tournament.id,
            },
            crate::CrEvent::ParticipantAdded {
                tournament_id: tournament.id,
                participant_id: participant.id,
            },
        )
        .await;
        Ok(promoted)
    }

    /// Signup helper for the public collaborator: roster if there is room,
    /// waitlist otherwise.
    pub async fn signup_or_waitlist(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        name: String,
        misc: Option<String>,
        email: Option<String>,
    ) -> CoreResult<SignupOutcome> {
        match self
            .signup(tenant, reference, name.clone(), misc)
            .await
        {
            Ok(participant) => Ok(SignupOutcome::Registered(participant)),
            Err(CoreError::Conflict(msg)) if msg == "tournament is full" => {
                let entry = self.waitlist_join(tenant, reference, name, email).await?;
                Ok(SignupOutcome::Waitlisted(entry))
            }
            Err(e) => Err(e),
        }
    }
}

/// outcome of a public signup attempt
#[derive(Debug, Clone)]
pub enum SignupOutcome {
    Registered(crate::Participant),
    Waitlisted(WaitlistEntry),
}
