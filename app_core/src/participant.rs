//! Participant roster: seeds, check-in, signup collaborator contract.

use crate::{
    Core, CoreError, CoreResult, CrEvent, CrTopic, EffectiveTenant, Tournament,
    utils::{normalize_opt, normalize_ws},
};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

/// a roster slot in one tournament
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// id of participant
    pub id: Uuid,
    /// id of owning tournament
    pub tournament_id: Uuid,
    /// owning tenant
    pub user_id: i64,
    /// display name, unique per tournament (case-insensitive)
    pub name: String,
    /// seed, 1..N contiguous among active participants
    pub seed: u32,
    /// cleared for DQ bookkeeping after start
    pub active: bool,
    pub checked_in: bool,
    /// free-form operator notes
    pub misc: Option<String>,
    /// null until the tournament completes
    pub final_rank: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// attributes for adding a participant to a pending tournament
#[derive(Debug, Clone, Default)]
pub struct NewParticipant {
    pub name: String,
    /// insertion seed; appended at the bottom when absent
    pub seed: Option<u32>,
    pub misc: Option<String>,
}

/// patch for a participant while the tournament is pending
#[derive(Debug, Clone, Default)]
pub struct ParticipantPatch {
    pub name: Option<String>,
    pub seed: Option<u32>,
    pub misc: Option<Option<String>>,
    pub checked_in: Option<bool>,
}

/// Reassign seeds 1..N in current order. Callers arrange `participants`
/// first; this only rewrites the numbers.
pub(crate) fn renumber_seeds(participants: &mut [Participant]) {
    for (i, p) in participants.iter_mut().enumerate() {
        p.seed = (i + 1) as u32;
    }
}

fn sorted_roster(mut participants: Vec<Participant>) -> Vec<Participant> {
    participants.sort_by_key(|p| p.seed);
    participants
}

impl Core {
    pub async fn list_participants(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<Vec<Participant>> {
        let tournament = self.find_tournament(tenant, reference).await?;
        Ok(sorted_roster(
            self.database.list_participants(tournament.id).await?,
        ))
    }

    #[instrument(name = "core.participant.add", skip(self, tenant, new))]
    pub async fn add_participant(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        new: NewParticipant,
    ) -> CoreResult<Participant> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        self.insert_roster_entry(&tournament, new, false).await
    }

    /// Add several participants in one call; seeds are appended in order.
    #[instrument(name = "core.participant.bulk_add", skip(self, tenant, names))]
    pub async fn bulk_add_participants(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        names: Vec<String>,
    ) -> CoreResult<Vec<Participant>> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        if tournament.has_started() {
            return Err(CoreError::Conflict(
                "roster is frozen once the tournament has started".into(),
            ));
        }
        let existing = self.database.list_participants(tournament.id).await?;
        let mut taken: Vec<String> = existing.iter().map(|p| p.name.to_lowercase()).collect();
        let mut next_seed = existing.len() as u32 + 1;

        let mut added = Vec::new();
        for raw in names {
            let name = normalize_ws(raw);
            if name.is_empty() {
                continue;
            }
            if taken.contains(&name.to_lowercase()) {
                return Err(CoreError::Conflict(format!(
                    "participant name already taken: {name}"
                )));
            }
            taken.push(name.to_lowercase());
            added.push(Participant {
                id: Uuid::new_v4(),
                tournament_id: tournament.id,
                user_id: tournament.user_id,
                name,
                seed: next_seed,
                active: true,
                checked_in: false,
                misc: None,
                final_rank: None,
                created_at: Utc::now(),
            });
            next_seed += 1;
        }
        if added.is_empty() {
            return Err(CoreError::Validation("no usable names given".into()));
        }

        self.database.insert_participants(&added).await?;
        info!(count = added.len(), "participants_bulk_added");
        self.publish_room(
            CrTopic::Tournament {
                user_id: tournament.user_id,
                tournament_id: tournament.id,
            },
            CrEvent::ParticipantBulk {
                tournament_id: tournament.id,
                count: added.len() as u32,
            },
        )
        .await;
        Ok(added)
    }

    #[instrument(name = "core.participant.update", skip(self, tenant, patch))]
    pub async fn update_participant(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        participant_id: Uuid,
        patch: ParticipantPatch,
    ) -> CoreResult<Participant> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        if tournament.has_started() {
            return Err(CoreError::Conflict(
                "roster is frozen once the tournament has started".into(),
            ));
        }
        let roster = sorted_roster(self.database.list_participants(tournament.id).await?);
        let Some(current) = roster.iter().find(|p| p.id == participant_id).cloned() else {
            return Err(CoreError::NotFound(format!(
                "participant: {participant_id}"
            )));
        };

        let mut updated = current.clone();
        if let Some(name) = patch.name {
            let name = normalize_ws(name);
            if name.is_empty() {
                return Err(CoreError::Validation("name is required".into()));
            }
            if roster.iter().any(|p| {
                p.id != participant_id && p.name.eq_ignore_ascii_case(&name)
            }) {
                return Err(CoreError::Conflict(format!(
                    "participant name already taken: {name}"
                )));
            }
            updated.name = name;
        }
        if let Some(misc) = patch.misc {
            updated.misc = normalize_opt(misc);
        }
        if let Some(checked_in) = patch.checked_in {
            updated.checked_in = checked_in;
        }

        let mut to_write = vec![updated.clone()];
        if let Some(new_seed) = patch.seed {
            let mut reordered: Vec<Participant> = roster
                .iter()
                .filter(|p| p.id != participant_id)
                .cloned()
                .collect();
            let index = (new_seed.max(1) as usize - 1).min(reordered.len());
            reordered.insert(index, updated.clone());
            renumber_seeds(&mut reordered);
            // everyone whose number moved gets written
            to_write = reordered
                .into_iter()
                .filter(|p| {
                    p.id == participant_id
                        || roster
                            .iter()
                            .find(|o| o.id == p.id)
                            .map(|o| o.seed != p.seed)
                            .unwrap_or(true)
                })
                .collect();
            updated = to_write
                .iter()
                .find(|p| p.id == participant_id)
                .cloned()
                .unwrap_or(updated);
        }

        self.database.update_participants(&to_write).await?;
        self.publish_room(
            CrTopic::Tournament {
                user_id: tournament.user_id,
                tournament_id: tournament.id,
            },
            CrEvent::ParticipantUpdated {
                tournament_id: tournament.id,
                participant_id,
            },
        )
        .await;
        Ok(updated)
    }

    #[instrument(name = "core.participant.remove", skip(self, tenant))]
    pub async fn remove_participant(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        participant_id: Uuid,
    ) -> CoreResult<()> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        if tournament.has_started() {
            return Err(CoreError::Conflict(
                "roster is frozen once the tournament has started".into(),
            ));
        }
        let roster = sorted_roster(self.database.list_participants(tournament.id).await?);
        if !roster.iter().any(|p| p.id == participant_id) {
            return Err(CoreError::NotFound(format!(
                "participant: {participant_id}"
            )));
        }

        self.database.delete_participant(participant_id).await?;

        // close the seed gap
        let mut remaining: Vec<Participant> = roster
            .into_iter()
            .filter(|p| p.id != participant_id)
            .collect();
        let before: Vec<u32> = remaining.iter().map(|p| p.seed).collect();
        renumber_seeds(&mut remaining);
        let moved: Vec<Participant> = remaining
            .into_iter()
            .zip(before)
            .filter(|(p, old)| p.seed != *old)
            .map(|(p, _)| p)
            .collect();
        if !moved.is_empty() {
            self.database.update_participants(&moved).await?;
        }

        self.publish_room(
            CrTopic::Tournament {
                user_id: tournament.user_id,
                tournament_id: tournament.id,
            },
            CrEvent::ParticipantDeleted {
                tournament_id: tournament.id,
                participant_id,
            },
        )
        .await;
        Ok(())
    }

    /// Toggle check-in; allowed while pending or checking_in.
    pub async fn set_checked_in(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        participant_id: Uuid,
        checked_in: bool,
    ) -> CoreResult<Participant> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        if tournament.has_started() {
            return Err(CoreError::Conflict(
                "check-in closes once the tournament has started".into(),
            ));
        }
        let mut participant = self
            .database
            .get_participant(participant_id)
            .await?
            .filter(|p| p.tournament_id == tournament.id)
            .ok_or_else(|| CoreError::NotFound(format!("participant: {participant_id}")))?;
        participant.checked_in = checked_in;
        self.database
            .update_participants(std::slice::from_ref(&participant))
            .await?;
        self.publish_room(
            CrTopic::Tournament {
                user_id: tournament.user_id,
                tournament_id: tournament.id,
            },
            CrEvent::ParticipantCheckin {
                tournament_id: tournament.id,
                participant_id,
                checked_in,
            },
        )
        .await;
        Ok(participant)
    }

    /// Shuffle all seeds of a pending tournament.
    #[instrument(name = "core.participant.randomize", skip(self, tenant))]
    pub async fn randomize_seeds(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<Vec<Participant>> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        if tournament.has_started() {
            return Err(CoreError::Conflict(
                "seeds are frozen once the tournament has started".into(),
            ));
        }
        let mut roster = self.database.list_participants(tournament.id).await?;
        roster.shuffle(&mut rand::rng());
        renumber_seeds(&mut roster);
        self.database.update_participants(&roster).await?;
        self.publish_room(
            CrTopic::Tournament {
                user_id: tournament.user_id,
                tournament_id: tournament.id,
            },
            CrEvent::ParticipantSeeded {
                tournament_id: tournament.id,
            },
        )
        .await;
        Ok(sorted_roster(roster))
    }

    /// Case-insensitive exact match first, then substring. Exposed to the
    /// public signup collaborator.
    pub async fn lookup_participant(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        name: &str,
    ) -> CoreResult<Option<Participant>> {
        let tournament = self.find_tournament(tenant, reference).await?;
        let roster = self.database.list_participants(tournament.id).await?;
        let needle = normalize_ws(name).to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }
        if let Some(exact) = roster.iter().find(|p| p.name.to_lowercase() == needle) {
            return Ok(Some(exact.clone()));
        }
        Ok(roster
            .iter()
            .find(|p| p.name.to_lowercase().contains(&needle))
            .cloned())
    }

    /// Public signup: pending tournaments only, unique name, capped roster.
    #[instrument(name = "core.participant.signup", skip(self, tenant, misc))]
    pub async fn signup(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        name: String,
        misc: Option<String>,
    ) -> CoreResult<Participant> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        self.insert_roster_entry(
            &tournament,
            NewParticipant {
                name,
                seed: None,
                misc,
            },
            true,
        )
        .await
    }

    /// Shared insertion path of `add_participant` and `signup`.
    async fn insert_roster_entry(
        &self,
        tournament: &Tournament,
        new: NewParticipant,
        enforce_cap: bool,
    ) -> CoreResult<Participant> {
        if tournament.has_started() {
            return Err(CoreError::Conflict(
                "signups are closed once the tournament has started".into(),
            ));
        }
        let name = normalize_ws(new.name);
        if name.is_empty() {
            return Err(CoreError::Validation("name is required".into()));
        }
        let roster = sorted_roster(self.database.list_participants(tournament.id).await?);
        if roster.iter().any(|p| p.name.eq_ignore_ascii_case(&name)) {
            return Err(CoreError::Conflict(format!(
                "participant name already taken: {name}"
            )));
        }
        if enforce_cap
            && let Some(cap) = tournament.options.signup_cap
            && roster.len() as u32 >= cap
        {
            return Err(CoreError::Conflict("tournament is full".into()));
        }

        let mut participant = Participant {
            id: Uuid::new_v4(),
            tournament_id: tournament.id,
            user_id: tournament.user_id,
            name,
            seed: roster.len() as u32 + 1,
            active: true,
            checked_in: false,
            misc: normalize_opt(new.misc),
            final_rank: None,
            created_at: Utc::now(),
        };
        self.database
            .insert_participants(std::slice::from_ref(&participant))
            .await?;

        // honor an explicit insertion seed by reshuffling afterwards
        if let Some(seed) = new.seed
            && (seed as usize) <= roster.len()
        {
            let mut reordered = roster;
            reordered.insert(seed.max(1) as usize - 1, participant.clone());
            renumber_seeds(&mut reordered);
            self.database.update_participants(&reordered).await?;
            if let Some(placed) = reordered.iter().find(|p| p.id == participant.id) {
                participant.seed = placed.seed;
            }
        }

        info!(id = %participant.id, "participant_added");
        self.publish_room(
            CrTopic::Tournament {
                user_id: tournament.user_id,
                tournament_id: tournament.id,
            },
            CrEvent::ParticipantAdded {
                tournament_id: tournament.id,
                participant_id: participant.id,
            },
        )
        .await;
        Ok(participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(name: &str, seed: u32) -> Participant {
        Participant {
            id: Uuid::new_v4(),
            tournament_id: Uuid::nil(),
            user_id: 1,
            name: name.into(),
            seed,
            active: true,
            checked_in: false,
            misc: None,
            final_rank: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn renumber_assigns_contiguous_seeds_in_order() {
        let mut roster = vec![participant("a", 9), participant("b", 3), participant("c", 7)];
        renumber_seeds(&mut roster);
        assert_eq!(
            roster.iter().map(|p| p.seed).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn sorted_roster_orders_by_seed() {
        let roster = vec![participant("a", 2), participant("b", 1)];
        let sorted = sorted_roster(roster);
        assert_eq!(sorted[0].name, "b");
        assert_eq!(sorted[1].name, "a");
    }
}
