//! Bracket engine: pure generation of match descriptors from a seeded
//! roster. The engine never reads the store; descriptors reference each
//! other by temporary index and the caller substitutes permanent ids when
//! persisting (in descriptor order).

pub mod double_elim;
pub mod round_robin;
pub mod single_elim;
pub mod swiss;

use crate::{CoreError, CoreResult, MatchState, TournamentOptions, TournamentType, match_identifier};
use uuid::Uuid;

/// temporary link to a sibling descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prereq {
    pub match_index: usize,
    /// take the loser instead of the winner
    pub takes_loser: bool,
}

impl Prereq {
    pub fn winner_of(match_index: usize) -> Self {
        Prereq {
            match_index,
            takes_loser: false,
        }
    }
    pub fn loser_of(match_index: usize) -> Self {
        Prereq {
            match_index,
            takes_loser: true,
        }
    }
}

/// one match to be persisted, §3 fields with temporary prerequisite indices
#[derive(Debug, Clone)]
pub struct MatchDescriptor {
    /// assigned by `finalize` in generation order
    pub identifier: String,
    pub round: i32,
    pub bracket_position: u32,
    pub losers_bracket: bool,
    pub player1_id: Option<Uuid>,
    pub player2_id: Option<Uuid>,
    pub player1_prereq: Option<Prereq>,
    pub player2_prereq: Option<Prereq>,
    /// assigned by `finalize`, round-major
    pub suggested_play_order: u32,
    pub state: MatchState,
    pub winner_id: Option<Uuid>,
    pub loser_id: Option<Uuid>,
    pub player1_score: i32,
    pub player2_score: i32,
    pub is_bye: bool,
}

impl MatchDescriptor {
    pub(crate) fn new(round: i32, bracket_position: u32, losers_bracket: bool) -> Self {
        MatchDescriptor {
            identifier: String::new(),
            round,
            bracket_position,
            losers_bracket,
            player1_id: None,
            player2_id: None,
            player1_prereq: None,
            player2_prereq: None,
            suggested_play_order: 0,
            state: MatchState::Pending,
            winner_id: None,
            loser_id: None,
            player1_score: 0,
            player2_score: 0,
            is_bye: false,
        }
    }
}

/// generation summary returned next to the descriptors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BracketStats {
    pub total_matches: u32,
    pub bye_matches: u32,
    /// winners-bracket / linear round count
    pub round_count: u32,
    /// format specific: losers rounds (double elim), planned rounds (swiss)
    pub format_rounds: u32,
}

#[derive(Debug, Clone)]
pub struct BracketPlan {
    pub matches: Vec<MatchDescriptor>,
    pub stats: BracketStats,
}

/// Generate the opening bracket for a format. Swiss emits round 1 only;
/// later rounds come from `swiss::next_round_pairings`.
pub fn generate(
    format: TournamentType,
    roster: &[Uuid],
    options: &TournamentOptions,
) -> CoreResult<BracketPlan> {
    if roster.is_empty() {
        return Err(CoreError::Validation("roster is empty".into()));
    }
    match format {
        TournamentType::SingleElim => single_elim::generate(roster, options),
        TournamentType::DoubleElim => double_elim::generate(roster, options),
        TournamentType::RoundRobin => round_robin::generate(roster, options),
        TournamentType::Swiss => swiss::initial_pairings(roster),
    }
}

/// Assign identifiers and play order in emission order. `offset` continues
/// the sequence of an existing bracket (Swiss rounds after the first).
pub(crate) fn finalize(matches: &mut [MatchDescriptor], offset: usize) {
    for (i, m) in matches.iter_mut().enumerate() {
        m.identifier = match_identifier(offset + i);
        m.suggested_play_order = (offset + i) as u32 + 1;
    }
}

/// Resolve generation-time byes to a fixpoint:
/// - a slot counts as resolved when it holds a player, has no prerequisite,
///   or its prerequisite is already complete (possibly with no survivor)
/// - fully resolved matches open with two players, complete as a bye with
///   one, and complete empty with none
/// - a pending match with one slot resolved to nobody is flagged `is_bye` so
///   runtime advancement auto-completes it when its real player arrives
pub(crate) fn resolve_byes(matches: &mut Vec<MatchDescriptor>) {
    loop {
        let mut changed = false;
        for i in 0..matches.len() {
            if matches[i].state != MatchState::Pending {
                continue;
            }

            // pull survivors out of completed prerequisites
            for slot in [1usize, 2] {
                let (player, prereq) = match slot {
                    1 => (matches[i].player1_id, matches[i].player1_prereq),
                    _ => (matches[i].player2_id, matches[i].player2_prereq),
                };
                if player.is_some() {
                    continue;
                }
                if let Some(p) = prereq {
                    let src = &matches[p.match_index];
                    if src.state == MatchState::Complete {
                        let value = if p.takes_loser {
                            src.loser_id
                        } else {
                            src.winner_id
                        };
                        if value.is_some() {
                            if slot == 1 {
                                matches[i].player1_id = value;
                            } else {
                                matches[i].player2_id = value;
                            }
                            changed = true;
                        }
                    }
                }
            }

            let r1 = slot_resolved(matches, i, 1);
            let r2 = slot_resolved(matches, i, 2);
            let m = &mut matches[i];
            match (r1, r2) {
                (true, true) => match (m.player1_id, m.player2_id) {
                    (Some(_), Some(_)) => {
                        m.state = MatchState::Open;
                        changed = true;
                    }
                    (Some(p), None) | (None, Some(p)) => {
                        m.state = MatchState::Complete;
                        m.winner_id = Some(p);
                        m.is_bye = true;
                        changed = true;
                    }
                    (None, None) => {
                        m.state = MatchState::Complete;
                        m.is_bye = true;
                        changed = true;
                    }
                },
                (true, false) if m.player1_id.is_none() && !m.is_bye => {
                    m.is_bye = true;
                    changed = true;
                }
                (false, true) if m.player2_id.is_none() && !m.is_bye => {
                    m.is_bye = true;
                    changed = true;
                }
                _ => {}
            }
        }
        if !changed {
            break;
        }
    }
}

fn slot_resolved(matches: &[MatchDescriptor], index: usize, slot: usize) -> bool {
    let (player, prereq) = match slot {
        1 => (matches[index].player1_id, matches[index].player1_prereq),
        _ => (matches[index].player2_id, matches[index].player2_prereq),
    };
    if player.is_some() {
        return true;
    }
    match prereq {
        None => true,
        Some(p) => matches[p.match_index].state == MatchState::Complete,
    }
}
