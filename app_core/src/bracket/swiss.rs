//! Swiss pairings: round 1 pairs top half against bottom half; later rounds
//! pair within match-win score groups, avoiding repeat opponents, floating
//! the odd player down. With an odd roster exactly one player per round
//! receives a bye (counted as a 1-0 win), never the same player twice.

use super::{BracketPlan, BracketStats, MatchDescriptor, finalize};
use crate::{CoreError, CoreResult, Match, MatchState};
use uuid::Uuid;

/// `⌈log₂ N⌉` rounds are enough to separate N players.
pub fn recommended_rounds(n: usize) -> u32 {
    let mut rounds = 0;
    let mut capacity = 1usize;
    while capacity < n {
        capacity *= 2;
        rounds += 1;
    }
    rounds
}

/// Every match of round `r` has completed.
pub fn is_round_complete(matches: &[Match], round: i32) -> bool {
    matches
        .iter()
        .filter(|m| m.round == round)
        .all(|m| m.state == MatchState::Complete)
}

/// Per-player pairing state derived from prior rounds.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub participant: Uuid,
    /// position in the seed-ordered roster
    pub seed_index: usize,
    /// match wins, byes included
    pub score: u32,
    pub opponents: Vec<Uuid>,
    pub had_bye: bool,
}

/// Derive pairing state for the seed-ordered roster from played matches.
pub fn player_states(roster: &[Uuid], matches: &[Match]) -> Vec<PlayerState> {
    roster
        .iter()
        .enumerate()
        .map(|(seed_index, &participant)| {
            let mut state = PlayerState {
                participant,
                seed_index,
                score: 0,
                opponents: Vec::new(),
                had_bye: false,
            };
            for m in matches {
                if !m.has_participant(participant) {
                    continue;
                }
                if m.is_bye {
                    state.had_bye = true;
                    state.score += 1;
                    continue;
                }
                if let Some(opponent) = m.opponent_of(participant) {
                    state.opponents.push(opponent);
                }
                if m.winner_id == Some(participant) {
                    state.score += 1;
                }
            }
            state
        })
        .collect()
}

fn open_match(round: i32, position: u32, a: Uuid, b: Uuid) -> MatchDescriptor {
    let mut m = MatchDescriptor::new(round, position, false);
    m.player1_id = Some(a);
    m.player2_id = Some(b);
    m.state = MatchState::Open;
    m
}

/// Byes count as a win with the default score 1-0.
fn bye_match(round: i32, position: u32, player: Uuid) -> MatchDescriptor {
    let mut m = MatchDescriptor::new(round, position, false);
    m.player1_id = Some(player);
    m.state = MatchState::Complete;
    m.winner_id = Some(player);
    m.player1_score = 1;
    m.is_bye = true;
    m
}

/// Round 1: seed 1 vs seed N/2+1, seed 2 vs seed N/2+2, and so on. The
/// lowest seed sits out when the roster is odd.
pub fn initial_pairings(roster: &[Uuid]) -> CoreResult<BracketPlan> {
    if roster.is_empty() {
        return Err(CoreError::Validation("roster is empty".into()));
    }
    let mut matches = Vec::new();
    let mut playing = roster;
    let bye: Option<Uuid>;
    if roster.len() % 2 != 0 {
        bye = roster.last().copied();
        playing = &roster[..roster.len() - 1];
    } else {
        bye = None;
    }

    let half = playing.len() / 2;
    for j in 0..half {
        matches.push(open_match(1, j as u32, playing[j], playing[j + half]));
    }
    if let Some(player) = bye {
        matches.push(bye_match(1, half as u32, player));
    }

    finalize(&mut matches, 0);
    let bye_matches = matches.iter().filter(|m| m.is_bye).count() as u32;
    let stats = BracketStats {
        total_matches: matches.len() as u32,
        bye_matches,
        round_count: 1,
        format_rounds: recommended_rounds(roster.len()),
    };
    Ok(BracketPlan { matches, stats })
}

/// Pair round `round` from the results of all prior rounds. `offset` is the
/// number of matches already persisted, so identifiers and play order
/// continue the existing sequence.
pub fn next_round_pairings(
    roster: &[Uuid],
    prior_matches: &[Match],
    round: i32,
    offset: usize,
) -> CoreResult<BracketPlan> {
    if round < 2 {
        return Err(CoreError::Validation(
            "next round pairing starts at round 2".into(),
        ));
    }
    if !is_round_complete(prior_matches, round - 1) {
        return Err(CoreError::Conflict(format!(
            "round {} has unfinished matches",
            round - 1
        )));
    }

    let mut states = player_states(roster, prior_matches);
    // standings order: score descending, seed ascending
    states.sort_by(|a, b| b.score.cmp(&a.score).then(a.seed_index.cmp(&b.seed_index)));

    // choose the bye first: the lowest-standing player without one
    let mut bye: Option<PlayerState> = None;
    if states.len() % 2 != 0 {
        let pick = states
            .iter()
            .rposition(|s| !s.had_bye)
            .unwrap_or(states.len() - 1);
        bye = Some(states.remove(pick));
    }

    // pair top-down over the score-sorted field, taking the highest-standing
    // fresh opponent; skipping past played opponents is what floats a player
    // into the next score group, and an unavoidable rematch falls back to the
    // nearest neighbour
    let mut matches = Vec::new();
    let mut position = 0u32;
    let mut pool = states;
    while pool.len() >= 2 {
        let p = pool.remove(0);
        let q_index = pool
            .iter()
            .position(|q| !p.opponents.contains(&q.participant))
            .unwrap_or(0);
        let q = pool.remove(q_index);
        matches.push(open_match(round, position, p.participant, q.participant));
        position += 1;
    }
    debug_assert!(pool.is_empty(), "bye selection leaves an even field");

    if let Some(b) = bye {
        matches.push(bye_match(round, position, b.participant));
    }

    finalize(&mut matches, offset);
    let bye_matches = matches.iter().filter(|m| m.is_bye).count() as u32;
    let stats = BracketStats {
        total_matches: matches.len() as u32,
        bye_matches,
        round_count: round as u32,
        format_rounds: recommended_rounds(roster.len()),
    };
    Ok(BracketPlan { matches, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn roster(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    /// Store-shaped match for feeding next_round_pairings.
    fn played(round: i32, a: Uuid, b: Uuid, winner: Uuid) -> Match {
        Match {
            id: Uuid::new_v4(),
            tournament_id: Uuid::nil(),
            user_id: 1,
            identifier: String::new(),
            round,
            suggested_play_order: 0,
            bracket_position: 0,
            losers_bracket: false,
            player1_id: Some(a),
            player2_id: Some(b),
            player1_prereq_match_id: None,
            player2_prereq_match_id: None,
            player1_is_prereq_loser: false,
            player2_is_prereq_loser: false,
            winner_id: Some(winner),
            loser_id: Some(if winner == a { b } else { a }),
            player1_score: if winner == a { 1 } else { 0 },
            player2_score: if winner == a { 0 } else { 1 },
            score_text: Some("1-0".into()),
            forfeited: false,
            forfeited_participant_id: None,
            station_id: None,
            underway_at: None,
            completed_at: Some(Utc::now()),
            state: MatchState::Complete,
            is_bye: false,
        }
    }

    fn bye_played(round: i32, player: Uuid) -> Match {
        let mut m = played(round, player, player, player);
        m.player2_id = None;
        m.loser_id = None;
        m.is_bye = true;
        m.score_text = None;
        m
    }

    #[test]
    fn round_one_pairs_top_half_against_bottom_half() {
        let r = roster(6);
        let plan = initial_pairings(&r).unwrap();
        assert_eq!(plan.matches.len(), 3);
        assert_eq!(plan.matches[0].player1_id, Some(r[0]));
        assert_eq!(plan.matches[0].player2_id, Some(r[3]));
        assert_eq!(plan.matches[2].player1_id, Some(r[2]));
        assert_eq!(plan.matches[2].player2_id, Some(r[5]));
    }

    #[test]
    fn odd_roster_gives_the_lowest_seed_a_bye() {
        let r = roster(5);
        let plan = initial_pairings(&r).unwrap();
        assert_eq!(plan.stats.bye_matches, 1);
        let bye = plan.matches.iter().find(|m| m.is_bye).unwrap();
        assert_eq!(bye.player1_id, Some(r[4]));
        assert_eq!(bye.winner_id, Some(r[4]));
        assert_eq!(bye.player1_score, 1, "bye counts as a 1-0 win");
    }

    #[test]
    fn recommended_rounds_is_log2_ceiling() {
        assert_eq!(recommended_rounds(2), 1);
        assert_eq!(recommended_rounds(3), 2);
        assert_eq!(recommended_rounds(8), 3);
        assert_eq!(recommended_rounds(9), 4);
    }

    #[test]
    fn next_round_groups_by_score_and_avoids_rematches() {
        let r = roster(4);
        // round 1: r0 beats r2, r1 beats r3
        let prior = vec![
            played(1, r[0], r[2], r[0]),
            played(1, r[1], r[3], r[1]),
        ];
        let plan = next_round_pairings(&r, &prior, 2, 2).unwrap();
        assert_eq!(plan.matches.len(), 2);
        // winners meet winners, losers meet losers
        let m1 = &plan.matches[0];
        assert_eq!(m1.player1_id, Some(r[0]));
        assert_eq!(m1.player2_id, Some(r[1]));
        let m2 = &plan.matches[1];
        assert_eq!(m2.player1_id, Some(r[2]));
        assert_eq!(m2.player2_id, Some(r[3]));
        // play order continues after the existing two matches
        assert_eq!(m1.suggested_play_order, 3);
        assert_eq!(m1.identifier, "C");
    }

    #[test]
    fn next_round_rejects_unfinished_prior_round() {
        let r = roster(4);
        let mut prior = vec![
            played(1, r[0], r[2], r[0]),
            played(1, r[1], r[3], r[1]),
        ];
        prior[1].state = MatchState::Open;
        prior[1].winner_id = None;
        let err = next_round_pairings(&r, &prior, 2, 2).expect_err("must reject");
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn no_player_receives_two_byes() {
        let r = roster(5);
        // round 1 per initial pairing: (0v2) (1v3), bye to 4
        let prior = vec![
            played(1, r[0], r[2], r[0]),
            played(1, r[1], r[3], r[1]),
            bye_played(1, r[4]),
        ];
        let plan = next_round_pairings(&r, &prior, 2, 3).unwrap();
        let bye = plan.matches.iter().find(|m| m.is_bye).expect("one bye");
        assert_ne!(bye.player1_id, Some(r[4]), "r4 already had a bye");
        assert_eq!(plan.stats.bye_matches, 1);
    }

    #[test]
    fn repeat_opponents_are_avoided_within_a_group() {
        let r = roster(4);
        // everyone at one win after two rounds of mirrored results
        let prior = vec![
            played(1, r[0], r[2], r[0]),
            played(1, r[1], r[3], r[1]),
            played(2, r[0], r[1], r[0]),
            played(2, r[2], r[3], r[2]),
        ];
        let plan = next_round_pairings(&r, &prior, 3, 4).unwrap();
        for m in &plan.matches {
            let a = m.player1_id.unwrap();
            let b = m.player2_id.unwrap();
            let met_before = prior
                .iter()
                .any(|p| p.has_participant(a) && p.has_participant(b));
            assert!(!met_before, "round 3 must produce fresh pairings");
        }
    }
}
