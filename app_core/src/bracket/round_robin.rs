//! Round robin via the circle method: participant 1 stays fixed, the rest
//! rotate each round. Odd rosters get a phantom opponent whose pairings are
//! simply skipped, so no bye matches are persisted.

use super::{BracketPlan, BracketStats, MatchDescriptor, finalize};
use crate::{CoreResult, MatchState, TournamentOptions};
use uuid::Uuid;

pub fn generate(roster: &[Uuid], options: &TournamentOptions) -> CoreResult<BracketPlan> {
    let mut circle: Vec<Option<Uuid>> = roster.iter().copied().map(Some).collect();
    if circle.len() % 2 != 0 {
        circle.push(None);
    }

    if options.sequential_pairings {
        // arrange so the opening round reads (1v2, 3v4, ...) instead of the
        // circle method's (1vN, 2vN-1, ...)
        let evens: Vec<Option<Uuid>> = circle.iter().step_by(2).copied().collect();
        let odds: Vec<Option<Uuid>> = circle.iter().skip(1).step_by(2).copied().collect();
        circle = evens.into_iter().chain(odds.into_iter().rev()).collect();
    }

    let size = circle.len();
    let rounds = size - 1;
    let mut matches = Vec::new();

    for r in 0..rounds {
        for j in 0..size / 2 {
            let (Some(a), Some(b)) = (circle[j], circle[size - 1 - j]) else {
                continue;
            };
            let mut m = MatchDescriptor::new(r as i32 + 1, j as u32, false);
            m.player1_id = Some(a);
            m.player2_id = Some(b);
            m.state = MatchState::Open;
            matches.push(m);
        }
        // keep position 0 fixed, rotate the rest clockwise
        let last = circle.pop().expect("circle is never empty");
        circle.insert(1, last);
    }

    finalize(&mut matches, 0);
    let stats = BracketStats {
        total_matches: matches.len() as u32,
        bye_matches: 0,
        round_count: rounds as u32,
        format_rounds: 0,
    };
    Ok(BracketPlan { matches, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TournamentOptions;
    use std::collections::HashSet;

    fn roster(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    fn all_pairs(plan: &BracketPlan) -> HashSet<(Uuid, Uuid)> {
        plan.matches
            .iter()
            .map(|m| {
                let a = m.player1_id.unwrap();
                let b = m.player2_id.unwrap();
                if a < b { (a, b) } else { (b, a) }
            })
            .collect()
    }

    #[test]
    fn even_roster_plays_n_minus_one_rounds() {
        let plan = generate(&roster(4), &TournamentOptions::default()).unwrap();
        assert_eq!(plan.stats.round_count, 3);
        assert_eq!(plan.stats.total_matches, 6); // C(4,2)
        assert_eq!(all_pairs(&plan).len(), 6, "every pairing exactly once");
    }

    #[test]
    fn odd_roster_plays_n_rounds_with_one_sitting_out() {
        let plan = generate(&roster(5), &TournamentOptions::default()).unwrap();
        assert_eq!(plan.stats.round_count, 5);
        assert_eq!(plan.stats.total_matches, 10); // C(5,2)
        for r in 1..=5 {
            let in_round = plan.matches.iter().filter(|m| m.round == r).count();
            assert_eq!(in_round, 2, "two matches per round, one player rests");
        }
    }

    #[test]
    fn sequential_pairings_open_with_adjacent_seeds() {
        let r = roster(4);
        let opts = TournamentOptions {
            sequential_pairings: true,
            ..TournamentOptions::default()
        };
        let plan = generate(&r, &opts).unwrap();
        let round1: Vec<_> = plan.matches.iter().filter(|m| m.round == 1).collect();
        let first: HashSet<_> = round1
            .iter()
            .flat_map(|m| [m.player1_id.unwrap(), m.player2_id.unwrap()])
            .collect();
        assert_eq!(first.len(), 4);
        // (1v2) and (3v4)
        assert!(
            round1
                .iter()
                .any(|m| m.player1_id == Some(r[0]) && m.player2_id == Some(r[1])
                    || m.player1_id == Some(r[1]) && m.player2_id == Some(r[0]))
        );
        assert!(
            round1
                .iter()
                .any(|m| m.player1_id == Some(r[2]) && m.player2_id == Some(r[3])
                    || m.player1_id == Some(r[3]) && m.player2_id == Some(r[2]))
        );
    }

    #[test]
    fn all_matches_are_open_from_generation() {
        let plan = generate(&roster(6), &TournamentOptions::default()).unwrap();
        assert!(plan.matches.iter().all(|m| m.state == MatchState::Open));
        assert!(plan.matches.iter().all(|m| !m.is_bye));
    }
}
