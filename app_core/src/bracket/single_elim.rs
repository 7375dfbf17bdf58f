//! Single elimination: standard seed pairing so the top seed can only meet
//! the bottom surviving seed in the final.

use super::{BracketPlan, BracketStats, MatchDescriptor, Prereq, finalize, resolve_byes};
use crate::{ByeStrategy, CoreResult, TournamentOptions};
use uuid::Uuid;

/// Seeds (1-based) in round-1 slot order for a power-of-two bracket, built by
/// the pairing recursion `pairs(d) = interleave(pairs(d-1), 2^d + 1 - pairs(d-1))`
/// starting from `[1, 2]`. Adjacent slots play each other.
pub(crate) fn seed_order(bracket_size: usize) -> Vec<usize> {
    let mut order = vec![1usize, 2];
    let mut size = 2;
    while size < bracket_size {
        size *= 2;
        let mut next = Vec::with_capacity(size);
        for &s in &order {
            next.push(s);
            next.push(size + 1 - s);
        }
        order = next;
    }
    order
}

pub(crate) fn bracket_size(n: usize) -> usize {
    let mut size = 1;
    while size < n {
        size *= 2;
    }
    size
}

pub(crate) fn round_count(bracket_size: usize) -> u32 {
    let mut rounds = 0;
    let mut size = bracket_size;
    while size > 1 {
        size /= 2;
        rounds += 1;
    }
    rounds
}

/// Full winners bracket with traditional round-1 byes, before bye
/// resolution. Returns the descriptors and the per-round descriptor indices.
pub(crate) fn build_traditional(roster: &[Uuid]) -> (Vec<MatchDescriptor>, Vec<Vec<usize>>) {
    let n = roster.len();
    let size = bracket_size(n);
    if size == 1 {
        // lone participant: a single auto-won bye
        let mut m = MatchDescriptor::new(1, 0, false);
        m.player1_id = roster.first().copied();
        (vec![m], vec![vec![0]])
    } else {
        let order = seed_order(size);
        let mut matches = Vec::new();
        let mut rounds: Vec<Vec<usize>> = Vec::new();

        // round 1 from seeded slots
        let mut first = Vec::new();
        for j in 0..size / 2 {
            let mut m = MatchDescriptor::new(1, j as u32, false);
            m.player1_id = roster.get(order[2 * j] - 1).copied();
            m.player2_id = roster.get(order[2 * j + 1] - 1).copied();
            first.push(matches.len());
            matches.push(m);
        }
        rounds.push(first);

        // later rounds fed by winner pairs
        let mut round = 2;
        let mut width = size / 4;
        while width >= 1 {
            let prev = rounds.last().expect("previous round exists").clone();
            let mut current = Vec::new();
            for j in 0..width {
                let mut m = MatchDescriptor::new(round, j as u32, false);
                m.player1_prereq = Some(Prereq::winner_of(prev[2 * j]));
                m.player2_prereq = Some(Prereq::winner_of(prev[2 * j + 1]));
                current.push(matches.len());
                matches.push(m);
            }
            rounds.push(current);
            round += 1;
            if width == 1 {
                break;
            }
            width /= 2;
        }
        (matches, rounds)
    }
}

/// Balanced variant: the top `size - n` seeds skip round 1 entirely; the
/// remaining seeds meet in a play-in round, whose winners fill the bottom of
/// a clean half-size bracket.
fn build_balanced(roster: &[Uuid]) -> (Vec<MatchDescriptor>, Vec<Vec<usize>>) {
    let n = roster.len();
    let size = bracket_size(n);
    if n == size || size < 4 {
        return build_traditional(roster);
    }
    let byes = size - n; // seeds 1..=byes skip round 1
    let playins = n - size / 2;

    let mut matches = Vec::new();
    let mut rounds: Vec<Vec<usize>> = Vec::new();

    // play-in round: best remaining vs worst remaining
    let mut first = Vec::new();
    for j in 0..playins {
        let mut m = MatchDescriptor::new(1, j as u32, false);
        m.player1_id = roster.get(byes + j).copied();
        m.player2_id = roster.get(n - 1 - j).copied();
        first.push(matches.len());
        matches.push(m);
    }
    rounds.push(first.clone());

    // half-size bracket; virtual seed v is either a direct entrant or the
    // winner of a play-in match
    let half = size / 2;
    let order = seed_order(half);
    enum Entry {
        Direct(Uuid),
        Winner(usize),
    }
    let entry = |v: usize| -> Entry {
        if v <= byes {
            Entry::Direct(roster[v - 1])
        } else {
            Entry::Winner(first[v - byes - 1])
        }
    };

    let mut second = Vec::new();
    for j in 0..half / 2 {
        let mut m = MatchDescriptor::new(2, j as u32, false);
        match entry(order[2 * j]) {
            Entry::Direct(id) => m.player1_id = Some(id),
            Entry::Winner(i) => m.player1_prereq = Some(Prereq::winner_of(i)),
        }
        match entry(order[2 * j + 1]) {
            Entry::Direct(id) => m.player2_id = Some(id),
            Entry::Winner(i) => m.player2_prereq = Some(Prereq::winner_of(i)),
        }
        second.push(matches.len());
        matches.push(m);
    }
    rounds.push(second);

    // remaining rounds as usual
    let mut round = 3;
    let mut width = half / 4;
    while width >= 1 {
        let prev = rounds.last().expect("previous round exists").clone();
        let mut current = Vec::new();
        for j in 0..width {
            let mut m = MatchDescriptor::new(round, j as u32, false);
            m.player1_prereq = Some(Prereq::winner_of(prev[2 * j]));
            m.player2_prereq = Some(Prereq::winner_of(prev[2 * j + 1]));
            current.push(matches.len());
            matches.push(m);
        }
        rounds.push(current);
        round += 1;
        if width == 1 {
            break;
        }
        width /= 2;
    }
    (matches, rounds)
}

/// Compact variant: bye matches are not persisted; the bye-receiving seed
/// advances straight into round 2 with its prerequisite already satisfied.
fn compact(matches: Vec<MatchDescriptor>) -> Vec<MatchDescriptor> {
    // players advanced out of byes are already in place after resolve_byes;
    // drop the bye rows and remap the surviving prerequisite indices
    let mut keep = Vec::new();
    let mut remap = vec![usize::MAX; matches.len()];
    for (i, m) in matches.iter().enumerate() {
        if m.is_bye && m.round == 1 {
            continue;
        }
        remap[i] = keep.len();
        keep.push(m.clone());
    }
    for m in &mut keep {
        for prereq in [&mut m.player1_prereq, &mut m.player2_prereq] {
            if let Some(p) = prereq {
                if remap[p.match_index] == usize::MAX {
                    *prereq = None;
                } else {
                    p.match_index = remap[p.match_index];
                }
            }
        }
    }
    keep
}

pub fn generate(roster: &[Uuid], options: &TournamentOptions) -> CoreResult<BracketPlan> {
    let n = roster.len();
    let size = bracket_size(n);

    let (mut matches, rounds) = match options.bye_strategy {
        ByeStrategy::Balanced => build_balanced(roster),
        _ => build_traditional(roster),
    };

    // optional third place match fed by the semifinal losers
    if options.hold_third_place_match && rounds.len() >= 2 {
        let semis = &rounds[rounds.len() - 2];
        if semis.len() == 2 {
            let final_round = matches.last().map(|m| m.round).unwrap_or(1);
            let mut m = MatchDescriptor::new(final_round, 1, false);
            m.player1_prereq = Some(Prereq::loser_of(semis[0]));
            m.player2_prereq = Some(Prereq::loser_of(semis[1]));
            matches.push(m);
        }
    }

    resolve_byes(&mut matches);
    if options.bye_strategy == ByeStrategy::CompactBracket {
        matches = compact(matches);
    }
    finalize(&mut matches, 0);

    let bye_matches = matches.iter().filter(|m| m.is_bye).count() as u32;
    let stats = BracketStats {
        total_matches: matches.len() as u32,
        bye_matches,
        round_count: round_count(size),
        format_rounds: 0,
    };
    Ok(BracketPlan { matches, stats })
}
