//! Double elimination: a winners bracket plus a losers bracket of drop
//! rounds, rounds numbered negatively for ordering and display. Drop rounds
//! interleave the incoming losers so that two players who met in the winners
//! bracket cannot meet again before the grand final.

use super::{
    BracketPlan, BracketStats, MatchDescriptor, Prereq, finalize, resolve_byes,
    single_elim::{bracket_size, build_traditional, round_count},
};
use crate::{CoreError, CoreResult, GrandFinalsModifier, TournamentOptions};
use uuid::Uuid;

/// Slot of a dropping loser within its drop round. Alternating the pattern
/// per round keeps winners-bracket rematches out of the losers bracket.
fn drop_slot(wb_round: usize, count: usize, position: usize) -> usize {
    if count <= 1 {
        0
    } else if wb_round % 2 == 0 {
        count - 1 - position
    } else {
        (position + count / 2) % count
    }
}

/// Copy one winners round into the emission sequence, rewriting its
/// prerequisite indices to the already-emitted positions.
fn emit_wb_round(
    matches: &mut Vec<MatchDescriptor>,
    wb: &[MatchDescriptor],
    wb_remap: &mut [usize],
    round_indices: &[usize],
) -> Vec<usize> {
    let mut out = Vec::new();
    for &i in round_indices {
        let mut m = wb[i].clone();
        for prereq in [&mut m.player1_prereq, &mut m.player2_prereq] {
            if let Some(p) = prereq {
                p.match_index = wb_remap[p.match_index];
            }
        }
        wb_remap[i] = matches.len();
        out.push(matches.len());
        matches.push(m);
    }
    out
}

pub fn generate(roster: &[Uuid], options: &TournamentOptions) -> CoreResult<BracketPlan> {
    let n = roster.len();
    if n < 3 {
        return Err(CoreError::Validation(
            "double elimination requires at least 3 participants".into(),
        ));
    }

    // winners bracket skeleton; double elim always places byes traditionally
    let (wb, wb_rounds) = build_traditional(roster);
    let k = wb_rounds.len();
    let mut matches: Vec<MatchDescriptor> = Vec::new();
    let mut wb_remap = vec![usize::MAX; wb.len()];

    // play order interleaves the brackets: each winners round is followed by
    // the losers rounds it feeds
    let wb1 = emit_wb_round(&mut matches, &wb, &mut wb_remap, &wb_rounds[0]);

    let mut lb_round = -1i32;
    // losers round 1: losers of winners round 1 pair up
    let mut prev_lb: Vec<usize> = Vec::new();
    if wb1.len() >= 2 {
        for j in 0..wb1.len() / 2 {
            let mut m = MatchDescriptor::new(lb_round, j as u32, true);
            m.player1_prereq = Some(Prereq::loser_of(wb1[2 * j]));
            m.player2_prereq = Some(Prereq::loser_of(wb1[2 * j + 1]));
            prev_lb.push(matches.len());
            matches.push(m);
        }
    }

    // per winners round: the drop round pitting losers-bracket survivors
    // against the fresh drops, then a consolidation round halving the field
    let mut wb_final = *wb1.first().expect("winners bracket is non-empty");
    for w in 2..=k {
        let wbw = emit_wb_round(&mut matches, &wb, &mut wb_remap, &wb_rounds[w - 1]);
        wb_final = *wbw.first().expect("winners round is non-empty");

        lb_round -= 1;
        let count = wbw.len();
        let mut drops = vec![None; count];
        for (pos, &wb_index) in wbw.iter().enumerate() {
            drops[drop_slot(w, count, pos)] = Some(wb_index);
        }

        let mut current = Vec::new();
        for j in 0..count {
            let mut m = MatchDescriptor::new(lb_round, j as u32, true);
            m.player1_prereq = Some(Prereq::winner_of(prev_lb[j]));
            m.player2_prereq = Some(Prereq::loser_of(
                drops[j].expect("every drop slot is filled"),
            ));
            current.push(matches.len());
            matches.push(m);
        }
        prev_lb = current;

        if w < k {
            lb_round -= 1;
            let mut consolidated = Vec::new();
            for j in 0..prev_lb.len() / 2 {
                let mut m = MatchDescriptor::new(lb_round, j as u32, true);
                m.player1_prereq = Some(Prereq::winner_of(prev_lb[2 * j]));
                m.player2_prereq = Some(Prereq::winner_of(prev_lb[2 * j + 1]));
                consolidated.push(matches.len());
                matches.push(m);
            }
            prev_lb = consolidated;
        }
    }
    let lb_rounds = (-lb_round) as u32;

    // grand final: winners champion vs losers champion
    let lb_final = *prev_lb.first().expect("losers final exists");
    let gf_round = k as i32 + 1;
    let mut gf = MatchDescriptor::new(gf_round, 0, false);
    gf.player1_prereq = Some(Prereq::winner_of(wb_final));
    gf.player2_prereq = Some(Prereq::winner_of(lb_final));
    let gf_index = matches.len();
    matches.push(gf);

    // with bracket_reset both grand final matches are persisted up front;
    // the reset is auto-voided when the winners champion takes the first
    if options.grand_finals_modifier == GrandFinalsModifier::BracketReset {
        let mut reset = MatchDescriptor::new(gf_round + 1, 0, false);
        reset.player1_prereq = Some(Prereq::winner_of(gf_index));
        reset.player2_prereq = Some(Prereq::loser_of(gf_index));
        matches.push(reset);
    }

    resolve_byes(&mut matches);
    finalize(&mut matches, 0);

    let bye_matches = matches.iter().filter(|m| m.is_bye).count() as u32;
    let stats = BracketStats {
        total_matches: matches.len() as u32,
        bye_matches,
        round_count: round_count(bracket_size(n)),
        format_rounds: lb_rounds,
    };
    Ok(BracketPlan { matches, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GrandFinalsModifier, TournamentOptions};

    fn roster(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    fn options(gf: GrandFinalsModifier) -> TournamentOptions {
        TournamentOptions {
            grand_finals_modifier: gf,
            ..TournamentOptions::default()
        }
    }

    #[test]
    fn four_players_have_two_losers_rounds_and_a_grand_final() {
        let plan = generate(&roster(4), &options(GrandFinalsModifier::None)).unwrap();
        // WB1 x2, LB1, WB final, LB final, GF
        assert_eq!(plan.matches.len(), 6);
        assert_eq!(plan.stats.format_rounds, 2);
        let lb: Vec<_> = plan.matches.iter().filter(|m| m.losers_bracket).collect();
        assert_eq!(lb.len(), 2);
        assert_eq!(lb[0].round, -1);
        assert_eq!(lb[1].round, -2);
    }

    #[test]
    fn three_players_losers_bracket_has_two_rounds() {
        let plan = generate(&roster(3), &options(GrandFinalsModifier::BracketReset)).unwrap();
        assert_eq!(plan.stats.format_rounds, 2);
        // reset match persisted at generation time
        let max_round = plan.matches.iter().map(|m| m.round).max().unwrap();
        let reset: Vec<_> = plan
            .matches
            .iter()
            .filter(|m| m.round == max_round)
            .collect();
        assert_eq!(reset.len(), 1);
        let gf_round: Vec<_> = plan
            .matches
            .iter()
            .filter(|m| m.round == max_round - 1)
            .collect();
        assert_eq!(gf_round.len(), 1);
    }

    #[test]
    fn play_order_interleaves_winners_and_losers_rounds() {
        let plan = generate(&roster(8), &options(GrandFinalsModifier::None)).unwrap();
        let round_sequence: Vec<i32> = plan.matches.iter().map(|m| m.round).collect();
        // WB1 x4, LB1 x2, WB2 x2, LB-2 x2, LB-3, WB3, LB-4, GF
        assert_eq!(
            round_sequence,
            vec![1, 1, 1, 1, -1, -1, 2, 2, -2, -2, -3, 3, -4, 4]
        );
        let orders: Vec<u32> = plan.matches.iter().map(|m| m.suggested_play_order).collect();
        assert_eq!(orders, (1..=14).collect::<Vec<u32>>());
    }

    #[test]
    fn losers_round_one_pairs_winners_round_one_losers() {
        let plan = generate(&roster(4), &options(GrandFinalsModifier::None)).unwrap();
        let lb1 = plan
            .matches
            .iter()
            .find(|m| m.round == -1)
            .expect("losers round 1");
        assert_eq!(lb1.player1_prereq, Some(Prereq::loser_of(0)));
        assert_eq!(lb1.player2_prereq, Some(Prereq::loser_of(1)));
    }

    #[test]
    fn losers_final_takes_winners_final_loser() {
        let plan = generate(&roster(4), &options(GrandFinalsModifier::None)).unwrap();
        let lb_final = plan
            .matches
            .iter()
            .find(|m| m.round == -2)
            .expect("losers final");
        let wb_final_index = plan
            .matches
            .iter()
            .position(|m| m.round == 2 && !m.losers_bracket)
            .expect("winners final");
        assert_eq!(
            lb_final.player2_prereq,
            Some(Prereq::loser_of(wb_final_index))
        );
    }

    #[test]
    fn reset_match_references_winner_and_loser_of_grand_final() {
        let plan = generate(&roster(4), &options(GrandFinalsModifier::BracketReset)).unwrap();
        let gf_index = plan
            .matches
            .iter()
            .position(|m| m.round == 3)
            .expect("grand final");
        let reset = plan
            .matches
            .iter()
            .find(|m| m.round == 4)
            .expect("reset match");
        assert_eq!(reset.player1_prereq, Some(Prereq::winner_of(gf_index)));
        assert_eq!(reset.player2_prereq, Some(Prereq::loser_of(gf_index)));
    }

    #[test]
    fn eight_players_no_winners_rematch_before_grand_final() {
        // the drop into a losers round must not share round-1 feeders with
        // the losers match whose winner it meets
        let plan = generate(&roster(8), &options(GrandFinalsModifier::None)).unwrap();
        let lb2: Vec<_> = plan.matches.iter().filter(|m| m.round == -2).collect();
        assert_eq!(lb2.len(), 2);
        for m in &lb2 {
            let from_lb = m.player1_prereq.expect("lb survivor");
            let from_wb = m.player2_prereq.expect("wb drop");
            assert!(!from_lb.takes_loser);
            assert!(from_wb.takes_loser);
            let drop_src = &plan.matches[from_wb.match_index];
            let lb_src = &plan.matches[from_lb.match_index];
            let drop_feeders: Vec<usize> = [drop_src.player1_prereq, drop_src.player2_prereq]
                .iter()
                .flatten()
                .map(|p| p.match_index)
                .collect();
            let lb_feeders: Vec<usize> = [lb_src.player1_prereq, lb_src.player2_prereq]
                .iter()
                .flatten()
                .map(|p| p.match_index)
                .collect();
            assert!(
                drop_feeders.iter().all(|i| !lb_feeders.contains(i)),
                "drop would allow an immediate winners-bracket rematch"
            );
        }
        assert_eq!(plan.stats.format_rounds, 4);
        assert_eq!(plan.matches.len(), 14); // 7 WB + 6 LB + GF
    }
}
