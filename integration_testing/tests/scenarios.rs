//! End-to-end scenarios over the real core + SQLite store + registry,
//! with literal inputs and expected terminal standings.

use anyhow::Result;
use app_core::{
    CoreError, GrandFinalsModifier, MatchState, TournamentOptions, TournamentState,
    TournamentType, UndoOutcome, find_next_match,
};
use integration_testing::support::*;
use std::collections::HashMap;
use uuid::Uuid;

fn rank_of(ranks: &HashMap<String, Option<u32>>, name: &str) -> u32 {
    ranks
        .get(name)
        .copied()
        .flatten()
        .unwrap_or_else(|| panic!("{name} has no final rank"))
}

async fn final_ranks_by_name(
    app: &TestApp,
    tenant: &app_core::EffectiveTenant,
    tournament: &app_core::Tournament,
) -> Result<HashMap<String, Option<u32>>> {
    Ok(roster(app, tenant, tournament)
        .await?
        .into_iter()
        .map(|p| (p.name, p.final_rank))
        .collect())
}

/// Scenario A: single elim, 4 seeds, third place match held.
#[tokio::test(flavor = "multi_thread")]
async fn given_four_seeds_single_elim_when_played_out_then_ranks_follow_bracket() -> Result<()> {
    let app = test_app().await?;
    let t1 = tenant(1);
    let (tournament, ids) = seeded_tournament(
        &app,
        &t1,
        TournamentType::SingleElim,
        TournamentOptions {
            hold_third_place_match: true,
            ..TournamentOptions::default()
        },
        &["Alice", "Bob", "Cara", "Dan"],
    )
    .await?;
    let reference = tournament.id.to_string();

    // Act: start generates M1 (1v4), M2 (2v3), final, third place
    let outcome = app.core.start_tournament(&t1, &reference).await?;
    assert_eq!(outcome.stats.total_matches, 4);
    let m1 = by_identifier(&outcome.matches, "A");
    assert_eq!(m1.player1_id, Some(ids["Alice"]));
    assert_eq!(m1.player2_id, Some(ids["Dan"]));

    app.core
        .set_winner(&t1, &reference, m1.id, ids["Alice"], (2, 0))
        .await?;
    let m2 = by_identifier(&outcome.matches, "B");
    app.core
        .set_winner(&t1, &reference, m2.id, ids["Bob"], (2, 1))
        .await?;
    let final_match = by_identifier(&outcome.matches, "C");
    app.core
        .set_winner(&t1, &reference, final_match.id, ids["Alice"], (2, 0))
        .await?;
    let third = by_identifier(&outcome.matches, "D");
    app.core
        .set_winner(&t1, &reference, third.id, ids["Cara"], (2, 0))
        .await?;

    let completed = app.core.complete_tournament(&t1, &reference).await?;
    assert_eq!(completed.state, TournamentState::Complete);

    // Assert
    let ranks = final_ranks_by_name(&app, &t1, &tournament).await?;
    assert_eq!(rank_of(&ranks, "Alice"), 1);
    assert_eq!(rank_of(&ranks, "Bob"), 2);
    assert_eq!(rank_of(&ranks, "Cara"), 3);
    assert_eq!(rank_of(&ranks, "Dan"), 4);
    Ok(())
}

/// Scenario B: single elim, 3 seeds, traditional byes.
#[tokio::test(flavor = "multi_thread")]
async fn given_three_seeds_when_played_out_then_bye_holder_can_win() -> Result<()> {
    let app = test_app().await?;
    let t1 = tenant(1);
    let (tournament, ids) = seeded_tournament(
        &app,
        &t1,
        TournamentType::SingleElim,
        TournamentOptions::default(),
        &["Alice", "Bob", "Cara"],
    )
    .await?;
    let reference = tournament.id.to_string();

    let outcome = app.core.start_tournament(&t1, &reference).await?;
    assert_eq!(outcome.stats.bye_matches, 1);

    // the bye auto-completed at generation: Alice advanced into the final
    let bye = outcome
        .matches
        .iter()
        .find(|m| m.is_bye)
        .expect("bye persisted");
    assert_eq!(bye.state, MatchState::Complete);
    assert_eq!(bye.winner_id, Some(ids["Alice"]));

    let semi = outcome
        .matches
        .iter()
        .find(|m| m.round == 1 && !m.is_bye)
        .expect("real round 1 match");
    app.core
        .set_winner(&t1, &reference, semi.id, ids["Bob"], (2, 0))
        .await?;

    let final_match = outcome
        .matches
        .iter()
        .find(|m| m.round == 2)
        .expect("final");
    app.core
        .set_winner(&t1, &reference, final_match.id, ids["Alice"], (2, 1))
        .await?;

    app.core.complete_tournament(&t1, &reference).await?;
    let ranks = final_ranks_by_name(&app, &t1, &tournament).await?;
    assert_eq!(rank_of(&ranks, "Alice"), 1);
    assert_eq!(rank_of(&ranks, "Bob"), 2);
    assert_eq!(rank_of(&ranks, "Cara"), 3);
    Ok(())
}

/// Scenario C: double elim, 4 seeds, grand final bracket reset played out.
#[tokio::test(flavor = "multi_thread")]
async fn given_bracket_reset_when_losers_champion_sweeps_then_they_take_first() -> Result<()> {
    let app = test_app().await?;
    let t1 = tenant(1);
    let (tournament, ids) = seeded_tournament(
        &app,
        &t1,
        TournamentType::DoubleElim,
        TournamentOptions {
            grand_finals_modifier: GrandFinalsModifier::BracketReset,
            ..TournamentOptions::default()
        },
        &["A", "B", "C", "D"],
    )
    .await?;
    let reference = tournament.id.to_string();
    let outcome = app.core.start_tournament(&t1, &reference).await?;
    let find = |round: i32| -> Uuid {
        outcome
            .matches
            .iter()
            .find(|m| m.round == round)
            .expect("match for round")
            .id
    };

    // winners bracket: A beats D, B beats C, A beats B
    let wb1 = by_identifier(&outcome.matches, "A").id;
    let wb2 = by_identifier(&outcome.matches, "B").id;
    app.core.set_winner(&t1, &reference, wb1, ids["A"], (2, 0)).await?;
    app.core.set_winner(&t1, &reference, wb2, ids["B"], (2, 0)).await?;
    app.core.set_winner(&t1, &reference, find(2), ids["A"], (2, 1)).await?;
    // losers bracket: C beats D, then B beats C
    app.core.set_winner(&t1, &reference, find(-1), ids["C"], (2, 0)).await?;
    app.core.set_winner(&t1, &reference, find(-2), ids["B"], (2, 0)).await?;
    // grand final: B beats A, forcing and then winning the reset
    app.core.set_winner(&t1, &reference, find(3), ids["B"], (3, 2)).await?;
    let matches = app.core.list_matches(&t1, &reference).await?;
    let reset = matches.iter().find(|m| m.round == 4).expect("reset live");
    assert_eq!(reset.state, MatchState::Open);
    app.core
        .set_winner(&t1, &reference, reset.id, ids["B"], (3, 1))
        .await?;

    app.core.complete_tournament(&t1, &reference).await?;
    let ranks = final_ranks_by_name(&app, &t1, &tournament).await?;
    assert_eq!(rank_of(&ranks, "B"), 1);
    assert_eq!(rank_of(&ranks, "A"), 2);
    assert_eq!(rank_of(&ranks, "C"), 3);
    assert_eq!(rank_of(&ranks, "D"), 4);
    Ok(())
}

/// Scenario D: round robin, 4 seeds, ranked by match wins.
#[tokio::test(flavor = "multi_thread")]
async fn given_round_robin_when_transitive_results_then_ranks_by_wins() -> Result<()> {
    let app = test_app().await?;
    let t1 = tenant(1);
    let (tournament, ids) = seeded_tournament(
        &app,
        &t1,
        TournamentType::RoundRobin,
        TournamentOptions::default(),
        &["P1", "P2", "P3", "P4"],
    )
    .await?;
    let reference = tournament.id.to_string();
    let outcome = app.core.start_tournament(&t1, &reference).await?;
    assert_eq!(outcome.stats.total_matches, 6);

    // the better-numbered player wins every pairing
    for (winner, loser) in [
        ("P1", "P2"),
        ("P1", "P3"),
        ("P1", "P4"),
        ("P2", "P3"),
        ("P2", "P4"),
        ("P3", "P4"),
    ] {
        let m = outcome
            .matches
            .iter()
            .find(|m| m.has_participant(ids[winner]) && m.has_participant(ids[loser]))
            .expect("every pairing exists once");
        app.core
            .set_winner(&t1, &reference, m.id, ids[winner], (2, 0))
            .await?;
    }

    app.core.complete_tournament(&t1, &reference).await?;
    let ranks = final_ranks_by_name(&app, &t1, &tournament).await?;
    assert_eq!(rank_of(&ranks, "P1"), 1);
    assert_eq!(rank_of(&ranks, "P2"), 2);
    assert_eq!(rank_of(&ranks, "P3"), 3);
    assert_eq!(rank_of(&ranks, "P4"), 4);
    Ok(())
}

/// Scenario E: undo after scoring the final of scenario A's bracket.
#[tokio::test(flavor = "multi_thread")]
async fn given_scored_final_when_undone_then_final_reopens_and_undo_is_spent() -> Result<()> {
    let app = test_app().await?;
    let t1 = tenant(1);
    let (tournament, ids) = seeded_tournament(
        &app,
        &t1,
        TournamentType::SingleElim,
        TournamentOptions {
            hold_third_place_match: true,
            ..TournamentOptions::default()
        },
        &["Alice", "Bob", "Cara", "Dan"],
    )
    .await?;
    let reference = tournament.id.to_string();
    let outcome = app.core.start_tournament(&t1, &reference).await?;

    let m1 = by_identifier(&outcome.matches, "A").id;
    let m2 = by_identifier(&outcome.matches, "B").id;
    let m3 = by_identifier(&outcome.matches, "C").id;
    app.core.set_winner(&t1, &reference, m1, ids["Alice"], (2, 0)).await?;
    app.core.set_winner(&t1, &reference, m2, ids["Bob"], (2, 1)).await?;
    app.core.set_winner(&t1, &reference, m3, ids["Alice"], (2, 0)).await?;

    // Act: one undo takes the final back
    let undone = app.core.undo_last(&t1, &reference).await?;
    assert_eq!(undone, UndoOutcome::Undone { match_id: m3 });

    let matches = app.core.list_matches(&t1, &reference).await?;
    let final_match = by_identifier(&matches, "C");
    assert_eq!(final_match.state, MatchState::Open);
    assert_eq!(final_match.winner_id, None);

    // the third place match keeps its inputs from the completed semis
    let third = by_identifier(&matches, "D");
    assert_eq!(third.player1_id, Some(ids["Cara"]));
    assert_eq!(third.player2_id, Some(ids["Dan"]));
    assert_eq!(third.state, MatchState::Open);

    // the final is next to call again
    let next = find_next_match(&matches).expect("something to play");
    assert_eq!(next.id, m3);

    // a second undo without intervening writes is a no-op
    let again = app.core.undo_last(&t1, &reference).await?;
    assert_eq!(again, UndoOutcome::NothingToUndo);
    Ok(())
}

/// Scenario F: tenant isolation.
#[tokio::test(flavor = "multi_thread")]
async fn given_foreign_tournament_when_read_or_written_then_hidden_or_forbidden() -> Result<()> {
    let app = test_app().await?;
    let t1 = tenant(1);
    let t2 = tenant(2);
    let (tournament, _) = seeded_tournament(
        &app,
        &t1,
        TournamentType::SingleElim,
        TournamentOptions::default(),
        &["Alice", "Bob"],
    )
    .await?;

    // reads: absent from the other tenant's views
    let err = app
        .core
        .find_tournament(&t2, &tournament.slug)
        .await
        .expect_err("slug hidden across tenants");
    assert!(matches!(err, CoreError::NotFound(_)));
    let buckets = app.core.list_tournaments(&t2).await?;
    assert!(buckets.pending.is_empty());
    assert!(buckets.underway.is_empty());
    assert!(buckets.complete.is_empty());

    // writes by id: rejected, not hidden
    let err = app
        .core
        .delete_tournament(&t2, &tournament.id.to_string())
        .await
        .expect_err("cross-tenant write");
    assert!(matches!(err, CoreError::Forbidden(_)));

    // events never crossed the tenant boundary
    assert!(app.events.foreign_events(1).is_empty());
    Ok(())
}
