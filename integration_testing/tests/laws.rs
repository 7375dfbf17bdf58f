//! Round-trip and idempotence laws plus the cross-cutting invariants that
//! must hold after every committed mutation.

use anyhow::Result;
use app_core::{
    CrEvent, MatchState, TournamentOptions, TournamentState, TournamentType,
};
use integration_testing::support::*;

#[tokio::test(flavor = "multi_thread")]
async fn given_started_tournament_when_reset_then_matches_gone_and_roster_intact() -> Result<()> {
    let app = test_app().await?;
    let t1 = tenant(1);
    let (tournament, _) = seeded_tournament(
        &app,
        &t1,
        TournamentType::SingleElim,
        TournamentOptions::default(),
        &["Alice", "Bob", "Cara", "Dan", "Eve"],
    )
    .await?;
    let reference = tournament.id.to_string();

    app.core.start_tournament(&t1, &reference).await?;
    assert!(!app.core.list_matches(&t1, &reference).await?.is_empty());

    // Act: byes completed at generation do not block a reset
    let after = app.core.reset_tournament(&t1, &reference).await?;

    // Assert
    assert_eq!(after.state, TournamentState::Pending);
    assert_eq!(after.started_at, None);
    assert_eq!(app.core.list_matches(&t1, &reference).await?.len(), 0);
    let roster = roster(&app, &t1, &tournament).await?;
    assert_eq!(roster.len(), 5, "participant count survives the reset");
    assert!(roster.iter().all(|p| p.final_rank.is_none()));

    // seeds are still the 1..N permutation
    let mut seeds: Vec<u32> = roster.iter().map(|p| p.seed).collect();
    seeds.sort_unstable();
    assert_eq!(seeds, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn given_completed_match_when_undo_then_prior_snapshot_restored() -> Result<()> {
    let app = test_app().await?;
    let t1 = tenant(1);
    let (tournament, ids) = seeded_tournament(
        &app,
        &t1,
        TournamentType::SingleElim,
        TournamentOptions::default(),
        &["Alice", "Bob", "Cara", "Dan"],
    )
    .await?;
    let reference = tournament.id.to_string();
    let outcome = app.core.start_tournament(&t1, &reference).await?;
    let m1 = by_identifier(&outcome.matches, "A").id;

    app.core
        .set_winner(&t1, &reference, m1, ids["Alice"], (2, 0))
        .await?;
    // the winner already advanced into the final
    let matches = app.core.list_matches(&t1, &reference).await?;
    assert_eq!(
        by_identifier(&matches, "C").player1_id,
        Some(ids["Alice"])
    );

    app.core.undo_last(&t1, &reference).await?;

    let matches = app.core.list_matches(&t1, &reference).await?;
    let m = by_identifier(&matches, "A");
    assert_eq!(m.state, MatchState::Open);
    assert_eq!(m.winner_id, None);
    assert_eq!(m.loser_id, None);
    assert_eq!((m.player1_score, m.player2_score), (0, 0));
    assert_eq!(m.score_text, None);
    // the advanced slot rolled back too
    assert_eq!(by_identifier(&matches, "C").player1_id, None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn given_same_result_when_reopen_and_rescore_then_terminal_state_identical() -> Result<()> {
    let app = test_app().await?;
    let t1 = tenant(1);
    let (tournament, ids) = seeded_tournament(
        &app,
        &t1,
        TournamentType::SingleElim,
        TournamentOptions::default(),
        &["Alice", "Bob", "Cara", "Dan"],
    )
    .await?;
    let reference = tournament.id.to_string();
    let outcome = app.core.start_tournament(&t1, &reference).await?;
    let m1 = by_identifier(&outcome.matches, "A").id;

    app.core
        .set_winner(&t1, &reference, m1, ids["Alice"], (2, 0))
        .await?;
    let first = app.core.list_matches(&t1, &reference).await?;

    app.core.reopen_match(&t1, &reference, m1).await?;
    app.core
        .set_winner(&t1, &reference, m1, ids["Alice"], (2, 0))
        .await?;
    let second = app.core.list_matches(&t1, &reference).await?;

    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.state, b.state);
        assert_eq!(a.winner_id, b.winner_id);
        assert_eq!(a.loser_id, b.loser_id);
        assert_eq!(a.player1_id, b.player1_id);
        assert_eq!(a.player2_id, b.player2_id);
        assert_eq!(
            (a.player1_score, a.player2_score),
            (b.player1_score, b.player2_score)
        );
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn given_swiss_when_rounds_progress_then_one_bye_per_round_never_repeated() -> Result<()> {
    let app = test_app().await?;
    let t1 = tenant(1);
    let (tournament, _) = seeded_tournament(
        &app,
        &t1,
        TournamentType::Swiss,
        TournamentOptions {
            swiss_rounds: 3,
            ..TournamentOptions::default()
        },
        &["P1", "P2", "P3", "P4", "P5"],
    )
    .await?;
    let reference = tournament.id.to_string();
    let outcome = app.core.start_tournament(&t1, &reference).await?;
    assert_eq!(outcome.stats.bye_matches, 1, "odd roster: one bye");

    let mut bye_holders = Vec::new();
    for round in 1..=3 {
        let matches = app.core.list_matches(&t1, &reference).await?;
        for m in matches.iter().filter(|m| m.round == round) {
            if m.is_bye {
                bye_holders.push(m.player1_id.expect("bye has its player"));
                continue;
            }
            let winner = m.player1_id.expect("seated");
            app.core
                .set_winner(&t1, &reference, m.id, winner, (1, 0))
                .await?;
        }
        if round < 3 {
            let new_round = app.core.swiss_next_round(&t1, &reference).await?;
            assert_eq!(
                new_round.iter().filter(|m| m.is_bye).count(),
                1,
                "exactly one bye each round"
            );
        }
    }

    bye_holders.sort_unstable();
    bye_holders.dedup();
    assert_eq!(bye_holders.len(), 3, "no participant received two byes");

    app.core.complete_tournament(&t1, &reference).await?;
    let ranked = roster(&app, &t1, &tournament).await?;
    assert!(ranked.iter().all(|p| p.final_rank.is_some()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn given_stations_when_auto_assigned_then_one_underway_match_each() -> Result<()> {
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
    app.core.start_tournament(&t1, &reference).await?;
    app.core.create_station(&t1, &reference, "TV 1".into()).await?;
    app.core.create_station(&t1, &reference, "TV 2".into()).await?;

    let assigned = app.core.auto_assign_stations(&t1, &reference).await?;
    assert_eq!(assigned.len(), 2, "two free stations, plenty of matches");
    assert!(assigned.iter().all(|m| m.state == MatchState::Underway));

    let stations = app.core.list_stations(&t1, &reference).await?;
    for s in &stations {
        let hosted = s.current_match_id.expect("every station busy");
        let m = app.core.get_match(&t1, &reference, hosted).await?;
        assert_eq!(m.station_id, Some(s.id));
        assert_eq!(m.state, MatchState::Underway);
    }

    // completing a hosted match frees its station
    let played = &assigned[0];
    let winner = played.player1_id.unwrap_or_else(|| ids["P1"]);
    app.core
        .set_winner(&t1, &reference, played.id, winner, (2, 0))
        .await?;
    let stations = app.core.list_stations(&t1, &reference).await?;
    let freed = stations
        .iter()
        .filter(|s| s.current_match_id.is_none())
        .count();
    assert_eq!(freed, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn given_any_match_event_when_published_then_snapshot_accompanies_it() -> Result<()> {
    let app = test_app().await?;
    let t1 = tenant(1);
    let (tournament, ids) = seeded_tournament(
        &app,
        &t1,
        TournamentType::SingleElim,
        TournamentOptions::default(),
        &["Alice", "Bob"],
    )
    .await?;
    let reference = tournament.id.to_string();
    let outcome = app.core.start_tournament(&t1, &reference).await?;
    app.events.clear();

    let m = by_identifier(&outcome.matches, "A").id;
    app.core
        .set_winner(&t1, &reference, m, ids["Alice"], (2, 0))
        .await?;

    let events = app.events.events();
    let completed = events
        .iter()
        .position(|e| matches!(e, CrEvent::MatchCompleted { .. }))
        .expect("match:completed published");
    let snapshot = events
        .iter()
        .position(|e| matches!(e, CrEvent::MatchesUpdate { .. }))
        .expect("matches:update published");
    assert!(
        snapshot > completed,
        "snapshot follows the match event for one-message resync"
    );
    if let CrEvent::MatchesUpdate { matches, .. } = &events[snapshot] {
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].winner_id, Some(ids["Alice"]));
    }
    Ok(())
}
