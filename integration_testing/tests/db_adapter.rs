//! Basic correctness tests for the SQLite adapter.

use anyhow::Result;
use app_core::{
    ChangeAction, DatabasePort, DbError, DbpLedger, DbpMatch, DbpParticipant, DbpTournament,
    Match, MatchChange, MatchState, TenantScope, Tournament, TournamentOptions, TournamentState,
    TournamentType, WriteBatch,
};
use chrono::Utc;
use db_sqlite::SqliteDb;
use integration_testing::support::init_test_tracing;
use uuid::Uuid;

async fn fresh_db() -> Result<SqliteDb> {
    init_test_tracing();
    let db = SqliteDb::new_in_memory()?;
    db.run_migration().await?;
    Ok(db)
}

fn make_tournament(user_id: i64, slug: &str) -> Tournament {
    Tournament {
        id: Uuid::new_v4(),
        user_id,
        name: format!("Tournament {slug}"),
        slug: slug.to_string(),
        game_name: Some("Melee".into()),
        tournament_type: TournamentType::DoubleElim,
        state: TournamentState::Pending,
        options: TournamentOptions {
            swiss_rounds: 4,
            hold_third_place_match: true,
            ..TournamentOptions::default()
        },
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
    }
}

fn make_match(t: &Tournament, identifier: &str, order: u32) -> Match {
    Match {
        id: Uuid::new_v4(),
        tournament_id: t.id,
        user_id: t.user_id,
        identifier: identifier.to_string(),
        round: 1,
        suggested_play_order: order,
        bracket_position: order - 1,
        losers_bracket: false,
        player1_id: None,
        player2_id: None,
        player1_prereq_match_id: None,
        player2_prereq_match_id: None,
        player1_is_prereq_loser: false,
        player2_is_prereq_loser: false,
        winner_id: None,
        loser_id: None,
        player1_score: 0,
        player2_score: 0,
        score_text: None,
        forfeited: false,
        forfeited_participant_id: None,
        station_id: None,
        underway_at: None,
        completed_at: None,
        state: MatchState::Pending,
        is_bye: false,
    }
}

fn make_change(t: &Tournament, match_id: Uuid) -> MatchChange {
    MatchChange {
        id: Uuid::new_v4(),
        tournament_id: t.id,
        user_id: t.user_id,
        match_id,
        action: ChangeAction::SetWinner,
        prior_state: MatchState::Open,
        prior_winner_id: None,
        prior_loser_id: None,
        prior_player1_score: 0,
        prior_player2_score: 0,
        actor: None,
        undone: false,
        created_at: Utc::now(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn given_new_tournament_when_insert_then_get_round_trips() -> Result<()> {
    let db = fresh_db().await?;

    // Arrange
    let t = make_tournament(7, "weekly-1");

    // Act
    db.insert_tournament(&t).await?;
    let fetched = db
        .get_tournament(TenantScope::Only(7), t.id)
        .await?
        .expect("row present");

    // Assert: field-by-field sanity checks
    assert_eq!(fetched.id, t.id);
    assert_eq!(fetched.name, "Tournament weekly-1");
    assert_eq!(fetched.tournament_type, TournamentType::DoubleElim);
    assert_eq!(fetched.state, TournamentState::Pending);
    assert_eq!(fetched.options.swiss_rounds, 4);
    assert!(fetched.options.hold_third_place_match);
    assert_eq!(fetched.created_at, t.created_at);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn given_foreign_scope_when_get_then_row_is_invisible() -> Result<()> {
    let db = fresh_db().await?;
    let t = make_tournament(7, "weekly-1");
    db.insert_tournament(&t).await?;

    assert!(
        db.get_tournament(TenantScope::Only(8), t.id).await?.is_none(),
        "scoped read returns no rows"
    );
    assert!(
        db.get_tournament_by_slug(TenantScope::Only(8), "weekly-1")
            .await?
            .is_none()
    );
    assert!(
        db.get_tournament(TenantScope::All, t.id).await?.is_some(),
        "the all sentinel sees everything"
    );
    assert!(db.list_tournaments(TenantScope::Only(8)).await?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn given_same_slug_twice_when_insert_then_unique_violation() -> Result<()> {
    let db = fresh_db().await?;
    db.insert_tournament(&make_tournament(7, "weekly")).await?;

    let err = db
        .insert_tournament(&make_tournament(7, "weekly"))
        .await
        .expect_err("slug is unique per tenant");
    assert!(matches!(err, DbError::UniqueViolation(_)));

    // the same slug under another tenant is fine
    db.insert_tournament(&make_tournament(8, "weekly")).await?;
    assert!(db.slug_exists(7, "weekly").await?);
    assert!(!db.slug_exists(7, "weekly-2").await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn given_tournament_with_children_when_delete_then_cascade() -> Result<()> {
    let db = fresh_db().await?;
    let t = make_tournament(7, "weekly");
    db.insert_tournament(&t).await?;

    let batch = WriteBatch {
        insert_matches: vec![make_match(&t, "A", 1), make_match(&t, "B", 2)],
        ledger_append: Some(make_change(&t, Uuid::new_v4())),
        ..WriteBatch::default()
    };
    db.commit(&batch).await?;
    assert_eq!(db.list_matches(t.id).await?.len(), 2);

    db.delete_tournament(t.id).await?;
    assert_eq!(db.list_matches(t.id).await?.len(), 0);
    assert!(db.latest_change(t.id).await?.is_none());
    assert!(db.list_participants(t.id).await?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn given_commit_batch_when_applied_then_rows_move_together() -> Result<()> {
    let db = fresh_db().await?;
    let mut t = make_tournament(7, "weekly");
    db.insert_tournament(&t).await?;

    let mut m = make_match(&t, "A", 1);
    t.state = TournamentState::Underway;
    t.started_at = Some(Utc::now());
    let batch = WriteBatch {
        update_tournament: Some(t.clone()),
        insert_matches: vec![m.clone()],
        ..WriteBatch::default()
    };
    db.commit(&batch).await?;

    m.state = MatchState::Open;
    m.score_text = Some("2-0".into());
    let batch = WriteBatch {
        update_matches: vec![m.clone()],
        ledger_append: Some(make_change(&t, m.id)),
        ..WriteBatch::default()
    };
    db.commit(&batch).await?;

    let fetched = db.get_match(m.id).await?.expect("row present");
    assert_eq!(fetched.state, MatchState::Open);
    assert_eq!(fetched.score_text.as_deref(), Some("2-0"));
    let latest = db.latest_change(t.id).await?.expect("ledger entry");
    assert_eq!(latest.match_id, m.id);
    assert!(!latest.undone);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn given_more_than_retention_changes_when_appended_then_old_ones_pruned() -> Result<()> {
    let db = fresh_db().await?;
    let t = make_tournament(7, "weekly");
    db.insert_tournament(&t).await?;

    for _ in 0..55 {
        let batch = WriteBatch {
            ledger_append: Some(make_change(&t, Uuid::new_v4())),
            ..WriteBatch::default()
        };
        db.commit(&batch).await?;
    }

    let kept = db.list_changes(t.id, 100).await?;
    assert_eq!(kept.len(), 50, "retention window holds");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn given_unknown_id_when_update_then_not_found() -> Result<()> {
    let db = fresh_db().await?;
    let t = make_tournament(7, "weekly");
    let err = db.update_tournament(&t).await.expect_err("nothing to update");
    assert!(matches!(err, DbError::NotFound));

    let missing = db.get_tournament(TenantScope::All, Uuid::new_v4()).await?;
    assert!(missing.is_none());
    Ok(())
}
