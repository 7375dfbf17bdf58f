//! End-to-end harness: real core wired to the in-memory SQLite adapter and
//! the recording registry.

use crate::port_fakes::CrRecorder;
use anyhow::Result;
use app_core::{
    Core, CoreBuilder, EffectiveTenant, Match, NewTournament, Participant, Principal, Role,
    Tournament, TournamentOptions, TournamentType,
};
use db_sqlite::SqliteDb;
use std::collections::HashMap;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT_TRACING: Once = Once::new();

/// Quiet tracing for tests; RUST_LOG opts into verbosity.
pub fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub struct TestApp {
    pub core: Arc<Core>,
    pub events: Arc<CrRecorder>,
}

/// Fresh core over a fresh in-memory store.
pub async fn test_app() -> Result<TestApp> {
    init_test_tracing();
    let db = SqliteDb::new_in_memory()?;
    db.run_migration().await?;
    let events = Arc::new(CrRecorder::new());
    let core = CoreBuilder::new()
        .set_db(Arc::new(db))
        .set_cr(events.clone())
        .build();
    Ok(TestApp {
        core: Arc::new(core),
        events,
    })
}

pub fn tenant(user_id: i64) -> EffectiveTenant {
    EffectiveTenant::resolve(Some(&Principal {
        user_id,
        role: Role::User,
        view_all: false,
        impersonate: None,
    }))
    .expect("plain principal resolves")
}

/// Create a pending tournament with a named, seed-ordered roster.
pub async fn seeded_tournament(
    app: &TestApp,
    tenant: &EffectiveTenant,
    tournament_type: TournamentType,
    options: TournamentOptions,
    names: &[&str],
) -> Result<(Tournament, HashMap<String, Uuid>)> {
    let tournament = app
        .core
        .create_tournament(
            tenant,
            NewTournament {
                name: format!("{tournament_type} cup"),
                game_name: Some("Test Game".into()),
                tournament_type,
                options,
            },
        )
        .await?;
    let added = app
        .core
        .bulk_add_participants(
            tenant,
            &tournament.id.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        )
        .await?;
    let ids = added.into_iter().map(|p| (p.name.clone(), p.id)).collect();
    Ok((tournament, ids))
}

/// The sorted roster, refreshed from the store.
pub async fn roster(
    app: &TestApp,
    tenant: &EffectiveTenant,
    tournament: &Tournament,
) -> Result<Vec<Participant>> {
    Ok(app
        .core
        .list_participants(tenant, &tournament.id.to_string())
        .await?)
}

/// Look a match up by its generated identifier ("A", "B", ...).
pub fn by_identifier<'a>(matches: &'a [Match], identifier: &str) -> &'a Match {
    matches
        .iter()
        .find(|m| m.identifier == identifier)
        .unwrap_or_else(|| panic!("no match with identifier {identifier}"))
}
