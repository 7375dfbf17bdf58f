// station of tournament

use crate::{Core, CoreError, CoreResult, EffectiveTenant, utils::normalize_ws};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

/// a physical or logical play location (TV, console pod)
///
/// `current_match_id` is null or references a match with `station_id` equal
/// to this station and state open or underway; both sides of that link are
/// only ever written together inside one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// id of station
    pub id: Uuid,
    /// id of owning tournament
    pub tournament_id: Uuid,
    /// owning tenant
    pub user_id: i64,
    /// human name, e.g. "TV 1"
    pub name: String,
    pub current_match_id: Option<Uuid>,
}

impl Core {
    pub async fn list_stations(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
    ) -> CoreResult<Vec<Station>> {
        let tournament = self.find_tournament(tenant, reference).await?;
        Ok(self.database.list_stations(tournament.id).await?)
    }

    #[instrument(name = "core.station.create", skip(self, tenant))]
    pub async fn create_station(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        name: String,
    ) -> CoreResult<Station> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let name = normalize_ws(name);
        if name.is_empty() {
            return Err(CoreError::Validation("station name is required".into()));
        }
        let existing = self.database.list_stations(tournament.id).await?;
        if existing.iter().any(|s| s.name.eq_ignore_ascii_case(&name)) {
            return Err(CoreError::Conflict(format!(
                "station name already taken: {name}"
            )));
        }
        let station = Station {
            id: Uuid::new_v4(),
            tournament_id: tournament.id,
            user_id: tournament.user_id,
            name,
            current_match_id: None,
        };
        self.database.insert_station(&station).await?;
        Ok(station)
    }

    #[instrument(name = "core.station.delete", skip(self, tenant))]
    pub async fn delete_station(
        &self,
        tenant: &EffectiveTenant,
        reference: &str,
        station_id: Uuid,
    ) -> CoreResult<()> {
        let tournament = self.find_tournament_for_write(tenant, reference).await?;
        let stations = self.database.list_stations(tournament.id).await?;
        let Some(station) = stations.iter().find(|s| s.id == station_id) else {
            return Err(CoreError::NotFound(format!("station: {station_id}")));
        };
        if station.current_match_id.is_some() {
            return Err(CoreError::Conflict(
                "station is hosting a match; clear it first".into(),
            ));
        }
        self.database.delete_station(station_id).await?;
        Ok(())
    }
}
