//! implementation of the display deployment pointer port

use crate::{
    helpers::*,
    map_db_err,
    schema::{tcc_deployments, tcc_deployments::dsl::*},
};
use app_core::{DbError, DbResult, DbpDeployment, Deployment};
use async_trait::async_trait;
use diesel::prelude::{
    AsChangeset, Insertable, OptionalExtension, QueryDsl, Queryable, RunQueryDsl,
};
use tracing::instrument;

#[derive(Debug, Queryable)]
pub(crate) struct DeploymentRow {
    pub user_id: i64,
    pub tournament_id: Option<String>,
    pub deployed_at: String,
}

impl TryFrom<DeploymentRow> for Deployment {
    type Error = DbError;

    fn try_from(r: DeploymentRow) -> Result<Self, Self::Error> {
        Ok(Deployment {
            user_id: r.user_id,
            tournament_id: parse_opt_uid(r.tournament_id.as_deref())?,
            deployed_at: parse_ts(&r.deployed_at)?,
        })
    }
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = tcc_deployments, treat_none_as_null = true)]
pub(crate) struct DeploymentWrite {
    pub user_id: i64,
    pub tournament_id: Option<String>,
    pub deployed_at: String,
}

impl From<&Deployment> for DeploymentWrite {
    fn from(d: &Deployment) -> Self {
        DeploymentWrite {
            user_id: d.user_id,
            tournament_id: opt_uid(d.tournament_id),
            deployed_at: ts(d.deployed_at),
        }
    }
}

#[async_trait]
impl DbpDeployment for crate::SqliteDb {
    #[instrument(name = "db.deployment.get", skip(self))]
    async fn get_deployment(&self, tenant: i64) -> DbResult<Option<Deployment>> {
        self.with_conn(move |conn| {
            let row = tcc_deployments
                .find(tenant)
                .first::<DeploymentRow>(conn)
                .optional()
                .map_err(map_db_err)?;
            row.map(Deployment::try_from).transpose()
        })
        .await
    }

    #[instrument(name = "db.deployment.set", skip(self, deployment))]
    async fn set_deployment(&self, deployment: &Deployment) -> DbResult<()> {
        let row = DeploymentWrite::from(deployment);
        self.with_conn(move |conn| {
            diesel::replace_into(tcc_deployments)
                .values(&row)
                .execute(conn)
                .map_err(map_db_err)?;
            Ok(())
        })
        .await
    }
}
