//! [`ControlPlane`] implementation over the SQL API

use crate::client::{ClientConfig, SqlClient};
use crate::rows::{self, ResultSet};
use crate::sql::{self, Statement};
use declarative::diff::AttributeDelta;
use declarative::{ApiError, ControlPlane, Descriptor, GrantSpec, ObservedState, ResourceId, ResourceKind};
use std::collections::BTreeSet;

/// Something that can run statements; the SQL API client in production
pub trait StatementRunner: Send + Sync {
    fn run(&self, statement: &Statement) -> crate::error::Result<ResultSet>;

    /// Run statements in order, stopping at the first failure
    fn run_all(&self, statements: &[Statement]) -> crate::error::Result<()> {
        for statement in statements {
            self.run(statement)?;
        }
        Ok(())
    }
}

impl StatementRunner for SqlClient {
    fn run(&self, statement: &Statement) -> crate::error::Result<ResultSet> {
        self.execute(statement)
    }
}

/// Snowflake control plane
pub struct SnowflakePlane<R: StatementRunner = SqlClient> {
    runner: R,
}

impl SnowflakePlane<SqlClient> {
    pub fn connect(config: ClientConfig) -> Self {
        log::debug!(
            "snowflake control plane for {} (role {})",
            config.account,
            config.role.as_deref().unwrap_or("default")
        );
        Self::with_runner(SqlClient::new(config))
    }
}

impl<R: StatementRunner> SnowflakePlane<R> {
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    fn run(&self, statement: &Statement) -> Result<ResultSet, ApiError> {
        self.runner.run(statement).map_err(ApiError::from)
    }

    fn run_all(&self, statements: &[Statement]) -> Result<(), ApiError> {
        self.runner.run_all(statements).map_err(ApiError::from)
    }

    fn privileges(&self, statement: Statement, privileges: &BTreeSet<String>) -> Result<(), ApiError> {
        if privileges.is_empty() {
            return Ok(());
        }
        self.run(&statement).map(|_| ())
    }
}

impl<R: StatementRunner> ControlPlane for SnowflakePlane<R> {
    fn describe(&self, id: &ResourceId) -> Result<ObservedState, ApiError> {
        if id.kind == ResourceKind::Grant {
            return Err(ApiError::Rejected(format!("{id} is observed through its grant specification")));
        }
        let rows = self.run(&sql::show(id))?;
        let row = rows.find_named(id.leaf_name()).ok_or(ApiError::NotFound)?;
        Ok(ObservedState::present(id.clone(), rows::attributes(id.kind, &row)))
    }

    fn create(&self, desired: &Descriptor) -> Result<ObservedState, ApiError> {
        self.run_all(&sql::create(desired))?;
        self.describe(desired.id())
    }

    fn update(&self, desired: &Descriptor, delta: &AttributeDelta) -> Result<ObservedState, ApiError> {
        self.run_all(&sql::alter(desired, delta))?;
        self.describe(desired.id())
    }

    fn delete(&self, id: &ResourceId) -> Result<(), ApiError> {
        self.run(&sql::drop(id)).map(|_| ())
    }

    fn describe_grant(&self, grant: &GrantSpec) -> Result<BTreeSet<String>, ApiError> {
        let rows = self.run(&sql::show_grants(grant))?;
        Ok(rows::held_privileges(grant, &rows))
    }

    fn grant_privileges(&self, grant: &GrantSpec, privileges: &BTreeSet<String>) -> Result<(), ApiError> {
        self.privileges(sql::grant(grant, privileges), privileges)
    }

    fn revoke_privileges(&self, grant: &GrantSpec, privileges: &BTreeSet<String>) -> Result<(), ApiError> {
        self.privileges(sql::revoke(grant, privileges), privileges)
    }
}
