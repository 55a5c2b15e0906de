//! Output projector
//!
//! Turns a converged pass into the read-only values collaborators consume:
//! one attribute map per declared resource and a derived connection record.
//! Secrets are only visible in the authenticated view.

use crate::descriptor::DescriptorSet;
use crate::error::{Error, Result};
use crate::executor::ConvergeReport;
use crate::sensitive::{REDACTED, Sensitive};
use crate::types::{Attributes, NodeStatus, ResourceId, Value};
use serde::Serialize;
use serde_json::{Map, Value as Json, json};
use std::collections::BTreeMap;

/// Which values a caller may see
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    /// Sensitive values replaced by a redaction marker
    #[default]
    Redacted,
    /// Sensitive values included
    Authenticated,
}

/// Resources that make up the connection record
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub account: String,
    pub user: ResourceId,
    pub warehouse: ResourceId,
    pub database: ResourceId,
    pub schema: ResourceId,
    pub role: ResourceId,
    /// Secret attribute of the user holding its credential
    pub password_attribute: String,
}

/// Everything a collaborator needs to connect as the service account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub account: String,
    pub user: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub role: String,
    pub password: Option<Sensitive<String>>,
}

/// Projected outputs of a converged pass
#[derive(Debug, Clone)]
pub struct Outputs {
    view: View,
    resources: BTreeMap<ResourceId, Attributes>,
    connection: Option<Connection>,
}

/// Project the outputs of `report` for `set`.
///
/// # Errors
///
/// Returns `IncompleteConverge` if any node is not in a converged terminal state.
pub fn project(
    set: &DescriptorSet,
    report: &ConvergeReport,
    connection: Option<&ConnectionSpec>,
    view: View,
) -> Result<Outputs> {
    let pending = report.unconverged();
    if !pending.is_empty() {
        return Err(Error::IncompleteConverge { pending });
    }

    let mut resources = BTreeMap::new();
    for outcome in report.outcomes() {
        if outcome.status == NodeStatus::Deleted {
            continue;
        }
        let Some(descriptor) = set.get(&outcome.id) else {
            continue;
        };

        let mut attributes = outcome.observed.attributes.clone();
        attributes.insert("name".to_string(), Value::from(outcome.id.name.as_str()));
        for (key, value) in descriptor.attributes() {
            attributes.insert(key.clone(), value.resolved());
        }
        if let Some(spec) = descriptor.grant_spec() {
            let privileges: Vec<&str> = spec.privileges.iter().map(String::as_str).collect();
            attributes.insert("privileges".to_string(), Value::from(privileges.join(",")));
            attributes.insert("principal".to_string(), Value::from(spec.principal.name.as_str()));
            attributes.insert("target".to_string(), Value::from(spec.target.to_string()));
        }
        resources.insert(outcome.id.clone(), attributes);
    }

    let connection = match connection {
        Some(spec) if resources.contains_key(&spec.user) => Some(Connection {
            account: spec.account.clone(),
            user: spec.user.name.clone(),
            warehouse: spec.warehouse.name.clone(),
            database: spec.database.name.clone(),
            schema: spec.schema.leaf_name().to_string(),
            role: spec.role.name.clone(),
            password: set
                .get(&spec.user)
                .and_then(|user| user.attribute(&spec.password_attribute))
                .and_then(|value| match value {
                    Value::Secret(secret) => Some(secret.clone()),
                    _ => None,
                }),
        }),
        _ => None,
    };

    Ok(Outputs {
        view,
        resources,
        connection,
    })
}

impl Outputs {
    pub fn view(&self) -> View {
        self.view
    }

    pub fn resources(&self) -> impl Iterator<Item = (&ResourceId, &Attributes)> {
        self.resources.iter()
    }

    /// One attribute as text, redacted unless the view is authenticated
    pub fn attribute(&self, id: &ResourceId, key: &str) -> Option<String> {
        self.resources
            .get(id)
            .and_then(|attributes| attributes.get(key))
            .map(|value| self.render(value))
    }

    /// The connection record; `None` in the redacted view
    pub fn connection(&self) -> Option<&Connection> {
        match self.view {
            View::Authenticated => self.connection.as_ref(),
            View::Redacted => None,
        }
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    fn render(&self, value: &Value) -> String {
        match (value, self.view) {
            (Value::Secret(secret), View::Authenticated) => secret.expose().clone(),
            (other, _) => other.to_string(),
        }
    }

    fn to_json_value(&self, value: &Value) -> Json {
        match value {
            Value::Number(n) => json!(n),
            Value::Flag(b) => json!(b),
            Value::Text(_) | Value::Ref(_) | Value::Secret(_) => Json::String(self.render(value)),
        }
    }

    /// JSON document with `resources` and `connection`
    pub fn to_json(&self) -> Json {
        let resources: Map<String, Json> = self
            .resources
            .iter()
            .map(|(id, attributes)| {
                let fields: Map<String, Json> = attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), self.to_json_value(v)))
                    .collect();
                (id.to_string(), Json::Object(fields))
            })
            .collect();

        let connection = match (&self.connection, self.view) {
            (None, _) => Json::Null,
            (Some(_), View::Redacted) => Json::String(REDACTED.to_string()),
            (Some(conn), View::Authenticated) => json!({
                "account": conn.account,
                "user": conn.user,
                "warehouse": conn.warehouse,
                "database": conn.database,
                "schema": conn.schema,
                "role": conn.role,
                "password": conn.password.as_ref().map(|p| p.expose().clone()),
            }),
        };

        json!({
            "resources": resources,
            "connection": connection,
        })
    }

    /// `SNOWFLAKE_*` variables for the connection; only in the authenticated view
    pub fn env_vars(&self) -> Option<Vec<(&'static str, String)>> {
        let conn = self.connection()?;
        let mut vars = vec![
            ("SNOWFLAKE_ACCOUNT", conn.account.clone()),
            ("SNOWFLAKE_USER", conn.user.clone()),
        ];
        if let Some(password) = &conn.password {
            vars.push(("SNOWFLAKE_PASSWORD", password.expose().clone()));
        }
        vars.extend([
            ("SNOWFLAKE_WAREHOUSE", conn.warehouse.clone()),
            ("SNOWFLAKE_DATABASE", conn.database.clone()),
            ("SNOWFLAKE_SCHEMA", conn.schema.clone()),
            ("SNOWFLAKE_ROLE", conn.role.clone()),
        ]);
        Some(vars)
    }
}
