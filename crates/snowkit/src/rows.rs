//! Result sets and `SHOW` row parsing
//!
//! The SQL API returns every cell as an optional string alongside the
//! column metadata. `SHOW ... LIKE` matches case-insensitively and treats
//! `_` as a wildcard, so rows are filtered again by exact name here.

use crate::error::{Error, Result};
use declarative::{Attributes, GrantScope, GrantSpec, ResourceId, ResourceKind, Value};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Response body of a successful statement
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResponse {
    #[serde(default)]
    pub statement_handle: String,
    #[serde(default)]
    pub result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    pub data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetMetaData {
    #[serde(default)]
    pub row_type: Vec<Column>,
    #[serde(default)]
    pub partition_info: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct Column {
    pub name: String,
}

/// Response body of an additional result partition
#[derive(Debug, Default, Deserialize)]
pub struct PartitionResponse {
    #[serde(default)]
    pub data: Vec<Vec<Option<String>>>,
}

/// Error body returned with a non-success status
#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "statementHandle")]
    pub statement_handle: String,
}

/// Rows of a statement with their column names
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let columns = columns.into_iter().map(|c| c.to_ascii_lowercase()).collect();
        Self { columns, rows }
    }

    pub(crate) fn from_response(response: StatementResponse) -> Self {
        let columns = response
            .result_set_meta_data
            .map(|meta| meta.row_type.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();
        Self::new(columns, response.data)
    }

    /// Parse a full statement response body
    pub fn parse(body: &str) -> Result<Self> {
        let response: StatementResponse = serde_json::from_str(body)?;
        Ok(Self::from_response(response))
    }

    pub(crate) fn extend(&mut self, rows: Vec<Vec<Option<String>>>) {
        self.rows.extend(rows);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|cells| Row { set: self, cells })
    }

    /// The row whose `name` column equals `name` exactly
    pub fn find_named(&self, name: &str) -> Option<Row<'_>> {
        self.rows().find(|row| row.get("name").is_some_and(|n| unquote(n) == name))
    }
}

/// One row of a [`ResultSet`]
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    set: &'a ResultSet,
    cells: &'a [Option<String>],
}

impl<'a> Row<'a> {
    /// Cell of `column` (case-insensitive); `None` for missing or SQL NULL
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let index = self.set.columns.iter().position(|c| c.eq_ignore_ascii_case(column))?;
        self.cells.get(index)?.as_deref()
    }

    fn text(&self, column: &str) -> Value {
        Value::from(self.get(column).unwrap_or_default())
    }

    fn number(&self, column: &str) -> Option<Value> {
        self.get(column)?.trim().parse::<i64>().ok().map(Value::Number)
    }

    fn flag(&self, column: &str) -> Option<Value> {
        match self.get(column)?.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Flag(true)),
            "false" => Some(Value::Flag(false)),
            _ => None,
        }
    }

    fn options_contain(&self, option: &str) -> bool {
        self.get("options")
            .is_some_and(|opts| opts.split(',').any(|o| o.trim().eq_ignore_ascii_case(option)))
    }
}

fn unquote(name: &str) -> &str {
    name.trim_matches('"')
}

fn insert(attributes: &mut Attributes, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        attributes.insert(key.to_string(), value);
    }
}

/// Map a `SHOW` row into the attribute names used by descriptors
pub fn attributes(kind: ResourceKind, row: &Row<'_>) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("comment".to_string(), row.text("comment"));

    match kind {
        ResourceKind::Warehouse => {
            let size = row.get("size").map(|s| Value::from(canonical_warehouse_size(s)));
            insert(&mut attributes, "warehouse_size", size);
            insert(&mut attributes, "auto_suspend", row.number("auto_suspend"));
            insert(&mut attributes, "auto_resume", row.flag("auto_resume"));
            insert(&mut attributes, "state", row.get("state").map(Value::from));
        }
        ResourceKind::Database => {
            insert(&mut attributes, "data_retention_time_in_days", row.number("retention_time"));
            attributes.insert("transient".to_string(), Value::Flag(row.options_contain("TRANSIENT")));
        }
        ResourceKind::Schema => {
            insert(&mut attributes, "database", row.get("database_name").map(|d| Value::from(unquote(d))));
            insert(&mut attributes, "data_retention_time_in_days", row.number("retention_time"));
            attributes.insert("transient".to_string(), Value::Flag(row.options_contain("TRANSIENT")));
        }
        ResourceKind::Role => {}
        ResourceKind::User => {
            for column in ["default_role", "default_warehouse", "default_namespace"] {
                insert(&mut attributes, column, row.get(column).map(|v| Value::from(unquote(v))));
            }
            insert(&mut attributes, "disabled", row.flag("disabled"));
        }
        ResourceKind::Grant => {}
    }
    attributes
}

/// Canonical spelling of a warehouse size.
///
/// `SHOW WAREHOUSES` reports `X-Small` or `2X-Large`, while declarations may
/// use any accepted synonym (`XSMALL`, `XXLARGE`, `X2LARGE`). Both sides are
/// compared in the hyphenated upper-case form. Unknown sizes are only
/// upper-cased.
pub fn canonical_warehouse_size(size: &str) -> String {
    let compact: String = size
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .collect::<String>()
        .to_ascii_uppercase();
    let canonical = match compact.as_str() {
        "XSMALL" => "X-SMALL",
        "SMALL" => "SMALL",
        "MEDIUM" => "MEDIUM",
        "LARGE" => "LARGE",
        "XLARGE" => "X-LARGE",
        "XXLARGE" | "X2LARGE" | "2XLARGE" => "2X-LARGE",
        "XXXLARGE" | "X3LARGE" | "3XLARGE" => "3X-LARGE",
        "X4LARGE" | "4XLARGE" => "4X-LARGE",
        "X5LARGE" | "5XLARGE" => "5X-LARGE",
        "X6LARGE" | "6XLARGE" => "6X-LARGE",
        _ => return size.trim().to_ascii_uppercase(),
    };
    canonical.to_string()
}

fn object_type_matches(reported: &str, declared: &str) -> bool {
    let declared = declared.to_ascii_uppercase();
    let reported = reported.to_ascii_uppercase();
    reported == declared || Some(reported.as_str()) == declared.strip_suffix('S')
}

fn same_object(reported: &str, target: &ResourceId) -> bool {
    let reported: Vec<&str> = reported.split('.').map(unquote).collect();
    let expected: Vec<&str> = target.name.split('.').collect();
    reported == expected
}

/// Privileges `grant` currently holds according to `SHOW GRANTS TO ROLE`
/// or `SHOW FUTURE GRANTS IN SCHEMA` rows. Ownership is never managed.
pub fn held_privileges(grant: &GrantSpec, rows: &ResultSet) -> BTreeSet<String> {
    rows.rows()
        .filter(|row| match &grant.scope {
            GrantScope::Object => {
                row.get("granted_on")
                    .is_some_and(|on| on.eq_ignore_ascii_case(grant.target.kind.as_str()))
                    && row.get("name").is_some_and(|name| same_object(name, &grant.target))
            }
            GrantScope::Future { object_type } => {
                row.get("grant_on").is_some_and(|on| object_type_matches(on, object_type))
                    && row
                        .get("grantee_name")
                        .is_some_and(|grantee| unquote(grantee) == grant.principal.name)
            }
        })
        .filter_map(|row| row.get("privilege"))
        .map(|p| p.trim().to_ascii_uppercase())
        .filter(|p| p != "OWNERSHIP")
        .collect()
}

/// Fail when a statement response carries no column metadata
pub(crate) fn require_columns(set: &ResultSet) -> Result<()> {
    if set.columns.is_empty() && !set.rows.is_empty() {
        return Err(Error::InvalidResponse("rows without column metadata".into()));
    }
    Ok(())
}
