//! Statement rendering
//!
//! Every statement carries two renderings: the text sent to the API and a
//! redacted copy with secret literals masked, which is the only form that
//! reaches logs.

use declarative::diff::{AttributeDelta, FieldChange};
use declarative::{Descriptor, GrantScope, GrantSpec, REDACTED, ResourceId, ResourceKind, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Attributes that shape the statement itself rather than a property
const STRUCTURAL: &[&str] = &["database", "transient"];

/// A single SQL statement
#[derive(Clone, PartialEq, Eq)]
pub struct Statement {
    text: String,
    redacted: String,
}

impl Statement {
    fn writer() -> Writer {
        Writer::default()
    }

    /// Text sent to the API
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text with secret literals masked
    pub fn redacted(&self) -> &str {
        &self.redacted
    }

    pub fn has_secret(&self) -> bool {
        self.text != self.redacted
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted)
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Statement").field(&self.redacted).finish()
    }
}

#[derive(Default)]
struct Writer {
    text: String,
    redacted: String,
}

impl Writer {
    fn raw(mut self, s: &str) -> Self {
        self.text.push_str(s);
        self.redacted.push_str(s);
        self
    }

    fn secret(mut self, s: &str) -> Self {
        self.text.push_str(&literal(s));
        self.redacted.push_str(&literal(REDACTED));
        self
    }

    fn value(self, value: &Value) -> Self {
        match value {
            Value::Text(text) => {
                let rendered = literal(text);
                self.raw(&rendered)
            }
            Value::Number(n) => self.raw(&n.to_string()),
            Value::Flag(b) => self.raw(if *b { "TRUE" } else { "FALSE" }),
            Value::Ref(id) => {
                let rendered = literal(&id.name);
                self.raw(&rendered)
            }
            Value::Secret(secret) => self.secret(secret.expose()),
        }
    }

    fn property(self, key: &str, value: &Value) -> Self {
        let key = format!(" {} = ", key.to_ascii_uppercase());
        self.raw(&key).value(value)
    }

    fn finish(self) -> Statement {
        Statement {
            text: self.text,
            redacted: self.redacted,
        }
    }
}

/// Quote an identifier, doubling embedded quotes
pub fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a dotted name one segment at a time (`D.S` -> `"D"."S"`)
pub fn qualified(name: &str) -> String {
    name.split('.').map(ident).collect::<Vec<_>>().join(".")
}

/// Quote a string literal, doubling embedded single quotes
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn object_keyword(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Warehouse => "WAREHOUSE",
        ResourceKind::Database => "DATABASE",
        ResourceKind::Schema => "SCHEMA",
        ResourceKind::Role => "ROLE",
        ResourceKind::User => "USER",
        ResourceKind::Grant => "GRANT",
    }
}

fn plural_keyword(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Warehouse => "WAREHOUSES",
        ResourceKind::Database => "DATABASES",
        ResourceKind::Schema => "SCHEMAS",
        ResourceKind::Role => "ROLES",
        ResourceKind::User => "USERS",
        ResourceKind::Grant => "GRANTS",
    }
}

/// `SHOW <KIND>S LIKE '<name>'`, scoped to the parent database for schemas.
///
/// `LIKE` is a case-insensitive pattern, so rows must still be matched by
/// exact name.
pub fn show(id: &ResourceId) -> Statement {
    let writer = Statement::writer()
        .raw("SHOW ")
        .raw(plural_keyword(id.kind))
        .raw(" LIKE ")
        .raw(&literal(id.leaf_name()));
    let writer = match (id.kind, id.name.rsplit_once('.')) {
        (ResourceKind::Schema, Some((database, _))) => writer.raw(" IN DATABASE ").raw(&qualified(database)),
        _ => writer,
    };
    writer.finish()
}

fn is_transient(desired: &Descriptor) -> bool {
    desired
        .attribute("transient")
        .and_then(Value::as_flag)
        .unwrap_or(false)
}

/// Statements that create `desired`.
///
/// Creation is `IF NOT EXISTS` so a retried call converges instead of
/// failing. A user is also granted its default role.
pub fn create(desired: &Descriptor) -> Vec<Statement> {
    let id = desired.id();
    let mut writer = Statement::writer().raw("CREATE ");
    if matches!(id.kind, ResourceKind::Database | ResourceKind::Schema) && is_transient(desired) {
        writer = writer.raw("TRANSIENT ");
    }
    writer = writer
        .raw(object_keyword(id.kind))
        .raw(" IF NOT EXISTS ")
        .raw(&qualified(&id.name));

    for (key, value) in desired.attributes() {
        if STRUCTURAL.contains(&key.as_str()) {
            continue;
        }
        writer = writer.property(key, value);
    }

    let mut statements = vec![writer.finish()];
    if id.kind == ResourceKind::User
        && let Some(role) = desired.attribute("default_role")
    {
        statements.push(grant_role(&role_name(role), &id.name));
    }
    statements
}

fn role_name(value: &Value) -> String {
    match value {
        Value::Ref(id) => id.name.clone(),
        other => other.resolved().to_string(),
    }
}

/// Statements that apply `delta` to an existing resource.
///
/// Changing a user's default role swaps the role assignment, revoking the
/// old role before granting the new one.
pub fn alter(desired: &Descriptor, delta: &AttributeDelta) -> Vec<Statement> {
    let id = desired.id();
    let mut statements = Vec::new();

    if id.kind == ResourceKind::User
        && let Some(FieldChange { from, to }) = delta.get("default_role")
    {
        if let Some(old) = from {
            let old = role_name(old);
            if old != role_name(to) && !old.is_empty() {
                statements.push(revoke_role(&old, &id.name));
            }
        }
        statements.push(grant_role(&role_name(to), &id.name));
    }

    if !delta.is_empty() {
        let mut writer = Statement::writer()
            .raw("ALTER ")
            .raw(object_keyword(id.kind))
            .raw(" ")
            .raw(&qualified(&id.name))
            .raw(" SET");
        for (field, change) in &delta.changes {
            writer = writer.property(field, &change.to);
        }
        statements.push(writer.finish());
    }
    statements
}

/// `DROP <KIND> IF EXISTS <name>`
pub fn drop(id: &ResourceId) -> Statement {
    Statement::writer()
        .raw("DROP ")
        .raw(object_keyword(id.kind))
        .raw(" IF EXISTS ")
        .raw(&qualified(&id.name))
        .finish()
}

fn grant_role(role: &str, user: &str) -> Statement {
    Statement::writer()
        .raw("GRANT ROLE ")
        .raw(&ident(role))
        .raw(" TO USER ")
        .raw(&ident(user))
        .finish()
}

fn revoke_role(role: &str, user: &str) -> Statement {
    Statement::writer()
        .raw("REVOKE ROLE ")
        .raw(&ident(role))
        .raw(" FROM USER ")
        .raw(&ident(user))
        .finish()
}

fn securable(grant: &GrantSpec) -> String {
    let target = qualified(&grant.target.name);
    match &grant.scope {
        GrantScope::Object => format!("{} {target}", object_keyword(grant.target.kind)),
        GrantScope::Future { object_type } => format!(
            "FUTURE {} IN {} {target}",
            object_type.to_ascii_uppercase(),
            object_keyword(grant.target.kind)
        ),
    }
}

fn privilege_list(privileges: &BTreeSet<String>) -> String {
    privileges.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// `GRANT <privileges> ON <securable> TO ROLE <principal>`
pub fn grant(grant: &GrantSpec, privileges: &BTreeSet<String>) -> Statement {
    Statement::writer()
        .raw("GRANT ")
        .raw(&privilege_list(privileges))
        .raw(" ON ")
        .raw(&securable(grant))
        .raw(" TO ROLE ")
        .raw(&ident(&grant.principal.name))
        .finish()
}

/// `REVOKE <privileges> ON <securable> FROM ROLE <principal>`
pub fn revoke(grant: &GrantSpec, privileges: &BTreeSet<String>) -> Statement {
    Statement::writer()
        .raw("REVOKE ")
        .raw(&privilege_list(privileges))
        .raw(" ON ")
        .raw(&securable(grant))
        .raw(" FROM ROLE ")
        .raw(&ident(&grant.principal.name))
        .finish()
}

/// Statement listing the privileges relevant to `grant`
pub fn show_grants(grant: &GrantSpec) -> Statement {
    match &grant.scope {
        GrantScope::Object => Statement::writer()
            .raw("SHOW GRANTS TO ROLE ")
            .raw(&ident(&grant.principal.name))
            .finish(),
        GrantScope::Future { .. } => Statement::writer()
            .raw("SHOW FUTURE GRANTS IN ")
            .raw(object_keyword(grant.target.kind))
            .raw(" ")
            .raw(&qualified(&grant.target.name))
            .finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::Sensitive;

    fn user() -> Descriptor {
        let db = ResourceId::database("D");
        Descriptor::builder(ResourceKind::User, "U")
            .reference("default_role", &ResourceId::role("R"))
            .reference("default_namespace", &ResourceId::schema(&db, "S"))
            .secret("password", Sensitive::new("it's-secret".to_string()))
            .create_only("must_change_password", false)
            .build()
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(ident("APP_WH"), "\"APP_WH\"");
        assert_eq!(ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualified("D.S"), "\"D\".\"S\"");
        assert_eq!(literal("it's"), "'it''s'");
    }

    #[test]
    fn test_show_statements() {
        let db = ResourceId::database("D");
        assert_eq!(show(&ResourceId::warehouse("W")).text(), "SHOW WAREHOUSES LIKE 'W'");
        assert_eq!(
            show(&ResourceId::schema(&db, "S")).text(),
            "SHOW SCHEMAS LIKE 'S' IN DATABASE \"D\""
        );
    }

    #[test]
    fn test_create_warehouse() {
        let desired = Descriptor::builder(ResourceKind::Warehouse, "W")
            .attr("warehouse_size", "X-SMALL")
            .attr("auto_suspend", 60u32)
            .attr("auto_resume", true)
            .create_only("initially_suspended", true)
            .build();
        let statements = create(&desired);
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].text(),
            "CREATE WAREHOUSE IF NOT EXISTS \"W\" AUTO_RESUME = TRUE AUTO_SUSPEND = 60 \
             INITIALLY_SUSPENDED = TRUE WAREHOUSE_SIZE = 'X-SMALL'"
        );
    }

    #[test]
    fn test_create_transient_schema_skips_structural_attributes() {
        let db = ResourceId::database("D");
        let desired = Descriptor::builder(ResourceKind::Schema, "D.S")
            .reference("database", &db)
            .attr("transient", true)
            .build();
        let statements = create(&desired);
        assert_eq!(statements[0].text(), "CREATE TRANSIENT SCHEMA IF NOT EXISTS \"D\".\"S\"");
    }

    #[test]
    fn test_create_user_masks_password_and_assigns_role() {
        let statements = create(&user());
        assert_eq!(statements.len(), 2);

        let create_user = &statements[0];
        assert!(create_user.has_secret());
        assert!(create_user.text().contains("PASSWORD = 'it''s-secret'"));
        assert!(create_user.redacted().contains("PASSWORD = '(sensitive)'"));
        assert!(!format!("{create_user} {create_user:?}").contains("secret"));
        assert!(create_user.text().contains("DEFAULT_NAMESPACE = 'D.S'"));
        assert!(create_user.text().contains("MUST_CHANGE_PASSWORD = FALSE"));

        assert_eq!(statements[1].text(), "GRANT ROLE \"R\" TO USER \"U\"");
    }

    #[test]
    fn test_alter_default_role_swaps_assignment() {
        let mut delta = AttributeDelta::default();
        delta.changes.insert(
            "default_role".into(),
            FieldChange {
                from: Some(Value::from("OLD")),
                to: Value::from("R"),
            },
        );
        let statements = alter(&user(), &delta);
        let texts: Vec<&str> = statements.iter().map(Statement::text).collect();
        assert_eq!(
            texts,
            vec![
                "REVOKE ROLE \"OLD\" FROM USER \"U\"",
                "GRANT ROLE \"R\" TO USER \"U\"",
                "ALTER USER \"U\" SET DEFAULT_ROLE = 'R'",
            ]
        );
    }

    #[test]
    fn test_alter_warehouse() {
        let desired = Descriptor::builder(ResourceKind::Warehouse, "W").build();
        let mut delta = AttributeDelta::default();
        delta.changes.insert(
            "auto_suspend".into(),
            FieldChange {
                from: Some(Value::Number(600)),
                to: Value::Number(60),
            },
        );
        let statements = alter(&desired, &delta);
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].text(), "ALTER WAREHOUSE \"W\" SET AUTO_SUSPEND = 60");
    }

    #[test]
    fn test_drop() {
        let db = ResourceId::database("D");
        assert_eq!(drop(&ResourceId::schema(&db, "S")).text(), "DROP SCHEMA IF EXISTS \"D\".\"S\"");
        assert_eq!(drop(&ResourceId::user("U")).text(), "DROP USER IF EXISTS \"U\"");
    }

    #[test]
    fn test_grant_and_revoke_on_object() {
        let role = ResourceId::role("R");
        let schema = ResourceId::schema(&ResourceId::database("D"), "S");
        let spec = GrantSpec::new(&role, ["USAGE", "CREATE TABLE"], &schema, GrantScope::Object);
        assert_eq!(
            grant(&spec, &spec.privileges).text(),
            "GRANT CREATE TABLE, USAGE ON SCHEMA \"D\".\"S\" TO ROLE \"R\""
        );
        let usage = BTreeSet::from(["USAGE".to_string()]);
        assert_eq!(
            revoke(&spec, &usage).text(),
            "REVOKE USAGE ON SCHEMA \"D\".\"S\" FROM ROLE \"R\""
        );
        assert_eq!(show_grants(&spec).text(), "SHOW GRANTS TO ROLE \"R\"");
    }

    #[test]
    fn test_future_grant() {
        let role = ResourceId::role("R");
        let schema = ResourceId::schema(&ResourceId::database("D"), "S");
        let spec = GrantSpec::new(
            &role,
            ["SELECT"],
            &schema,
            GrantScope::Future {
                object_type: "tables".into(),
            },
        );
        assert_eq!(
            grant(&spec, &spec.privileges).text(),
            "GRANT SELECT ON FUTURE TABLES IN SCHEMA \"D\".\"S\" TO ROLE \"R\""
        );
        assert_eq!(show_grants(&spec).text(), "SHOW FUTURE GRANTS IN SCHEMA \"D\".\"S\"");
    }
}
