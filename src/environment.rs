//! The analytics environment declaration
//!
//! One warehouse, one database with one schema, an application role with
//! usage grants on all three, and a service account that defaults to that
//! role. Names are derived from the configured prefix and environment label.

use crate::config::ProvisionConfig;
use snowkit::canonical_warehouse_size;
use declarative::{
    ConnectionSpec, Descriptor, DescriptorBuilder, DescriptorSet, GrantScope, GrantSpec, ResourceId, ResourceKind,
    Sensitive,
};

/// Secret attribute of the service user holding its password
pub const PASSWORD_ATTRIBUTE: &str = "password";

/// Remote names of the managed resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Names {
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub role: String,
    pub user: String,
}

impl Names {
    pub fn derive(prefix: &str, environment: &str, schema: &str) -> Self {
        let prefix = prefix.to_ascii_uppercase();
        let env = environment.to_ascii_uppercase();
        Self {
            warehouse: format!("{prefix}_WH_{env}"),
            database: format!("{prefix}_DB_{env}"),
            schema: schema.to_ascii_uppercase(),
            role: format!("{prefix}_APP_ROLE_{env}"),
            user: format!("{prefix}_SVC_{env}"),
        }
    }
}

/// The declared descriptor set plus what the output projector needs
#[derive(Debug, Clone)]
pub struct Environment {
    pub names: Names,
    pub set: DescriptorSet,
    pub connection: ConnectionSpec,
}

fn with_comment(builder: DescriptorBuilder, comment: Option<&String>) -> DescriptorBuilder {
    match comment {
        Some(comment) => builder.attr("comment", comment.as_str()),
        None => builder,
    }
}

impl Environment {
    pub fn declare(config: &ProvisionConfig, password: Sensitive<String>) -> Self {
        let names = Names::derive(&config.prefix, &config.environment, &config.schema.name);

        let warehouse = ResourceId::warehouse(&names.warehouse);
        let database = ResourceId::database(&names.database);
        let schema = ResourceId::schema(&database, &names.schema);
        let role = ResourceId::role(&names.role);
        let user = ResourceId::user(&names.user);

        let mut set = DescriptorSet::new();

        let wh = &config.warehouse;
        set.push(
            with_comment(Descriptor::builder(ResourceKind::Warehouse, &names.warehouse), wh.comment.as_ref())
                .attr("warehouse_size", canonical_warehouse_size(&wh.size))
                .attr("auto_suspend", wh.auto_suspend)
                .attr("auto_resume", wh.auto_resume)
                .create_only("initially_suspended", wh.initially_suspended)
                .build(),
        );

        let db = &config.database;
        let mut builder = with_comment(Descriptor::builder(ResourceKind::Database, &names.database), db.comment.as_ref())
            .attr("transient", db.transient);
        if let Some(days) = db.data_retention_time_in_days {
            builder = builder.attr("data_retention_time_in_days", days);
        }
        set.push(builder.build());

        set.push(
            with_comment(Descriptor::builder(ResourceKind::Schema, &schema.name), config.schema.comment.as_ref())
                .reference("database", &database)
                .attr("transient", db.transient)
                .build(),
        );

        set.push(with_comment(Descriptor::builder(ResourceKind::Role, &names.role), config.role.comment.as_ref()).build());

        let grants = [
            (&config.role.warehouse_privileges, &warehouse, GrantScope::Object),
            (&config.role.database_privileges, &database, GrantScope::Object),
            (&config.schema.privileges, &schema, GrantScope::Object),
        ];
        for (privileges, target, scope) in grants {
            set.push(Descriptor::grant(GrantSpec::new(&role, privileges, target, scope)));
        }
        if !config.role.future_table_privileges.is_empty() {
            set.push(Descriptor::grant(GrantSpec::new(
                &role,
                &config.role.future_table_privileges,
                &schema,
                GrantScope::Future {
                    object_type: "TABLES".to_string(),
                },
            )));
        }

        set.push(
            with_comment(Descriptor::builder(ResourceKind::User, &names.user), config.service_user.comment.as_ref())
                .reference("default_role", &role)
                .reference("default_warehouse", &warehouse)
                .reference("default_namespace", &schema)
                .secret(PASSWORD_ATTRIBUTE, password)
                .create_only("must_change_password", false)
                .build(),
        );

        let connection = ConnectionSpec {
            account: config.account.clone(),
            user,
            warehouse,
            database,
            schema,
            role,
            password_attribute: PASSWORD_ATTRIBUTE.to_string(),
        };

        Self {
            names,
            set,
            connection,
        }
    }
}
