use anyhow::{Result, bail};
use declarative::{Mode, Outputs, View};

use super::{Session, engine_error};
use crate::Context;
use crate::cli::{OutputArgs, OutputFormat};
use crate::environment::Environment;
use crate::ui;

pub fn run(ctx: &Context, args: OutputArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let engine = session.engine(session.plan_options(None));
    let env = &session.environment;

    let pass = engine.plan(&env.set, Mode::Apply).map_err(engine_error("plan"))?;
    if !pass.plan().is_noop() {
        let summary = pass.plan().summary();
        bail!(
            "environment is not converged ({} to create, {} to update); run 'provision apply' first",
            summary.create,
            summary.update + summary.conflict
        );
    }

    let view = if args.show_sensitive {
        View::Authenticated
    } else {
        View::Redacted
    };
    let outputs = engine
        .outputs(&env.set, &pass.observed_report(), Some(&env.connection), view)
        .map_err(engine_error("output"))?;

    match args.format {
        OutputFormat::Text => print_text(&outputs, env),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outputs.to_json())?),
        OutputFormat::Env => {
            let Some(vars) = outputs.env_vars() else {
                bail!("env format requires --show-sensitive");
            };
            for line in env_lines(&vars) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

/// Human-readable outputs; the connection record only in the authenticated view
pub fn print_text(outputs: &Outputs, env: &Environment) {
    let conn = &env.connection;

    ui::header("Resources");
    ui::kv("warehouse", &env.names.warehouse);
    if let Some(size) = outputs.attribute(&conn.warehouse, "warehouse_size") {
        ui::kv("  size", &size);
    }
    if let Some(state) = outputs.attribute(&conn.warehouse, "state") {
        ui::kv("  state", &state.to_lowercase());
    }
    ui::kv("database", &env.names.database);
    ui::kv("schema", &conn.schema.name);
    ui::kv("role", &env.names.role);
    ui::kv("user", &env.names.user);

    match outputs.connection() {
        Some(connection) => {
            ui::header("Connection");
            ui::kv("account", &connection.account);
            ui::kv("user", &connection.user);
            ui::kv(
                "password",
                connection.password.as_ref().map_or("(not set)", |p| p.expose().as_str()),
            );
            ui::kv("warehouse", &connection.warehouse);
            ui::kv("database", &connection.database);
            ui::kv("schema", &connection.schema);
            ui::kv("role", &connection.role);
        }
        None if outputs.has_connection() => {
            println!();
            ui::dim("Connection details hidden; pass --show-sensitive to reveal them");
        }
        None => {}
    }
}

fn env_lines(vars: &[(&str, String)]) -> Vec<String> {
    vars.iter()
        .map(|(key, value)| format!("export {key}={}", shell_quote(value)))
        .collect()
}

/// Single-quote for POSIX shells
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
