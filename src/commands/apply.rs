use anyhow::Result;
use declarative::{Mode, View};

use super::{Session, engine_error, ensure_success, output};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let engine = session.engine(session.plan_options(args.jobs));
    let env = &session.environment;

    let pass = engine.plan(&env.set, Mode::Apply).map_err(engine_error("plan"))?;

    if pass.plan().is_noop() {
        ui::success("No changes needed, environment is converged");
        let outputs = engine
            .outputs(&env.set, &pass.observed_report(), Some(&env.connection), View::Redacted)
            .map_err(engine_error("output"))?;
        output::print_text(&outputs, env);
        return Ok(());
    }

    ui::display_plan(pass.plan(), ctx.verbose > 0);

    if !args.yes {
        println!();
        if !ui::confirm("Apply these changes?", true)? {
            ui::info("Aborted");
            return Ok(());
        }
    }

    // Deadline starts now, not while the operator was reading the plan
    let options = session.settings.config.execute_options(args.jobs, args.timeout);
    let engine = engine.with_options(options);

    let mut progress = ui::BarProgress::new(ctx.verbose > 0);
    let report = engine.execute(pass, &mut progress).map_err(engine_error("apply"))?;
    ui::display_report(&report);
    ensure_success(&report)?;

    let outputs = engine
        .outputs(&env.set, &report, Some(&env.connection), View::Redacted)
        .map_err(engine_error("output"))?;
    output::print_text(&outputs, env);
    if !ctx.quiet {
        ui::dim("Run 'provision output --show-sensitive' for the service credentials");
    }
    Ok(())
}
