use anyhow::Result;
use declarative::Mode;

use super::{Session, engine_error, ensure_success};
use crate::Context;
use crate::cli::DestroyArgs;
use crate::ui;

pub fn run(ctx: &Context, args: DestroyArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let engine = session.engine(session.plan_options(args.jobs));

    let pass = engine
        .plan(&session.environment.set, Mode::Destroy)
        .map_err(engine_error("plan"))?;

    if pass.plan().is_noop() {
        ui::success("Nothing to destroy");
        return Ok(());
    }

    ui::display_plan(pass.plan(), ctx.verbose > 0);

    if !args.yes {
        println!();
        let prompt = format!(
            "Delete {} resource(s) in {}?",
            pass.plan().mutation_count(),
            session.settings.config.environment
        );
        if !ui::confirm(&prompt, false)? {
            ui::info("Aborted");
            return Ok(());
        }
    }

    let engine = engine.with_options(session.settings.config.execute_options(args.jobs, None));
    let mut progress = ui::BarProgress::new(ctx.verbose > 0);
    let report = engine.execute(pass, &mut progress).map_err(engine_error("destroy"))?;
    ui::display_report(&report);
    ensure_success(&report)
}
