use anyhow::Result;
use declarative::Mode;

use super::{Session, engine_error};
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let engine = session.engine(session.plan_options(None));

    let pass = engine
        .plan(&session.environment.set, Mode::Apply)
        .map_err(engine_error("plan"))?;
    let plan = pass.plan();

    if plan.is_noop() {
        ui::success("No changes needed, environment is converged");
        return Ok(());
    }

    ui::display_plan(plan, ctx.verbose > 0);
    if plan.summary().conflict > 0 {
        ui::warn("Conflicting resources need manual replacement; apply will fail them");
    }
    if !ctx.quiet {
        ui::dim("Run 'provision apply' to make these changes");
    }
    Ok(())
}
