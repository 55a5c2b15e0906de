//! Operator commands
//!
//! Each command loads settings, declares the environment and drives the
//! engine through its public API only.

pub mod apply;
pub mod destroy;
pub mod output;
pub mod plan;

use anyhow::Result;
use declarative::{CancelToken, ControlPlane, ConvergeReport, Engine, ExecuteOptions};
use snowkit::SnowflakePlane;
use std::sync::Arc;

use crate::Context;
use crate::config::Settings;
use crate::environment::Environment;

/// Settings and the declared environment for one invocation
pub struct Session {
    pub settings: Settings,
    pub environment: Environment,
}

impl Session {
    pub fn open(ctx: &Context) -> Result<Self> {
        let settings = Settings::load(ctx.config.as_deref())?;
        log::debug!("Loaded config from {}", settings.path.display());
        let environment = Environment::declare(&settings.config, settings.secrets.service_password.clone());
        log::info!(
            "Declared {} resources for {} ({})",
            environment.set.len(),
            settings.config.environment,
            settings.config.account
        );
        Ok(Self {
            settings,
            environment,
        })
    }

    /// Engine over the Snowflake control plane; the observer gets its own
    /// client when a separate credential is configured
    pub fn engine(&self, options: ExecuteOptions) -> Engine {
        let config = &self.settings.config;
        let plane: Arc<dyn ControlPlane> = Arc::new(SnowflakePlane::connect(config.admin_client(&self.settings.secrets)));
        let engine = Engine::new(plane).with_options(options);

        match config.observer_client(&self.settings.secrets) {
            Some(observer) => {
                log::info!("Observing with a separate credential");
                engine.with_observer(Arc::new(SnowflakePlane::connect(observer)))
            }
            None => engine,
        }
    }

    /// Options for observation only; the pass deadline is armed at execution
    pub fn plan_options(&self, jobs: Option<usize>) -> ExecuteOptions {
        let config = &self.settings.config;
        ExecuteOptions {
            jobs: jobs.unwrap_or(config.execution.jobs),
            retry: config.retry(),
            cancel: CancelToken::new(),
        }
    }
}

/// Engine errors already carry resource context; add the command name
pub(crate) fn engine_error(command: &str) -> impl FnOnce(declarative::Error) -> anyhow::Error + '_ {
    move |err| {
        let advice = match &err {
            declarative::Error::Observation { source, .. } => Some(source.category().advice()),
            _ => None,
        };
        let err = anyhow::Error::new(err);
        match advice {
            Some(advice) => err.context(format!("{command} failed ({advice})")),
            None => err.context(format!("{command} failed")),
        }
    }
}

/// Fail the process when any node failed
pub(crate) fn ensure_success(report: &ConvergeReport) -> Result<()> {
    if report.is_success() {
        return Ok(());
    }
    let failed: Vec<String> = report.failed().map(|o| o.id.to_string()).collect();
    let pending = report.summary.failed + report.summary.skipped;
    if report.cancelled {
        anyhow::bail!("pass cancelled with {pending} resource(s) not converged");
    }
    anyhow::bail!("{pending} resource(s) did not converge (failed: {})", failed.join(", "))
}
