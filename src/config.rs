//! Configuration loading
//!
//! Settings come from a TOML file (`provision.toml` by default). Secrets are
//! never read from the file: they come from the environment only and are
//! wrapped in [`Sensitive`] as soon as they are read.
//!
//! # Environment Variables
//!
//! - `SNOWFLAKE_ADMIN_TOKEN` - administrative credential (required)
//! - `SNOWFLAKE_OBSERVER_TOKEN` - read-only credential for the observer (optional)
//! - `PROVISION_SERVICE_PASSWORD` - service account password (required)
//! - `SNOWFLAKE_ACCOUNT` - overrides `account`
//! - `PROVISION_ENVIRONMENT` - overrides `environment`
//! - `SNOWFLAKE_ENDPOINT` - overrides the API base URL

use anyhow::{Context, Result, bail};
use declarative::{CancelToken, ExecuteOptions, RetryConfig, Sensitive};
use serde::{Deserialize, Serialize};
use snowkit::{ClientConfig, TokenType};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "provision.toml";

pub const ENV_ADMIN_TOKEN: &str = "SNOWFLAKE_ADMIN_TOKEN";
pub const ENV_OBSERVER_TOKEN: &str = "SNOWFLAKE_OBSERVER_TOKEN";
pub const ENV_SERVICE_PASSWORD: &str = "PROVISION_SERVICE_PASSWORD";
pub const ENV_ACCOUNT: &str = "SNOWFLAKE_ACCOUNT";
pub const ENV_ENVIRONMENT: &str = "PROVISION_ENVIRONMENT";
pub const ENV_ENDPOINT: &str = "SNOWFLAKE_ENDPOINT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Account identifier, e.g. `acme-xy12345`
    #[serde(default)]
    pub account: String,

    /// Environment label embedded in resource names (`dev`, `prod`)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Name prefix for every managed resource
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// API base URL override
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub admin: CredentialConfig,

    /// Separate read-only credential for observation
    #[serde(default)]
    pub observer: Option<CredentialConfig>,

    #[serde(default)]
    pub warehouse: WarehouseConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub role: RoleConfig,

    #[serde(default)]
    pub service_user: ServiceUserConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialConfig {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub token_type: TokenType,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            role: Some("ACCOUNTADMIN".to_string()),
            token_type: TokenType::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseConfig {
    #[serde(default = "default_warehouse_size")]
    pub size: String,
    #[serde(default = "default_auto_suspend")]
    pub auto_suspend: u32,
    #[serde(default = "default_true")]
    pub auto_resume: bool,
    #[serde(default = "default_true")]
    pub initially_suspended: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            size: default_warehouse_size(),
            auto_suspend: default_auto_suspend(),
            auto_resume: true,
            initially_suspended: true,
            comment: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub data_retention_time_in_days: Option<u32>,
    #[serde(default)]
    pub transient: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    #[serde(default = "default_schema_name")]
    pub name: String,
    #[serde(default = "default_schema_privileges")]
    pub privileges: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            name: default_schema_name(),
            privileges: default_schema_privileges(),
            comment: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default = "default_usage")]
    pub warehouse_privileges: Vec<String>,
    #[serde(default = "default_usage")]
    pub database_privileges: Vec<String>,
    /// Privileges on tables created later in the schema; empty for none
    #[serde(default)]
    pub future_table_privileges: Vec<String>,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            comment: None,
            warehouse_privileges: default_usage(),
            database_privileges: default_usage(),
            future_table_privileges: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceUserConfig {
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    /// Pass deadline; no deadline when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            timeout_secs: None,
            retry_delay_ms: default_retry_delay_ms(),
            statement_timeout_secs: default_statement_timeout_secs(),
        }
    }
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_prefix() -> String {
    "ANALYTICS".to_string()
}

fn default_warehouse_size() -> String {
    "X-SMALL".to_string()
}

fn default_auto_suspend() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

fn default_schema_name() -> String {
    "APP".to_string()
}

fn default_schema_privileges() -> Vec<String> {
    vec!["USAGE".into(), "CREATE TABLE".into(), "CREATE VIEW".into()]
}

fn default_usage() -> Vec<String> {
    vec!["USAGE".into()]
}

fn default_jobs() -> usize {
    4
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_statement_timeout_secs() -> u64 {
    60
}

/// Whether `name` is usable as an unquoted identifier segment
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ProvisionConfig {
    /// Parse TOML content
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML format in provision config")
    }

    /// Load and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Apply non-secret overrides from the environment
    pub fn apply_env_overrides(&mut self, env: &dyn Fn(&str) -> Option<String>) {
        if let Some(account) = env(ENV_ACCOUNT) {
            log::debug!("Using account from {ENV_ACCOUNT}");
            self.account = account;
        }
        if let Some(environment) = env(ENV_ENVIRONMENT) {
            log::debug!("Using environment from {ENV_ENVIRONMENT}: {environment}");
            self.environment = environment;
        }
        if let Some(endpoint) = env(ENV_ENDPOINT) {
            log::debug!("Using endpoint from {ENV_ENDPOINT}: {endpoint}");
            self.endpoint = Some(endpoint);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.account.trim().is_empty() {
            bail!("account is not set (config `account` or {ENV_ACCOUNT})");
        }
        if !is_identifier(&self.environment) {
            bail!("environment '{}' must be alphanumeric", self.environment);
        }
        if !is_identifier(&self.prefix) {
            bail!("prefix '{}' must be a plain identifier", self.prefix);
        }
        if !is_identifier(&self.schema.name) {
            bail!("schema name '{}' must be a plain identifier", self.schema.name);
        }
        if self.execution.jobs == 0 {
            bail!("execution.jobs must be at least 1");
        }
        for (what, privileges) in [
            ("schema.privileges", &self.schema.privileges),
            ("role.warehouse_privileges", &self.role.warehouse_privileges),
            ("role.database_privileges", &self.role.database_privileges),
        ] {
            if privileges.iter().all(|p| p.trim().is_empty()) {
                bail!("{what} must name at least one privilege");
            }
        }
        Ok(())
    }

    /// Retry policy for control plane calls
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(2, Duration::from_millis(self.execution.retry_delay_ms))
    }

    /// Engine options; `timeout_secs` overrides the configured pass deadline
    pub fn execute_options(&self, jobs: Option<usize>, timeout_secs: Option<u64>) -> ExecuteOptions {
        let cancel = match timeout_secs.or(self.execution.timeout_secs) {
            Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
            None => CancelToken::new(),
        };
        ExecuteOptions {
            jobs: jobs.unwrap_or(self.execution.jobs),
            retry: self.retry(),
            cancel,
        }
    }

    fn client_config(&self, credential: &CredentialConfig, token: Sensitive<String>) -> ClientConfig {
        let mut config = ClientConfig::new(&self.account, token).with_token_type(credential.token_type);
        if let Some(role) = &credential.role {
            config = config.with_role(role);
        }
        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint);
        }
        config.statement_timeout = Duration::from_secs(self.execution.statement_timeout_secs);
        config.request_timeout = config.statement_timeout + Duration::from_secs(30);
        config
    }

    /// Client settings for the administrative credential
    pub fn admin_client(&self, secrets: &Secrets) -> ClientConfig {
        self.client_config(&self.admin, secrets.admin_token.clone())
    }

    /// Client settings for the observer, when a separate credential is configured
    pub fn observer_client(&self, secrets: &Secrets) -> Option<ClientConfig> {
        let credential = self.observer.as_ref()?;
        let token = secrets.observer_token.clone()?;
        Some(self.client_config(credential, token))
    }
}

/// Secrets read from the environment
#[derive(Debug, Clone)]
pub struct Secrets {
    pub admin_token: Sensitive<String>,
    pub observer_token: Option<Sensitive<String>>,
    pub service_password: Sensitive<String>,
}

impl Secrets {
    pub fn from_env(env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<Sensitive<String>> {
            env(key)
                .filter(|v| !v.is_empty())
                .map(Sensitive::new)
                .with_context(|| format!("{key} is not set"))
        };
        Ok(Self {
            admin_token: required(ENV_ADMIN_TOKEN)?,
            observer_token: env(ENV_OBSERVER_TOKEN).filter(|v| !v.is_empty()).map(Sensitive::new),
            service_password: required(ENV_SERVICE_PASSWORD)?,
        })
    }
}

/// Read a variable from the process environment
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Resolve the config file path
///
/// Priority:
/// 1. `--config` (with `~` expanded)
/// 2. `./provision.toml`
/// 3. `<config dir>/provision/provision.toml`
pub fn resolve_path(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(shellexpand::tilde(path).as_ref()));
    }

    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Ok(local);
    }

    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(dir.join("provision").join(DEFAULT_CONFIG_FILE))
}

/// Everything a command needs: validated settings plus secrets
pub struct Settings {
    pub config: ProvisionConfig,
    pub secrets: Secrets,
    pub path: PathBuf,
}

impl Settings {
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let path = resolve_path(explicit)?;
        log::info!("Loading config from {}", path.display());
        Self::load_with(&path, &process_env)
    }

    pub fn load_with(path: &Path, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = ProvisionConfig::load(path)?;
        config.apply_env_overrides(env);
        config.validate()?;
        let secrets = Secrets::from_env(env)?;
        Ok(Self {
            config,
            secrets,
            path: path.to_path_buf(),
        })
    }
}
