//! SQL statements API client.
//!
//! Statements are submitted synchronously to `/api/v2/statements`. A `202`
//! answer means the statement outlived its server-side timeout and is
//! reported as [`Error::StillRunning`]. Results spread over several
//! partitions are fetched and concatenated.

use crate::error::{Error, Result};
use crate::rows::{self, ErrorResponse, PartitionResponse, ResultSet, StatementResponse};
use crate::sql::Statement;
use declarative::Sensitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const USER_AGENT: &str = concat!("snowkit/", env!("CARGO_PKG_VERSION"));

/// How the bearer token was issued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    #[default]
    KeypairJwt,
    Oauth,
    ProgrammaticAccessToken,
}

impl TokenType {
    /// Value of the `X-Snowflake-Authorization-Token-Type` header
    pub fn header_value(&self) -> &'static str {
        match self {
            Self::KeypairJwt => "KEYPAIR_JWT",
            Self::Oauth => "OAUTH",
            Self::ProgrammaticAccessToken => "PROGRAMMATIC_ACCESS_TOKEN",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_value())
    }
}

/// Connection settings for one credential
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Account identifier (`orgname-account` or locator)
    pub account: String,
    /// Base URL override; defaults to `https://<account>.snowflakecomputing.com`
    pub endpoint: Option<String>,
    pub token: Sensitive<String>,
    pub token_type: TokenType,
    /// Role statements run under
    pub role: Option<String>,
    /// Server-side statement timeout
    pub statement_timeout: Duration,
    /// Client-side request timeout
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(account: impl Into<String>, token: Sensitive<String>) -> Self {
        Self {
            account: account.into(),
            endpoint: None,
            token,
            token_type: TokenType::default(),
            role: None,
            statement_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(90),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    #[must_use]
    pub fn with_token_type(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.snowflakecomputing.com", self.account.to_ascii_lowercase()),
        }
    }
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

/// Blocking client for the SQL statements API
pub struct SqlClient {
    agent: ureq::Agent,
    config: ClientConfig,
    base_url: String,
}

impl SqlClient {
    pub fn new(config: ClientConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.request_timeout))
            .http_status_as_error(false)
            .build()
            .into();
        let base_url = config.base_url();
        Self {
            agent,
            config,
            base_url,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn statements_url(&self) -> String {
        format!("{}/api/v2/statements", self.base_url)
    }

    fn partition_url(&self, handle: &str, partition: usize) -> String {
        format!("{}/api/v2/statements/{handle}?partition={partition}", self.base_url)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.config.token.expose())
    }

    /// Execute one statement and return its rows.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures, non-success statuses and
    /// unreadable bodies.
    pub fn execute(&self, statement: &Statement) -> Result<ResultSet> {
        log::debug!("sql: {statement}");
        let request = StatementRequest {
            statement: statement.text(),
            timeout: self.config.statement_timeout.as_secs(),
            role: self.config.role.as_deref(),
        };

        let mut response = self
            .agent
            .post(&self.statements_url())
            .header("Authorization", &self.bearer())
            .header("X-Snowflake-Authorization-Token-Type", self.config.token_type.header_value())
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send_json(&request)?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        let parsed = parse_response(status, &body)?;

        let partitions = parsed
            .result_set_meta_data
            .as_ref()
            .map_or(0, |meta| meta.partition_info.len());
        let handle = parsed.statement_handle.clone();
        let mut set = ResultSet::from_response(parsed);
        for partition in 1..partitions {
            set.extend(self.fetch_partition(&handle, partition)?);
        }
        rows::require_columns(&set)?;
        Ok(set)
    }

    fn fetch_partition(&self, handle: &str, partition: usize) -> Result<Vec<Vec<Option<String>>>> {
        log::debug!("sql: fetching partition {partition} of {handle}");
        let mut response = self
            .agent
            .get(&self.partition_url(handle, partition))
            .header("Authorization", &self.bearer())
            .header("X-Snowflake-Authorization-Token-Type", self.config.token_type.header_value())
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .call()?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        if status != 200 {
            return Err(status_error(status, &body));
        }
        let partition: PartitionResponse = serde_json::from_str(&body)?;
        Ok(partition.data)
    }
}

fn status_error(status: u16, body: &str) -> Error {
    let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();
    if status == 202 {
        return Error::StillRunning {
            handle: parsed.statement_handle,
        };
    }
    let message = if parsed.message.is_empty() {
        format!("HTTP {status}")
    } else {
        parsed.message
    };
    Error::Statement {
        status,
        code: parsed.code,
        message,
    }
}

/// Interpret a statement response by status
pub(crate) fn parse_response(status: u16, body: &str) -> Result<StatementResponse> {
    match status {
        200 => Ok(serde_json::from_str(body)?),
        _ => Err(status_error(status, body)),
    }
}
