//! # snowkit
//!
//! Snowflake backend for the `declarative` reconciliation engine.
//!
//! This crate provides:
//! - A blocking client for the SQL statements API (`/api/v2/statements`)
//! - Statement rendering with quoted identifiers and redacted secrets
//! - `SHOW` row parsing into descriptor attributes and held privileges
//! - Classification of HTTP and SQL failures into engine error signals
//!
//! ## Example
//!
//! ```no_run
//! use declarative::{ControlPlane, ResourceId, Sensitive};
//! use snowkit::{ClientConfig, SnowflakePlane};
//!
//! let config = ClientConfig::new("acme-xy12345", Sensitive::new("token".to_string()))
//!     .with_role("SYSADMIN");
//! let plane = SnowflakePlane::connect(config);
//! let state = plane.describe(&ResourceId::warehouse("ANALYTICS_WH"));
//! println!("{state:?}");
//! ```

pub mod client;
pub mod error;
pub mod plane;
pub mod rows;
pub mod sql;

pub use client::{ClientConfig, SqlClient, TokenType};
pub use error::{Error, Result};
pub use plane::{SnowflakePlane, StatementRunner};
pub use rows::{ResultSet, canonical_warehouse_size};
pub use sql::Statement;
