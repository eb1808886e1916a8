//! Homologaciones MCP Server
//!
//! This library provides an MCP (Model Context Protocol) server exposing
//! session-gated access to a remote "homologaciones" (approval-record) API
//! plus a set of PostgreSQL inspection tools.
//!
//! # Architecture
//!
//! - **SessionStore**: in-memory map of session id to last activity, with a
//!   30-minute sliding TTL and a 10-minute background sweep.
//! - **AuthGateway**: compares the submitted secret against `AUTH_SECRET`
//!   and mints sessions on a match.
//! - **DbGateway**: one PostgreSQL connection per tool call (no pooling),
//!   configured from `DB_*` environment variables.
//! - **ApprovalGateway**: single HTTP GET against the homologaciones API.
//! - **HomologacionMcpServer**: the MCP server wiring those components to
//!   named tools over stdio, using the `rmcp` crate.
//!
//! # Tools
//!
//! ## Authentication
//! - `auth_login`: Exchange the shared secret for a sessionId
//! - `auth_logout`: Revoke a sessionId
//! - `auth_help`: Describe the authentication flow
//!
//! ## Homologaciones
//! - `buscar_homologaciones_aprobadas`: Fetch approved records (needs a sessionId)
//!
//! ## Database
//! - `get_database_context`: Full structure, keys, counts, and sample data
//! - `get_table_relationships`: All foreign-key edges
//! - `execute_query`: Run a SELECT (non-SELECT statements are rejected)
//! - `get_table_schema`: Column details for one table
//! - `list_tables`: All public tables
//! - `suggest_queries`: Keyword-based SQL suggestions
//! - `insert_data`: Insert one row with validated identifiers and typed parameters
//! - `test_connection`: Round-trip connectivity check

pub mod config;
pub mod db;
pub mod error;
pub mod homologacion;
pub mod server;
pub mod session;

pub use config::{AuthConfig, DbConfig};
pub use db::DbGateway;
pub use error::ToolError;
pub use homologacion::ApprovalGateway;
pub use server::HomologacionMcpServer;
pub use session::{AuthGateway, SessionStore, SESSION_TTL, SWEEP_INTERVAL};
