//! MCP tool request types.
//!
//! These structs define the parameters for each MCP tool exposed by the server.

use rmcp::schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AuthLoginRequest {
    #[schemars(description = "Shared secret configured on the server (AUTH_SECRET)")]
    pub secret: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AuthLogoutRequest {
    #[schemars(description = "Session id returned by auth_login")]
    #[serde(rename = "sessionId", alias = "session_id")]
    pub session_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BuscarHomologacionesRequest {
    #[schemars(description = "Session id returned by auth_login")]
    #[serde(rename = "sessionId", alias = "session_id")]
    pub session_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteQueryRequest {
    #[schemars(description = "SQL SELECT query to execute")]
    pub query: String,
    #[schemars(description = "Maximum rows to return, appended as LIMIT when the query has none (default: 1000)")]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTableSchemaRequest {
    #[schemars(description = "Name of the table")]
    #[serde(rename = "tableName", alias = "table_name")]
    pub table_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SuggestQueriesRequest {
    #[schemars(description = "The user's question or need, in natural language")]
    #[serde(rename = "userQuestion", alias = "user_question")]
    pub user_question: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InsertDataRequest {
    #[schemars(description = "Name of the table to insert into")]
    pub table: String,
    #[schemars(description = "Row to insert as a column-to-value mapping")]
    pub data: Map<String, Value>,
}
