//! MCP server implementation with auth, database, and homologaciones tools.

mod requests;

pub use requests::*;

use crate::db::DbGateway;
use crate::error::ToolError;
use crate::homologacion::ApprovalGateway;
use crate::session::{AuthGateway, SessionStore};
use chrono::Utc;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default row cap for `execute_query` when the caller gives none.
const DEFAULT_QUERY_LIMIT: i64 = 1000;

/// MCP server exposing session-gated homologaciones lookup plus PostgreSQL
/// inspection tools.
#[derive(Clone)]
pub struct HomologacionMcpServer {
    sessions: Arc<SessionStore>,
    auth: Arc<AuthGateway>,
    db: Arc<DbGateway>,
    approvals: Arc<ApprovalGateway>,
    tool_router: ToolRouter<Self>,
}

impl HomologacionMcpServer {
    pub fn new(
        sessions: Arc<SessionStore>,
        auth: Arc<AuthGateway>,
        db: Arc<DbGateway>,
        approvals: Arc<ApprovalGateway>,
    ) -> Self {
        Self {
            sessions,
            auth,
            db,
            approvals,
            tool_router: Self::tool_router(),
        }
    }

    fn instructions(&self) -> String {
        format!(
            "Homologaciones MCP server. \
             \n\nWorkflow: \
             \n1. auth_login: Exchange the shared secret for a sessionId. \
             \n2. buscar_homologaciones_aprobadas: Fetch approved records (requires sessionId). \
             \n3. auth_logout: Revoke the sessionId when done. \
             \n\nSessions expire after {} minutes of inactivity; each successful use renews the window. \
             \n\nDatabase tools (no session required): get_database_context, get_table_relationships, \
             execute_query (SELECT only), get_table_schema, list_tables, suggest_queries, \
             insert_data, test_connection. \
             \nTip: call auth_help for the full authentication flow.",
            self.sessions.ttl().as_secs() / 60
        )
    }

    fn json_result(value: &Value) -> CallToolResult {
        CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        )])
    }

    fn json_error(value: &Value) -> CallToolResult {
        CallToolResult {
            content: vec![Content::text(
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            )],
            is_error: Some(true),
            meta: None,
            structured_content: None,
        }
    }

    fn unauthorized() -> CallToolResult {
        Self::json_error(&json!({
            "error": true,
            "message": "Invalid or expired session. Call auth_login to obtain a new sessionId.",
            "requiredAction": "auth_login",
        }))
    }

    fn is_select(query: &str) -> bool {
        query.trim().to_lowercase().starts_with("select")
    }
}

#[tool_router]
impl HomologacionMcpServer {
    #[tool(
        description = "Authenticate with the shared secret. On success returns a sessionId \
        valid for 30 minutes of inactivity; every authenticated call renews the window."
    )]
    #[instrument(skip(self, req))]
    async fn auth_login(
        &self,
        Parameters(req): Parameters<AuthLoginRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: auth_login");
        let outcome = self.auth.authenticate(&req.secret);
        let mut value = serde_json::to_value(&outcome).unwrap_or_else(|_| json!({}));
        if outcome.success {
            if let Value::Object(map) = &mut value {
                map.insert(
                    "expiresIn".to_string(),
                    json!(self.sessions.ttl().as_secs()),
                );
            }
        }
        // Auth failure is a structured, retryable result, not a tool error.
        Ok(Self::json_result(&value))
    }

    #[tool(description = "Revoke a sessionId obtained from auth_login.")]
    #[instrument(skip(self, req))]
    async fn auth_logout(
        &self,
        Parameters(req): Parameters<AuthLogoutRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: auth_logout");
        let revoked = self.sessions.revoke(&req.session_id);
        let message = if revoked {
            "Session closed."
        } else {
            "Session not found (already expired or logged out)."
        };
        Ok(Self::json_result(&json!({
            "success": revoked,
            "message": message,
        })))
    }

    #[tool(description = "Explain the authentication flow and session rules.")]
    async fn auth_help(&self) -> Result<CallToolResult, McpError> {
        debug!("Tool call: auth_help");
        Ok(Self::json_result(&json!({
            "flow": [
                "Call auth_login with the shared secret to receive a sessionId.",
                "Pass that sessionId to protected tools such as buscar_homologaciones_aprobadas.",
                "Call auth_logout to revoke the sessionId when you are done.",
            ],
            "session": {
                "ttlMinutes": self.sessions.ttl().as_secs() / 60,
                "renewal": "Each successful use of a sessionId restarts its inactivity window.",
                "expiry": "Unused sessions are swept automatically and must be re-created via auth_login.",
            },
            "protectedTools": ["buscar_homologaciones_aprobadas"],
        })))
    }

    #[tool(
        description = "Fetch approved homologaciones from the remote API. Requires a valid \
        sessionId from auth_login."
    )]
    #[instrument(skip(self, req))]
    async fn buscar_homologaciones_aprobadas(
        &self,
        Parameters(req): Parameters<BuscarHomologacionesRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: buscar_homologaciones_aprobadas");
        if !self.sessions.validate(&req.session_id) {
            return Ok(Self::unauthorized());
        }
        match self.approvals.fetch_approved().await {
            Ok(data) => Ok(Self::json_result(&json!({
                "authenticated": true,
                "sessionId": req.session_id,
                "data": data,
                "timestamp": Utc::now().to_rfc3339(),
            }))),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(
        description = "Analyze the whole database: tables, columns, keys, relationships, \
        row counts, and sample data."
    )]
    #[instrument(skip(self))]
    async fn get_database_context(&self) -> Result<CallToolResult, McpError> {
        debug!("Tool call: get_database_context");
        match self.db.database_context().await {
            Ok(value) => Ok(Self::json_result(&value)),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(description = "List all foreign-key relationships between tables.")]
    #[instrument(skip(self))]
    async fn get_table_relationships(&self) -> Result<CallToolResult, McpError> {
        debug!("Tool call: get_table_relationships");
        match self.db.table_relationships().await {
            Ok(value) => Ok(Self::json_result(&value)),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(
        description = "Execute a SQL SELECT query. Non-SELECT statements are rejected; a \
        LIMIT is appended when the query has none (default 1000)."
    )]
    #[instrument(skip(self, req), fields(limit = req.limit))]
    async fn execute_query(
        &self,
        Parameters(req): Parameters<ExecuteQueryRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: execute_query");
        // Reject before touching the database.
        if !Self::is_select(&req.query) {
            return Ok(ToolError::NonSelectQuery(snippet(&req.query)).to_tool_result());
        }
        let limit = req.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        if limit <= 0 {
            return Ok(
                ToolError::InvalidParams(format!("limit must be positive, got {limit}"))
                    .to_tool_result(),
            );
        }
        match self.db.execute_select(&req.query, limit).await {
            Ok(value) => Ok(Self::json_result(&value)),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(description = "Get the detailed column structure of one table.")]
    #[instrument(skip(self, req), fields(table = %req.table_name))]
    async fn get_table_schema(
        &self,
        Parameters(req): Parameters<GetTableSchemaRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: get_table_schema");
        match self.db.table_schema(&req.table_name).await {
            Ok(value) => Ok(Self::json_result(&value)),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(description = "List all tables available in the database.")]
    #[instrument(skip(self))]
    async fn list_tables(&self) -> Result<CallToolResult, McpError> {
        debug!("Tool call: list_tables");
        match self.db.list_tables().await {
            Ok(value) => Ok(Self::json_result(&value)),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(description = "Suggest useful SQL queries based on the user's question.")]
    async fn suggest_queries(
        &self,
        Parameters(req): Parameters<SuggestQueriesRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: suggest_queries");
        Ok(Self::json_result(&suggest_queries_for(&req.user_question)))
    }

    #[tool(
        description = "Insert one row into a table. Column names are validated and values \
        are bound as typed parameters."
    )]
    #[instrument(skip(self, req), fields(table = %req.table))]
    async fn insert_data(
        &self,
        Parameters(req): Parameters<InsertDataRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: insert_data");
        match self.db.insert_row(&req.table, &req.data).await {
            Ok(value) => Ok(Self::json_result(&value)),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(description = "Verify that the database connection works.")]
    #[instrument(skip(self))]
    async fn test_connection(&self) -> Result<CallToolResult, McpError> {
        debug!("Tool call: test_connection");
        match self.db.test_connection().await {
            Ok(value) => Ok(Self::json_result(&value)),
            Err(e) => Ok(e.to_tool_result()),
        }
    }
}

#[tool_handler]
impl ServerHandler for HomologacionMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(self.instructions()),
            ..Default::default()
        }
    }
}

/// Keyword-to-SQL suggestion map carried over from the original tool.
const SUGGESTION_MAP: &[(&str, &[&str])] = &[
    (
        "homologaciones aprobadas",
        &[
            "SELECT * FROM homologaciones WHERE estado = 'Aprobado'",
            "SELECT COUNT(*) as total_aprobadas FROM homologaciones WHERE estado = 'Aprobado'",
        ],
    ),
    (
        "homologaciones pendientes",
        &[
            "SELECT * FROM homologaciones WHERE estado = 'Pendiente'",
            "SELECT COUNT(*) as total_pendientes FROM homologaciones WHERE estado = 'Pendiente'",
        ],
    ),
    (
        "usuarios",
        &[
            "SELECT * FROM usuarios",
            "SELECT tipo_usuario, COUNT(*) as cantidad FROM usuarios GROUP BY tipo_usuario",
        ],
    ),
    (
        "reportes",
        &[
            "SELECT estado, COUNT(*) as cantidad FROM homologaciones GROUP BY estado",
            "SELECT DATE_TRUNC('month', fecha_solicitud) as mes, COUNT(*) FROM homologaciones GROUP BY mes ORDER BY mes",
        ],
    ),
    (
        "estadísticas",
        &[
            "SELECT COUNT(*) as total_homologaciones FROM homologaciones",
            "SELECT AVG(EXTRACT(DAY FROM (fecha_aprobacion - fecha_solicitud))) as dias_promedio_aprobacion FROM homologaciones WHERE fecha_aprobacion IS NOT NULL",
        ],
    ),
];

/// Fallback suggestions when no keyword matches.
const GENERAL_SUGGESTIONS: &[&str] = &[
    "SELECT * FROM homologaciones LIMIT 10",
    "SELECT * FROM usuarios LIMIT 10",
    "SELECT table_name FROM information_schema.tables WHERE table_schema = 'public'",
];

fn suggest_queries_for(user_question: &str) -> Value {
    let lower = user_question.to_lowercase();
    let mut suggestions: Vec<Value> = SUGGESTION_MAP
        .iter()
        .filter(|(keyword, _)| lower.contains(keyword))
        .map(|(keyword, queries)| json!({ "keyword": keyword, "queries": queries }))
        .collect();

    if suggestions.is_empty() {
        suggestions.push(json!({
            "keyword": "consultas generales",
            "queries": GENERAL_SUGGESTIONS,
        }));
    }

    let total: usize = suggestions
        .iter()
        .filter_map(|s| s.get("queries").and_then(|q| q.as_array()).map(Vec::len))
        .sum();

    json!({
        "userQuestion": user_question,
        "suggestions": suggestions,
        "tip": "Use the execute_query tool to run any of these queries",
        "totalSuggestions": total,
    })
}

fn snippet(query: &str) -> String {
    let trimmed = query.trim();
    let mut end = trimmed.len().min(60);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;

    fn test_server(secret: Option<&str>) -> HomologacionMcpServer {
        test_server_with(secret, ApprovalGateway::new())
    }

    fn test_server_with(secret: Option<&str>, approvals: ApprovalGateway) -> HomologacionMcpServer {
        let sessions = Arc::new(SessionStore::new());
        let auth = Arc::new(AuthGateway::new(
            secret.map(str::to_string),
            Arc::clone(&sessions),
        ));
        let db = Arc::new(DbGateway::new(DbConfig::from_lookup(|_| None)));
        HomologacionMcpServer::new(sessions, auth, db, Arc::new(approvals))
    }

    fn payload(result: &CallToolResult) -> Value {
        let text = result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .expect("text content");
        serde_json::from_str(&text).expect("JSON payload")
    }

    #[tokio::test]
    async fn login_then_logout_round_trip() {
        let server = test_server(Some("hunter2"));

        let login = server
            .auth_login(Parameters(AuthLoginRequest {
                secret: "hunter2".to_string(),
            }))
            .await
            .expect("tool call");
        let login_payload = payload(&login);
        assert_eq!(login_payload["success"], json!(true));
        assert_eq!(login_payload["expiresIn"], json!(1800));
        let session_id = login_payload["sessionId"]
            .as_str()
            .expect("sessionId on success")
            .to_string();
        assert!(!session_id.is_empty());

        let logout = server
            .auth_logout(Parameters(AuthLogoutRequest {
                session_id: session_id.clone(),
            }))
            .await
            .expect("tool call");
        assert_eq!(payload(&logout)["success"], json!(true));

        // Second logout reports the session as gone.
        let again = server
            .auth_logout(Parameters(AuthLogoutRequest { session_id }))
            .await
            .expect("tool call");
        assert_eq!(payload(&again)["success"], json!(false));
    }

    #[tokio::test]
    async fn wrong_secret_returns_structured_failure() {
        let server = test_server(Some("hunter2"));
        let result = server
            .auth_login(Parameters(AuthLoginRequest {
                secret: "wrong".to_string(),
            }))
            .await
            .expect("tool call");
        // Retryable user fault: structured payload, not a tool error.
        assert_ne!(result.is_error, Some(true));
        let value = payload(&result);
        assert_eq!(value["success"], json!(false));
        assert!(value.get("sessionId").is_none());
    }

    #[tokio::test]
    async fn missing_secret_config_names_the_variable() {
        let server = test_server(None);
        let result = server
            .auth_login(Parameters(AuthLoginRequest {
                secret: "anything".to_string(),
            }))
            .await
            .expect("tool call");
        let value = payload(&result);
        assert_eq!(value["success"], json!(false));
        assert!(value["message"].as_str().unwrap().contains("AUTH_SECRET"));
    }

    #[tokio::test]
    async fn login_fetch_logout_full_flow() {
        let records = json!([{"id": 7, "estatus": "Aprobado"}]);
        let endpoint = crate::homologacion::test_support::one_shot_server(
            "HTTP/1.1 200 OK",
            records.to_string(),
        )
        .await;
        let server = test_server_with(Some("hunter2"), ApprovalGateway::with_endpoint(endpoint));

        let login = server
            .auth_login(Parameters(AuthLoginRequest {
                secret: "hunter2".to_string(),
            }))
            .await
            .expect("tool call");
        let session_id = payload(&login)["sessionId"].as_str().unwrap().to_string();

        let fetch = server
            .buscar_homologaciones_aprobadas(Parameters(BuscarHomologacionesRequest {
                session_id: session_id.clone(),
            }))
            .await
            .expect("tool call");
        assert_ne!(fetch.is_error, Some(true));
        let value = payload(&fetch);
        assert_eq!(value["authenticated"], json!(true));
        assert_eq!(value["sessionId"], json!(session_id));
        assert_eq!(value["data"], records);
        assert!(value["timestamp"].as_str().is_some());

        let logout = server
            .auth_logout(Parameters(AuthLogoutRequest {
                session_id: session_id.clone(),
            }))
            .await
            .expect("tool call");
        assert_eq!(payload(&logout)["success"], json!(true));

        // The revoked session must not reach the remote API again.
        let rejected = server
            .buscar_homologaciones_aprobadas(Parameters(BuscarHomologacionesRequest {
                session_id,
            }))
            .await
            .expect("tool call");
        assert_eq!(rejected.is_error, Some(true));
        assert_eq!(payload(&rejected)["requiredAction"], json!("auth_login"));
    }

    #[tokio::test]
    async fn protected_tool_rejects_revoked_session() {
        let server = test_server(Some("hunter2"));
        let login = server
            .auth_login(Parameters(AuthLoginRequest {
                secret: "hunter2".to_string(),
            }))
            .await
            .expect("tool call");
        let session_id = payload(&login)["sessionId"].as_str().unwrap().to_string();

        server
            .auth_logout(Parameters(AuthLogoutRequest {
                session_id: session_id.clone(),
            }))
            .await
            .expect("tool call");

        let result = server
            .buscar_homologaciones_aprobadas(Parameters(BuscarHomologacionesRequest {
                session_id,
            }))
            .await
            .expect("tool call");
        assert_eq!(result.is_error, Some(true));
        let value = payload(&result);
        assert_eq!(value["requiredAction"], json!("auth_login"));
    }

    #[tokio::test]
    async fn protected_tool_rejects_unknown_session() {
        let server = test_server(Some("hunter2"));
        let result = server
            .buscar_homologaciones_aprobadas(Parameters(BuscarHomologacionesRequest {
                session_id: "session_0_bogus".to_string(),
            }))
            .await
            .expect("tool call");
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn non_select_query_is_rejected_before_any_db_work() {
        // The DB gateway has no configuration, so reaching it would surface
        // a missing-config message instead of the SELECT restriction.
        let server = test_server(Some("hunter2"));
        let result = server
            .execute_query(Parameters(ExecuteQueryRequest {
                query: "DROP TABLE homologaciones".to_string(),
                limit: None,
            }))
            .await
            .expect("tool call");
        assert_eq!(result.is_error, Some(true));
        let text = result.content.first().and_then(|c| c.as_text()).unwrap();
        assert!(text.text.contains("SELECT"));
        assert!(!text.text.contains("DB_HOST"));
    }

    #[tokio::test]
    async fn select_check_is_case_insensitive() {
        assert!(HomologacionMcpServer::is_select("  SeLeCt 1"));
        assert!(HomologacionMcpServer::is_select("select * from t"));
        assert!(!HomologacionMcpServer::is_select("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!HomologacionMcpServer::is_select("delete from t"));
        let server = test_server(None);
        let result = server
            .execute_query(Parameters(ExecuteQueryRequest {
                query: "UPDATE t SET a = 1".to_string(),
                limit: Some(10),
            }))
            .await
            .expect("tool call");
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn non_positive_limit_is_rejected() {
        let server = test_server(None);
        let result = server
            .execute_query(Parameters(ExecuteQueryRequest {
                query: "SELECT 1".to_string(),
                limit: Some(0),
            }))
            .await
            .expect("tool call");
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn auth_help_is_static_and_successful() {
        let server = test_server(None);
        let result = server.auth_help().await.expect("tool call");
        assert_ne!(result.is_error, Some(true));
        let value = payload(&result);
        assert_eq!(value["session"]["ttlMinutes"], json!(30));
    }

    #[test]
    fn suggestions_match_known_keywords() {
        let value = suggest_queries_for("cuántas homologaciones aprobadas hay?");
        let suggestions = value["suggestions"].as_array().unwrap();
        assert_eq!(suggestions[0]["keyword"], json!("homologaciones aprobadas"));
        assert_eq!(value["totalSuggestions"], json!(2));
    }

    #[test]
    fn suggestions_fall_back_to_general_queries() {
        let value = suggest_queries_for("algo completamente distinto");
        let suggestions = value["suggestions"].as_array().unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0]["keyword"], json!("consultas generales"));
        assert_eq!(value["totalSuggestions"], json!(3));
    }

    #[test]
    fn suggestions_can_combine_multiple_keywords() {
        let value = suggest_queries_for("reportes de usuarios");
        let suggestions = value["suggestions"].as_array().unwrap();
        assert_eq!(suggestions.len(), 2);
        assert_eq!(value["totalSuggestions"], json!(4));
    }
}
