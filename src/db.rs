//! PostgreSQL gateway.
//!
//! One connection is opened per tool call and dropped when the call
//! finishes; there is no pooling. Caller-supplied SQL runs over the simple
//! query protocol so arbitrary SELECTs work regardless of column types,
//! while the fixed introspection queries use binary parameters.
//!
//! Table and column names supplied by the caller are validated against a
//! strict identifier pattern and double-quoted before interpolation; values
//! are always bound as statement parameters.

use crate::config::DbConfig;
use crate::error::ToolError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, Row, SimpleQueryMessage};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Timeout for establishing a database connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Sample rows fetched per table in the full database context.
const SAMPLE_ROWS: i64 = 3;

/// Gateway holding the (possibly absent) database configuration.
///
/// A missing configuration does not prevent construction; every operation
/// fails deterministically with the stored configuration-fault message.
pub struct DbGateway {
    config: Result<DbConfig, String>,
}

impl DbGateway {
    pub fn new(config: Result<DbConfig, ToolError>) -> Self {
        Self {
            config: config.map_err(|e| e.to_string()),
        }
    }

    fn config(&self) -> Result<&DbConfig, ToolError> {
        self.config
            .as_ref()
            .map_err(|msg| ToolError::MissingConfig(msg.clone()))
    }

    /// Open a fresh connection and spawn its driver task. The connection
    /// closes when the returned client is dropped.
    async fn connect(&self) -> Result<Client, ToolError> {
        let config = self.config()?;
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .user(&config.user)
            .password(&config.password)
            .dbname(&config.dbname)
            .connect_timeout(CONNECT_TIMEOUT);

        debug!(host = %config.host, dbname = %config.dbname, "Connecting to PostgreSQL");
        let (client, connection) = pg.connect(NoTls).await.map_err(|e| {
            error!(host = %config.host, dbname = %config.dbname, error = %e, "Connection failed");
            ToolError::Database(format!("connection to {} failed: {e}", config.host))
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Database connection error");
            }
        });

        info!(host = %config.host, dbname = %config.dbname, "Connected to PostgreSQL");
        Ok(client)
    }

    /// Full structural context: every public table with columns, keys,
    /// row count, and a few sample rows.
    pub async fn database_context(&self) -> Result<Value, ToolError> {
        let client = self.connect().await?;
        let tables = client.query(LIST_TABLES_SQL, &[]).await?;

        let mut table_details = Vec::with_capacity(tables.len());
        let mut total_rows: i64 = 0;
        for table in &tables {
            let name: String = table.try_get("table_name")?;
            let comment: Option<String> = table.try_get("table_comment")?;

            let columns = client.query(TABLE_COLUMNS_SQL, &[&name]).await?;
            let primary_keys = client.query(TABLE_PRIMARY_KEYS_SQL, &[&name]).await?;
            let foreign_keys = client.query(TABLE_FOREIGN_KEYS_SQL, &[&name]).await?;

            // Table names come from information_schema, but quote them anyway.
            let ident = quote_identifier(&name)?;
            let count_row = client
                .query_one(&format!("SELECT COUNT(*)::bigint AS total FROM {ident}"), &[])
                .await?;
            let row_count: i64 = count_row.try_get("total")?;
            total_rows += row_count;

            // Serialize sample rows server-side so every column type (numeric,
            // arrays, ...) survives the trip as real JSON.
            let sample = client
                .query(
                    &format!(
                        "SELECT to_jsonb({ident}.*) AS sample_row FROM {ident} LIMIT {SAMPLE_ROWS}"
                    ),
                    &[],
                )
                .await?;

            table_details.push(json!({
                "name": name,
                "comment": comment,
                "totalRows": row_count,
                "columns": rows_to_json(&columns),
                "primaryKeys": primary_keys
                    .iter()
                    .map(|r| r.try_get::<_, String>("column_name"))
                    .collect::<Result<Vec<_>, _>>()?,
                "foreignKeys": rows_to_json(&foreign_keys),
                "sampleData": sample
                    .iter()
                    .map(|r| r.try_get::<_, Value>("sample_row"))
                    .collect::<Result<Vec<_>, _>>()?,
            }));
        }

        let dbname = self.config()?.dbname.clone();
        Ok(json!({
            "database": dbname,
            "totalTables": table_details.len(),
            "tables": table_details,
            "summary": format!(
                "Database with {} tables and {} total rows",
                table_details.len(),
                total_rows
            ),
        }))
    }

    /// All foreign-key edges between public tables.
    pub async fn table_relationships(&self) -> Result<Value, ToolError> {
        let client = self.connect().await?;
        let rows = client.query(ALL_RELATIONSHIPS_SQL, &[]).await?;
        let relationships = rows_to_json(&rows);
        Ok(json!({
            "relationships": relationships,
            "totalRelationships": relationships.len(),
            "summary": format!("{} relationships found between tables", relationships.len()),
        }))
    }

    /// Run a caller-supplied SELECT. The SELECT-prefix check happens at the
    /// tool adapter before this is called; a LIMIT clause is appended when
    /// the query does not already carry one.
    pub async fn execute_select(&self, query: &str, limit: i64) -> Result<Value, ToolError> {
        let limited = apply_limit(query, limit);

        let client = self.connect().await?;
        let rows = simple_select(&client, &limited).await?;
        Ok(json!({
            "success": true,
            "rowCount": rows.len(),
            "rows": rows,
            "query": limited,
            "executedAt": Utc::now().to_rfc3339(),
        }))
    }

    /// Column details for one table; errors if the table does not exist.
    pub async fn table_schema(&self, table: &str) -> Result<Value, ToolError> {
        let client = self.connect().await?;
        let exists_row = client.query_one(TABLE_EXISTS_SQL, &[&table]).await?;
        let exists: bool = exists_row.try_get("exists")?;
        if !exists {
            return Err(ToolError::TableNotFound(table.to_string()));
        }

        let columns = client.query(TABLE_COLUMNS_SQL, &[&table]).await?;
        Ok(json!({
            "table": table,
            "columns": rows_to_json(&columns),
            "totalColumns": columns.len(),
        }))
    }

    /// All public tables with their comments.
    pub async fn list_tables(&self) -> Result<Value, ToolError> {
        let client = self.connect().await?;
        let rows = client.query(LIST_TABLES_SQL, &[]).await?;
        let tables = rows_to_json(&rows);
        Ok(json!({
            "tables": tables,
            "totalTables": tables.len(),
        }))
    }

    /// Insert one row. Table and column names are identifier-validated,
    /// values are bound as parameters typed from the prepared statement.
    pub async fn insert_row(&self, table: &str, data: &Map<String, Value>) -> Result<Value, ToolError> {
        if data.is_empty() {
            return Err(ToolError::InvalidParams(
                "data must contain at least one column".to_string(),
            ));
        }

        let sql = build_insert_sql(table, data.keys())?;

        let client = self.connect().await?;
        let statement = client.prepare(&sql).await?;
        let param_types = statement.params();
        if param_types.len() != data.len() {
            return Err(ToolError::Database(
                "prepared statement parameter count mismatch".to_string(),
            ));
        }

        let mut bound: Vec<Box<dyn ToSql + Send + Sync>> = Vec::with_capacity(data.len());
        for ((column, value), ty) in data.iter().zip(param_types) {
            bound.push(bind_json_param(column, value, ty)?);
        }
        let params: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|p| -> &(dyn ToSql + Sync) { p.as_ref() })
            .collect();

        let returned = client.query(&statement, &params).await?;
        let inserted = returned
            .first()
            .map(|row| row.try_get::<_, Value>("inserted"))
            .transpose()?
            .unwrap_or(Value::Null);
        info!(table = %table, "Row inserted");
        Ok(json!({
            "success": true,
            "table": table,
            "inserted": inserted,
            "insertedAt": Utc::now().to_rfc3339(),
        }))
    }

    /// Round-trip check returning server time and version.
    pub async fn test_connection(&self) -> Result<Value, ToolError> {
        let client = self.connect().await?;
        let rows = simple_select(
            &client,
            "SELECT NOW()::text AS current_time, version() AS postgres_version",
        )
        .await?;
        Ok(json!({
            "success": true,
            "connectionStatus": "Connection successful",
            "serverInfo": rows.into_iter().next().unwrap_or(Value::Null),
            "testedAt": Utc::now().to_rfc3339(),
        }))
    }
}

/// Build an identifier-validated INSERT whose inserted row comes back as a
/// single `to_jsonb` column, so the payload keeps every column type intact.
fn build_insert_sql<'a>(
    table: &str,
    columns: impl Iterator<Item = &'a String>,
) -> Result<String, ToolError> {
    let table_ident = quote_identifier(table)?;
    let mut column_idents = Vec::new();
    let mut placeholders = Vec::new();
    for (i, column) in columns.enumerate() {
        column_idents.push(quote_identifier(column)?);
        placeholders.push(format!("${}", i + 1));
    }

    Ok(format!(
        "INSERT INTO {table_ident} ({}) VALUES ({}) RETURNING to_jsonb({table_ident}.*) AS inserted",
        column_idents.join(", "),
        placeholders.join(", "),
    ))
}

/// Append `LIMIT n` to a query that has no LIMIT clause of its own.
///
/// Trailing semicolons are trimmed first so the appended clause stays part
/// of the same statement, and the existing-clause check requires the word
/// LIMIT on its own (an identifier like `speed_limit` does not count).
fn apply_limit(query: &str, limit: i64) -> String {
    let stripped = query.trim().trim_end_matches(';').trim_end();
    if has_limit_clause(stripped) {
        stripped.to_string()
    } else {
        format!("{stripped} LIMIT {limit}")
    }
}

fn has_limit_clause(query: &str) -> bool {
    fn is_ident_char(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'_'
    }

    let lower = query.to_lowercase();
    let bytes = lower.as_bytes();
    let mut start = 0;
    while let Some(pos) = lower[start..].find("limit") {
        let begin = start + pos;
        let end = begin + "limit".len();
        let standalone = (begin == 0 || !is_ident_char(bytes[begin - 1]))
            && (end == bytes.len() || !is_ident_char(bytes[end]));
        if standalone {
            return true;
        }
        start = end;
    }
    false
}

/// Validate and double-quote a SQL identifier. Rejects anything outside
/// `[A-Za-z_][A-Za-z0-9_]*` so caller-supplied names cannot smuggle SQL.
pub fn quote_identifier(name: &str) -> Result<String, ToolError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid || name.len() > 63 {
        return Err(ToolError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

/// Run a caller-supplied query over the simple (text) protocol and map the
/// result rows to JSON objects. Every value arrives as text or null, which
/// keeps arbitrary column types representable.
async fn simple_select(client: &Client, sql: &str) -> Result<Vec<Value>, ToolError> {
    let messages = client.simple_query(sql).await?;
    let mut rows = Vec::new();
    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            let mut obj = Map::new();
            for (idx, column) in row.columns().iter().enumerate() {
                let cell = row
                    .try_get(idx)?
                    .map(|v| Value::String(v.to_string()))
                    .unwrap_or(Value::Null);
                obj.insert(column.name().to_string(), cell);
            }
            rows.push(Value::Object(obj));
        }
    }
    Ok(rows)
}

/// Map typed rows (binary protocol) to JSON objects. Types without a JSON
/// mapping come back as null.
pub fn rows_to_json(rows: &[Row]) -> Vec<Value> {
    rows.iter()
        .map(|row| {
            let mut obj = Map::new();
            for (idx, column) in row.columns().iter().enumerate() {
                obj.insert(column.name().to_string(), cell_to_json(row, idx, column.type_()));
            }
            Value::Object(obj)
        })
        .collect()
}

fn cell_to_json(row: &Row, idx: usize, ty: &Type) -> Value {
    fn cell<'a, T>(row: &'a Row, idx: usize) -> Option<T>
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        row.try_get::<_, Option<T>>(idx).ok().flatten()
    }

    match *ty {
        Type::BOOL => cell::<bool>(row, idx).map(Value::Bool),
        Type::INT2 => cell::<i16>(row, idx).map(Value::from),
        Type::INT4 => cell::<i32>(row, idx).map(Value::from),
        Type::INT8 => cell::<i64>(row, idx).map(Value::from),
        Type::OID => cell::<u32>(row, idx).map(Value::from),
        Type::FLOAT4 => cell::<f32>(row, idx).map(Value::from),
        Type::FLOAT8 => cell::<f64>(row, idx).map(Value::from),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            cell::<String>(row, idx).map(Value::String)
        }
        Type::JSON | Type::JSONB => cell::<Value>(row, idx),
        Type::UUID => cell::<Uuid>(row, idx).map(|u| Value::String(u.to_string())),
        Type::TIMESTAMP => {
            cell::<NaiveDateTime>(row, idx).map(|t| Value::String(t.to_string()))
        }
        Type::TIMESTAMPTZ => {
            cell::<DateTime<Utc>>(row, idx).map(|t| Value::String(t.to_rfc3339()))
        }
        Type::DATE => cell::<NaiveDate>(row, idx).map(|d| Value::String(d.to_string())),
        _ => None,
    }
    .unwrap_or(Value::Null)
}

/// Convert one JSON value into a SQL parameter matching the prepared
/// statement's inferred column type.
fn bind_json_param(
    column: &str,
    value: &Value,
    ty: &Type,
) -> Result<Box<dyn ToSql + Send + Sync>, ToolError> {
    let mismatch = |expected: &str| {
        ToolError::InvalidParams(format!(
            "column '{column}' expects {expected}, got: {value}"
        ))
    };

    if value.is_null() {
        return null_param(column, ty);
    }

    let boxed: Box<dyn ToSql + Send + Sync> = match *ty {
        Type::BOOL => Box::new(value.as_bool().ok_or_else(|| mismatch("a boolean"))?),
        Type::INT2 => {
            let n = value.as_i64().ok_or_else(|| mismatch("an integer"))?;
            Box::new(i16::try_from(n).map_err(|_| mismatch("a 16-bit integer"))?)
        }
        Type::INT4 => {
            let n = value.as_i64().ok_or_else(|| mismatch("an integer"))?;
            Box::new(i32::try_from(n).map_err(|_| mismatch("a 32-bit integer"))?)
        }
        Type::INT8 => Box::new(value.as_i64().ok_or_else(|| mismatch("an integer"))?),
        Type::FLOAT4 => Box::new(value.as_f64().ok_or_else(|| mismatch("a number"))? as f32),
        Type::FLOAT8 => Box::new(value.as_f64().ok_or_else(|| mismatch("a number"))?),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => match value {
            Value::String(s) => Box::new(s.clone()),
            other => Box::new(other.to_string()),
        },
        Type::JSON | Type::JSONB => Box::new(value.clone()),
        Type::UUID => {
            let s = value.as_str().ok_or_else(|| mismatch("a UUID string"))?;
            Box::new(Uuid::parse_str(s).map_err(|_| mismatch("a UUID string"))?)
        }
        Type::TIMESTAMPTZ => {
            let s = value.as_str().ok_or_else(|| mismatch("an RFC 3339 timestamp"))?;
            let ts = DateTime::parse_from_rfc3339(s)
                .map_err(|_| mismatch("an RFC 3339 timestamp"))?;
            Box::new(ts.with_timezone(&Utc))
        }
        Type::TIMESTAMP => {
            let s = value.as_str().ok_or_else(|| mismatch("a timestamp string"))?;
            let ts = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
                .map_err(|_| mismatch("a timestamp string"))?;
            Box::new(ts)
        }
        Type::DATE => {
            let s = value.as_str().ok_or_else(|| mismatch("a YYYY-MM-DD date"))?;
            Box::new(
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|_| mismatch("a YYYY-MM-DD date"))?,
            )
        }
        ref other => {
            return Err(ToolError::InvalidParams(format!(
                "column '{column}' has unsupported type {other} for insert"
            )))
        }
    };
    Ok(boxed)
}

fn null_param(column: &str, ty: &Type) -> Result<Box<dyn ToSql + Send + Sync>, ToolError> {
    let boxed: Box<dyn ToSql + Send + Sync> = match *ty {
        Type::BOOL => Box::new(Option::<bool>::None),
        Type::INT2 => Box::new(Option::<i16>::None),
        Type::INT4 => Box::new(Option::<i32>::None),
        Type::INT8 => Box::new(Option::<i64>::None),
        Type::FLOAT4 => Box::new(Option::<f32>::None),
        Type::FLOAT8 => Box::new(Option::<f64>::None),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            Box::new(Option::<String>::None)
        }
        Type::JSON | Type::JSONB => Box::new(Option::<Value>::None),
        Type::UUID => Box::new(Option::<Uuid>::None),
        Type::TIMESTAMPTZ => Box::new(Option::<DateTime<Utc>>::None),
        Type::TIMESTAMP => Box::new(Option::<NaiveDateTime>::None),
        Type::DATE => Box::new(Option::<NaiveDate>::None),
        ref other => {
            return Err(ToolError::InvalidParams(format!(
                "column '{column}' has unsupported type {other} for insert"
            )))
        }
    };
    Ok(boxed)
}

// Introspection SQL. Identifier-ish columns are cast to ::text so the
// binary protocol returns plain base types instead of information_schema
// domains.

const LIST_TABLES_SQL: &str = "
    SELECT
        t.table_name::text AS table_name,
        obj_description(c.oid)::text AS table_comment
    FROM information_schema.tables t
    LEFT JOIN pg_class c ON c.relname = t.table_name
    WHERE t.table_schema = 'public'
    ORDER BY t.table_name";

const TABLE_COLUMNS_SQL: &str = "
    SELECT
        c.column_name::text AS column_name,
        c.data_type::text AS data_type,
        c.is_nullable::text AS is_nullable,
        c.column_default::text AS column_default,
        c.character_maximum_length::int AS character_maximum_length,
        col_description(pgc.oid, c.ordinal_position::int)::text AS column_comment
    FROM information_schema.columns c
    LEFT JOIN pg_class pgc ON pgc.relname = c.table_name
    WHERE c.table_name = $1 AND c.table_schema = 'public'
    ORDER BY c.ordinal_position";

const TABLE_PRIMARY_KEYS_SQL: &str = "
    SELECT kcu.column_name::text AS column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
        AND tc.table_name = $1";

const TABLE_FOREIGN_KEYS_SQL: &str = "
    SELECT
        kcu.column_name::text AS column_name,
        ccu.table_name::text AS foreign_table_name,
        ccu.column_name::text AS foreign_column_name,
        tc.constraint_name::text AS constraint_name
    FROM information_schema.table_constraints AS tc
    JOIN information_schema.key_column_usage AS kcu
        ON tc.constraint_name = kcu.constraint_name
    JOIN information_schema.constraint_column_usage AS ccu
        ON ccu.constraint_name = tc.constraint_name
    WHERE tc.constraint_type = 'FOREIGN KEY'
        AND tc.table_name = $1";

const ALL_RELATIONSHIPS_SQL: &str = "
    SELECT
        tc.table_name::text AS source_table,
        kcu.column_name::text AS source_column,
        ccu.table_name::text AS target_table,
        ccu.column_name::text AS target_column,
        tc.constraint_name::text AS constraint_name
    FROM information_schema.table_constraints AS tc
    JOIN information_schema.key_column_usage AS kcu
        ON tc.constraint_name = kcu.constraint_name
    JOIN information_schema.constraint_column_usage AS ccu
        ON ccu.constraint_name = tc.constraint_name
    WHERE tc.constraint_type = 'FOREIGN KEY'
    ORDER BY tc.table_name";

const TABLE_EXISTS_SQL: &str = "
    SELECT EXISTS (
        SELECT FROM information_schema.tables
        WHERE table_schema = 'public' AND table_name = $1
    ) AS exists";
