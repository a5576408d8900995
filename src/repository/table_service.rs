use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Postgres, QueryBuilder, Row};

use crate::error::AppError;

const ALLOWED_TABLES: &[&str] = &[
    "accounts",
    "acats",
    "audit_logs",
    "branches",
    "client_acats",
    "clients",
    "crops",
    "histories",
    "loan_proposals",
    "report_types",
    "reports",
    "screenings",
    "users",
];

// Reference columns hold uuids even though they are not suffixed with _id.
const UUID_COLUMNS: &[&str] = &[
    "id",
    "client",
    "client_acat",
    "branch",
    "crop",
    "created_by",
    "user_id",
    "actor",
    "screening",
    "loan",
    "acat",
    "default_branch",
];

pub async fn list_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
    limit: i64,
    offset: i64,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    let table_name = validate_table(table)?;
    let order_name = if order_by.trim().is_empty() {
        "date_created"
    } else {
        validate_identifier(order_by)?
    };

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE 1=1");

    if let Some(filter_map) = filters {
        for (key, value) in filter_map {
            push_filter_clause(&mut query, key, value)?;
        }
    }

    query.push(" ORDER BY t.").push(order_name);
    if ascending {
        query.push(" ASC");
    } else {
        query.push(" DESC");
    }
    query
        .push(" LIMIT ")
        .push_bind(limit.clamp(1, 10_000))
        .push(" OFFSET ")
        .push_bind(offset.max(0));

    let rows = query.build().fetch_all(pool).await.map_err(map_db_error)?;
    Ok(read_rows(rows))
}

pub async fn get_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: &str,
    id_field: &str,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    let id_name = validate_identifier(id_field)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE ");
    push_scalar_filter(
        &mut query,
        id_name,
        &infer_scalar_filter(id_name, &Value::String(row_id.to_string())),
    );
    query.push(" LIMIT 1");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

pub async fn create_row(
    pool: &sqlx::PgPool,
    table: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Could not create {table_name} record."
        )));
    }

    let mut keys = payload.keys().cloned().collect::<Vec<_>>();
    keys.sort_unstable();
    for key in &keys {
        validate_identifier(key)?;
    }

    // jsonb_populate_record lets PostgreSQL resolve column types (uuid,
    // jsonb, numeric ...) from the table definition.
    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
    query.push(table_name).push(" (");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(validate_identifier(key)?);
        }
    }
    query.push(") SELECT ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push("r.");
            separated.push_unseparated(validate_identifier(key)?);
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query
        .push(") r RETURNING row_to_json(")
        .push(table_name)
        .push(".*) AS row");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::Internal(format!("Could not create {table_name} record.")))
}

pub async fn update_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }

    let mut keys = payload.keys().cloned().collect::<Vec<_>>();
    keys.sort_unstable();
    for key in &keys {
        validate_identifier(key)?;
    }

    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query.push(table_name).push(" t SET ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            let col = validate_identifier(key)?;
            separated.push(col);
            separated.push_unseparated(" = r.");
            separated.push_unseparated(col);
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query.push(") r WHERE ");
    push_scalar_filter(
        &mut query,
        "id",
        &infer_scalar_filter("id", &Value::String(row_id.to_string())),
    );
    query.push(" RETURNING row_to_json(t) AS row");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

pub async fn count_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
) -> Result<i64, AppError> {
    let table_name = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*)::bigint AS total FROM ");
    query.push(table_name).push(" t WHERE 1=1");

    if let Some(filter_map) = filters {
        for (key, value) in filter_map {
            push_filter_clause(&mut query, key, value)?;
        }
    }

    let row = query.build().fetch_one(pool).await.map_err(map_db_error)?;

    Ok(row.try_get::<i64, _>("total").unwrap_or(0))
}

fn read_rows(rows: Vec<PgRow>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .collect()
}

fn validate_table(table: &str) -> Result<&str, AppError> {
    let normalized = validate_identifier(table)?;
    if ALLOWED_TABLES.contains(&normalized) {
        return Ok(normalized);
    }
    Err(AppError::Forbidden(format!(
        "Table '{normalized}' is not allowed."
    )))
}

// Identifiers are pushed into SQL unquoted, so fully reserved keywords
// would produce syntax errors at runtime. Rejected up front instead.
const RESERVED_IDENTIFIERS: &[&str] = &[
    "all", "check", "column", "constraint", "create", "current_user", "default", "distinct",
    "from", "grant", "group", "having", "into", "not", "null", "order", "primary", "references",
    "select", "session_user", "table", "to", "union", "unique", "user", "using", "where",
];

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(
            "Identifier cannot be empty.".to_string(),
        ));
    }
    if RESERVED_IDENTIFIERS.contains(&trimmed) {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    if !trimmed.chars().all(|character| {
        character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
    }) {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    if trimmed
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_digit())
    {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone)]
enum ScalarFilter {
    Text(String),
    Uuid(uuid::Uuid),
    Bool(bool),
    I64(i64),
    F64(f64),
    Date(NaiveDate),
    Timestamp(DateTime<FixedOffset>),
}

fn push_filter_clause(
    query: &mut QueryBuilder<Postgres>,
    filter_key: &str,
    value: &Value,
) -> Result<(), AppError> {
    let column = validate_identifier(filter_key)?;

    match value {
        Value::Null => Ok(()),
        Value::Array(items) => {
            if items.is_empty() {
                return Ok(());
            }
            if is_uuid_column(column) {
                let mut parsed = Vec::with_capacity(items.len());
                for item in items {
                    let Some(text) = item.as_str() else {
                        return Err(AppError::BadRequest(format!(
                            "Filter '{column}' expects uuid values."
                        )));
                    };
                    let as_uuid = uuid::Uuid::parse_str(text.trim()).map_err(|_| {
                        AppError::BadRequest(format!("Filter '{column}' expects uuid values."))
                    })?;
                    parsed.push(as_uuid);
                }
                query
                    .push(" AND t.")
                    .push(column)
                    .push(" = ANY(")
                    .push_bind(parsed)
                    .push(")");
                return Ok(());
            }
            let texts = items
                .iter()
                .map(render_scalar)
                .collect::<Vec<String>>();
            query
                .push(" AND t.")
                .push(column)
                .push("::text = ANY(")
                .push_bind(texts)
                .push(")");
            Ok(())
        }
        _ => {
            query.push(" AND ");
            let filter = infer_scalar_filter(column, value);
            push_scalar_filter(query, column, &filter);
            Ok(())
        }
    }
}

fn push_scalar_filter(query: &mut QueryBuilder<Postgres>, column: &str, value: &ScalarFilter) {
    query.push("t.").push(column);
    match value {
        ScalarFilter::Text(text) => {
            query.push("::text = ").push_bind(text.clone());
        }
        ScalarFilter::Uuid(id) => {
            query.push(" = ").push_bind(*id);
        }
        ScalarFilter::Bool(flag) => {
            query.push(" = ").push_bind(*flag);
        }
        ScalarFilter::I64(number) => {
            query.push(" = ").push_bind(*number);
        }
        ScalarFilter::F64(number) => {
            query.push(" = ").push_bind(*number);
        }
        ScalarFilter::Date(value) => {
            query.push(" = ").push_bind(*value);
        }
        ScalarFilter::Timestamp(value) => {
            query.push(" = ").push_bind(value.to_owned());
        }
    }
}

fn infer_scalar_filter(column: &str, value: &Value) -> ScalarFilter {
    match value {
        Value::Bool(flag) => ScalarFilter::Bool(*flag),
        Value::Number(number) => {
            if let Some(as_i64) = number.as_i64() {
                return ScalarFilter::I64(as_i64);
            }
            if let Some(as_f64) = number.as_f64() {
                return ScalarFilter::F64(as_f64);
            }
            ScalarFilter::Text(number.to_string())
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if is_uuid_column(column) {
                if let Ok(parsed) = uuid::Uuid::parse_str(trimmed) {
                    return ScalarFilter::Uuid(parsed);
                }
            }
            if is_timestamp_column(column) {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
                    return ScalarFilter::Timestamp(parsed);
                }
                if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
                    return ScalarFilter::Date(parsed);
                }
            }
            ScalarFilter::Text(text.clone())
        }
        _ => ScalarFilter::Text(render_scalar(value)),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn is_uuid_column(column: &str) -> bool {
    let normalized = column.trim();
    UUID_COLUMNS.contains(&normalized) || normalized.ends_with("_id")
}

fn is_timestamp_column(column: &str) -> bool {
    let normalized = column.trim();
    normalized.ends_with("_created") || normalized.ends_with("_modified") || normalized.ends_with("_at")
}

fn map_db_error(error: sqlx::Error) -> AppError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if message.contains("23505")
        || message
            .to_ascii_lowercase()
            .contains("duplicate key value violates unique constraint")
    {
        return AppError::Conflict("Duplicate value violates a unique constraint.".to_string());
    }
    AppError::Dependency("Database operation failed.".to_string())
}
