//! Whitelisted JSON row access for the CRUD handlers.
//!
//! Rows are read with `row_to_json` and written through
//! `jsonb_populate_record`, so PostgreSQL resolves column types (uuid, date,
//! numeric, jsonb) from the table definition.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, PgPool, Postgres, QueryBuilder, Row, Transaction};

use crate::error::AppError;

const ALLOWED_TABLES: &[&str] = &[
    "assets",
    "contracts",
    "financial_records",
    "maintenance",
    "notifications",
    "payments",
    "users",
];

const MAX_PAGE_SIZE: i64 = 1000;

pub async fn list_rows(
    pool: &PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
    limit: i64,
    offset: i64,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    let table_name = validate_table(table)?;
    let order_column = if order_by.trim().is_empty() {
        "created_at"
    } else {
        validate_identifier(order_by)?
    };

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    if let Some(filter_map) = filters {
        for (key, value) in filter_map {
            push_filter(&mut query, key, value)?;
        }
    }
    query
        .push(" ORDER BY t.")
        .push(order_column)
        .push(if ascending { " ASC" } else { " DESC" })
        .push(" LIMIT ")
        .push_bind(limit.clamp(1, MAX_PAGE_SIZE))
        .push(" OFFSET ")
        .push_bind(offset.max(0));

    let rows = query.build().fetch_all(pool).await.map_err(map_db_error)?;
    Ok(read_rows(rows))
}

pub async fn get_row(
    pool: &PgPool,
    table: &str,
    row_id: &str,
    id_field: &str,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    let id_column = validate_identifier(id_field)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    push_condition(&mut query, id_column, Operator::Eq, &key_filter(id_column, row_id));
    query.push(" LIMIT 1");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    first_json(row).ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

pub async fn create_row(
    pool: &PgPool,
    table: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let mut query = insert_query(table, payload)?;
    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;
    first_json(row).ok_or_else(|| AppError::Internal(format!("Could not create {table} record.")))
}

/// `create_row` inside an open transaction.
pub async fn create_row_tx(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let mut query = insert_query(table, payload)?;
    let row = query
        .build()
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_db_error)?;
    first_json(row).ok_or_else(|| AppError::Internal(format!("Could not create {table} record.")))
}

pub async fn update_row(
    pool: &PgPool,
    table: &str,
    row_id: &str,
    payload: &Map<String, Value>,
    id_field: &str,
) -> Result<Value, AppError> {
    let mut query = update_query(table, row_id, payload, id_field)?;
    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;
    first_json(row).ok_or_else(|| AppError::NotFound(format!("{table} record not found.")))
}

/// `update_row` inside an open transaction.
pub async fn update_row_tx(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    row_id: &str,
    payload: &Map<String, Value>,
    id_field: &str,
) -> Result<Value, AppError> {
    let mut query = update_query(table, row_id, payload, id_field)?;
    let row = query
        .build()
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_db_error)?;
    first_json(row).ok_or_else(|| AppError::NotFound(format!("{table} record not found.")))
}

fn insert_query(
    table: &str,
    payload: &Map<String, Value>,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let table_name = validate_table(table)?;
    let columns = payload_columns(payload)?;
    if columns.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Could not create {table_name} record."
        )));
    }

    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
    query.push(table_name).push(" (");
    push_column_list(&mut query, &columns, "");
    query.push(") SELECT ");
    push_column_list(&mut query, &columns, "r.");
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ")
        .push_bind(Value::Object(payload.clone()))
        .push(") r RETURNING row_to_json(")
        .push(table_name)
        .push(".*) AS row");
    Ok(query)
}

fn update_query(
    table: &str,
    row_id: &str,
    payload: &Map<String, Value>,
    id_field: &str,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let table_name = validate_table(table)?;
    let id_column = validate_identifier(id_field)?;
    let columns = payload_columns(payload)?;
    if columns.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }

    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query.push(table_name).push(" t SET ");
    {
        let mut assignments = query.separated(", ");
        for column in &columns {
            assignments.push(*column);
            assignments.push_unseparated(" = r.");
            assignments.push_unseparated(*column);
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ")
        .push_bind(Value::Object(payload.clone()))
        .push(") r WHERE 1=1");
    push_condition(&mut query, id_column, Operator::Eq, &key_filter(id_column, row_id));
    query.push(" RETURNING row_to_json(t) AS row");
    Ok(query)
}

/// Hard delete; returns the row as it was before deletion.
pub async fn delete_row(
    pool: &PgPool,
    table: &str,
    row_id: &str,
    id_field: &str,
) -> Result<Value, AppError> {
    let existing = get_row(pool, table, row_id, id_field).await?;
    let table_name = validate_table(table)?;
    let id_column = validate_identifier(id_field)?;

    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    push_condition(&mut query, id_column, Operator::Eq, &key_filter(id_column, row_id));
    query.build().execute(pool).await.map_err(map_db_error)?;

    Ok(existing)
}

pub async fn count_rows(
    pool: &PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
) -> Result<i64, AppError> {
    let table_name = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*)::bigint AS total FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    if let Some(filter_map) = filters {
        for (key, value) in filter_map {
            push_filter(&mut query, key, value)?;
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

fn first_json(row: Option<PgRow>) -> Option<Value> {
    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
}

fn payload_columns(payload: &Map<String, Value>) -> Result<Vec<&str>, AppError> {
    let mut columns = payload
        .keys()
        .map(|key| validate_identifier(key))
        .collect::<Result<Vec<_>, _>>()?;
    columns.sort_unstable();
    Ok(columns)
}

fn push_column_list(query: &mut QueryBuilder<Postgres>, columns: &[&str], prefix: &str) {
    let mut separated = query.separated(", ");
    for column in columns {
        separated.push(prefix);
        separated.push_unseparated(*column);
    }
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

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    let valid = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !trimmed.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(trimmed)
    } else {
        Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FilterValue {
    Text(String),
    Uuid(uuid::Uuid),
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
}

impl FilterValue {
    fn as_text(&self) -> String {
        match self {
            FilterValue::Text(text) => text.clone(),
            FilterValue::Uuid(id) => id.to_string(),
            FilterValue::Bool(flag) => flag.to_string(),
            FilterValue::Int(number) => number.to_string(),
            FilterValue::Float(number) => number.to_string(),
            FilterValue::Date(date) => date.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    ILike,
    IsNull,
    In,
}

impl Operator {
    fn sql(self) -> &'static str {
        match self {
            Operator::Gt => " > ",
            Operator::Gte => " >= ",
            Operator::Lt => " < ",
            Operator::Lte => " <= ",
            Operator::ILike => " ILIKE ",
            _ => " = ",
        }
    }
}

/// `due_date__lt` → (`due_date`, Lt). Unknown suffixes are part of the
/// column name and fail identifier validation only if malformed.
fn parse_filter_key(filter_key: &str) -> Result<(&str, Operator), AppError> {
    let parsed = filter_key.rsplit_once("__").and_then(|(column, suffix)| {
        let operator = match suffix {
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "ilike" => Operator::ILike,
            "is_null" => Operator::IsNull,
            "in" => Operator::In,
            _ => return None,
        };
        Some((column, operator))
    });
    let (column, operator) = parsed.unwrap_or((filter_key, Operator::Eq));
    Ok((validate_identifier(column)?, operator))
}

fn push_filter(
    query: &mut QueryBuilder<Postgres>,
    filter_key: &str,
    value: &Value,
) -> Result<(), AppError> {
    let (column, operator) = parse_filter_key(filter_key)?;

    if operator == Operator::IsNull {
        let want_null = value.as_bool().unwrap_or(true);
        query
            .push(" AND t.")
            .push(column)
            .push(if want_null { " IS NULL" } else { " IS NOT NULL" });
        return Ok(());
    }

    match value {
        Value::Null => Ok(()),
        Value::Array(items) => {
            if !matches!(operator, Operator::Eq | Operator::In) {
                return Err(AppError::BadRequest(format!(
                    "Filter '{filter_key}' does not support array values."
                )));
            }
            push_any(query, column, items);
            Ok(())
        }
        _ => {
            push_condition(query, column, operator, &infer_filter(column, value));
            Ok(())
        }
    }
}

fn push_condition(
    query: &mut QueryBuilder<Postgres>,
    column: &str,
    operator: Operator,
    value: &FilterValue,
) {
    query.push(" AND t.").push(column);
    if operator == Operator::ILike {
        query.push("::text ILIKE ").push_bind(value.as_text());
        return;
    }

    let sql_operator = operator.sql();
    match value {
        FilterValue::Text(text) => {
            query.push("::text").push(sql_operator).push_bind(text.clone());
        }
        FilterValue::Uuid(id) => {
            query.push(sql_operator).push_bind(*id);
        }
        FilterValue::Bool(flag) => {
            query.push(sql_operator).push_bind(*flag);
        }
        FilterValue::Int(number) => {
            query.push(sql_operator).push_bind(*number);
        }
        FilterValue::Float(number) => {
            query.push(sql_operator).push_bind(*number);
        }
        FilterValue::Date(date) => {
            query.push(sql_operator).push_bind(*date);
        }
    }
}

/// `column = ANY($n)`; an empty list matches nothing.
fn push_any(query: &mut QueryBuilder<Postgres>, column: &str, items: &[Value]) {
    if items.is_empty() {
        query.push(" AND FALSE");
        return;
    }

    query.push(" AND t.").push(column);
    if is_uuid_column(column) {
        let ids = items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|text| uuid::Uuid::parse_str(text.trim()).ok())
            .collect::<Vec<_>>();
        if ids.len() == items.len() {
            query.push(" = ANY(").push_bind(ids).push(")");
            return;
        }
    }
    let texts = items
        .iter()
        .map(|item| match item {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>();
    query.push("::text = ANY(").push_bind(texts).push(")");
}

fn key_filter(column: &str, raw: &str) -> FilterValue {
    infer_filter(column, &Value::String(raw.to_string()))
}

fn infer_filter(column: &str, value: &Value) -> FilterValue {
    match value {
        Value::Bool(flag) => FilterValue::Bool(*flag),
        Value::Number(number) => number
            .as_i64()
            .map(FilterValue::Int)
            .or_else(|| number.as_f64().map(FilterValue::Float))
            .unwrap_or_else(|| FilterValue::Text(number.to_string())),
        Value::String(text) => {
            let trimmed = text.trim();
            if is_uuid_column(column) {
                if let Ok(parsed) = uuid::Uuid::parse_str(trimmed) {
                    return FilterValue::Uuid(parsed);
                }
            }
            if is_date_column(column) {
                if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
                    return FilterValue::Date(parsed);
                }
            }
            FilterValue::Text(text.clone())
        }
        other => FilterValue::Text(other.to_string()),
    }
}

fn is_uuid_column(column: &str) -> bool {
    column == "id" || column.ends_with("_id")
}

fn is_date_column(column: &str) -> bool {
    column.ends_with("_date")
}

fn map_db_error(error: sqlx::Error) -> AppError {
    let is_unique_violation = error
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .is_some_and(|code| code == "23505");

    tracing::error!(db_error = %error, "Database query failed");

    if is_unique_violation {
        return AppError::Conflict("Duplicate value violates a unique constraint.".to_string());
    }
    AppError::Dependency("Database operation failed.".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use sqlx::{Postgres, QueryBuilder};

    use super::{
        infer_filter, insert_query, parse_filter_key, push_filter, update_query,
        validate_identifier, validate_table, FilterValue, Operator,
    };

    fn where_sql(filters: Value) -> String {
        let mut query = QueryBuilder::<Postgres>::new("SELECT 1 FROM payments t WHERE 1=1");
        for (key, value) in filters.as_object().expect("object") {
            push_filter(&mut query, key, value).expect("valid filter");
        }
        query.sql().to_string()
    }

    #[test]
    fn parses_operator_suffixes() {
        assert_eq!(
            parse_filter_key("due_date__lt").expect("valid"),
            ("due_date", Operator::Lt)
        );
        assert_eq!(
            parse_filter_key("contract_id__in").expect("valid"),
            ("contract_id", Operator::In)
        );
        assert_eq!(
            parse_filter_key("status").expect("valid"),
            ("status", Operator::Eq)
        );
        assert!(parse_filter_key("bad-column").is_err());
    }

    #[test]
    fn infers_typed_values_from_column_names() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        assert!(matches!(
            infer_filter("asset_id", &json!(id)),
            FilterValue::Uuid(_)
        ));
        assert!(matches!(
            infer_filter("due_date", &json!("2024-06-15")),
            FilterValue::Date(_)
        ));
        assert_eq!(
            infer_filter("status", &json!("paid")),
            FilterValue::Text("paid".to_string())
        );
        assert_eq!(infer_filter("rooms", &json!(3)), FilterValue::Int(3));
    }

    #[test]
    fn builds_where_clauses() {
        let sql = where_sql(json!({
            "status": "pending",
            "due_date__lt": "2024-06-15",
            "paid_date__is_null": true
        }));
        // Map keys iterate in sorted order, so binds follow key order.
        assert!(sql.contains("t.due_date < $1"), "{sql}");
        assert!(sql.contains("t.status::text = $2"), "{sql}");
        assert!(sql.contains("t.paid_date IS NULL"), "{sql}");
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let sql = where_sql(json!({ "contract_id__in": [] }));
        assert!(sql.ends_with("AND FALSE"), "{sql}");

        let sql = where_sql(json!({
            "contract_id__in": ["550e8400-e29b-41d4-a716-446655440000"]
        }));
        assert!(sql.contains("t.contract_id = ANY($1)"), "{sql}");
    }

    #[test]
    fn rejects_unknown_tables_and_identifiers() {
        assert!(validate_table("assets").is_ok());
        assert!(validate_table("pg_user").is_err());
        assert!(validate_identifier("1col").is_err());
        assert!(validate_identifier("name; drop").is_err());
    }

    #[test]
    fn write_queries_share_shape_inside_and_outside_transactions() {
        let payload = json!({ "status": "paid", "paid_date": "2024-06-15" });
        let payload = payload.as_object().expect("object");

        let insert = insert_query("financial_records", payload).expect("insert");
        let sql = insert.sql().to_string();
        assert!(sql.starts_with("INSERT INTO financial_records (paid_date, status)"), "{sql}");
        assert!(sql.ends_with("RETURNING row_to_json(financial_records.*) AS row"), "{sql}");

        let update = update_query(
            "payments",
            "550e8400-e29b-41d4-a716-446655440000",
            payload,
            "id",
        )
        .expect("update");
        let sql = update.sql().to_string();
        assert!(sql.starts_with("UPDATE payments t SET paid_date = r.paid_date, status = r.status"), "{sql}");
        assert!(sql.contains("t.id = $2"), "{sql}");

        assert!(update_query("payments", "x", &serde_json::Map::new(), "id").is_err());
        assert!(insert_query("pg_user", payload).is_err());
    }
}
