use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::{
    access::{apply_scope, assert_asset_manager, visible_asset_ids},
    auth::{require_role, require_user, AuthUser},
    error::{AppError, AppResult},
    models::Role,
    repository::{
        non_empty_opt,
        table_service::{create_row, delete_row, get_row, list_rows, update_row},
        val_str,
    },
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input,
        CreateFinancialRecordInput, FinancialRecordsQuery, IdPath, UpdateFinancialRecordInput,
    },
    state::{db_pool, AppState},
};

const LEDGER_ROLES: &[Role] = &[Role::Admin, Role::Owner];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/financial-records",
            axum::routing::get(list_records).post(create_record),
        )
        .route(
            "/financial-records/{id}",
            axum::routing::get(get_record)
                .patch(update_record)
                .delete(delete_record),
        )
}

/// Records without an asset belong to the admins' general ledger.
async fn assert_record_manager(pool: &PgPool, user: &AuthUser, record: &Value) -> AppResult<()> {
    if user.is_admin() {
        return Ok(());
    }
    let asset_id = val_str(record, "asset_id");
    if asset_id.is_empty() {
        return Err(AppError::Forbidden(
            "Forbidden: only admins can change records without an asset.".to_string(),
        ));
    }
    let asset = get_row(pool, "assets", &asset_id, "id").await?;
    assert_asset_manager(user, &asset)
}

async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<FinancialRecordsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, LEDGER_ROLES)?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(record_type) = query.record_type {
        filters.insert("type".to_string(), Value::String(record_type.as_str().to_string()));
    }
    if let Some(asset_id) = non_empty_opt(query.asset_id.as_deref()) {
        filters.insert("asset_id".to_string(), Value::String(asset_id));
    }
    if let Some(from) = query.from {
        filters.insert("record_date__gte".to_string(), Value::String(from.to_string()));
    }
    if let Some(to) = query.to {
        filters.insert("record_date__lte".to_string(), Value::String(to.to_string()));
    }
    let scope = visible_asset_ids(pool, &user).await?;
    apply_scope(&mut filters, "asset_id", &scope);

    let rows = list_rows(
        pool,
        "financial_records",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "record_date",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn create_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateFinancialRecordInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, LEDGER_ROLES)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let mut record = remove_nulls(serialize_to_map(&payload));

    // A contract pins the record to that contract's asset.
    if let Some(contract_id) = non_empty_opt(payload.contract_id.as_deref()) {
        let contract = get_row(pool, "contracts", &contract_id, "id").await?;
        record.insert(
            "asset_id".to_string(),
            Value::String(val_str(&contract, "asset_id")),
        );
    }
    let scoped = Value::Object(record.clone());
    if user.role == Role::Owner && val_str(&scoped, "asset_id").is_empty() {
        return Err(AppError::UnprocessableEntity(
            "asset_id or contract_id is required.".to_string(),
        ));
    }
    assert_record_manager(pool, &user, &scoped).await?;

    if payload.record_date.is_none() {
        record.insert(
            "record_date".to_string(),
            Value::String(state.config.today().to_string()),
        );
    }

    let created = create_row(pool, "financial_records", &record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_record(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, LEDGER_ROLES)?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "financial_records", &path.id, "id").await?;
    match assert_record_manager(pool, &user, &record).await {
        Ok(()) => Ok(Json(record)),
        Err(AppError::Forbidden(_) | AppError::NotFound(_)) => Err(AppError::NotFound(
            "financial_records record not found.".to_string(),
        )),
        Err(error) => Err(error),
    }
}

async fn update_record(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateFinancialRecordInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, LEDGER_ROLES)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "financial_records", &path.id, "id").await?;
    assert_record_manager(pool, &user, &existing).await?;

    let patch = remove_nulls(serialize_to_map(&payload));
    let updated = update_row(pool, "financial_records", &path.id, &patch, "id").await?;
    Ok(Json(updated))
}

async fn delete_record(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, LEDGER_ROLES)?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "financial_records", &path.id, "id").await?;
    assert_record_manager(pool, &user, &existing).await?;

    let deleted = delete_row(pool, "financial_records", &path.id, "id").await?;
    Ok(Json(deleted))
}
