use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::{
    access::{
        apply_scope, assert_asset_manager, load_visible_contract, managed_asset_for_contract,
        visible_contract_ids,
    },
    auth::{require_role, require_user},
    error::{AppError, AppResult},
    models::Role,
    repository::{
        non_empty_opt,
        table_service::{create_row, delete_row, get_row, list_rows, update_row},
        val_date, val_str,
    },
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_date_range, validate_input,
        ContractsQuery, CreateContractInput, IdPath, UpdateContractInput,
    },
    services::{
        asset_status::{run_asset_status_reconciliation, ReconcileScope},
        notifications::{notify, NewNotification},
    },
    state::{db_pool, AppState},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/contracts",
            axum::routing::get(list_contracts).post(create_contract),
        )
        .route(
            "/contracts/{id}",
            axum::routing::get(get_contract)
                .patch(update_contract)
                .delete(delete_contract),
        )
}

/// `CT` + yyyymmdd of the start date + `-` + a short random suffix.
fn generate_contract_number(start_date: NaiveDate) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "CT{}-{}",
        start_date.format("%Y%m%d"),
        suffix[..6].to_ascii_uppercase()
    )
}

/// Occupancy follows the contract table, so every contract write
/// re-derives the status of the asset it belongs to.
async fn reconcile_asset(state: &AppState, pool: &PgPool, asset_id: &str) {
    if asset_id.is_empty() {
        return;
    }
    match run_asset_status_reconciliation(pool, state.config.today(), ReconcileScope::Asset(asset_id))
        .await
    {
        Ok(summary) if summary.changed > 0 => {
            tracing::info!(asset_id, "Asset status updated after contract change");
        }
        Ok(_) => {}
        Err(error) => {
            tracing::warn!(asset_id, error = %error, "Asset status reconciliation failed");
        }
    }
}

async fn ensure_tenant(pool: &PgPool, tenant_id: &str) -> AppResult<Value> {
    let tenant = match get_row(pool, "users", tenant_id, "id").await {
        Ok(row) => row,
        Err(AppError::NotFound(_)) => {
            return Err(AppError::UnprocessableEntity(
                "tenant_id does not reference an existing user.".to_string(),
            ))
        }
        Err(error) => return Err(error),
    };
    if Role::parse(&val_str(&tenant, "role")) != Some(Role::Tenant) {
        return Err(AppError::UnprocessableEntity(
            "tenant_id must reference a user with the tenant role.".to_string(),
        ));
    }
    Ok(tenant)
}

async fn list_contracts(
    State(state): State<AppState>,
    Query(query): Query<ContractsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(status) = query.status {
        filters.insert("status".to_string(), Value::String(status.as_str().to_string()));
    }
    if let Some(asset_id) = non_empty_opt(query.asset_id.as_deref()) {
        filters.insert("asset_id".to_string(), Value::String(asset_id));
    }
    if let Some(tenant_id) = non_empty_opt(query.tenant_id.as_deref()) {
        filters.insert("tenant_id".to_string(), Value::String(tenant_id));
    }
    let scope = visible_contract_ids(pool, &user).await?;
    apply_scope(&mut filters, "id", &scope);

    let rows = list_rows(
        pool,
        "contracts",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        query.offset,
        "start_date",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn create_contract(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateContractInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin, Role::Owner])?;
    validate_input(&payload)?;
    validate_date_range(payload.start_date, payload.end_date)?;
    let pool = db_pool(&state)?;

    let asset = get_row(pool, "assets", &payload.asset_id, "id").await?;
    assert_asset_manager(&user, &asset)?;
    ensure_tenant(pool, &payload.tenant_id).await?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    if non_empty_opt(payload.contract_number.as_deref()).is_none() {
        record.insert(
            "contract_number".to_string(),
            Value::String(generate_contract_number(payload.start_date)),
        );
    }

    let created = create_row(pool, "contracts", &record).await?;
    let contract_id = val_str(&created, "id");
    reconcile_asset(&state, pool, &payload.asset_id).await;

    notify(
        pool,
        NewNotification {
            user_id: &payload.tenant_id,
            kind: "contract_created",
            title: "New rental contract".to_string(),
            message: format!(
                "Contract {} for {} starts on {}.",
                val_str(&created, "contract_number"),
                val_str(&asset, "name"),
                payload.start_date
            ),
            related_id: Some(&contract_id),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_contract(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;
    Ok(Json(load_visible_contract(pool, &user, &path.id).await?))
}

async fn update_contract(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateContractInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin, Role::Owner])?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "contracts", &path.id, "id").await?;
    managed_asset_for_contract(pool, &user, &existing).await?;

    let start = payload.start_date.or_else(|| val_date(&existing, "start_date"));
    let end = payload.end_date.or_else(|| val_date(&existing, "end_date"));
    if let (Some(start), Some(end)) = (start, end) {
        validate_date_range(start, end)?;
    }
    if let Some(tenant_id) = non_empty_opt(payload.tenant_id.as_deref()) {
        ensure_tenant(pool, &tenant_id).await?;
    }

    let patch = remove_nulls(serialize_to_map(&payload));
    let updated = update_row(pool, "contracts", &path.id, &patch, "id").await?;
    reconcile_asset(&state, pool, &val_str(&updated, "asset_id")).await;

    Ok(Json(updated))
}

async fn delete_contract(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin, Role::Owner])?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "contracts", &path.id, "id").await?;
    managed_asset_for_contract(pool, &user, &existing).await?;

    let deleted = delete_row(pool, "contracts", &path.id, "id").await?;
    reconcile_asset(&state, pool, &val_str(&deleted, "asset_id")).await;
    tracing::info!(contract_id = %path.id, deleted_by = %user.id, "Contract deleted");

    Ok(Json(deleted))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::generate_contract_number;

    #[test]
    fn contract_numbers_carry_the_start_date() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let number = generate_contract_number(start);
        assert!(number.starts_with("CT20240101-"));
        assert_eq!(number.len(), "CT20240101-".len() + 6);
        assert_ne!(number, generate_contract_number(start));
    }
}
