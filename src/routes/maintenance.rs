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
    access::{apply_scope, assert_asset_manager, load_visible_asset, visible_asset_ids},
    auth::{require_user, AuthUser},
    error::{AppError, AppResult},
    models::{FinancialType, MaintenanceStatus, Role},
    repository::{
        non_empty_opt,
        table_service::{create_row, delete_row, get_row, list_rows, update_row},
        val_date, val_f64, val_str,
    },
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input,
        CreateMaintenanceInput, IdPath, MaintenanceQuery, UpdateMaintenanceInput,
    },
    services::notifications::{notify, NewNotification},
    state::{db_pool, AppState},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/maintenance",
            axum::routing::get(list_maintenance).post(create_maintenance),
        )
        .route(
            "/maintenance/{id}",
            axum::routing::get(get_maintenance)
                .patch(update_maintenance)
                .delete(delete_maintenance),
        )
}

/// Maintenance rows are readable by whoever can read their asset.
async fn load_visible_request(pool: &PgPool, user: &AuthUser, id: &str) -> AppResult<(Value, Value)> {
    let record = get_row(pool, "maintenance", id, "id").await?;
    let asset = load_visible_asset(pool, user, &val_str(&record, "asset_id"))
        .await
        .map_err(|error| match error {
            AppError::NotFound(_) => AppError::NotFound("maintenance record not found.".to_string()),
            other => other,
        })?;
    Ok((record, asset))
}

async fn list_maintenance(
    State(state): State<AppState>,
    Query(query): Query<MaintenanceQuery>,
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
    let scope = visible_asset_ids(pool, &user).await?;
    apply_scope(&mut filters, "asset_id", &scope);

    let rows = list_rows(
        pool,
        "maintenance",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

/// Tenants report problems; only managers set cost and status.
fn report_record(user: &AuthUser, input: &CreateMaintenanceInput) -> Map<String, Value> {
    let mut record = remove_nulls(serialize_to_map(input));
    if user.role == Role::Tenant {
        record.remove("cost");
        record.insert(
            "status".to_string(),
            Value::String(MaintenanceStatus::Pending.as_str().to_string()),
        );
    }
    record.insert("reported_by".to_string(), Value::String(user.id.clone()));
    record
}

async fn create_maintenance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateMaintenanceInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    // Tenants may only report on assets their contracts reach.
    let asset = load_visible_asset(pool, &user, &payload.asset_id).await?;
    let created = create_row(pool, "maintenance", &report_record(&user, &payload)).await?;

    let owner_id = val_str(&asset, "owner_id");
    if owner_id != user.id {
        notify(
            pool,
            NewNotification {
                user_id: &owner_id,
                kind: "maintenance_reported",
                title: "Maintenance reported".to_string(),
                message: format!("{}: {}", val_str(&asset, "name"), payload.title),
                related_id: Some(&val_str(&created, "id")),
            },
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_maintenance(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;
    let (record, _) = load_visible_request(pool, &user, &path.id).await?;
    Ok(Json(record))
}

fn is_completing(existing: &Value, input: &UpdateMaintenanceInput) -> bool {
    input.status == Some(MaintenanceStatus::Completed)
        && MaintenanceStatus::parse(&val_str(existing, "status")) != Some(MaintenanceStatus::Completed)
}

/// Completion stamps today's date unless one was given.
fn completion_patch(
    existing: &Value,
    input: &UpdateMaintenanceInput,
    today: NaiveDate,
) -> Map<String, Value> {
    let mut patch = remove_nulls(serialize_to_map(input));
    if is_completing(existing, input) && input.completed_date.is_none() {
        patch.insert("completed_date".to_string(), Value::String(today.to_string()));
    }
    patch
}

fn expense_record(record: &Value, date: NaiveDate) -> Map<String, Value> {
    let mut expense = Map::new();
    expense.insert("asset_id".to_string(), Value::String(val_str(record, "asset_id")));
    expense.insert(
        "type".to_string(),
        Value::String(FinancialType::Expense.as_str().to_string()),
    );
    expense.insert("category".to_string(), Value::String("maintenance".to_string()));
    expense.insert("amount".to_string(), json!(val_f64(record, "cost")));
    expense.insert("description".to_string(), Value::String(val_str(record, "title")));
    expense.insert("record_date".to_string(), Value::String(date.to_string()));
    expense
}

async fn update_maintenance(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateMaintenanceInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "maintenance", &path.id, "id").await?;
    let asset = get_row(pool, "assets", &val_str(&existing, "asset_id"), "id").await?;
    assert_asset_manager(&user, &asset)?;

    let today = state.config.today();
    let patch = completion_patch(&existing, &payload, today);
    let completed_now = is_completing(&existing, &payload);
    let updated = update_row(pool, "maintenance", &path.id, &patch, "id").await?;

    if completed_now && val_f64(&updated, "cost") > 0.0 {
        let spent_on = val_date(&updated, "completed_date").unwrap_or(today);
        create_row(pool, "financial_records", &expense_record(&updated, spent_on)).await?;
    }

    if let Some(status) = payload.status {
        let reporter = val_str(&existing, "reported_by");
        if !reporter.is_empty() && reporter != user.id {
            notify(
                pool,
                NewNotification {
                    user_id: &reporter,
                    kind: "maintenance_updated",
                    title: "Maintenance status changed".to_string(),
                    message: format!("{} is now {status}.", val_str(&updated, "title")),
                    related_id: Some(&path.id),
                },
            )
            .await;
        }
    }

    Ok(Json(updated))
}

async fn delete_maintenance(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "maintenance", &path.id, "id").await?;
    let asset = get_row(pool, "assets", &val_str(&existing, "asset_id"), "id").await?;
    assert_asset_manager(&user, &asset)?;

    let deleted = delete_row(pool, "maintenance", &path.id, "id").await?;
    Ok(Json(deleted))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{completion_patch, expense_record, report_record};
    use crate::{
        auth::AuthUser,
        models::{MaintenanceStatus, Role},
        schemas::{CreateMaintenanceInput, UpdateMaintenanceInput},
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn update(status: Option<MaintenanceStatus>) -> UpdateMaintenanceInput {
        UpdateMaintenanceInput {
            maintenance_type: None,
            title: None,
            description: None,
            cost: None,
            status,
            scheduled_date: None,
            completed_date: None,
        }
    }

    #[test]
    fn tenant_reports_are_pending_and_costless() {
        let tenant = AuthUser {
            id: "t1".to_string(),
            role: Role::Tenant,
            name: String::new(),
            phone: String::new(),
        };
        let input: CreateMaintenanceInput = serde_json::from_value(json!({
            "asset_id": "a1",
            "title": "Leaking tap",
            "cost": 500,
            "status": "completed"
        }))
        .expect("valid input");
        let record = report_record(&tenant, &input);
        assert_eq!(record.get("reported_by"), Some(&json!("t1")));
        assert_eq!(record.get("status"), Some(&json!("pending")));
        assert_eq!(record.get("type"), Some(&json!("repair")));
        assert!(!record.contains_key("cost"));
    }

    #[test]
    fn completion_stamps_today_once() {
        let open = json!({ "status": "in_progress" });
        let patch = completion_patch(&open, &update(Some(MaintenanceStatus::Completed)), date(2024, 6, 15));
        assert_eq!(patch.get("completed_date"), Some(&json!("2024-06-15")));

        let done = json!({ "status": "completed" });
        let patch = completion_patch(&done, &update(Some(MaintenanceStatus::Completed)), date(2024, 6, 15));
        assert!(!patch.contains_key("completed_date"));

        let patch = completion_patch(&open, &update(None), date(2024, 6, 15));
        assert!(patch.is_empty());
    }

    #[test]
    fn completed_cost_becomes_an_expense() {
        let record = json!({ "asset_id": "a1", "title": "Roof repair", "cost": "3200" });
        let expense = expense_record(&record, date(2024, 6, 15));
        assert_eq!(expense.get("type"), Some(&json!("expense")));
        assert_eq!(expense.get("category"), Some(&json!("maintenance")));
        assert_eq!(expense.get("amount"), Some(&json!(3200.0)));
    }
}
