use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::{
    auth::{require_user, AuthUser},
    error::{AppError, AppResult},
    models::NotificationStatus,
    repository::{
        table_service::{count_rows, delete_row, get_row, list_rows, update_row},
        val_str,
    },
    schemas::{clamp_limit_in_range, IdPath, NotificationsQuery},
    state::{db_pool, AppState},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/notifications", axum::routing::get(list_notifications))
        .route(
            "/notifications/read-all",
            axum::routing::post(mark_all_read),
        )
        .route(
            "/notifications/{id}",
            axum::routing::delete(delete_notification),
        )
        .route(
            "/notifications/{id}/read",
            axum::routing::post(mark_read),
        )
}

fn own_filters(user: &AuthUser) -> Map<String, Value> {
    let mut filters = Map::new();
    filters.insert("user_id".to_string(), Value::String(user.id.clone()));
    filters
}

fn is_read(record: &Value) -> bool {
    NotificationStatus::parse(&val_str(record, "status")) == Some(NotificationStatus::Read)
}

/// Someone else's notification reads as missing.
async fn load_own_notification(pool: &PgPool, user: &AuthUser, id: &str) -> AppResult<Value> {
    let record = get_row(pool, "notifications", id, "id").await?;
    if val_str(&record, "user_id") != user.id {
        return Err(AppError::NotFound("notifications record not found.".to_string()));
    }
    Ok(record)
}

async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut filters = own_filters(&user);
    if let Some(status) = query.status {
        filters.insert("status".to_string(), Value::String(status.as_str().to_string()));
    }
    let rows = list_rows(
        pool,
        "notifications",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 500),
        0,
        "created_at",
        false,
    )
    .await?;

    let mut unread = own_filters(&user);
    unread.insert(
        "status".to_string(),
        Value::String(NotificationStatus::Unread.as_str().to_string()),
    );
    let unread_count = count_rows(pool, "notifications", Some(&unread)).await?;

    Ok(Json(json!({ "data": rows, "unread_count": unread_count })))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = load_own_notification(pool, &user, &path.id).await?;
    if is_read(&record) {
        return Ok(Json(record));
    }
    let mut patch = Map::new();
    patch.insert(
        "status".to_string(),
        Value::String(NotificationStatus::Read.as_str().to_string()),
    );
    let updated = update_row(pool, "notifications", &path.id, &patch, "id").await?;
    Ok(Json(updated))
}

async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let outcome = sqlx::query(
        "UPDATE notifications SET status = 'read'
         WHERE user_id::text = $1 AND status::text = 'unread'",
    )
    .bind(&user.id)
    .execute(pool)
    .await
    .map_err(|error| {
        tracing::error!(error = %error, "Marking notifications read failed");
        AppError::Dependency("Database request failed.".to_string())
    })?;

    Ok(Json(json!({ "updated": outcome.rows_affected() })))
}

async fn delete_notification(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;

    load_own_notification(pool, &user, &path.id).await?;
    let deleted = delete_row(pool, "notifications", &path.id, "id").await?;
    Ok(Json(deleted))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::is_read;

    #[test]
    fn already_read_notifications_are_left_alone() {
        assert!(is_read(&json!({ "status": "read" })));
        assert!(is_read(&json!({ "status": " READ " })));
        assert!(!is_read(&json!({ "status": "unread" })));
        assert!(!is_read(&json!({})));
    }
}
