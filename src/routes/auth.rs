use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Map, Value};

use crate::{
    auth::{issue_token, require_user, verify_password, AuthUser},
    error::{AppError, AppResult},
    repository::{
        table_service::{get_row, list_rows},
        val_str,
    },
    routes::users::public_user,
    schemas::{validate_input, LoginInput},
    state::{db_pool, AppState},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/auth/login", axum::routing::post(login))
        .route("/auth/me", axum::routing::get(me))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    filters.insert(
        "phone".to_string(),
        Value::String(payload.phone.trim().to_string()),
    );
    let row = list_rows(pool, "users", Some(&filters), 1, 0, "created_at", false)
        .await?
        .pop();

    // Unknown phone and wrong password look the same to the caller.
    let invalid = || AppError::Unauthorized("Invalid phone or password.".to_string());
    let row = row.ok_or_else(invalid)?;
    if !verify_password(&payload.password, &val_str(&row, "password")) {
        tracing::info!(phone = %payload.phone, "Rejected login attempt");
        return Err(invalid());
    }
    let user = AuthUser::from_row(&row).ok_or_else(invalid)?;

    let token = issue_token(&state.config, &user.id, user.role)?;
    state.user_cache.insert(user.id.clone(), user.clone()).await;
    tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

    Ok(Json(json!({
        "token": token,
        "token_type": "Bearer",
        "expires_in_hours": state.config.jwt_ttl_hours,
        "user": public_user(row),
    })))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;
    let row = get_row(pool, "users", &user.id, "id").await?;
    Ok(Json(public_user(row)))
}
