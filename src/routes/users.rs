use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::{hash_password, require_role, require_user},
    error::{AppError, AppResult},
    models::Role,
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreateUserInput,
        IdPath, UpdateProfileInput, UpdateUserInput, UsersQuery,
    },
    state::{db_pool, AppState},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/users",
            axum::routing::get(list_users).post(create_user),
        )
        .route("/users/me", axum::routing::patch(update_profile))
        .route(
            "/users/{id}",
            axum::routing::get(get_user)
                .patch(update_user)
                .delete(delete_user),
        )
}

/// Strips the password hash before a user row leaves the service.
pub fn public_user(mut row: Value) -> Value {
    if let Some(object) = row.as_object_mut() {
        object.remove("password");
    }
    row
}

fn hash_password_field(patch: &mut Map<String, Value>) -> AppResult<()> {
    if let Some(Value::String(password)) = patch.get("password") {
        let hashed = hash_password(password)?;
        patch.insert("password".to_string(), Value::String(hashed));
    }
    Ok(())
}

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UsersQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin])?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(role) = query.role {
        filters.insert("role".to_string(), Value::String(role.as_str().to_string()));
    }

    let rows = list_rows(
        pool,
        "users",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "created_at",
        false,
    )
    .await?
    .into_iter()
    .map(public_user)
    .collect::<Vec<_>>();

    Ok(Json(json!({ "data": rows })))
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateUserInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin])?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.insert(
        "phone".to_string(),
        Value::String(payload.phone.trim().to_string()),
    );
    hash_password_field(&mut record)?;

    let created = create_row(pool, "users", &record).await?;
    tracing::info!(
        created_by = %user.id,
        role = %payload.role,
        "User account created"
    );
    Ok((StatusCode::CREATED, Json(public_user(created))))
}

async fn get_user(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin])?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "users", &path.id, "id").await?;
    Ok(Json(public_user(record)))
}

async fn update_user(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateUserInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin])?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let mut patch = remove_nulls(serialize_to_map(&payload));
    hash_password_field(&mut patch)?;

    let updated = update_row(pool, "users", &path.id, &patch, "id").await?;
    state.user_cache.invalidate(&path.id).await;
    Ok(Json(public_user(updated)))
}

async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let mut patch = remove_nulls(serialize_to_map(&payload));
    hash_password_field(&mut patch)?;

    let updated = update_row(pool, "users", &user.id, &patch, "id").await?;
    state.user_cache.invalidate(&user.id).await;
    Ok(Json(public_user(updated)))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin])?;
    if path.id == user.id {
        return Err(AppError::BadRequest(
            "Admins cannot delete their own account.".to_string(),
        ));
    }
    let pool = db_pool(&state)?;

    let deleted = delete_row(pool, "users", &path.id, "id").await?;
    state.user_cache.invalidate(&path.id).await;
    tracing::info!(deleted_by = %user.id, user_id = %path.id, "User account deleted");
    Ok(Json(public_user(deleted)))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{hash_password_field, public_user};
    use crate::auth::verify_password;

    #[test]
    fn strips_password_hash() {
        let row = public_user(json!({ "id": "u1", "password": "$argon2id$...", "name": "A" }));
        assert_eq!(row, json!({ "id": "u1", "name": "A" }));
    }

    #[test]
    fn hashes_password_in_patch() {
        let mut patch = Map::new();
        patch.insert("password".to_string(), Value::String("new-secret".to_string()));
        hash_password_field(&mut patch).expect("hash");
        let stored = patch
            .get("password")
            .and_then(Value::as_str)
            .unwrap_or_default();
        assert!(verify_password("new-secret", stored));

        let mut untouched = Map::new();
        untouched.insert("name".to_string(), json!("B"));
        hash_password_field(&mut untouched).expect("no-op");
        assert!(!untouched.contains_key("password"));
    }
}
