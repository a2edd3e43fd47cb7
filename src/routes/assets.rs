use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    access::{apply_scope, assert_asset_manager, load_visible_asset, visible_asset_ids},
    auth::{require_role, require_user, AuthUser},
    error::{AppError, AppResult},
    models::{AssetStatus, AssetType, Role},
    repository::{
        non_empty_opt,
        table_service::{create_row, delete_row, get_row, list_rows, update_row},
        val_str,
    },
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, AssetsQuery,
        CreateAssetInput, CreateUnitInput, IdPath, UpdateAssetInput,
    },
    services::asset_status::{run_asset_status_reconciliation, ReconcileScope},
    state::{db_pool, AppState},
};

/// Location columns a unit copies from its parent.
const INHERITED_LOCATION: &[&str] = &[
    "address",
    "subdistrict",
    "district",
    "province",
    "postal_code",
    "latitude",
    "longitude",
];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/assets",
            axum::routing::get(list_assets).post(create_asset),
        )
        .route(
            "/assets/reconcile-status",
            axum::routing::post(reconcile_status),
        )
        .route(
            "/assets/{id}",
            axum::routing::get(get_asset)
                .patch(update_asset)
                .delete(delete_asset),
        )
        .route("/assets/{id}/children", axum::routing::get(list_children))
        .route("/assets/{id}/units", axum::routing::post(create_unit))
}

async fn list_assets(
    State(state): State<AppState>,
    Query(query): Query<AssetsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(status) = query.status {
        filters.insert("status".to_string(), Value::String(status.as_str().to_string()));
    }
    if let Some(asset_type) = query.asset_type {
        filters.insert("type".to_string(), Value::String(asset_type.as_str().to_string()));
    }
    if let Some(parent_id) = non_empty_opt(query.parent_id.as_deref()) {
        filters.insert("parent_id".to_string(), Value::String(parent_id));
    }
    if let Some(owner_id) = non_empty_opt(query.owner_id.as_deref()) {
        filters.insert("owner_id".to_string(), Value::String(owner_id));
    }
    let scope = visible_asset_ids(pool, &user).await?;
    apply_scope(&mut filters, "id", &scope);

    let rows = list_rows(
        pool,
        "assets",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        query.offset,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

/// Owners always own what they create; admins must say who the owner is.
fn resolve_owner_id(user: &AuthUser, requested: Option<&str>) -> AppResult<String> {
    match user.role {
        Role::Owner => Ok(user.id.clone()),
        Role::Admin => non_empty_opt(requested).ok_or_else(|| {
            AppError::UnprocessableEntity("owner_id is required when an admin creates an asset.".to_string())
        }),
        Role::Tenant => Err(AppError::Forbidden(
            "Forbidden: tenants cannot create assets.".to_string(),
        )),
    }
}

async fn create_asset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateAssetInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin, Role::Owner])?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    let mut owner_id = resolve_owner_id(&user, payload.owner_id.as_deref())?;

    if let Some(parent_id) = non_empty_opt(payload.parent_id.as_deref()) {
        let parent = get_row(pool, "assets", &parent_id, "id").await?;
        assert_asset_manager(&user, &parent)?;
        owner_id = val_str(&parent, "owner_id");
    }
    record.insert("owner_id".to_string(), Value::String(owner_id));

    let created = create_row(pool, "assets", &record).await?;
    tracing::info!(
        asset_id = %val_str(&created, "id"),
        created_by = %user.id,
        "Asset created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_asset(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;
    Ok(Json(load_visible_asset(pool, &user, &path.id).await?))
}

async fn update_asset(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateAssetInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "assets", &path.id, "id").await?;
    assert_asset_manager(&user, &existing)?;

    let patch = remove_nulls(serialize_to_map(&payload));
    let updated = update_row(pool, "assets", &path.id, &patch, "id").await?;
    if !changes_status(&existing, &patch) {
        return Ok(Json(updated));
    }

    // A manual status (e.g. leaving maintenance) is re-checked against contracts.
    match run_asset_status_reconciliation(pool, state.config.today(), ReconcileScope::Asset(&path.id))
        .await
    {
        Ok(summary) if summary.changed > 0 => {
            tracing::info!(asset_id = %path.id, "Asset status reconciled after manual change");
            Ok(Json(get_row(pool, "assets", &path.id, "id").await?))
        }
        Ok(_) => Ok(Json(updated)),
        Err(error) => {
            tracing::warn!(asset_id = %path.id, error = %error, "Asset status reconciliation failed");
            Ok(Json(updated))
        }
    }
}

fn changes_status(existing: &Value, patch: &Map<String, Value>) -> bool {
    let Some(next) = patch.get("status").and_then(Value::as_str) else {
        return false;
    };
    AssetStatus::parse(next) != AssetStatus::parse(&val_str(existing, "status"))
}

async fn delete_asset(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "assets", &path.id, "id").await?;
    assert_asset_manager(&user, &existing)?;

    let deleted = delete_row(pool, "assets", &path.id, "id").await?;
    tracing::info!(asset_id = %path.id, deleted_by = %user.id, "Asset deleted");
    Ok(Json(deleted))
}

async fn list_children(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let parent = load_visible_asset(pool, &user, &path.id).await?;
    let mut filters = Map::new();
    filters.insert("parent_id".to_string(), Value::String(val_str(&parent, "id")));
    let scope = visible_asset_ids(pool, &user).await?;
    apply_scope(&mut filters, "id", &scope);

    let rows = list_rows(pool, "assets", Some(&filters), 1000, 0, "name", true).await?;
    Ok(Json(json!({ "data": rows })))
}

/// Builds a child unit row from its parent: same owner and location, the
/// parent's type unless one is given, and `available` status.
fn unit_record(parent: &Value, input: &CreateUnitInput) -> Map<String, Value> {
    let mut record = remove_nulls(serialize_to_map(input));
    for column in INHERITED_LOCATION {
        if let Some(value) = parent.get(*column).filter(|value| !value.is_null()) {
            record.insert((*column).to_string(), value.clone());
        }
    }
    let unit_type = input
        .asset_type
        .or_else(|| AssetType::parse(&val_str(parent, "type")))
        .unwrap_or(AssetType::Apartment);
    record.insert("type".to_string(), Value::String(unit_type.as_str().to_string()));
    record.insert("owner_id".to_string(), Value::String(val_str(parent, "owner_id")));
    record.insert("parent_id".to_string(), Value::String(val_str(parent, "id")));
    record.insert(
        "status".to_string(),
        Value::String(AssetStatus::Available.as_str().to_string()),
    );
    record
}

async fn create_unit(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<CreateUnitInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let parent = get_row(pool, "assets", &path.id, "id").await?;
    assert_asset_manager(&user, &parent)?;

    let created = create_row(pool, "assets", &unit_record(&parent, &payload)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn reconcile_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin, Role::Owner])?;
    let pool = db_pool(&state)?;

    let scope = if user.is_admin() {
        ReconcileScope::All
    } else {
        ReconcileScope::Owner(&user.id)
    };
    let summary = run_asset_status_reconciliation(pool, state.config.today(), scope).await?;
    tracing::info!(
        requested_by = %user.id,
        checked = summary.checked,
        changed = summary.changed,
        "Asset status reconciliation finished"
    );
    Ok(Json(json!({ "data": summary })))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{changes_status, resolve_owner_id, unit_record};
    use crate::{auth::AuthUser, models::Role, schemas::CreateUnitInput};

    fn user(id: &str, role: Role) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            role,
            name: String::new(),
            phone: String::new(),
        }
    }

    #[test]
    fn forces_owner_id_for_owners() {
        let owner = user("o1", Role::Owner);
        assert_eq!(resolve_owner_id(&owner, Some("o2")).expect("owner"), "o1");

        let admin = user("a1", Role::Admin);
        assert_eq!(resolve_owner_id(&admin, Some("o2")).expect("owner"), "o2");
        assert!(resolve_owner_id(&admin, None).is_err());
        assert!(resolve_owner_id(&user("t1", Role::Tenant), None).is_err());
    }

    #[test]
    fn units_inherit_owner_type_and_location() {
        let parent = json!({
            "id": "p1",
            "owner_id": "o1",
            "type": "land",
            "province": "เชียงใหม่",
            "latitude": 18.79,
            "longitude": null,
            "status": "rented"
        });
        let input = CreateUnitInput {
            name: "Lot 3".to_string(),
            asset_type: None,
            size: Some(400.0),
            rooms: None,
            current_value: None,
        };
        let record = unit_record(&parent, &input);
        assert_eq!(record.get("owner_id"), Some(&json!("o1")));
        assert_eq!(record.get("parent_id"), Some(&json!("p1")));
        assert_eq!(record.get("type"), Some(&json!("land")));
        assert_eq!(record.get("province"), Some(&json!("เชียงใหม่")));
        assert_eq!(record.get("status"), Some(&json!("available")));
        assert!(!record.contains_key("longitude"));
        assert!(!record.contains_key("rooms"));
    }

    #[test]
    fn leaving_maintenance_triggers_reconciliation() {
        let existing = json!({ "id": "a1", "status": "maintenance" });
        let leave = json!({ "status": "available" });
        let rename = json!({ "name": "Unit 2B" });
        let same = json!({ "status": "Maintenance" });

        assert!(changes_status(&existing, leave.as_object().expect("object")));
        assert!(!changes_status(&existing, rename.as_object().expect("object")));
        assert!(!changes_status(&existing, same.as_object().expect("object")));
    }
}
