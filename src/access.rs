//! Role-scoped visibility: admins see everything, owners see their assets
//! and what hangs off them, tenants see what their contracts reach.

use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::Role,
    repository::{table_service::get_row, val_str},
};

/// Visible ids of one table, or `None` when the caller is unrestricted.
pub type Scope = Option<Vec<String>>;

fn asset_scope_sql(role: Role) -> Option<&'static str> {
    match role {
        Role::Admin => None,
        Role::Owner => Some("SELECT id::text FROM assets WHERE owner_id::text = $1 ORDER BY 1"),
        Role::Tenant => Some(
            "SELECT DISTINCT asset_id::text FROM contracts
             WHERE tenant_id::text = $1 AND asset_id IS NOT NULL ORDER BY 1",
        ),
    }
}

fn contract_scope_sql(role: Role) -> Option<&'static str> {
    match role {
        Role::Admin => None,
        Role::Owner => Some(
            "SELECT c.id::text FROM contracts c JOIN assets a ON a.id = c.asset_id
             WHERE a.owner_id::text = $1 ORDER BY 1",
        ),
        Role::Tenant => Some("SELECT id::text FROM contracts WHERE tenant_id::text = $1 ORDER BY 1"),
    }
}

async fn scoped_ids(pool: &PgPool, sql: Option<&'static str>, user_id: &str) -> AppResult<Scope> {
    let Some(sql) = sql else {
        return Ok(None);
    };
    let ids = sqlx::query_scalar::<_, String>(sql)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(|error| {
            tracing::error!(db_error = %error, "Scope query failed");
            AppError::Dependency("Database operation failed.".to_string())
        })?;
    Ok(Some(ids))
}

pub async fn visible_asset_ids(pool: &PgPool, user: &AuthUser) -> AppResult<Scope> {
    scoped_ids(pool, asset_scope_sql(user.role), &user.id).await
}

pub async fn visible_contract_ids(pool: &PgPool, user: &AuthUser) -> AppResult<Scope> {
    scoped_ids(pool, contract_scope_sql(user.role), &user.id).await
}

pub fn id_array(ids: &[String]) -> Value {
    Value::Array(ids.iter().cloned().map(Value::String).collect())
}

/// Narrows list filters to the caller's scope on `column`.
pub fn apply_scope(filters: &mut Map<String, Value>, column: &str, scope: &Scope) {
    if let Some(ids) = scope {
        filters.insert(format!("{column}__in"), id_array(ids));
    }
}

fn in_scope(scope: &Scope, id: &str) -> bool {
    scope
        .as_ref()
        .map_or(true, |ids| ids.iter().any(|candidate| candidate == id))
}

/// Loads an asset the caller may read; out-of-scope rows read as missing.
pub async fn load_visible_asset(pool: &PgPool, user: &AuthUser, asset_id: &str) -> AppResult<Value> {
    let asset = get_row(pool, "assets", asset_id, "id").await?;
    let scope = visible_asset_ids(pool, user).await?;
    if in_scope(&scope, &val_str(&asset, "id")) {
        Ok(asset)
    } else {
        Err(AppError::NotFound("assets record not found.".to_string()))
    }
}

pub async fn load_visible_contract(
    pool: &PgPool,
    user: &AuthUser,
    contract_id: &str,
) -> AppResult<Value> {
    let contract = get_row(pool, "contracts", contract_id, "id").await?;
    let scope = visible_contract_ids(pool, user).await?;
    if in_scope(&scope, &val_str(&contract, "id")) {
        Ok(contract)
    } else {
        Err(AppError::NotFound("contracts record not found.".to_string()))
    }
}

/// Writes on an asset (and its contracts, payments, maintenance and
/// financial records) are reserved to admins and the asset's owner.
pub fn assert_asset_manager(user: &AuthUser, asset: &Value) -> AppResult<()> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Owner if val_str(asset, "owner_id") == user.id => Ok(()),
        _ => Err(AppError::Forbidden(
            "Forbidden: only the asset owner or an admin can change this record.".to_string(),
        )),
    }
}

/// Loads the asset behind a contract and checks the caller manages it.
pub async fn managed_asset_for_contract(
    pool: &PgPool,
    user: &AuthUser,
    contract: &Value,
) -> AppResult<Value> {
    let asset = get_row(pool, "assets", &val_str(contract, "asset_id"), "id").await?;
    assert_asset_manager(user, &asset)?;
    Ok(asset)
}
