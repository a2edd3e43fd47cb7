use std::collections::BTreeMap;

use axum::{extract::State, http::HeaderMap, Json};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::{
    access::{visible_asset_ids, visible_contract_ids, Scope},
    auth::{require_role, require_user, AuthUser},
    error::{AppError, AppResult},
    models::Role,
    repository::table_service::count_rows,
    services::dashboard::{month_bounds, summarize_portfolio, GroupTotal, PortfolioSummary},
    state::{db_pool, AppState},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/dashboard/summary", axum::routing::get(dashboard_summary))
        .route("/admin/summary", axum::routing::get(admin_summary))
}

/// Grouped count and amount over a whole table. `$1` narrows `column` to a
/// scope (NULL means unrestricted); `dated` adds a `[$2, $3)` window on
/// `record_date`.
fn grouped_totals_sql(
    table: &str,
    key: &str,
    column: &str,
    amount: Option<&str>,
    dated: bool,
) -> String {
    let amount = amount
        .map(|column| format!("COALESCE(SUM({column}), 0)::float8"))
        .unwrap_or_else(|| "0::float8".to_string());
    let window = if dated {
        " AND record_date >= $2 AND record_date < $3"
    } else {
        ""
    };
    format!(
        "SELECT COALESCE({key}::text, ''), COUNT(*), {amount} FROM {table}
         WHERE ($1::text[] IS NULL OR {column}::text = ANY($1)){window}
         GROUP BY 1"
    )
}

async fn grouped_totals(
    pool: &PgPool,
    sql: &str,
    scope: &Scope,
    month: Option<(NaiveDate, NaiveDate)>,
) -> AppResult<Vec<GroupTotal>> {
    let mut query = sqlx::query_as::<_, (String, i64, f64)>(sql).bind(scope.clone());
    if let Some((start, end)) = month {
        query = query.bind(start).bind(end);
    }
    let rows = query.fetch_all(pool).await.map_err(|error| {
        tracing::error!(db_error = %error, "Dashboard aggregate failed");
        AppError::Dependency("Database operation failed.".to_string())
    })?;
    Ok(rows.into_iter().map(GroupTotal::from).collect())
}

async fn portfolio_for(state: &AppState, pool: &PgPool, user: &AuthUser) -> AppResult<PortfolioSummary> {
    let today = state.config.today();
    let asset_scope = visible_asset_ids(pool, user).await?;
    let contract_scope = visible_contract_ids(pool, user).await?;

    let assets = grouped_totals(
        pool,
        &grouped_totals_sql("assets", "status", "id", None, false),
        &asset_scope,
        None,
    )
    .await?;
    let contracts = grouped_totals(
        pool,
        &grouped_totals_sql("contracts", "status", "id", None, false),
        &contract_scope,
        None,
    )
    .await?;
    let payments = grouped_totals(
        pool,
        &grouped_totals_sql("payments", "status", "contract_id", Some("amount"), false),
        &contract_scope,
        None,
    )
    .await?;

    // The ledger is not part of a tenant's view.
    let records = if user.role == Role::Tenant {
        Vec::new()
    } else {
        grouped_totals(
            pool,
            &grouped_totals_sql("financial_records", "type", "asset_id", Some("amount"), true),
            &asset_scope,
            Some(month_bounds(today)),
        )
        .await?
    };

    Ok(summarize_portfolio(&assets, &contracts, &payments, &records, today))
}

async fn dashboard_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;
    let summary = portfolio_for(&state, pool, &user).await?;
    Ok(Json(json!({ "data": summary })))
}

async fn admin_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin])?;
    let pool = db_pool(&state)?;

    let summary = portfolio_for(&state, pool, &user).await?;
    let mut users_by_role = BTreeMap::new();
    for role in Role::ALL {
        let mut filters = Map::new();
        filters.insert("role".to_string(), Value::String(role.as_str().to_string()));
        users_by_role.insert(role.as_str(), count_rows(pool, "users", Some(&filters)).await?);
    }

    Ok(Json(json!({
        "data": {
            "portfolio": summary,
            "users_by_role": users_by_role,
            "total_users": users_by_role.values().sum::<i64>(),
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::grouped_totals_sql;

    #[test]
    fn aggregates_without_a_row_cap() {
        let sql = grouped_totals_sql("payments", "status", "contract_id", Some("amount"), false);
        assert!(sql.contains("COALESCE(SUM(amount), 0)::float8"), "{sql}");
        assert!(sql.contains("contract_id::text = ANY($1)"), "{sql}");
        assert!(sql.contains("$1::text[] IS NULL"), "{sql}");
        assert!(!sql.to_ascii_uppercase().contains("LIMIT"), "{sql}");

        let sql = grouped_totals_sql("assets", "status", "id", None, false);
        assert!(sql.contains("0::float8 FROM assets"), "{sql}");
        assert!(!sql.contains("record_date"), "{sql}");

        let sql = grouped_totals_sql("financial_records", "type", "asset_id", Some("amount"), true);
        assert!(sql.contains("record_date >= $2 AND record_date < $3"), "{sql}");
    }
}
