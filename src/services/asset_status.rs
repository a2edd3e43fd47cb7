use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

use crate::{
    error::{AppError, AppResult},
    models::{AssetStatus, ContractStatus},
    repository::table_service::update_row,
};

/// The part of a contract that decides occupancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractWindow {
    pub status: Option<ContractStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ContractWindow {
    /// Active and `start_date <= today <= end_date`, both ends inclusive.
    /// A contract missing either date never covers a day.
    pub fn covers(&self, today: NaiveDate) -> bool {
        match (self.status, self.start_date, self.end_date) {
            (Some(ContractStatus::Active), Some(start), Some(end)) => start <= today && today <= end,
            _ => false,
        }
    }
}

/// Decides the new status of one asset, `None` meaning "leave as is".
///
/// `maintenance` is a manual override and is never cleared here.
pub fn reconcile_asset_status(
    current: Option<AssetStatus>,
    contracts: &[ContractWindow],
    today: NaiveDate,
) -> Option<AssetStatus> {
    if current == Some(AssetStatus::Maintenance) {
        return None;
    }

    let occupied = contracts.iter().any(|contract| contract.covers(today));
    match (occupied, current) {
        (true, Some(AssetStatus::Rented)) => None,
        (true, _) => Some(AssetStatus::Rented),
        (false, Some(AssetStatus::Rented)) => Some(AssetStatus::Available),
        (false, _) => None,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ReconcileScope<'a> {
    All,
    Owner(&'a str),
    Asset(&'a str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReconcileSummary {
    pub today: Option<NaiveDate>,
    pub checked: u32,
    pub marked_rented: u32,
    pub marked_available: u32,
    pub skipped_maintenance: u32,
    pub changed: u32,
}

/// Recomputes occupancy for every asset in `scope` and persists the changes.
///
/// Only assets whose status actually changes are written, so a second run
/// over unchanged data reports `changed == 0`. A database error aborts the
/// run; writes already made stay (each update is its own statement).
pub async fn run_asset_status_reconciliation(
    pool: &PgPool,
    today: NaiveDate,
    scope: ReconcileScope<'_>,
) -> AppResult<ReconcileSummary> {
    let assets = load_assets(pool, scope).await?;
    let asset_ids = assets.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>();
    let mut windows = load_contract_windows(pool, &asset_ids).await?;

    let mut summary = ReconcileSummary {
        today: Some(today),
        ..ReconcileSummary::default()
    };

    for (asset_id, raw_status) in assets {
        summary.checked += 1;
        let current = raw_status.as_deref().and_then(AssetStatus::parse);
        if current == Some(AssetStatus::Maintenance) {
            summary.skipped_maintenance += 1;
            continue;
        }

        let contracts = windows.remove(&asset_id).unwrap_or_default();
        let Some(next) = reconcile_asset_status(current, &contracts, today) else {
            continue;
        };

        let mut patch = Map::new();
        patch.insert("status".to_string(), Value::String(next.as_str().to_string()));
        update_row(pool, "assets", &asset_id, &patch, "id").await?;

        summary.changed += 1;
        match next {
            AssetStatus::Rented => summary.marked_rented += 1,
            AssetStatus::Available => summary.marked_available += 1,
            AssetStatus::Maintenance => {}
        }
    }

    info!(
        today = %today,
        checked = summary.checked,
        changed = summary.changed,
        rented = summary.marked_rented,
        available = summary.marked_available,
        maintenance = summary.skipped_maintenance,
        "Asset status reconciliation completed"
    );

    Ok(summary)
}

async fn load_assets(
    pool: &PgPool,
    scope: ReconcileScope<'_>,
) -> AppResult<Vec<(String, Option<String>)>> {
    let mut query =
        QueryBuilder::<Postgres>::new("SELECT id::text, status::text FROM assets WHERE 1=1");
    match scope {
        ReconcileScope::All => {}
        ReconcileScope::Owner(owner_id) => {
            query
                .push(" AND owner_id::text = ")
                .push_bind(owner_id.to_string());
        }
        ReconcileScope::Asset(asset_id) => {
            query.push(" AND id::text = ").push_bind(asset_id.to_string());
        }
    }
    query.push(" ORDER BY id");

    query
        .build_query_as::<(String, Option<String>)>()
        .fetch_all(pool)
        .await
        .map_err(db_error)
}

async fn load_contract_windows(
    pool: &PgPool,
    asset_ids: &[String],
) -> AppResult<HashMap<String, Vec<ContractWindow>>> {
    if asset_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, (String, Option<String>, Option<NaiveDate>, Option<NaiveDate>)>(
        "SELECT asset_id::text, status::text, start_date, end_date
         FROM contracts
         WHERE asset_id::text = ANY($1)",
    )
    .bind(asset_ids)
    .fetch_all(pool)
    .await
    .map_err(db_error)?;

    Ok(group_windows(rows))
}

fn group_windows(
    rows: Vec<(String, Option<String>, Option<NaiveDate>, Option<NaiveDate>)>,
) -> HashMap<String, Vec<ContractWindow>> {
    let mut grouped: HashMap<String, Vec<ContractWindow>> = HashMap::new();
    for (asset_id, status, start_date, end_date) in rows {
        grouped.entry(asset_id).or_default().push(ContractWindow {
            status: status.as_deref().and_then(ContractStatus::parse),
            start_date,
            end_date,
        });
    }
    grouped
}

fn db_error(error: sqlx::Error) -> AppError {
    tracing::error!(db_error = %error, "Asset status query failed");
    AppError::Dependency("Database operation failed.".to_string())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{group_windows, reconcile_asset_status, ContractWindow};
    use crate::models::{AssetStatus, ContractStatus};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn window(status: ContractStatus, start: NaiveDate, end: NaiveDate) -> ContractWindow {
        ContractWindow {
            status: Some(status),
            start_date: Some(start),
            end_date: Some(end),
        }
    }

    fn year_2024() -> ContractWindow {
        window(ContractStatus::Active, date(2024, 1, 1), date(2024, 12, 31))
    }

    #[test]
    fn active_contract_covering_today_rents_the_asset() {
        let today = date(2024, 6, 15);
        assert_eq!(
            reconcile_asset_status(Some(AssetStatus::Available), &[year_2024()], today),
            Some(AssetStatus::Rented)
        );
        assert_eq!(
            reconcile_asset_status(None, &[year_2024()], today),
            Some(AssetStatus::Rented)
        );
    }

    #[test]
    fn range_is_inclusive_on_both_ends() {
        assert!(year_2024().covers(date(2024, 1, 1)));
        assert!(year_2024().covers(date(2024, 12, 31)));
        assert!(!year_2024().covers(date(2023, 12, 31)));
        assert!(!year_2024().covers(date(2025, 1, 1)));
    }

    #[test]
    fn non_active_or_open_ended_contracts_do_not_count() {
        let today = date(2024, 6, 15);
        for status in [
            ContractStatus::Pending,
            ContractStatus::Expired,
            ContractStatus::Terminated,
        ] {
            assert!(!window(status, date(2024, 1, 1), date(2024, 12, 31)).covers(today));
        }
        let open_ended = ContractWindow {
            status: Some(ContractStatus::Active),
            start_date: Some(date(2024, 1, 1)),
            end_date: None,
        };
        assert!(!open_ended.covers(today));
    }

    #[test]
    fn rented_without_cover_becomes_available() {
        let today = date(2025, 2, 1);
        assert_eq!(
            reconcile_asset_status(Some(AssetStatus::Rented), &[year_2024()], today),
            Some(AssetStatus::Available)
        );
        assert_eq!(
            reconcile_asset_status(Some(AssetStatus::Rented), &[], today),
            Some(AssetStatus::Available)
        );
        assert_eq!(
            reconcile_asset_status(Some(AssetStatus::Available), &[], today),
            None
        );
    }

    #[test]
    fn maintenance_is_never_touched() {
        let covered = date(2024, 6, 15);
        let uncovered = date(2025, 6, 15);
        assert_eq!(
            reconcile_asset_status(Some(AssetStatus::Maintenance), &[year_2024()], covered),
            None
        );
        assert_eq!(
            reconcile_asset_status(Some(AssetStatus::Maintenance), &[], uncovered),
            None
        );
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let today = date(2024, 6, 15);
        let cases = [
            (Some(AssetStatus::Available), vec![year_2024()]),
            (Some(AssetStatus::Rented), vec![]),
            (Some(AssetStatus::Maintenance), vec![year_2024()]),
            (None, vec![]),
        ];
        for (initial, contracts) in cases {
            let after_first = reconcile_asset_status(initial, &contracts, today).or(initial);
            assert_eq!(reconcile_asset_status(after_first, &contracts, today), None);
        }
    }

    #[test]
    fn groups_contract_rows_by_asset() {
        let grouped = group_windows(vec![
            (
                "a1".to_string(),
                Some("active".to_string()),
                Some(date(2024, 1, 1)),
                Some(date(2024, 12, 31)),
            ),
            ("a1".to_string(), Some("weird".to_string()), None, None),
            ("a2".to_string(), None, None, None),
        ]);
        assert_eq!(grouped["a1"].len(), 2);
        assert_eq!(grouped["a1"][1].status, None);
        assert_eq!(grouped["a2"].len(), 1);
    }
}
