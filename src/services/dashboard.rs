use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::models::{AssetStatus, ContractStatus, FinancialType, PaymentStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total_assets: u32,
    pub assets_by_status: BTreeMap<String, u32>,
    pub active_contracts: u32,
    pub payments_by_status: BTreeMap<String, u32>,
    pub outstanding_amount: f64,
    pub month_start: Option<NaiveDate>,
    pub month_income: f64,
    pub month_expense: f64,
    pub month_net: f64,
}

/// First day of the month containing `today` and of the following month.
pub fn month_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today.with_day(1).unwrap_or(today);
    let next = if start.month() == 12 {
        NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
    };
    (start, next.unwrap_or(start))
}

/// One `GROUP BY` bucket: the grouped status or type, its row count and
/// the summed amount (zero for tables without one).
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotal {
    pub key: String,
    pub count: i64,
    pub amount: f64,
}

impl From<(String, i64, f64)> for GroupTotal {
    fn from((key, count, amount): (String, i64, f64)) -> Self {
        Self { key, count, amount }
    }
}

fn as_count(count: i64) -> u32 {
    u32::try_from(count.max(0)).unwrap_or(u32::MAX)
}

/// Builds the summary from grouped totals of assets by status, contracts
/// by status, payments by status and this month's ledger by type.
pub fn summarize_portfolio(
    assets_by_status: &[GroupTotal],
    contracts_by_status: &[GroupTotal],
    payments_by_status: &[GroupTotal],
    month_records_by_type: &[GroupTotal],
    today: NaiveDate,
) -> PortfolioSummary {
    let mut summary = PortfolioSummary::default();

    for status in AssetStatus::ALL {
        summary.assets_by_status.insert(status.as_str().to_string(), 0);
    }
    for group in assets_by_status {
        let count = as_count(group.count);
        summary.total_assets = summary.total_assets.saturating_add(count);
        *summary.assets_by_status.entry(group.key.clone()).or_default() += count;
    }

    summary.active_contracts = contracts_by_status
        .iter()
        .filter(|group| ContractStatus::parse(&group.key) == Some(ContractStatus::Active))
        .map(|group| as_count(group.count))
        .sum();

    for status in PaymentStatus::ALL {
        summary.payments_by_status.insert(status.as_str().to_string(), 0);
    }
    for group in payments_by_status {
        let Some(status) = PaymentStatus::parse(&group.key) else {
            continue;
        };
        *summary
            .payments_by_status
            .entry(status.as_str().to_string())
            .or_default() += as_count(group.count);
        if matches!(
            status,
            PaymentStatus::Pending | PaymentStatus::Overdue | PaymentStatus::WaitingApproval
        ) {
            summary.outstanding_amount += group.amount;
        }
    }

    let (month_start, _) = month_bounds(today);
    summary.month_start = Some(month_start);
    for group in month_records_by_type {
        match FinancialType::parse(&group.key) {
            Some(FinancialType::Income) => summary.month_income += group.amount,
            Some(FinancialType::Expense) => summary.month_expense += group.amount,
            None => {}
        }
    }
    summary.month_net = summary.month_income - summary.month_expense;

    summary
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use super::{month_bounds, summarize_portfolio, GroupTotal};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn computes_month_bounds_across_year_end() {
        assert_eq!(month_bounds(date(2024, 6, 15)), (date(2024, 6, 1), date(2024, 7, 1)));
        assert_eq!(month_bounds(date(2024, 12, 31)), (date(2024, 12, 1), date(2025, 1, 1)));
    }

    fn group(key: &str, count: i64, amount: f64) -> GroupTotal {
        GroupTotal::from((key.to_string(), count, amount))
    }

    #[test]
    fn summarizes_portfolio() {
        let assets = vec![group("rented", 2, 0.0), group("maintenance", 1, 0.0)];
        let contracts = vec![group("active", 1, 0.0), group("expired", 1, 0.0)];
        let payments = vec![
            group("pending", 1, 5000.0),
            group("overdue", 1, 2500.5),
            group("paid", 1, 9000.0),
        ];
        let records = vec![group("income", 1, 9000.0), group("expense", 1, 1200.0)];

        let summary =
            summarize_portfolio(&assets, &contracts, &payments, &records, date(2024, 6, 15));
        assert_eq!(summary.total_assets, 3);
        assert_eq!(summary.assets_by_status["rented"], 2);
        assert_eq!(summary.assets_by_status["available"], 0);
        assert_eq!(summary.active_contracts, 1);
        assert_eq!(summary.payments_by_status["overdue"], 1);
        assert_eq!(summary.outstanding_amount, 7500.5);
        assert_eq!(summary.month_start, Some(date(2024, 6, 1)));
        assert_eq!(summary.month_income, 9000.0);
        assert_eq!(summary.month_expense, 1200.0);
        assert_eq!(summary.month_net, 7800.0);
    }

    #[test]
    fn counts_are_not_bounded_by_a_page_size() {
        let assets = vec![group("available", 4200, 0.0), group("rented", 1800, 0.0)];
        let payments = vec![group("pending", 2500, 12_500_000.0)];
        let contracts = vec![group("active", 1800, 0.0)];
        let summary = summarize_portfolio(&assets, &contracts, &payments, &[], date(2024, 6, 15));
        assert_eq!(summary.total_assets, 6000);
        assert_eq!(summary.active_contracts, 1800);
        assert_eq!(summary.payments_by_status["pending"], 2500);
        assert_eq!(summary.outstanding_amount, 12_500_000.0);
    }
}
