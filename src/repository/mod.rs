pub mod table_service;

use chrono::NaiveDate;
use serde_json::Value;

/// Trimmed string field of a JSON row, empty when missing.
pub fn val_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

pub fn val_str_opt(row: &Value, key: &str) -> Option<String> {
    Some(val_str(row, key)).filter(|value| !value.is_empty())
}

/// Numeric field of a JSON row. `numeric` columns may arrive as strings;
/// anything unparseable reads as zero.
pub fn val_f64(row: &Value, key: &str) -> f64 {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .map(value_to_f64)
        .unwrap_or(0.0)
}

pub fn value_to_f64(value: &Value) -> f64 {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|text| text.trim().parse::<f64>().ok()))
        .filter(|number| number.is_finite())
        .unwrap_or(0.0)
}

/// Date field of a JSON row; accepts `YYYY-MM-DD` and timestamps.
pub fn val_date(row: &Value, key: &str) -> Option<NaiveDate> {
    let raw = val_str(row, key);
    let date_part = raw.get(..10).unwrap_or(&raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

pub fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{non_empty_opt, val_date, val_f64, val_str};

    #[test]
    fn reads_numeric_strings() {
        let row = json!({ "amount": "1500.50", "deposit": 3000, "bad": "abc" });
        assert_eq!(val_f64(&row, "amount"), 1500.5);
        assert_eq!(val_f64(&row, "deposit"), 3000.0);
        assert_eq!(val_f64(&row, "bad"), 0.0);
        assert_eq!(val_f64(&row, "missing"), 0.0);
    }

    #[test]
    fn reads_dates_and_timestamps() {
        let row = json!({
            "start_date": "2024-01-01",
            "paid_date": "2024-06-15T10:00:00+07:00",
            "end_date": null
        });
        assert_eq!(
            val_date(&row, "start_date"),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(
            val_date(&row, "paid_date"),
            NaiveDate::from_ymd_opt(2024, 6, 15)
        );
        assert_eq!(val_date(&row, "end_date"), None);
    }

    #[test]
    fn trims_strings() {
        let row = json!({ "name": "  Baan Suan  ", "blank": "   " });
        assert_eq!(val_str(&row, "name"), "Baan Suan");
        assert_eq!(val_str(&row, "blank"), "");
        assert_eq!(non_empty_opt(Some("  ")), None);
    }
}
