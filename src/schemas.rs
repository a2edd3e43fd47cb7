use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        AssetStatus, AssetType, ContractStatus, FinancialType, MaintenanceStatus,
        NotificationStatus, PaymentStatus, PaymentType, Role,
    },
};

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

pub fn serialize_to_map<T>(value: &T) -> serde_json::Map<String, serde_json::Value>
where
    T: Serialize,
{
    serde_json::to_value(value)
        .ok()
        .and_then(|json| json.as_object().cloned())
        .unwrap_or_default()
}

pub fn remove_nulls(
    mut map: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    map.retain(|_, value| !value.is_null());
    map
}

pub fn clamp_limit_in_range(limit: i64, minimum: i64, maximum: i64) -> i64 {
    limit.clamp(minimum, maximum)
}

fn default_limit() -> i64 {
    200
}
fn default_maintenance_type() -> String {
    "repair".to_string()
}
fn default_asset_status() -> AssetStatus {
    AssetStatus::Available
}
fn default_contract_status() -> ContractStatus {
    ContractStatus::Active
}
fn default_payment_status() -> PaymentStatus {
    PaymentStatus::Pending
}
fn default_maintenance_status() -> MaintenanceStatus {
    MaintenanceStatus::Pending
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdPath {
    pub id: String,
}

// --- auth & users ---

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(length(min = 3, max = 32))]
    pub phone: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateUserInput {
    #[validate(length(min = 3, max = 32))]
    pub phone: String,
    #[validate(length(min = 6, max = 256))]
    pub password: String,
    pub role: Role,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateUserInput {
    #[validate(length(min = 3, max = 32))]
    pub phone: Option<String>,
    #[validate(length(min = 6, max = 256))]
    pub password: Option<String>,
    pub role: Option<Role>,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateProfileInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub address: Option<String>,
    #[validate(length(min = 6, max = 256))]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UsersQuery {
    pub role: Option<Role>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

// --- assets ---

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateAssetInput {
    pub owner_id: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub address: Option<String>,
    pub subdistrict: Option<String>,
    pub district: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    #[validate(range(min = 0.0))]
    pub size: Option<f64>,
    #[validate(range(min = 0))]
    pub rooms: Option<i32>,
    #[validate(range(min = 0.0))]
    pub purchase_value: Option<f64>,
    #[validate(range(min = 0.0))]
    pub current_value: Option<f64>,
    #[serde(default = "default_asset_status")]
    pub status: AssetStatus,
    pub parent_id: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateAssetInput {
    #[serde(rename = "type")]
    pub asset_type: Option<AssetType>,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub address: Option<String>,
    pub subdistrict: Option<String>,
    pub district: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    #[validate(range(min = 0.0))]
    pub size: Option<f64>,
    #[validate(range(min = 0))]
    pub rooms: Option<i32>,
    #[validate(range(min = 0.0))]
    pub purchase_value: Option<f64>,
    #[validate(range(min = 0.0))]
    pub current_value: Option<f64>,
    pub status: Option<AssetStatus>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
}

/// A rental unit carved out of a parent asset (typically land).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateUnitInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: Option<AssetType>,
    #[validate(range(min = 0.0))]
    pub size: Option<f64>,
    #[validate(range(min = 0))]
    pub rooms: Option<i32>,
    #[validate(range(min = 0.0))]
    pub current_value: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetsQuery {
    pub status: Option<AssetStatus>,
    #[serde(rename = "type")]
    pub asset_type: Option<AssetType>,
    pub parent_id: Option<String>,
    pub owner_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

// --- contracts ---

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateContractInput {
    #[validate(length(min = 1))]
    pub asset_id: String,
    #[validate(length(min = 1))]
    pub tenant_id: String,
    #[validate(length(max = 64))]
    pub contract_number: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate(range(min = 0.0))]
    pub rent_amount: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub deposit: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub insurance: f64,
    #[serde(default = "default_contract_status")]
    pub status: ContractStatus,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateContractInput {
    pub tenant_id: Option<String>,
    #[validate(length(max = 64))]
    pub contract_number: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    pub rent_amount: Option<f64>,
    #[validate(range(min = 0.0))]
    pub deposit: Option<f64>,
    #[validate(range(min = 0.0))]
    pub insurance: Option<f64>,
    pub status: Option<ContractStatus>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractsQuery {
    pub status: Option<ContractStatus>,
    pub asset_id: Option<String>,
    pub tenant_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), AppError> {
    if end < start {
        return Err(AppError::UnprocessableEntity(
            "end_date must be on or after start_date.".to_string(),
        ));
    }
    Ok(())
}

// --- payments ---

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreatePaymentInput {
    #[validate(length(min = 1))]
    pub contract_id: String,
    #[validate(range(min = 0.0))]
    pub amount: f64,
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
    #[serde(default = "default_payment_status")]
    pub status: PaymentStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdatePaymentInput {
    #[validate(range(min = 0.0))]
    pub amount: Option<f64>,
    #[serde(rename = "type")]
    pub payment_type: Option<PaymentType>,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
    pub status: Option<PaymentStatus>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SubmitProofInput {
    #[validate(length(min = 1, max = 10))]
    pub proof_images: Vec<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RejectPaymentInput {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentsQuery {
    pub status: Option<PaymentStatus>,
    #[serde(rename = "type")]
    pub payment_type: Option<PaymentType>,
    pub contract_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

// --- maintenance ---

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateMaintenanceInput {
    #[validate(length(min = 1))]
    pub asset_id: String,
    #[serde(rename = "type", default = "default_maintenance_type")]
    pub maintenance_type: String,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
    #[validate(range(min = 0.0))]
    pub cost: Option<f64>,
    #[serde(default = "default_maintenance_status")]
    pub status: MaintenanceStatus,
    pub scheduled_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateMaintenanceInput {
    #[serde(rename = "type")]
    pub maintenance_type: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0.0))]
    pub cost: Option<f64>,
    pub status: Option<MaintenanceStatus>,
    pub scheduled_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MaintenanceQuery {
    pub status: Option<MaintenanceStatus>,
    pub asset_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

// --- financial records ---

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateFinancialRecordInput {
    pub asset_id: Option<String>,
    pub contract_id: Option<String>,
    #[serde(rename = "type")]
    pub record_type: FinancialType,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[validate(range(min = 0.0))]
    pub amount: f64,
    pub description: Option<String>,
    pub record_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateFinancialRecordInput {
    #[serde(rename = "type")]
    pub record_type: Option<FinancialType>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    #[validate(range(min = 0.0))]
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub record_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FinancialRecordsQuery {
    #[serde(rename = "type")]
    pub record_type: Option<FinancialType>,
    pub asset_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

// --- notifications & misc ---

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationsQuery {
    pub status: Option<NotificationStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReverseGeocodeQuery {
    pub lat: f64,
    pub lng: f64,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{
        remove_nulls, serialize_to_map, validate_date_range, validate_input, CreateAssetInput,
        CreateContractInput, CreateUserInput,
    };

    #[test]
    fn asset_input_maps_to_columns() {
        let input: CreateAssetInput = serde_json::from_value(json!({
            "type": "land",
            "name": "North plot",
            "size": 1600.0
        }))
        .expect("valid input");
        let map = remove_nulls(serialize_to_map(&input));
        assert_eq!(map.get("type"), Some(&json!("land")));
        assert_eq!(map.get("status"), Some(&json!("available")));
        assert!(!map.contains_key("owner_id"));
    }

    #[test]
    fn contract_defaults_and_dates() {
        let input: CreateContractInput = serde_json::from_value(json!({
            "asset_id": "a1",
            "tenant_id": "t1",
            "start_date": "2024-01-01",
            "end_date": "2024-12-31",
            "rent_amount": 8000
        }))
        .expect("valid input");
        let map = serialize_to_map(&input);
        assert_eq!(map.get("status"), Some(&json!("active")));
        assert_eq!(map.get("start_date"), Some(&json!("2024-01-01")));
        assert_eq!(map.get("deposit"), Some(&json!(0.0)));
    }

    #[test]
    fn rejects_unknown_enum_values() {
        let parsed = serde_json::from_value::<CreateAssetInput>(json!({
            "type": "castle",
            "name": "Nope"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn validates_fields() {
        let input: CreateUserInput = serde_json::from_value(json!({
            "phone": "0812345678",
            "password": "123",
            "role": "tenant",
            "name": "Somchai",
            "email": "not-an-email"
        }))
        .expect("deserializes");
        assert!(validate_input(&input).is_err());
    }

    #[test]
    fn checks_date_order() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let end = NaiveDate::from_ymd_opt(2023, 12, 31).expect("valid date");
        assert!(validate_date_range(start, start).is_ok());
        assert!(validate_date_range(start, end).is_err());
    }
}
