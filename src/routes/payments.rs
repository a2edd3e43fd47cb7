use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::{
    access::{
        apply_scope, load_visible_contract, managed_asset_for_contract, visible_contract_ids,
    },
    auth::{require_role, require_user, AuthUser},
    error::{AppError, AppResult},
    models::{FinancialType, PaymentStatus, PaymentType, Role},
    repository::{
        non_empty_opt,
        table_service::{
            create_row, create_row_tx, delete_row, get_row, list_rows, update_row, update_row_tx,
        },
        val_f64, val_str, val_str_opt,
    },
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreatePaymentInput,
        IdPath, PaymentsQuery, RejectPaymentInput, SubmitProofInput, UpdatePaymentInput,
    },
    services::{
        notifications::{notify, NewNotification},
        receipt::{build_receipt, receipt_number_for},
    },
    state::{db_pool, AppState},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/payments",
            axum::routing::get(list_payments).post(create_payment),
        )
        .route(
            "/payments/{id}",
            axum::routing::get(get_payment)
                .patch(update_payment)
                .delete(delete_payment),
        )
        .route("/payments/{id}/proof", axum::routing::post(submit_proof))
        .route("/payments/{id}/approve", axum::routing::post(approve_payment))
        .route("/payments/{id}/reject", axum::routing::post(reject_payment))
        .route("/payments/{id}/receipt", axum::routing::get(get_receipt))
}

fn payment_status(payment: &Value) -> Option<PaymentStatus> {
    PaymentStatus::parse(&val_str(payment, "status"))
}

fn ensure_status(payment: &Value, allowed: &[PaymentStatus], action: &str) -> AppResult<()> {
    match payment_status(payment) {
        Some(status) if allowed.contains(&status) => Ok(()),
        status => Err(AppError::Conflict(format!(
            "Cannot {action} a payment in status '{}'.",
            status.map(PaymentStatus::as_str).unwrap_or("unknown")
        ))),
    }
}

fn status_patch(status: PaymentStatus) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert("status".to_string(), Value::String(status.as_str().to_string()));
    patch
}

/// Marks a payment paid today and assigns a receipt number and date unless
/// the payment already carries them.
fn approval_patch(payment: &Value, today: NaiveDate) -> Map<String, Value> {
    let mut patch = status_patch(PaymentStatus::Paid);
    patch.insert("paid_date".to_string(), Value::String(today.to_string()));
    if val_str_opt(payment, "receipt_number").is_none() {
        patch.insert(
            "receipt_number".to_string(),
            Value::String(receipt_number_for(&val_str(payment, "id"), today)),
        );
    }
    if val_str_opt(payment, "receipt_date").is_none() {
        patch.insert("receipt_date".to_string(), Value::String(today.to_string()));
    }
    patch
}

/// The payment patch and the income entry it books, committed together.
fn approval_writes(
    payment: &Value,
    contract: &Value,
    today: NaiveDate,
) -> (Map<String, Value>, Map<String, Value>) {
    let patch = approval_patch(payment, today);
    let mut approved = payment.as_object().cloned().unwrap_or_default();
    approved.extend(patch.clone());
    let record = income_record(&Value::Object(approved), contract, today);
    (patch, record)
}

fn income_record(payment: &Value, contract: &Value, today: NaiveDate) -> Map<String, Value> {
    let category = PaymentType::parse(&val_str(payment, "type"))
        .unwrap_or(PaymentType::Other)
        .as_str();
    let mut record = Map::new();
    record.insert("asset_id".to_string(), Value::String(val_str(contract, "asset_id")));
    record.insert("contract_id".to_string(), Value::String(val_str(contract, "id")));
    record.insert(
        "type".to_string(),
        Value::String(FinancialType::Income.as_str().to_string()),
    );
    record.insert("category".to_string(), Value::String(category.to_string()));
    record.insert("amount".to_string(), json!(val_f64(payment, "amount")));
    record.insert(
        "description".to_string(),
        Value::String(format!(
            "Payment {} for contract {}",
            val_str(payment, "id"),
            val_str(contract, "contract_number")
        )),
    );
    record.insert("record_date".to_string(), Value::String(today.to_string()));
    record
}

/// The reject body is optional; an empty body means no reason.
fn parse_reject_body(body: &[u8]) -> AppResult<Option<String>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let input = serde_json::from_slice::<RejectPaymentInput>(body)
        .map_err(|error| AppError::UnprocessableEntity(format!("Invalid request body: {error}")))?;
    Ok(non_empty_opt(input.reason.as_deref()))
}

/// A payment the caller may read, together with its contract.
async fn load_visible_payment(
    pool: &PgPool,
    user: &AuthUser,
    payment_id: &str,
) -> AppResult<(Value, Value)> {
    let payment = get_row(pool, "payments", payment_id, "id").await?;
    let contract = load_visible_contract(pool, user, &val_str(&payment, "contract_id"))
        .await
        .map_err(|error| match error {
            AppError::NotFound(_) => AppError::NotFound("payments record not found.".to_string()),
            other => other,
        })?;
    Ok((payment, contract))
}

/// A payment the caller manages, with its contract and asset.
async fn load_managed_payment(
    pool: &PgPool,
    user: &AuthUser,
    payment_id: &str,
) -> AppResult<(Value, Value, Value)> {
    let payment = get_row(pool, "payments", payment_id, "id").await?;
    let contract = get_row(pool, "contracts", &val_str(&payment, "contract_id"), "id").await?;
    let asset = managed_asset_for_contract(pool, user, &contract).await?;
    Ok((payment, contract, asset))
}

async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(status) = query.status {
        filters.insert("status".to_string(), Value::String(status.as_str().to_string()));
    }
    if let Some(payment_type) = query.payment_type {
        filters.insert("type".to_string(), Value::String(payment_type.as_str().to_string()));
    }
    if let Some(contract_id) = non_empty_opt(query.contract_id.as_deref()) {
        filters.insert("contract_id".to_string(), Value::String(contract_id));
    }
    let scope = visible_contract_ids(pool, &user).await?;
    apply_scope(&mut filters, "contract_id", &scope);

    let rows = list_rows(
        pool,
        "payments",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        query.offset,
        "due_date",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePaymentInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin, Role::Owner])?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let contract = get_row(pool, "contracts", &payload.contract_id, "id").await?;
    managed_asset_for_contract(pool, &user, &contract).await?;

    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, "payments", &record).await?;
    let payment_id = val_str(&created, "id");

    if payload.status == PaymentStatus::Pending {
        let due = payload
            .due_date
            .map(|date| format!(" due on {date}"))
            .unwrap_or_default();
        notify(
            pool,
            NewNotification {
                user_id: &val_str(&contract, "tenant_id"),
                kind: "payment_due",
                title: "New payment request".to_string(),
                message: format!(
                    "A {} payment of {:.2} baht{due} was added to contract {}.",
                    payload.payment_type,
                    payload.amount,
                    val_str(&contract, "contract_number")
                ),
                related_id: Some(&payment_id),
            },
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;
    let (payment, _) = load_visible_payment(pool, &user, &path.id).await?;
    Ok(Json(payment))
}

async fn update_payment(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdatePaymentInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin, Role::Owner])?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    load_managed_payment(pool, &user, &path.id).await?;
    let patch = remove_nulls(serialize_to_map(&payload));
    let updated = update_row(pool, "payments", &path.id, &patch, "id").await?;
    Ok(Json(updated))
}

async fn delete_payment(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin, Role::Owner])?;
    let pool = db_pool(&state)?;

    load_managed_payment(pool, &user, &path.id).await?;
    let deleted = delete_row(pool, "payments", &path.id, "id").await?;
    Ok(Json(deleted))
}

async fn submit_proof(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<SubmitProofInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let (payment, contract) = load_visible_payment(pool, &user, &path.id).await?;
    if !user.is_admin() && val_str(&contract, "tenant_id") != user.id {
        return Err(AppError::Forbidden(
            "Forbidden: only the contract tenant can submit payment proof.".to_string(),
        ));
    }
    ensure_status(
        &payment,
        &[PaymentStatus::Pending, PaymentStatus::Overdue],
        "submit proof for",
    )?;

    let images = payload
        .proof_images
        .iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .map(|url| Value::String(url.to_string()))
        .collect::<Vec<_>>();
    if images.is_empty() {
        return Err(AppError::UnprocessableEntity(
            "proof_images must contain at least one image URL.".to_string(),
        ));
    }

    let mut patch = status_patch(PaymentStatus::WaitingApproval);
    patch.insert("proof_images".to_string(), Value::Array(images));
    if let Some(note) = non_empty_opt(payload.note.as_deref()) {
        patch.insert("note".to_string(), Value::String(note));
    }
    let updated = update_row(pool, "payments", &path.id, &patch, "id").await?;

    let asset = get_row(pool, "assets", &val_str(&contract, "asset_id"), "id").await?;
    notify(
        pool,
        NewNotification {
            user_id: &val_str(&asset, "owner_id"),
            kind: "payment_proof_submitted",
            title: "Payment proof submitted".to_string(),
            message: format!(
                "{} submitted proof for a payment of {:.2} baht on {}.",
                user.name,
                val_f64(&payment, "amount"),
                val_str(&asset, "name")
            ),
            related_id: Some(&path.id),
        },
    )
    .await;

    Ok(Json(updated))
}

async fn approve_payment(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin, Role::Owner])?;
    let pool = db_pool(&state)?;

    let (payment, contract, _) = load_managed_payment(pool, &user, &path.id).await?;
    ensure_status(
        &payment,
        &[
            PaymentStatus::WaitingApproval,
            PaymentStatus::Pending,
            PaymentStatus::Overdue,
        ],
        "approve",
    )?;

    let (patch, record) = approval_writes(&payment, &contract, state.config.today());
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::Dependency(format!("txn begin: {e}")))?;
    let updated = update_row_tx(&mut tx, "payments", &path.id, &patch, "id").await?;
    create_row_tx(&mut tx, "financial_records", &record).await?;
    tx.commit()
        .await
        .map_err(|e| AppError::Dependency(format!("txn commit: {e}")))?;

    tracing::info!(
        payment_id = %path.id,
        approved_by = %user.id,
        receipt_number = %val_str(&updated, "receipt_number"),
        "Payment approved"
    );

    notify(
        pool,
        NewNotification {
            user_id: &val_str(&contract, "tenant_id"),
            kind: "payment_approved",
            title: "Payment approved".to_string(),
            message: format!(
                "Your payment of {:.2} baht was approved. Receipt {}.",
                val_f64(&updated, "amount"),
                val_str(&updated, "receipt_number")
            ),
            related_id: Some(&path.id),
        },
    )
    .await;

    Ok(Json(updated))
}

async fn reject_payment(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, &[Role::Admin, Role::Owner])?;
    let pool = db_pool(&state)?;
    let reason = parse_reject_body(&body)?;

    let (payment, contract, _) = load_managed_payment(pool, &user, &path.id).await?;
    ensure_status(&payment, &[PaymentStatus::WaitingApproval], "reject")?;

    let mut patch = status_patch(PaymentStatus::Pending);
    if let Some(reason) = &reason {
        patch.insert("note".to_string(), Value::String(reason.clone()));
    }
    let updated = update_row(pool, "payments", &path.id, &patch, "id").await?;

    let message = match &reason {
        Some(reason) => format!("Your payment proof was rejected: {reason}"),
        None => "Your payment proof was rejected. Please submit it again.".to_string(),
    };
    notify(
        pool,
        NewNotification {
            user_id: &val_str(&contract, "tenant_id"),
            kind: "payment_rejected",
            title: "Payment rejected".to_string(),
            message,
            related_id: Some(&path.id),
        },
    )
    .await;

    Ok(Json(updated))
}

async fn get_receipt(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let (payment, contract) = load_visible_payment(pool, &user, &path.id).await?;
    if payment_status(&payment) != Some(PaymentStatus::Paid) {
        return Err(AppError::Conflict(
            "A receipt is only available for paid payments.".to_string(),
        ));
    }

    // Receipts still render when the tenant or asset row has gone away.
    let tenant = get_row(pool, "users", &val_str(&contract, "tenant_id"), "id")
        .await
        .ok();
    let asset = get_row(pool, "assets", &val_str(&contract, "asset_id"), "id")
        .await
        .ok();

    let receipt = build_receipt(&payment, &contract, tenant.as_ref(), asset.as_ref());
    Ok(Json(json!({ "data": receipt })))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{approval_patch, approval_writes, ensure_status, income_record, parse_reject_body};
    use crate::{error::AppError, models::PaymentStatus};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).expect("valid date")
    }

    #[test]
    fn approval_assigns_receipt_once() {
        let fresh = json!({ "id": "9f1c2d3e-aaaa-bbbb-cccc-000000000000", "status": "waiting_approval" });
        let patch = approval_patch(&fresh, today());
        assert_eq!(patch.get("status"), Some(&json!("paid")));
        assert_eq!(patch.get("paid_date"), Some(&json!("2024-06-15")));
        assert_eq!(patch.get("receipt_number"), Some(&json!("RC202406-9F1C2D3E")));
        assert_eq!(patch.get("receipt_date"), Some(&json!("2024-06-15")));

        let numbered = json!({
            "id": "p2",
            "receipt_number": "RC202405-00000001",
            "receipt_date": "2024-05-31"
        });
        let patch = approval_patch(&numbered, today());
        assert!(!patch.contains_key("receipt_number"));
        assert!(!patch.contains_key("receipt_date"));
    }

    #[test]
    fn income_record_uses_payment_type_as_category() {
        let payment = json!({ "id": "p1", "type": "utility", "amount": "1250.50" });
        let contract = json!({ "id": "c1", "asset_id": "a1", "contract_number": "CT-1" });
        let record = income_record(&payment, &contract, today());
        assert_eq!(record.get("type"), Some(&json!("income")));
        assert_eq!(record.get("category"), Some(&json!("utility")));
        assert_eq!(record.get("amount"), Some(&json!(1250.5)));
        assert_eq!(record.get("asset_id"), Some(&json!("a1")));
        assert_eq!(record.get("record_date"), Some(&json!("2024-06-15")));
    }

    #[test]
    fn approval_books_one_income_entry_for_the_patched_payment() {
        let payment = json!({
            "id": "9f1c2d3e-aaaa-bbbb-cccc-000000000000",
            "status": "pending",
            "type": "rent",
            "amount": 8500
        });
        let contract = json!({ "id": "c1", "asset_id": "a1", "contract_number": "CT-7" });
        let (patch, record) = approval_writes(&payment, &contract, today());

        assert_eq!(patch.get("status"), Some(&json!("paid")));
        assert_eq!(record.get("type"), Some(&json!("income")));
        assert_eq!(record.get("category"), Some(&json!("rent")));
        assert_eq!(record.get("amount"), Some(&json!(8500.0)));
        assert_eq!(record.get("contract_id"), Some(&json!("c1")));
        assert_eq!(record.get("record_date"), patch.get("paid_date"));
        assert!(record
            .get("description")
            .and_then(|value| value.as_str())
            .is_some_and(|text| text.contains("9f1c2d3e-aaaa-bbbb-cccc-000000000000")));
    }

    #[test]
    fn reject_reason_is_optional() {
        assert_eq!(parse_reject_body(b"").expect("empty"), None);
        assert_eq!(parse_reject_body(b"{}").expect("no reason"), None);
        assert_eq!(
            parse_reject_body(br#"{"reason":" blurry slip "}"#).expect("reason"),
            Some("blurry slip".to_string())
        );
        assert!(parse_reject_body(b"not json").is_err());
    }

    #[test]
    fn guards_status_transitions() {
        let paid = json!({ "status": "paid" });
        let waiting = json!({ "status": "waiting_approval" });
        assert!(ensure_status(&waiting, &[PaymentStatus::WaitingApproval], "reject").is_ok());
        assert!(matches!(
            ensure_status(&paid, &[PaymentStatus::WaitingApproval], "reject"),
            Err(AppError::Conflict(_))
        ));
        assert!(ensure_status(&json!({}), &[PaymentStatus::Pending], "approve").is_err());
    }
}
