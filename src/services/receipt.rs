//! Printable receipt content for a payment: line items and the total in
//! Thai words.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde_json::Value;

use crate::{
    models::PaymentType,
    repository::{val_date, val_f64, val_str},
    services::thai_text::{amount_to_baht_text, format_thai_date},
};

/// Amounts closer than this are treated as equal.
const AMOUNT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    FirstPayment,
    Rent,
    Utility,
    Deposit,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptLine {
    pub label: String,
    pub amount: f64,
}

impl ReceiptLine {
    fn new(label: &str, amount: f64) -> Self {
        Self {
            label: label.to_string(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentBreakdown {
    pub kind: ReceiptKind,
    pub lines: Vec<ReceiptLine>,
    pub total: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn sanitize(amount: f64) -> f64 {
    if amount.is_finite() {
        amount
    } else {
        0.0
    }
}

/// A payment equal to deposit + insurance (both positive) is the first
/// payment of a lease, itemized as advance rent and insurance.
pub fn is_first_payment(amount: f64, deposit: f64, insurance: f64) -> bool {
    deposit > 0.0 && insurance > 0.0 && (amount - (deposit + insurance)).abs() < AMOUNT_TOLERANCE
}

pub fn itemize_payment(
    amount: f64,
    payment_type: Option<PaymentType>,
    deposit: f64,
    insurance: f64,
) -> PaymentBreakdown {
    let amount = sanitize(amount);
    let deposit = sanitize(deposit);
    let insurance = sanitize(insurance);

    if is_first_payment(amount, deposit, insurance) {
        return PaymentBreakdown {
            kind: ReceiptKind::FirstPayment,
            lines: vec![
                ReceiptLine::new("ค่าเช่าล่วงหน้า", deposit),
                ReceiptLine::new("เงินประกัน", insurance),
            ],
            total: amount,
        };
    }

    let (kind, lines) = match payment_type.unwrap_or(PaymentType::Other) {
        PaymentType::Rent => (ReceiptKind::Rent, vec![ReceiptLine::new("ค่าเช่า", amount)]),
        PaymentType::Utility => {
            // Electricity takes the rounded half; water takes the rest so
            // the lines add up to the amount exactly.
            let electricity = round2(amount / 2.0);
            let water = round2(amount - electricity);
            (
                ReceiptKind::Utility,
                vec![
                    ReceiptLine::new("ค่าไฟฟ้า", electricity),
                    ReceiptLine::new("ค่าน้ำประปา", water),
                ],
            )
        }
        PaymentType::Deposit => (
            ReceiptKind::Deposit,
            vec![ReceiptLine::new("เงินมัดจำ", amount)],
        ),
        PaymentType::Other => (
            ReceiptKind::Other,
            vec![ReceiptLine::new("ค่าใช้จ่ายอื่นๆ", amount)],
        ),
    };

    PaymentBreakdown {
        kind,
        lines,
        total: amount,
    }
}

/// `RC` + yyyymm + `-` + first eight hex digits of the payment id.
pub fn receipt_number_for(payment_id: &str, issued_on: NaiveDate) -> String {
    let short_id = payment_id
        .chars()
        .filter(char::is_ascii_hexdigit)
        .take(8)
        .collect::<String>()
        .to_ascii_uppercase();
    format!(
        "RC{:04}{:02}-{short_id}",
        issued_on.year(),
        issued_on.month()
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptDocument {
    pub payment_id: String,
    pub receipt_number: String,
    pub issued_on: Option<NaiveDate>,
    pub issued_on_text: String,
    pub contract_number: String,
    pub tenant_name: String,
    pub tenant_phone: String,
    pub asset_name: String,
    pub asset_address: String,
    pub kind: ReceiptKind,
    pub lines: Vec<ReceiptLine>,
    pub total: f64,
    pub total_text: String,
}

pub fn build_receipt(
    payment: &Value,
    contract: &Value,
    tenant: Option<&Value>,
    asset: Option<&Value>,
) -> ReceiptDocument {
    let payment_id = val_str(payment, "id");
    let payment_type = PaymentType::parse(&val_str(payment, "type"));
    let breakdown = itemize_payment(
        val_f64(payment, "amount"),
        payment_type,
        val_f64(contract, "deposit"),
        val_f64(contract, "insurance"),
    );

    let issued_on = val_date(payment, "receipt_date").or_else(|| val_date(payment, "paid_date"));
    let receipt_number = Some(val_str(payment, "receipt_number"))
        .filter(|number| !number.is_empty())
        .or_else(|| issued_on.map(|date| receipt_number_for(&payment_id, date)))
        .unwrap_or_default();

    ReceiptDocument {
        receipt_number,
        issued_on,
        issued_on_text: issued_on.map(format_thai_date).unwrap_or_default(),
        contract_number: val_str(contract, "contract_number"),
        tenant_name: tenant.map(|row| val_str(row, "name")).unwrap_or_default(),
        tenant_phone: tenant.map(|row| val_str(row, "phone")).unwrap_or_default(),
        asset_name: asset.map(|row| val_str(row, "name")).unwrap_or_default(),
        asset_address: asset.map(format_asset_address).unwrap_or_default(),
        kind: breakdown.kind,
        total_text: amount_to_baht_text(breakdown.total),
        total: breakdown.total,
        lines: breakdown.lines,
        payment_id,
    }
}

pub fn format_asset_address(asset: &Value) -> String {
    ["address", "subdistrict", "district", "province", "postal_code"]
        .iter()
        .map(|key| val_str(asset, key))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{
        build_receipt, itemize_payment, receipt_number_for, ReceiptKind, ReceiptLine,
    };
    use crate::models::PaymentType;

    fn line_sum(lines: &[ReceiptLine]) -> f64 {
        lines.iter().map(|line| line.amount).sum()
    }

    #[test]
    fn first_payment_splits_into_advance_rent_and_insurance() {
        let breakdown = itemize_payment(15_000.0, Some(PaymentType::Rent), 5_000.0, 10_000.0);
        assert_eq!(breakdown.kind, ReceiptKind::FirstPayment);
        assert_eq!(breakdown.lines.len(), 2);
        assert_eq!(breakdown.lines[0].amount, 5_000.0);
        assert_eq!(breakdown.lines[1].amount, 10_000.0);
        assert!((line_sum(&breakdown.lines) - 15_000.0).abs() < 0.01);
    }

    #[test]
    fn first_payment_tolerates_float_noise_only() {
        let near = itemize_payment(15_000.004, Some(PaymentType::Other), 5_000.0, 10_000.0);
        assert_eq!(near.kind, ReceiptKind::FirstPayment);
        let off = itemize_payment(15_000.5, Some(PaymentType::Other), 5_000.0, 10_000.0);
        assert_eq!(off.kind, ReceiptKind::Other);
    }

    #[test]
    fn zero_insurance_is_not_a_first_payment() {
        let breakdown = itemize_payment(5_000.0, Some(PaymentType::Rent), 5_000.0, 0.0);
        assert_eq!(breakdown.kind, ReceiptKind::Rent);
        assert_eq!(breakdown.lines, vec![ReceiptLine::new("ค่าเช่า", 5_000.0)]);
    }

    #[test]
    fn utility_splits_evenly_and_sums_to_amount() {
        for amount in [1_000.0, 1_001.0, 333.33, 0.01] {
            let breakdown = itemize_payment(amount, Some(PaymentType::Utility), 0.0, 0.0);
            assert_eq!(breakdown.kind, ReceiptKind::Utility);
            assert_eq!(breakdown.lines.len(), 2);
            assert!((line_sum(&breakdown.lines) - amount).abs() < 1e-9, "{amount}");
            for line in &breakdown.lines {
                assert!((line.amount - amount / 2.0).abs() <= 0.01, "{amount}");
            }
        }
    }

    #[test]
    fn deposit_other_and_unknown_types_are_single_lines() {
        let deposit = itemize_payment(2_000.0, Some(PaymentType::Deposit), 0.0, 0.0);
        assert_eq!(deposit.kind, ReceiptKind::Deposit);
        assert_eq!(deposit.lines.len(), 1);

        let unknown = itemize_payment(750.0, None, 0.0, 0.0);
        assert_eq!(unknown.kind, ReceiptKind::Other);
        assert_eq!(unknown.lines[0].amount, 750.0);
    }

    #[test]
    fn malformed_amounts_read_as_zero() {
        let breakdown = itemize_payment(f64::NAN, Some(PaymentType::Rent), 0.0, 0.0);
        assert_eq!(breakdown.total, 0.0);
    }

    #[test]
    fn numbers_receipts_by_month_and_id() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).expect("valid date");
        assert_eq!(
            receipt_number_for("9f1c2d3e-4b5a-6789-abcd-ef0123456789", date),
            "RC202406-9F1C2D3E"
        );
    }

    #[test]
    fn builds_full_document() {
        let payment = json!({
            "id": "9f1c2d3e-4b5a-6789-abcd-ef0123456789",
            "amount": "15000.00",
            "type": "rent",
            "paid_date": "2024-06-15",
            "receipt_number": null
        });
        let contract = json!({ "contract_number": "CT-001", "deposit": 5000, "insurance": "10000" });
        let tenant = json!({ "name": "Somchai", "phone": "0812345678" });
        let asset = json!({
            "name": "Baan Suan",
            "address": "99/1 Sukhumvit Rd",
            "district": "Watthana",
            "province": "Bangkok",
            "postal_code": "10110"
        });

        let receipt = build_receipt(&payment, &contract, Some(&tenant), Some(&asset));
        assert_eq!(receipt.kind, ReceiptKind::FirstPayment);
        assert_eq!(receipt.receipt_number, "RC202406-9F1C2D3E");
        assert_eq!(receipt.issued_on_text, "15 มิถุนายน 2567");
        assert_eq!(receipt.total_text, "หนึ่งหมื่นห้าพันบาทถ้วน");
        assert_eq!(receipt.asset_address, "99/1 Sukhumvit Rd Watthana Bangkok 10110");
        assert_eq!(receipt.tenant_name, "Somchai");
    }
}
