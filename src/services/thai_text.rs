//! Thai number and date rendering for printable documents.

use chrono::{Datelike, NaiveDate};

const DIGITS: [&str; 10] = [
    "ศูนย์", "หนึ่ง", "สอง", "สาม", "สี่", "ห้า", "หก", "เจ็ด", "แปด", "เก้า",
];
const PLACES: [&str; 6] = ["", "สิบ", "ร้อย", "พัน", "หมื่น", "แสน"];
const MILLION: u64 = 1_000_000;
/// Largest magnitude whose satang count is still exact in an `f64`.
const MAX_RENDERED_AMOUNT: f64 = 90_000_000_000_000.0;

const MONTHS: [&str; 12] = [
    "มกราคม",
    "กุมภาพันธ์",
    "มีนาคม",
    "เมษายน",
    "พฤษภาคม",
    "มิถุนายน",
    "กรกฎาคม",
    "สิงหาคม",
    "กันยายน",
    "ตุลาคม",
    "พฤศจิกายน",
    "ธันวาคม",
];

/// Buddhist era = Common era + 543.
const BUDDHIST_ERA_OFFSET: i32 = 543;

/// Reads a non-negative integer in Thai, e.g. `21` → "ยี่สิบเอ็ด".
///
/// Values of a million and above recurse on the millions part, so
/// `2_500_000` reads "สองล้านห้าแสน".
pub fn number_to_thai_words(value: u64) -> String {
    if value == 0 {
        return DIGITS[0].to_string();
    }

    let mut words = String::new();
    let millions = value / MILLION;
    let remainder = value % MILLION;

    if millions > 0 {
        words.push_str(&number_to_thai_words(millions));
        words.push_str("ล้าน");
    }
    if remainder > 0 {
        words.push_str(&below_million(remainder, millions > 0));
    }
    words
}

/// A trailing 1 reads "เอ็ด" whenever any higher digit is spoken, including
/// a millions part (`has_higher`).
fn below_million(value: u64, has_higher: bool) -> String {
    let mut words = String::new();
    for position in (0..PLACES.len()).rev() {
        let digit = (value / 10u64.pow(position as u32) % 10) as usize;
        if digit == 0 {
            continue;
        }
        match (position, digit) {
            (0, 1) if value >= 10 || has_higher => words.push_str("เอ็ด"),
            (1, 1) => {}
            (1, 2) => words.push_str("ยี่"),
            _ => words.push_str(DIGITS[digit]),
        }
        words.push_str(PLACES[position]);
    }
    words
}

/// Renders a baht amount the way it is written on receipts:
/// `1500.0` → "หนึ่งพันห้าร้อยบาทถ้วน", `0.5` → "ห้าสิบสตางค์".
///
/// Non-finite input reads as zero; magnitudes above 90 million million baht
/// are clamped to that bound.
pub fn amount_to_baht_text(amount: f64) -> String {
    let amount = if amount.is_finite() { amount } else { 0.0 };
    let amount = if amount.abs() > MAX_RENDERED_AMOUNT {
        tracing::warn!(amount, "Amount too large for baht text, clamping");
        MAX_RENDERED_AMOUNT.copysign(amount)
    } else {
        amount
    };
    let prefix = if amount < 0.0 { "ลบ" } else { "" };

    let total_satang = (amount.abs() * 100.0).round() as u64;
    let baht = total_satang / 100;
    let satang = total_satang % 100;

    let mut text = prefix.to_string();
    if baht > 0 || satang == 0 {
        text.push_str(&number_to_thai_words(baht));
        text.push_str("บาท");
    }
    if satang == 0 {
        text.push_str("ถ้วน");
    } else {
        text.push_str(&number_to_thai_words(satang));
        text.push_str("สตางค์");
    }
    text
}

/// `2024-06-15` → "15 มิถุนายน 2567".
pub fn format_thai_date(date: NaiveDate) -> String {
    let month = MONTHS[date.month0() as usize];
    format!(
        "{} {month} {}",
        date.day(),
        date.year() + BUDDHIST_ERA_OFFSET
    )
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{amount_to_baht_text, format_thai_date, number_to_thai_words};

    #[test]
    fn reads_reference_values() {
        assert_eq!(number_to_thai_words(0), "ศูนย์");
        assert_eq!(number_to_thai_words(100), "หนึ่งร้อย");
        assert_eq!(number_to_thai_words(21), "ยี่สิบเอ็ด");
        assert_eq!(number_to_thai_words(1_000_000), "หนึ่งล้าน");
    }

    #[test]
    fn reads_tens_special_cases() {
        assert_eq!(number_to_thai_words(1), "หนึ่ง");
        assert_eq!(number_to_thai_words(10), "สิบ");
        assert_eq!(number_to_thai_words(11), "สิบเอ็ด");
        assert_eq!(number_to_thai_words(20), "ยี่สิบ");
        assert_eq!(number_to_thai_words(101), "หนึ่งร้อยเอ็ด");
        assert_eq!(number_to_thai_words(111), "หนึ่งร้อยสิบเอ็ด");
    }

    #[test]
    fn reads_each_place() {
        assert_eq!(number_to_thai_words(5_000), "ห้าพัน");
        assert_eq!(number_to_thai_words(12_500), "หนึ่งหมื่นสองพันห้าร้อย");
        assert_eq!(
            number_to_thai_words(345_678),
            "สามแสนสี่หมื่นห้าพันหกร้อยเจ็ดสิบแปด"
        );
    }

    #[test]
    fn recurses_on_millions() {
        assert_eq!(number_to_thai_words(2_500_000), "สองล้านห้าแสน");
        assert_eq!(number_to_thai_words(21_000_000), "ยี่สิบเอ็ดล้าน");
        assert_eq!(number_to_thai_words(1_000_001), "หนึ่งล้านเอ็ด");
        assert_eq!(number_to_thai_words(2_000_011), "สองล้านสิบเอ็ด");
        assert_eq!(
            number_to_thai_words(1_000_000_000_000),
            "หนึ่งล้านล้าน"
        );
    }

    #[test]
    fn renders_baht_and_satang() {
        assert_eq!(amount_to_baht_text(0.0), "ศูนย์บาทถ้วน");
        assert_eq!(amount_to_baht_text(1500.0), "หนึ่งพันห้าร้อยบาทถ้วน");
        assert_eq!(
            amount_to_baht_text(1500.50),
            "หนึ่งพันห้าร้อยบาทห้าสิบสตางค์"
        );
        assert_eq!(amount_to_baht_text(0.25), "ยี่สิบห้าสตางค์");
        assert_eq!(amount_to_baht_text(-21.0), "ลบยี่สิบเอ็ดบาทถ้วน");
        assert_eq!(amount_to_baht_text(f64::NAN), "ศูนย์บาทถ้วน");
    }

    #[test]
    fn clamps_amounts_beyond_exact_satang() {
        let bound = "เก้าสิบล้านล้านบาทถ้วน";
        assert_eq!(amount_to_baht_text(90_000_000_000_000.0), bound);
        assert_eq!(amount_to_baht_text(1e20), bound);
        assert_eq!(amount_to_baht_text(-1e20), format!("ลบ{bound}"));
    }

    #[test]
    fn formats_buddhist_era_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).expect("valid date");
        assert_eq!(format_thai_date(date), "15 มิถุนายน 2567");
    }
}
