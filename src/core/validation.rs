use std::collections::HashSet;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ValidationIssue;
use super::identifiers::{
    check_french_vat_key, is_eu_vat_format, is_siret_shaped, is_tax_identifier,
    validate_siret_checksum,
};
use super::normalize::Normalized;
use super::profile::{Field, Profile};
use super::types::{InvoiceRecord, LineItem};

/// Number of checks the score is computed against.
pub const SCORED_CHECKS: u32 = 12;

/// Fields with a dedicated format rule; counted in [`Summary::checked_fields`].
const FORMAT_RULES: usize = 8;

/// Tolerance for totals reconciliation.
const ROUNDING_TOLERANCE: Decimal = dec!(0.01);

/// Outcome of a business validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// True iff there are no errors. Warnings never affect validity.
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    /// Completeness heuristic in `0..=100`.
    ///
    /// This is not a certified conformance score: it only reflects how many
    /// problems the validator found. Gating downloads or submissions on a
    /// threshold is the caller's decision.
    pub score: u8,
    pub profile: Profile,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub errors_count: usize,
    pub warnings_count: usize,
    pub checked_fields: usize,
}

impl ValidationResult {
    fn new(profile: Profile, errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        let score = score(errors.len(), warnings.len());
        Self {
            is_valid: errors.is_empty(),
            summary: Summary {
                errors_count: errors.len(),
                warnings_count: warnings.len(),
                checked_fields: FORMAT_RULES + profile.requirements().required.len(),
            },
            errors,
            warnings,
            score,
            profile,
        }
    }

    /// Errors followed by warnings.
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().chain(&self.warnings)
    }
}

/// Weighted deduction score: 1 point per error, 0.3 per warning, out of
/// [`SCORED_CHECKS`], scaled to a percentage and rounded half up.
pub fn score(errors: usize, warnings: usize) -> u8 {
    // Work in tenths of a check to stay exact.
    let total = u64::from(SCORED_CHECKS) * 10;
    let deducted = (errors as u64)
        .saturating_mul(10)
        .saturating_add((warnings as u64).saturating_mul(3));
    let remaining = total.saturating_sub(deducted);
    let pct = (remaining * 100 + total / 2) / total;
    u8::try_from(pct).unwrap_or(100)
}

/// Validate an invoice record against a Factur-X profile.
///
/// Returns all findings (not just the first). Missing required fields and
/// format violations are errors; missing recommended fields, arithmetic
/// mismatches, date ordering and checksum problems are warnings.
pub fn validate_invoice(record: &InvoiceRecord, profile: Profile) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    check_presence(record, profile, &HashSet::new(), &mut errors, &mut warnings);
    check_formats(record, &mut errors);
    for (i, item) in record.items.iter().enumerate() {
        check_item(item, i, &mut errors);
    }
    check_consistency(record, &mut warnings);
    check_identifiers(record, &mut warnings);

    finish(profile, errors, warnings)
}

/// Normalize a loosely-typed JSON record, then validate it.
///
/// Conversion problems (unparseable amounts, malformed dates, ...) are
/// reported as errors on their field; such a field is not additionally
/// reported as missing.
pub fn validate_json(value: &Value, profile: Profile) -> ValidationResult {
    validate_normalized(&InvoiceRecord::from_json(value), profile)
}

/// Validate an already normalized record, merging in the normalizer's issues.
///
/// Same result as [`validate_json`] on the value the record came from.
pub fn validate_normalized(normalized: &Normalized, profile: Profile) -> ValidationResult {
    let record = &normalized.record;

    let malformed: HashSet<&str> = normalized.issues.iter().map(|i| i.field.as_str()).collect();
    let mut errors = normalized.issues.clone();
    let mut warnings = Vec::new();

    check_presence(record, profile, &malformed, &mut errors, &mut warnings);
    check_formats(record, &mut errors);
    for (i, item) in record.items.iter().enumerate() {
        check_item(item, i, &mut errors);
    }
    check_consistency(record, &mut warnings);
    check_identifiers(record, &mut warnings);

    finish(profile, errors, warnings)
}

fn finish(
    profile: Profile,
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
) -> ValidationResult {
    let result = ValidationResult::new(profile, errors, warnings);
    tracing::debug!(
        %profile,
        errors = result.summary.errors_count,
        warnings = result.summary.warnings_count,
        score = result.score,
        "validated invoice record"
    );
    result
}

fn check_presence(
    record: &InvoiceRecord,
    profile: Profile,
    skip: &HashSet<&str>,
    errors: &mut Vec<ValidationIssue>,
    warnings: &mut Vec<ValidationIssue>,
) {
    let requirements = profile.requirements();

    for field in requirements.required {
        if field.is_present(record) || skip.contains(field.name()) {
            continue;
        }
        let message = match field {
            Field::Items => "at least one line item is required".to_string(),
            _ => format!("field is required for the {profile} profile"),
        };
        errors.push(ValidationIssue::error(field.name(), message));
    }

    for field in requirements.recommended {
        if !field.is_present(record) && !skip.contains(field.name()) {
            warnings.push(ValidationIssue::warning(
                field.name(),
                format!("field is recommended for the {profile} profile"),
            ));
        }
    }
}

fn check_formats(record: &InvoiceRecord, errors: &mut Vec<ValidationIssue>) {
    let number_len = record.invoice_number.trim().chars().count();
    if number_len > 100 {
        errors.push(ValidationIssue::error(
            Field::InvoiceNumber.name(),
            "invoice number must be between 1 and 100 characters",
        ));
    }

    for (field, value) in [
        (Field::SellerSiret, record.seller.siret()),
        (Field::BuyerSiret, record.buyer.siret()),
    ] {
        if let Some(value) = value.filter(|v| !is_tax_identifier(v)) {
            errors.push(ValidationIssue::error(
                field.name(),
                format!("'{value}' is neither a 14-digit SIRET nor a VAT number"),
            ));
        }
    }

    for (field, value) in [
        (Field::SellerVat, record.seller.vat_number()),
        (Field::BuyerVat, record.buyer.vat_number()),
    ] {
        if let Some(value) = value.filter(|v| !is_eu_vat_format(v)) {
            errors.push(ValidationIssue::error(
                field.name(),
                format!("'{value}' is not an EU VAT number"),
            ));
        }
    }

    let currency = record.currency.trim();
    if !currency.is_empty()
        && !(currency.len() == 3 && currency.bytes().all(|b| b.is_ascii_uppercase()))
    {
        errors.push(ValidationIssue::error(
            Field::Currency.name(),
            format!("currency '{currency}' must be an ISO 4217 code (e.g. EUR, USD)"),
        ));
    }

    for (field, amount) in [
        (Field::TotalHt, record.total_ht),
        (Field::TotalTtc, record.total_ttc),
    ] {
        if amount.is_some_and(|a| a.is_sign_negative() && !a.is_zero()) {
            errors.push(ValidationIssue::error(
                field.name(),
                "total must be a non-negative amount",
            ));
        }
    }
}

fn check_item(item: &LineItem, index: usize, errors: &mut Vec<ValidationIssue>) {
    let path = |name: &str| format!("items[{index}].{name}");

    if item.designation.trim().is_empty() {
        errors.push(ValidationIssue::error(
            path("designation"),
            "line item designation is required",
        ));
    }
    if item.quantity <= Decimal::ZERO {
        errors.push(ValidationIssue::error(
            path("quantity"),
            "quantity must be greater than zero",
        ));
    }
    if item.unit_price < Decimal::ZERO {
        errors.push(ValidationIssue::error(
            path("unitPrice"),
            "unit price must not be negative",
        ));
    }
    if item.discount < Decimal::ZERO {
        errors.push(ValidationIssue::error(
            path("discount"),
            "discount must not be negative",
        ));
    }
    if item.vat_rate < Decimal::ZERO || item.vat_rate > dec!(100) {
        errors.push(ValidationIssue::error(
            path("vatRate"),
            "VAT rate must be between 0 and 100",
        ));
    }
}

fn check_consistency(record: &InvoiceRecord, warnings: &mut Vec<ValidationIssue>) {
    if let (Some(ht), Some(ttc)) = (record.total_ht, record.total_ttc) {
        if ttc < ht {
            warnings.push(ValidationIssue::warning(
                Field::TotalTtc.name(),
                format!("gross total {ttc} is lower than net total {ht} (negative VAT?)"),
            ));
        }
    }

    if let (Some(issued), Some(due)) = (record.invoice_date, record.due_date) {
        if due < issued {
            warnings.push(ValidationIssue::warning(
                Field::DueDate.name(),
                format!("due date {due} is before invoice date {issued}"),
            ));
        }
    }

    if let Some(ht) = record.total_ht.filter(|_| !record.items.is_empty()) {
        let lines = record.line_net_total();
        if lines.saturating_sub(ht).abs() > ROUNDING_TOLERANCE {
            warnings.push(ValidationIssue::warning(
                Field::TotalHt.name(),
                format!(
                    "net total {ht} does not match the sum of line amounts {}",
                    lines.round_dp(2)
                ),
            ));
        }
    }

    if let (Some(ht), Some(tva), Some(ttc)) = (record.total_ht, record.total_tva, record.total_ttc)
    {
        if ht.saturating_add(tva).saturating_sub(ttc).abs() > ROUNDING_TOLERANCE {
            warnings.push(ValidationIssue::warning(
                Field::TotalTtc.name(),
                format!("gross total {ttc} differs from net total {ht} + VAT {tva}"),
            ));
        }
    }
}

fn check_identifiers(record: &InvoiceRecord, warnings: &mut Vec<ValidationIssue>) {
    if let Some(siret) = record.seller.siret() {
        if is_siret_shaped(siret) && !validate_siret_checksum(siret) {
            warnings.push(ValidationIssue::warning(
                Field::SellerSiret.name(),
                "seller SIRET looks invalid (checksum mismatch)",
            ));
        }
    }

    for (field, value) in [
        (Field::SellerVat, record.seller.vat_number()),
        (Field::BuyerVat, record.buyer.vat_number()),
    ] {
        if value.and_then(check_french_vat_key) == Some(false) {
            warnings.push(ValidationIssue::warning(
                field.name(),
                "French VAT number key does not match the SIREN",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InvoiceRecordBuilder, LineItemBuilder, PartyBuilder};
    use chrono::NaiveDate;
    use serde_json::json;

    fn comfort_record() -> InvoiceRecord {
        InvoiceRecordBuilder::new("INV-001")
            .invoice_date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
            .seller(PartyBuilder::new("ACME").siret("73282932000074").build())
            .buyer(PartyBuilder::new("Client SARL").build())
            .add_item(
                LineItemBuilder::new("Service", dec!(1), dec!(1000))
                    .montant_ht(dec!(1000))
                    .build(),
            )
            .total_ht(dec!(1000))
            .total_ttc(dec!(1200))
            .build()
    }

    #[test]
    fn score_formula() {
        assert_eq!(score(0, 0), 100);
        assert_eq!(score(0, 2), 95);
        assert_eq!(score(1, 0), 92);
        assert_eq!(score(2, 0), 83);
        assert_eq!(score(12, 0), 0);
        assert_eq!(score(50, 50), 0);
        assert_eq!(score(usize::MAX, usize::MAX), 0);
    }

    #[test]
    fn score_strictly_decreases_per_error() {
        let mut last = score(0, 0);
        for errors in 1..=12 {
            let next = score(errors, 0);
            assert!(next < last, "{errors} errors: {next} !< {last}");
            last = next;
        }
    }

    #[test]
    fn comfort_scenario_only_address_warnings() {
        let result = validate_invoice(&comfort_record(), Profile::Comfort);
        assert!(result.is_valid, "{:?}", result.errors);
        assert_eq!(result.score, 95);
        let warned: Vec<&str> = result.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(warned, ["sellerAddress", "buyerAddress"]);
        assert_eq!(result.summary.checked_fields, 8 + 9);
    }

    #[test]
    fn missing_required_fields() {
        let record = InvoiceRecordBuilder::new("").currency("").build();
        let result = validate_invoice(&record, Profile::Minimum);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            ["invoiceNumber", "invoiceDate", "sellerName", "buyerName", "totalTTC", "currency"]
        );
        assert!(!result.is_valid);
    }

    #[test]
    fn empty_items_is_an_error_at_comfort() {
        let mut record = comfort_record();
        record.items.clear();
        let result = validate_invoice(&record, Profile::Comfort);
        assert!(result.errors.iter().any(|e| e.field == "items"));
        // Line-sum reconciliation needs lines.
        assert!(!result.warnings.iter().any(|w| w.field == "totalHT"));
    }

    #[test]
    fn item_rules() {
        let record = InvoiceRecordBuilder::new("INV-1")
            .add_item(LineItem {
                designation: " ".into(),
                quantity: dec!(0),
                unit_price: dec!(-1),
                discount: dec!(-5),
                vat_rate: dec!(120),
                montant_ht: None,
                montant_ttc: None,
            })
            .build();
        let result = validate_invoice(&record, Profile::Minimum);
        let item_fields: Vec<&str> = result
            .errors
            .iter()
            .map(|e| e.field.as_str())
            .filter(|f| f.starts_with("items[0]"))
            .collect();
        assert_eq!(
            item_fields,
            [
                "items[0].designation",
                "items[0].quantity",
                "items[0].unitPrice",
                "items[0].discount",
                "items[0].vatRate"
            ]
        );
    }

    #[test]
    fn format_rules() {
        let mut record = comfort_record();
        record.seller.siret = Some("123".into());
        record.buyer.vat_number = Some("not-a-vat".into());
        record.currency = "eur".into();
        record.total_ttc = Some(dec!(-1));
        record.invoice_number = "X".repeat(101);

        let result = validate_invoice(&record, Profile::Comfort);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            ["invoiceNumber", "sellerSIRET", "buyerVAT", "currency", "totalTTC"]
        );
    }

    #[test]
    fn vat_shaped_identifier_in_siret_slot() {
        let mut record = comfort_record();
        record.seller.siret = Some("FR40303265045".into());
        let result = validate_invoice(&record, Profile::Comfort);
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn cross_field_warnings() {
        let mut record = comfort_record();
        record.total_ttc = Some(dec!(900));
        record.total_tva = Some(dec!(200));
        record.due_date = NaiveDate::from_ymd_opt(2025, 1, 1);
        record.items[0].montant_ht = Some(dec!(999.50));

        let result = validate_invoice(&record, Profile::Comfort);
        assert!(result.is_valid);
        let fields: Vec<&str> = result.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(
            fields,
            ["sellerAddress", "buyerAddress", "totalTTC", "dueDate", "totalHT", "totalTTC"]
        );
    }

    #[test]
    fn one_cent_tolerance() {
        let mut record = comfort_record();
        record.items[0].montant_ht = Some(dec!(999.99));
        let result = validate_invoice(&record, Profile::Comfort);
        assert!(!result.warnings.iter().any(|w| w.field == "totalHT"));
    }

    #[test]
    fn line_sum_falls_back_to_quantity_times_price() {
        let mut record = comfort_record();
        record.items[0].montant_ht = None;
        record.items[0].quantity = dec!(2);
        let result = validate_invoice(&record, Profile::Comfort);
        assert!(result.warnings.iter().any(|w| w.field == "totalHT"));
    }

    #[test]
    fn bad_siret_checksum_is_a_warning() {
        let mut record = comfort_record();
        record.seller.siret = Some("73282932000075".into());
        let result = validate_invoice(&record, Profile::Comfort);
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.field == "sellerSIRET"));
    }

    #[test]
    fn french_vat_key_mismatch_is_a_warning() {
        let mut record = comfort_record();
        record.seller.vat_number = Some("FR41303265045".into());
        let result = validate_invoice(&record, Profile::Comfort);
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.field == "sellerVAT"));
    }

    #[test]
    fn profile_monotonicity() {
        let record = InvoiceRecordBuilder::new("INV-1")
            .invoice_date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
            .due_date(NaiveDate::from_ymd_opt(2025, 2, 15).unwrap())
            .seller(
                PartyBuilder::new("ACME")
                    .siret("73282932000074")
                    .vat_number("FR40303265045")
                    .build(),
            )
            .buyer(PartyBuilder::new("Client").build())
            .add_item(LineItemBuilder::new("Service", dec!(1), dec!(100)).build())
            .totals(dec!(100), dec!(20), dec!(120))
            .build();

        for profile in Profile::ALL {
            let result = validate_invoice(&record, profile);
            assert!(result.is_valid, "{profile}: {:?}", result.errors);
        }
    }

    #[test]
    fn json_format_issue_replaces_required_error() {
        let result = validate_json(
            &json!({
                "invoiceNumber": "INV-1",
                "invoiceDate": "15/01/2025",
                "sellerName": "ACME",
                "buyerName": "Client",
                "totalTTC": 120
            }),
            Profile::Minimum,
        );
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "invoiceDate");
        assert!(result.errors[0].message.contains("YYYY-MM-DD"));
    }

    #[test]
    fn serializes_camel_case() {
        let result = validate_invoice(&comfort_record(), Profile::Comfort);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isValid"], true);
        assert_eq!(json["profile"], "comfort");
        assert_eq!(json["summary"]["warningsCount"], 2);
        assert_eq!(json["warnings"][0]["severity"], "warning");
    }
}
