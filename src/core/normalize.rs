//! Loosely-typed invoice input (extraction output, API payloads) to [`InvoiceRecord`].
//!
//! Extraction produces JSON with optional fields, numbers as strings and
//! legacy field names. Everything that cannot be represented in the typed
//! record is dropped and reported as an error-severity [`ValidationIssue`].

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::error::{FacturxError, ValidationIssue};
use super::types::{DEFAULT_CURRENCY, DEFAULT_VAT_RATE, InvoiceRecord, LineItem, Party};

/// Result of normalizing a loosely-typed record.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub record: InvoiceRecord,
    /// Values that were present but could not be converted.
    pub issues: Vec<ValidationIssue>,
}

impl InvoiceRecord {
    /// Normalize a JSON invoice object.
    ///
    /// Accepts the field names of the validator contract (`sellerName`,
    /// `totalHT`, ...) as well as the extraction synonyms (`supplierName`,
    /// `subtotal`, `taxAmount`, `total`, item `description`, ...). Never fails.
    pub fn from_json(value: &Value) -> Normalized {
        let mut reader = Reader::default();
        let Some(obj) = value.as_object() else {
            reader.issue("record", "expected a JSON object");
            return Normalized {
                record: InvoiceRecord {
                    currency: DEFAULT_CURRENCY.to_string(),
                    ..InvoiceRecord::default()
                },
                issues: reader.issues,
            };
        };

        let record = InvoiceRecord {
            invoice_number: reader
                .text(obj, "invoiceNumber", &["invoiceNumber", "number"])
                .unwrap_or_default(),
            invoice_date: reader.date(obj, "invoiceDate", &["invoiceDate", "date"]),
            due_date: reader.date(obj, "dueDate", &["dueDate"]),
            currency: reader
                .text(obj, "currency", &["currency"])
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            seller: Party {
                name: reader
                    .text(obj, "sellerName", &["sellerName", "supplierName"])
                    .unwrap_or_default(),
                address: reader.text(obj, "sellerAddress", &["sellerAddress", "supplierAddress"]),
                siret: reader.text(
                    obj,
                    "sellerSIRET",
                    &["sellerSIRET", "supplierSIRET", "supplierVAT"],
                ),
                vat_number: reader.text(obj, "sellerVAT", &["sellerVAT", "sellerVATNumber"]),
                country: reader.text(obj, "sellerCountry", &["sellerCountry"]),
            },
            buyer: buyer(&mut reader, obj),
            items: reader.items(obj),
            total_ht: reader.decimal(obj, "totalHT", &["totalHT", "subtotal"]),
            total_tva: reader.decimal(obj, "totalTVA", &["totalTVA", "taxAmount"]),
            total_ttc: reader.decimal(obj, "totalTTC", &["totalTTC", "total"]),
            payment_terms: reader.text(obj, "paymentTerms", &["paymentTerms"]),
        };

        Normalized {
            record,
            issues: reader.issues,
        }
    }

    /// Parse and normalize a JSON document.
    ///
    /// Only syntactically invalid JSON is an error; value-level problems are
    /// reported in [`Normalized::issues`].
    pub fn from_json_str(json: &str) -> Result<Normalized, FacturxError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| FacturxError::Record(e.to_string()))?;
        Ok(Self::from_json(&value))
    }
}

fn buyer(reader: &mut Reader, obj: &Map<String, Value>) -> Party {
    let siret = reader.text(obj, "buyerSIRET", &["buyerSIRET"]);
    let vat = reader.text(obj, "buyerVAT", &["buyerVAT"]);
    // Extraction writes whatever identifier it finds into buyerVAT.
    let (siret, vat_number) = match siret {
        Some(siret) => (Some(siret), vat),
        None => (vat, None),
    };
    Party {
        name: reader.text(obj, "buyerName", &["buyerName"]).unwrap_or_default(),
        address: reader.text(obj, "buyerAddress", &["buyerAddress"]),
        siret,
        vat_number,
        country: reader.text(obj, "buyerCountry", &["buyerCountry"]),
    }
}

#[derive(Default)]
struct Reader {
    issues: Vec<ValidationIssue>,
}

impl Reader {
    fn issue(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue::error(field, message));
    }

    /// First key present with a non-null value.
    fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|k| obj.get(*k))
            .find(|v| !v.is_null())
    }

    fn text(&mut self, obj: &Map<String, Value>, field: &str, keys: &[&str]) -> Option<String> {
        match Self::lookup(obj, keys)? {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => {
                self.issue(field, format!("expected text, found {}", kind(other)));
                None
            }
        }
    }

    fn decimal(&mut self, obj: &Map<String, Value>, field: &str, keys: &[&str]) -> Option<Decimal> {
        let value = Self::lookup(obj, keys)?;
        match parse_decimal_value(value) {
            Ok(amount) => amount,
            Err(()) => {
                self.issue(field, format!("'{}' is not a number", display(value)));
                None
            }
        }
    }

    fn date(&mut self, obj: &Map<String, Value>, field: &str, keys: &[&str]) -> Option<NaiveDate> {
        let raw = self.text(obj, field, keys)?;
        let date = parse_iso_date(&raw);
        if date.is_none() {
            self.issue(field, format!("'{raw}' is not a date in YYYY-MM-DD format"));
        }
        date
    }

    fn items(&mut self, obj: &Map<String, Value>) -> Vec<LineItem> {
        let Some(value) = Self::lookup(obj, &["items", "lineItems"]) else {
            return Vec::new();
        };
        let Some(entries) = value.as_array() else {
            self.issue("items", format!("expected a list, found {}", kind(value)));
            return Vec::new();
        };

        entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let Some(item) = entry.as_object() else {
                    self.issue(format!("items[{i}]"), format!("expected an object, found {}", kind(entry)));
                    return None;
                };
                let path = |name: &str| format!("items[{i}].{name}");
                Some(LineItem {
                    designation: self
                        .text(item, &path("designation"), &["designation", "description"])
                        .unwrap_or_default(),
                    quantity: self
                        .decimal(item, &path("quantity"), &["quantity"])
                        .unwrap_or(Decimal::ONE),
                    unit_price: self
                        .decimal(item, &path("unitPrice"), &["unitPrice"])
                        .unwrap_or(Decimal::ZERO),
                    discount: self
                        .decimal(item, &path("discount"), &["discount"])
                        .unwrap_or(Decimal::ZERO),
                    vat_rate: self
                        .decimal(item, &path("vatRate"), &["vatRate"])
                        .unwrap_or(DEFAULT_VAT_RATE),
                    montant_ht: self.decimal(item, &path("montantHT"), &["montantHT"]),
                    montant_ttc: self.decimal(item, &path("montantTTC"), &["montantTTC"]),
                })
            })
            .collect()
    }
}

/// `Ok(None)` for blank strings, `Err` for values that are not numeric.
fn parse_decimal_value(value: &Value) -> Result<Option<Decimal>, ()> {
    match value {
        Value::Number(n) => parse_decimal_str(&n.to_string()).map(Some).ok_or(()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_decimal_str(s).map(Some).ok_or(()),
        _ => Err(()),
    }
}

/// Parse `1200.5`, `"1 200,50"`, `"1.200,50"`, `"1,200.50"` and `"1200 €"`.
pub(crate) fn parse_decimal_str(raw: &str) -> Option<Decimal> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€')
        .collect();

    let normalized = match (compact.rfind(','), compact.rfind('.')) {
        // The separator that comes last is the decimal one.
        (Some(comma), Some(dot)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(_), None) => compact.replace(',', "."),
        _ => compact,
    };

    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()
}

/// Strict `YYYY-MM-DD`.
pub(crate) fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
