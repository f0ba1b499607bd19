use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Default invoice currency (ISO 4217).
pub const DEFAULT_CURRENCY: &str = "EUR";

/// VAT rate assumed when extraction did not provide one.
pub const DEFAULT_VAT_RATE: Decimal = dec!(20);

/// Invoice record consumed by validation and generation.
///
/// This is the strongly typed side of the trust boundary: loosely-typed
/// extraction output goes through [`InvoiceRecord::from_json`] before
/// reaching it. Empty strings and `None` both mean "absent".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceRecord {
    /// Invoice number as printed on the document.
    pub invoice_number: String,
    /// Issue date.
    pub invoice_date: Option<NaiveDate>,
    /// Payment due date.
    pub due_date: Option<NaiveDate>,
    /// ISO 4217 currency code. [`DEFAULT_CURRENCY`] when absent from serialized input.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Seller (issuer of the invoice).
    pub seller: Party,
    /// Buyer (recipient of the invoice).
    pub buyer: Party,
    /// Invoice lines, in document order.
    pub items: Vec<LineItem>,
    /// Total net amount (HT).
    #[serde(rename = "totalHT")]
    pub total_ht: Option<Decimal>,
    /// Total VAT amount (TVA).
    #[serde(rename = "totalTVA")]
    pub total_tva: Option<Decimal>,
    /// Total gross amount (TTC).
    #[serde(rename = "totalTTC")]
    pub total_ttc: Option<Decimal>,
    /// Free-text payment terms.
    pub payment_terms: Option<String>,
}

/// Seller or buyer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Party {
    pub name: String,
    /// Free-text postal address, decomposed by [`parse_address`](crate::core::parse_address).
    pub address: Option<String>,
    /// Tax identifier: a 14-digit SIRET or a VAT-shaped number.
    pub siret: Option<String>,
    /// Intra-community VAT number.
    pub vat_number: Option<String>,
    /// ISO 3166-1 alpha-2 country code overriding the one parsed from the address.
    pub country: Option<String>,
}

impl Party {
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    pub fn address(&self) -> Option<&str> {
        non_blank(self.address.as_deref())
    }

    pub fn siret(&self) -> Option<&str> {
        non_blank(self.siret.as_deref())
    }

    pub fn vat_number(&self) -> Option<&str> {
        non_blank(self.vat_number.as_deref())
    }

    pub fn country(&self) -> Option<&str> {
        non_blank(self.country.as_deref())
    }
}

/// A single invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub designation: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Absolute line allowance, deducted from `quantity * unit_price`.
    #[serde(default)]
    pub discount: Decimal,
    /// VAT rate in percent (0–100).
    pub vat_rate: Decimal,
    /// Line net amount as extracted (HT).
    #[serde(rename = "montantHT", default)]
    pub montant_ht: Option<Decimal>,
    /// Line gross amount as extracted (TTC).
    #[serde(rename = "montantTTC", default)]
    pub montant_ttc: Option<Decimal>,
}

impl Default for LineItem {
    fn default() -> Self {
        Self {
            designation: String::new(),
            quantity: Decimal::ONE,
            unit_price: Decimal::ZERO,
            discount: Decimal::ZERO,
            vat_rate: DEFAULT_VAT_RATE,
            montant_ht: None,
            montant_ttc: None,
        }
    }
}

impl LineItem {
    /// Line net amount: the extracted `montant_ht`, else `quantity * unit_price - discount`.
    pub fn net_amount(&self) -> Decimal {
        self.montant_ht.unwrap_or_else(|| {
            self.quantity
                .saturating_mul(self.unit_price)
                .saturating_sub(self.discount)
        })
    }
}

impl InvoiceRecord {
    /// Sum of all line net amounts.
    pub fn line_net_total(&self) -> Decimal {
        self.items
            .iter()
            .fold(Decimal::ZERO, |sum, item| sum.saturating_add(item.net_amount()))
    }

    /// VAT total: the extracted amount, else `total_ttc - total_ht`.
    pub fn tax_total(&self) -> Decimal {
        self.total_tva.unwrap_or_else(|| {
            self.total_ttc
                .unwrap_or(Decimal::ZERO)
                .saturating_sub(self.total_ht.unwrap_or(Decimal::ZERO))
        })
    }

    /// Currency code, falling back to [`DEFAULT_CURRENCY`] when blank.
    pub fn currency_code(&self) -> &str {
        non_blank(Some(&self.currency)).unwrap_or(DEFAULT_CURRENCY)
    }
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
