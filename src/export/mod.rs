//! Accounting export contract.
//!
//! Export consumers receive a slice of [`ExportInvoice`] values and render
//! them into a file body. Two semicolon-separated CSV renderers ship with the
//! crate; other formats implement [`AccountingExport`] themselves.
//!
//! # Example
//!
//! ```
//! use facturx::core::*;
//! use facturx::export::*;
//! use rust_decimal_macros::dec;
//!
//! let record = InvoiceRecordBuilder::new("F-001")
//!     .seller(PartyBuilder::new("Dupont SARL").build())
//!     .buyer(PartyBuilder::new("Martin SA").build())
//!     .totals(dec!(100), dec!(20), dec!(120))
//!     .build();
//! let invoices = [ExportInvoice::new(record, InvoiceStatus::Validated)];
//!
//! let csv = InvoiceCsv.render(&invoices).unwrap();
//! assert!(csv.lines().nth(1).unwrap().starts_with("F-001;"));
//! ```

mod csv;

pub use csv::{InvoiceCsv, LineItemCsv};

use serde::{Deserialize, Serialize};

use crate::core::{FacturxError, InvoiceRecord, Profile};

/// Lifecycle state of an invoice as seen by export consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Validated,
    Exported,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Validated => "validated",
            Self::Exported => "exported",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An invoice handed to an export consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportInvoice {
    /// Reference number of the stored invoice; the record's own number wins when set.
    pub invoice_number: String,
    pub record: InvoiceRecord,
    pub status: InvoiceStatus,
    /// Profile the Factur-X document was generated for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

impl ExportInvoice {
    pub fn new(record: InvoiceRecord, status: InvoiceStatus) -> Self {
        Self {
            invoice_number: record.invoice_number.clone(),
            record,
            status,
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// The number to print: the record's, else the stored reference.
    pub fn number(&self) -> &str {
        match self.record.invoice_number.trim() {
            "" => self.invoice_number.trim(),
            number => number,
        }
    }
}

/// A renderer turning invoices into an accounting file.
pub trait AccountingExport {
    /// Short identifier of the format (`csv`, `csv-items`, ...).
    fn name(&self) -> &'static str;

    /// File extension without the dot.
    fn file_extension(&self) -> &'static str;

    fn mime_type(&self) -> &'static str {
        "text/csv"
    }

    /// Render all invoices, in order, into one file body.
    fn render(&self, invoices: &[ExportInvoice]) -> Result<String, FacturxError>;
}

/// Look up a built-in renderer by its [`AccountingExport::name`] (case-insensitive).
pub fn exporter(format: &str) -> Result<Box<dyn AccountingExport + Send + Sync>, FacturxError> {
    match format.trim().to_ascii_lowercase().as_str() {
        "csv" => Ok(Box::new(InvoiceCsv)),
        "csv-items" => Ok(Box::new(LineItemCsv)),
        other => Err(FacturxError::Export(format!(
            "unsupported export format: {other}"
        ))),
    }
}
