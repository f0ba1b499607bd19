//! UN/CEFACT Cross Industry Invoice (CII) XML for Factur-X.
//!
//! - [`to_cii_xml`] / [`to_cii_xml_with`] generate a profile-specific document
//! - [`from_cii_xml`] reads a CII document back into an [`InvoiceRecord`](crate::core::InvoiceRecord)
//! - [`validate_xml_structure`] checks the mandatory element skeleton
//!
//! # Example
//!
//! ```
//! use facturx::core::*;
//! use facturx::cii;
//! use rust_decimal_macros::dec;
//!
//! let record = InvoiceRecordBuilder::new("INV-001")
//!     .seller(PartyBuilder::new("ACME").build())
//!     .buyer(PartyBuilder::new("Client SARL").build())
//!     .totals(dec!(100), dec!(20), dec!(120))
//!     .build();
//!
//! let xml = cii::to_cii_xml(&record, Profile::Minimum).unwrap();
//! assert!(cii::validate_xml_structure(&xml).is_valid);
//! ```

mod generate;
mod parse;
mod structure;
pub(crate) mod xml_utils;

pub use generate::{CiiOptions, VatBreakdownMode, to_cii_xml, to_cii_xml_with};
pub use parse::from_cii_xml;
pub use structure::{StructureFlags, StructureReport, validate_xml_structure};

/// CII namespace URIs (version 100).
pub mod cii_ns {
    pub const RSM: &str = "urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100";
    pub const RAM: &str =
        "urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100";
    pub const UDT: &str = "urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100";
}

/// Document type code for a commercial invoice (UNTDID 1001).
pub const COMMERCIAL_INVOICE: &str = "380";

/// Unit code for "piece" (UN/ECE Recommendation 20).
pub const UNIT_PIECE: &str = "C62";
