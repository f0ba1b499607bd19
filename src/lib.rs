//! # facturx
//!
//! Factur-X (ZUGFeRD 2 / EN 16931) hybrid invoices: a UN/CEFACT Cross
//! Industry Invoice XML embedded in a PDF/A-3 document.
//!
//! The crate turns a semi-structured invoice record (typically the output of
//! a text-extraction step) into a validated, profile-specific CII document,
//! embeds it in an existing PDF, and reads it back.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use facturx::core::*;
//! use rust_decimal_macros::dec;
//!
//! let record = InvoiceRecordBuilder::new("F-2024-001")
//!     .invoice_date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
//!     .seller(PartyBuilder::new("Dupont SARL")
//!         .address("12 Rue de la Paix, 75002 Paris, France")
//!         .siret("73282932000074")
//!         .build())
//!     .buyer(PartyBuilder::new("Martin SA")
//!         .address("5 Avenue Foch, 69006 Lyon, France")
//!         .build())
//!     .add_item(LineItemBuilder::new("Conseil", dec!(2), dec!(500)).build())
//!     .totals(dec!(1000), dec!(200), dec!(1200))
//!     .build();
//!
//! assert_eq!(recommend_profile(&record), Profile::Comfort);
//! let result = validate_invoice(&record, Profile::Comfort);
//! assert!(result.is_valid);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Invoice record, JSON normalization, profiles, business validation |
//! | `cii` (default) | CII XML generation, parsing and structural validation |
//! | `pdfa` (default) | PDF/A-3 embed/extract and the end-to-end [`pipeline`] |
//! | `export` | Accounting export contract and CSV renderers |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "cii")]
pub mod cii;

#[cfg(feature = "pdfa")]
pub mod pdfa;

#[cfg(feature = "pdfa")]
pub mod pipeline;

#[cfg(feature = "export")]
pub mod export;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
