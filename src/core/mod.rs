//! Core invoice types, normalization, profiles and business validation.
//!
//! This module holds everything that does not depend on an XML or PDF
//! library: the typed invoice record and its JSON trust boundary, the
//! Factur-X profile tables, identifier checks, the address parser and the
//! scored business validator.

mod address;
mod builder;
mod error;
mod identifiers;
mod normalize;
mod profile;
mod types;
mod validation;

pub use address::*;
pub use builder::*;
pub use error::*;
pub use identifiers::*;
pub use normalize::Normalized;
pub(crate) use normalize::parse_iso_date;
pub use profile::*;
pub use types::*;
pub use validation::*;
