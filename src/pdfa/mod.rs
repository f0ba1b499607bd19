//! Factur-X PDF/A-3 embedding and extraction.
//!
//! [`embed_in_pdf`] attaches a CII document to an existing PDF as
//! `factur-x.xml`, with the associated-file entries, document info and XMP
//! metadata a Factur-X reader expects. [`extract_from_pdf`] reads it back.
//!
//! # Conformance levels
//!
//! | Profile | XMP `fx:ConformanceLevel` |
//! |---------|---------------------------|
//! | Minimum | `MINIMUM` |
//! | Basic | `BASIC` |
//! | Comfort | `COMFORT` |
//! | Extended | `EXTENDED` |
//!
//! The embedder does not convert arbitrary PDFs to PDF/A: fonts, colour
//! profiles and transparency of the source document are left untouched.

mod embed;
mod extract;
mod xmp;

pub use embed::{EmbedOptions, decrypt_source, embed_in_pdf, embed_in_pdf_with};
pub use extract::extract_from_pdf;

/// The embedded XML filename per Factur-X 1.0.
pub const FACTURX_FILENAME: &str = "factur-x.xml";

/// Namespace of the Factur-X PDF/A extension schema.
pub const FX_NAMESPACE: &str = "urn:factur-x:pdfa:CrossIndustryDocument:invoice:1p0#";

/// Attachment names accepted as the Factur-X XML (`factur-x.xml`, `facturx.xml`, ...).
pub(crate) fn is_facturx_filename(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("factur-x") || lower.contains("facturx")
}
