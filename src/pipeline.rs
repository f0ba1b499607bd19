//! End-to-end conversion of an invoice record into a Factur-X document.
//!
//! The steps run in a fixed order: business validation, profile selection,
//! CII generation, structural self-check of the generated XML, and (when a
//! source PDF is supplied) PDF/A-3 embedding. Validation and structure
//! findings are reported in the returned [`Conversion`]; they never abort
//! the run. Only XML generation and embedding failures are errors.

use serde_json::Value;

use crate::cii::{self, StructureReport};
use crate::core::{
    FacturxError, InvoiceRecord, Profile, ValidationResult, recommend_profile, validate_invoice,
    validate_normalized,
};
use crate::pdfa;

/// The XML and, when a source PDF was given, the hybrid PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub xml: String,
    pub pdf: Option<Vec<u8>>,
}

/// Everything a conversion produced.
#[derive(Debug, Clone)]
pub struct Conversion {
    /// Profile the document was generated for.
    pub profile: Profile,
    pub validation: ValidationResult,
    /// Structural check of the generated XML.
    pub structure: StructureReport,
    pub document: GeneratedDocument,
}

impl Conversion {
    /// Valid business data and a structurally complete XML document.
    pub fn is_conformant(&self) -> bool {
        self.validation.is_valid && self.structure.is_valid
    }
}

/// Convert a typed record.
///
/// `profile` defaults to the one [`recommend_profile`] picks for the record.
pub fn convert(
    record: &InvoiceRecord,
    source_pdf: Option<&[u8]>,
    profile: Option<Profile>,
) -> Result<Conversion, FacturxError> {
    let profile = profile.unwrap_or_else(|| recommend_profile(record));
    let validation = validate_invoice(record, profile);
    finish(record, validation, source_pdf, profile)
}

/// Convert loosely-typed JSON as produced by an extraction step.
///
/// Values the normalizer had to drop show up as validation errors.
pub fn convert_json(
    value: &Value,
    source_pdf: Option<&[u8]>,
    profile: Option<Profile>,
) -> Result<Conversion, FacturxError> {
    let normalized = InvoiceRecord::from_json(value);
    let profile = profile.unwrap_or_else(|| recommend_profile(&normalized.record));
    let validation = validate_normalized(&normalized, profile);
    finish(&normalized.record, validation, source_pdf, profile)
}

fn finish(
    record: &InvoiceRecord,
    validation: ValidationResult,
    source_pdf: Option<&[u8]>,
    profile: Profile,
) -> Result<Conversion, FacturxError> {
    let xml = cii::to_cii_xml(record, profile)?;
    let structure = cii::validate_xml_structure(&xml);
    if !structure.is_valid {
        tracing::warn!(
            invoice_number = %record.invoice_number,
            errors = structure.errors.len(),
            "generated XML failed the structural check"
        );
    }

    let pdf = source_pdf
        .map(|pdf| pdfa::embed_in_pdf(pdf, &xml, &record.invoice_number, profile))
        .transpose()?;

    tracing::debug!(
        invoice_number = %record.invoice_number,
        profile = %profile,
        valid = validation.is_valid,
        score = validation.score,
        embedded = pdf.is_some(),
        "conversion finished"
    );

    Ok(Conversion {
        profile,
        validation,
        structure,
        document: GeneratedDocument { xml, pdf },
    })
}
