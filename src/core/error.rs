use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while reading, generating, embedding or exporting invoices.
///
/// Data deficiencies are never reported through this type: they are
/// [`ValidationIssue`] values inside a validation result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FacturxError {
    /// The loosely-typed input record could not be parsed at all.
    #[error("invalid invoice record: {0}")]
    Record(String),

    /// XML generation or parsing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// Embedding the XML into the PDF failed at the given stage.
    #[error("failed to embed XML in PDF ({stage}): {message}")]
    Embedding { stage: EmbedStage, message: String },

    /// The source PDF is encrypted and cannot be opened without a password.
    #[error("encrypted PDF: {0}")]
    Encrypted(String),

    /// No Factur-X XML could be read back from a PDF.
    #[error("failed to extract XML from PDF: {0}")]
    Extraction(String),

    /// An accounting export could not be rendered.
    #[error("export error: {0}")]
    Export(String),
}

impl FacturxError {
    pub(crate) fn embedding(stage: EmbedStage, message: impl Into<String>) -> Self {
        Self::Embedding {
            stage,
            message: message.into(),
        }
    }
}

/// The PDF embedding stage that failed.
///
/// `Load` means the source PDF itself is unusable (re-export or re-scan it);
/// the other stages point at the embedding step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedStage {
    /// Parsing the source PDF.
    Load,
    /// Attaching the XML, metadata and associated-file entries.
    Attach,
    /// Writing the resulting PDF.
    Serialize,
}

impl std::fmt::Display for EmbedStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Load => "source PDF",
            Self::Attach => "attachment",
            Self::Serialize => "serialization",
        })
    }
}

/// Severity of a [`ValidationIssue`]. Warnings never make a record invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single field-level finding with field path and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// External field name or path (e.g. "sellerSIRET", "items[0].quantity").
    pub field: String,
    /// Human-readable description.
    pub message: String,
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "{}: {}", self.field, self.message),
            Severity::Warning => write!(f, "{} (warning): {}", self.field, self.message),
        }
    }
}

impl ValidationIssue {
    /// Create an error-severity issue.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    /// Create a warning-severity issue.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
