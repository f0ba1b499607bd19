use serde::{Deserialize, Serialize};

use super::types::InvoiceRecord;

/// Factur-X conformance profile.
///
/// Profiles are ordered: every field required by a lower profile is also
/// required by all higher ones.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Header data and totals only.
    Minimum,
    /// Adds net total; addresses recommended.
    Basic,
    /// Adds seller identifier and line items.
    #[default]
    Comfort,
    /// Adds seller VAT number and due date.
    Extended,
}

impl Profile {
    /// All profiles from lowest to highest.
    pub const ALL: [Profile; 4] = [
        Profile::Minimum,
        Profile::Basic,
        Profile::Comfort,
        Profile::Extended,
    ];

    /// The guideline identifier written to `GuidelineSpecifiedDocumentContextParameter`.
    pub fn urn(&self) -> &'static str {
        match self {
            Self::Minimum => "urn:factur-x.eu:1p0:minimum",
            Self::Basic => "urn:factur-x.eu:1p0:basic",
            Self::Comfort => "urn:factur-x.eu:1p0:comfort",
            Self::Extended => "urn:factur-x.eu:1p0:extended",
        }
    }

    /// Map a guideline identifier back to a profile.
    pub fn from_urn(urn: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.urn() == urn.trim())
    }

    /// The XMP `fx:ConformanceLevel` value.
    pub fn conformance_level(&self) -> &'static str {
        match self {
            Self::Minimum => "MINIMUM",
            Self::Basic => "BASIC",
            Self::Comfort => "COMFORT",
            Self::Extended => "EXTENDED",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimum => "minimum",
            Self::Basic => "basic",
            Self::Comfort => "comfort",
            Self::Extended => "extended",
        }
    }

    /// Field requirements of this profile.
    pub fn requirements(&self) -> &'static ProfileRequirements {
        match self {
            Self::Minimum => &MINIMUM,
            Self::Basic => &BASIC,
            Self::Comfort => &COMFORT,
            Self::Extended => &EXTENDED,
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown profile name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown Factur-X profile '{0}' (expected minimum, basic, comfort or extended)")]
pub struct UnknownProfile(pub String);

impl std::str::FromStr for Profile {
    type Err = UnknownProfile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimum" => Ok(Self::Minimum),
            "basic" => Ok(Self::Basic),
            "comfort" | "en16931" | "en 16931" => Ok(Self::Comfort),
            "extended" => Ok(Self::Extended),
            _ => Err(UnknownProfile(s.to_string())),
        }
    }
}

/// Invoice record fields referenced by profile requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    InvoiceNumber,
    InvoiceDate,
    DueDate,
    Currency,
    SellerName,
    SellerAddress,
    SellerSiret,
    SellerVat,
    BuyerName,
    BuyerAddress,
    BuyerSiret,
    BuyerVat,
    TotalHt,
    TotalTva,
    TotalTtc,
    Items,
    PaymentTerms,
}

impl Field {
    /// External (wire) name of the field, as used in validation issues.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvoiceNumber => "invoiceNumber",
            Self::InvoiceDate => "invoiceDate",
            Self::DueDate => "dueDate",
            Self::Currency => "currency",
            Self::SellerName => "sellerName",
            Self::SellerAddress => "sellerAddress",
            Self::SellerSiret => "sellerSIRET",
            Self::SellerVat => "sellerVAT",
            Self::BuyerName => "buyerName",
            Self::BuyerAddress => "buyerAddress",
            Self::BuyerSiret => "buyerSIRET",
            Self::BuyerVat => "buyerVAT",
            Self::TotalHt => "totalHT",
            Self::TotalTva => "totalTVA",
            Self::TotalTtc => "totalTTC",
            Self::Items => "items",
            Self::PaymentTerms => "paymentTerms",
        }
    }

    /// Whether the record carries a non-empty value for this field.
    pub fn is_present(&self, record: &InvoiceRecord) -> bool {
        match self {
            Self::InvoiceNumber => !record.invoice_number.trim().is_empty(),
            Self::InvoiceDate => record.invoice_date.is_some(),
            Self::DueDate => record.due_date.is_some(),
            Self::Currency => !record.currency.trim().is_empty(),
            Self::SellerName => record.seller.has_name(),
            Self::SellerAddress => record.seller.address().is_some(),
            Self::SellerSiret => record.seller.siret().is_some(),
            Self::SellerVat => record.seller.vat_number().is_some(),
            Self::BuyerName => record.buyer.has_name(),
            Self::BuyerAddress => record.buyer.address().is_some(),
            Self::BuyerSiret => record.buyer.siret().is_some(),
            Self::BuyerVat => record.buyer.vat_number().is_some(),
            Self::TotalHt => record.total_ht.is_some(),
            Self::TotalTva => record.total_tva.is_some(),
            Self::TotalTtc => record.total_ttc.is_some(),
            Self::Items => !record.items.is_empty(),
            Self::PaymentTerms => record
                .payment_terms
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty()),
        }
    }
}

/// Required, recommended and optional fields of a profile.
///
/// Missing required fields are errors, missing recommended fields are
/// warnings, optional fields are informational.
#[derive(Debug)]
pub struct ProfileRequirements {
    pub required: &'static [Field],
    pub recommended: &'static [Field],
    pub optional: &'static [Field],
}

static MINIMUM: ProfileRequirements = ProfileRequirements {
    required: &[
        Field::InvoiceNumber,
        Field::InvoiceDate,
        Field::SellerName,
        Field::BuyerName,
        Field::TotalTtc,
        Field::Currency,
    ],
    recommended: &[],
    optional: &[],
};

static BASIC: ProfileRequirements = ProfileRequirements {
    required: &[
        Field::InvoiceNumber,
        Field::InvoiceDate,
        Field::SellerName,
        Field::BuyerName,
        Field::TotalHt,
        Field::TotalTtc,
        Field::Currency,
    ],
    recommended: &[Field::SellerAddress, Field::BuyerAddress],
    optional: &[Field::DueDate, Field::SellerSiret, Field::BuyerSiret],
};

static COMFORT: ProfileRequirements = ProfileRequirements {
    required: &[
        Field::InvoiceNumber,
        Field::InvoiceDate,
        Field::SellerName,
        Field::SellerSiret,
        Field::BuyerName,
        Field::TotalHt,
        Field::TotalTtc,
        Field::Currency,
        Field::Items,
    ],
    recommended: &[Field::SellerAddress, Field::BuyerAddress],
    optional: &[
        Field::DueDate,
        Field::BuyerSiret,
        Field::SellerVat,
        Field::BuyerVat,
    ],
};

static EXTENDED: ProfileRequirements = ProfileRequirements {
    required: &[
        Field::InvoiceNumber,
        Field::InvoiceDate,
        Field::SellerName,
        Field::SellerSiret,
        Field::SellerVat,
        Field::BuyerName,
        Field::TotalHt,
        Field::TotalTtc,
        Field::Currency,
        Field::Items,
        Field::DueDate,
    ],
    recommended: &[Field::SellerAddress, Field::BuyerAddress],
    optional: &[Field::BuyerSiret, Field::BuyerVat, Field::PaymentTerms],
};

/// Suggest the most complete profile the record's data can support.
///
/// Total and deterministic; looks only at data presence, not validity.
pub fn recommend_profile(record: &InvoiceRecord) -> Profile {
    let has_items = Field::Items.is_present(record);
    let has_siret = Field::SellerSiret.is_present(record);

    if has_items
        && has_siret
        && Field::SellerVat.is_present(record)
        && Field::DueDate.is_present(record)
    {
        Profile::Extended
    } else if has_items && has_siret {
        Profile::Comfort
    } else if Field::SellerAddress.is_present(record) && Field::BuyerAddress.is_present(record) {
        Profile::Basic
    } else {
        Profile::Minimum
    }
}
