use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};

use super::cii_ns;
use super::xml_utils::local_name;
use crate::core::{Profile, ValidationIssue};

/// Outcome of [`validate_xml_structure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub structure: StructureFlags,
    /// Guideline identifier found in the document context, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guideline_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureFlags {
    pub has_context: bool,
    pub has_document: bool,
    pub has_transaction: bool,
}

impl StructureReport {
    fn failed(error: ValidationIssue) -> Self {
        Self {
            is_valid: false,
            errors: vec![error],
            structure: StructureFlags::default(),
            guideline_id: None,
        }
    }

    /// Factur-X profile declared by the guideline identifier.
    pub fn profile(&self) -> Option<Profile> {
        self.guideline_id.as_deref().and_then(Profile::from_urn)
    }
}

/// Check that an XML string carries the mandatory CII skeleton.
///
/// Checks, in order: root `CrossIndustryInvoice` bound to the CII namespace
/// (any prefix), document context, exchanged document and its ID, trade
/// transaction, header agreement with seller and buyer, header settlement.
/// A missing root aborts with exactly one error; other missing elements
/// accumulate. Malformed XML yields a single `xml` error. Never panics.
pub fn validate_xml_structure(xml: &str) -> StructureReport {
    let scan = match Scan::run(xml) {
        Ok(scan) => scan,
        Err(error) => return StructureReport::failed(error),
    };

    let mut errors = Vec::new();
    let mut missing = |present: bool, field: &str, message: &str| {
        if !present {
            errors.push(ValidationIssue::error(field, message));
        }
    };

    missing(scan.context, "context", "ExchangedDocumentContext missing");
    missing(scan.document, "document", "ExchangedDocument missing");
    if scan.document {
        missing(
            scan.document_id,
            "invoiceNumber",
            "invoice ID missing in ExchangedDocument",
        );
    }
    missing(scan.transaction, "transaction", "SupplyChainTradeTransaction missing");
    if scan.transaction {
        missing(scan.agreement, "agreement", "ApplicableHeaderTradeAgreement missing");
        if scan.agreement {
            missing(scan.seller, "seller", "SellerTradeParty missing");
            missing(scan.buyer, "buyer", "BuyerTradeParty missing");
        }
        missing(scan.settlement, "settlement", "ApplicableHeaderTradeSettlement missing");
    }

    StructureReport {
        is_valid: errors.is_empty(),
        errors,
        structure: StructureFlags {
            has_context: scan.context,
            has_document: scan.document,
            has_transaction: scan.transaction,
        },
        guideline_id: scan.guideline_id,
    }
}

#[derive(Default)]
struct Scan {
    rooted: bool,
    context: bool,
    document: bool,
    document_id: bool,
    transaction: bool,
    agreement: bool,
    seller: bool,
    buyer: bool,
    settlement: bool,
    guideline_id: Option<String>,
}

impl Scan {
    fn run(xml: &str) -> Result<Self, ValidationIssue> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut scan = Scan::default();
        let mut path: Vec<String> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    if path.is_empty() {
                        check_root(e)?;
                    }
                    path.push(String::from_utf8_lossy(local_name(e.name().as_ref())).into_owned());
                    scan.enter(&path);
                }
                Ok(Event::Empty(ref e)) => {
                    if path.is_empty() {
                        check_root(e)?;
                    }
                    path.push(String::from_utf8_lossy(local_name(e.name().as_ref())).into_owned());
                    scan.enter(&path);
                    path.pop();
                }
                Ok(Event::Text(ref e)) => {
                    let text = e.unescape().map_err(parse_error)?;
                    scan.text(&path, &text);
                }
                Ok(Event::CData(ref e)) => {
                    scan.text(&path, &String::from_utf8_lossy(&e[..]));
                }
                Ok(Event::End(_)) => {
                    path.pop();
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(parse_error(e)),
                _ => {}
            }
        }

        if let Some(open) = path.last() {
            return Err(parse_error(format!("element <{open}> is not closed")));
        }
        if !scan.rooted {
            return Err(root_missing("no root element"));
        }
        Ok(scan)
    }

    fn enter(&mut self, path: &[String]) {
        let names: Vec<&str> = path.iter().map(String::as_str).collect();
        match names.as_slice() {
            [_] => self.rooted = true,
            [_, "ExchangedDocumentContext"] => self.context = true,
            [_, "ExchangedDocument"] => self.document = true,
            [_, "SupplyChainTradeTransaction"] => self.transaction = true,
            [_, "SupplyChainTradeTransaction", "ApplicableHeaderTradeAgreement"] => {
                self.agreement = true
            }
            [_, "SupplyChainTradeTransaction", "ApplicableHeaderTradeSettlement"] => {
                self.settlement = true
            }
            [_, _, "ApplicableHeaderTradeAgreement", "SellerTradeParty"] => self.seller = true,
            [_, _, "ApplicableHeaderTradeAgreement", "BuyerTradeParty"] => self.buyer = true,
            _ => {}
        }
    }

    fn text(&mut self, path: &[String], text: &str) {
        let names: Vec<&str> = path.iter().map(String::as_str).collect();
        match names.as_slice() {
            [_, "ExchangedDocument", "ID"] if !text.trim().is_empty() => self.document_id = true,
            [
                _,
                "ExchangedDocumentContext",
                "GuidelineSpecifiedDocumentContextParameter",
                "ID",
            ] => self.guideline_id = Some(text.trim().to_string()),
            _ => {}
        }
    }
}

/// The root must be `CrossIndustryInvoice` with its prefix bound to the CII namespace.
fn check_root(e: &BytesStart<'_>) -> Result<(), ValidationIssue> {
    let qname = e.name();
    let found = String::from_utf8_lossy(qname.as_ref()).into_owned();
    if local_name(qname.as_ref()) != b"CrossIndustryInvoice" {
        return Err(root_missing(&format!("found <{found}>")));
    }

    let declaration = match qname.prefix() {
        Some(prefix) => [b"xmlns:".as_slice(), prefix.as_ref()].concat(),
        None => b"xmlns".to_vec(),
    };
    let bound = e.attributes().flatten().any(|attr| {
        attr.key.as_ref() == declaration.as_slice() && attr.value.as_ref() == cii_ns::RSM.as_bytes()
    });
    if !bound {
        return Err(root_missing(&format!(
            "<{found}> is not in namespace {}",
            cii_ns::RSM
        )));
    }
    Ok(())
}

fn root_missing(detail: &str) -> ValidationIssue {
    ValidationIssue::error(
        "root",
        format!("CrossIndustryInvoice root element missing ({detail})"),
    )
}

fn parse_error(e: impl std::fmt::Display) -> ValidationIssue {
    ValidationIssue::error("xml", format!("XML parse error: {e}"))
}
