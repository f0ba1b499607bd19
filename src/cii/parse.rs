use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rust_decimal::Decimal;
use std::str::FromStr;

use super::xml_utils::local_name;
use crate::core::*;

/// Parse a CII (Cross Industry Invoice) XML string into an invoice record.
///
/// Elements are matched by local name, so documents using other namespace
/// prefixes are read as well. Party addresses are rebuilt as
/// `line, postcode city, country`.
pub fn from_cii_xml(xml: &str) -> Result<InvoiceRecord, FacturxError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut p = CiiParsed::default();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = element_name(e);
                p.capture_attributes(e);
                p.enter(&path, &name);
                path.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                let name = element_name(e);
                p.enter(&path, &name);
                path.push(name);
                p.element_closed(&path);
                path.pop();
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| FacturxError::Xml(format!("invalid text: {e}")))?;
                if !text.is_empty() {
                    p.handle_text(&path, &text);
                }
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(&e[..]).trim().to_string();
                if !text.is_empty() {
                    p.handle_text(&path, &text);
                }
            }
            Ok(Event::End(_)) => {
                p.element_closed(&path);
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FacturxError::Xml(format!("parse error: {e}"))),
            _ => {}
        }
    }

    if !p.is_cii {
        return Err(FacturxError::Xml(
            "root element is not CrossIndustryInvoice".into(),
        ));
    }
    p.into_record()
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(local_name(e.name().as_ref())).into_owned()
}

#[derive(Default)]
struct CiiParsed {
    is_cii: bool,
    number: Option<String>,
    issue_date: Option<String>,
    due_date: Option<String>,
    currency: Option<String>,
    payment_terms: Option<String>,

    seller: CiiParty,
    buyer: CiiParty,

    line_total: Option<String>,
    tax_basis_total: Option<String>,
    tax_total: Option<String>,
    grand_total: Option<String>,

    lines: Vec<CiiLine>,
    current_line: Option<CiiLine>,

    // Temp state
    current_scheme_id: Option<String>,
    current_currency_id: Option<String>,
}

#[derive(Default)]
struct CiiParty {
    name: Option<String>,
    legal_id: Option<String>,
    vat_id: Option<String>,
    other_tax_id: Option<String>,
    line_one: Option<String>,
    postcode: Option<String>,
    city: Option<String>,
    country: Option<String>,
}

#[derive(Default)]
struct CiiLine {
    name: Option<String>,
    price: Option<String>,
    quantity: Option<String>,
    tax_rate: Option<String>,
    line_total: Option<String>,
}

impl CiiParsed {
    fn enter(&mut self, path: &[String], name: &str) {
        if path.is_empty() {
            self.is_cii = name == "CrossIndustryInvoice";
        }
    }

    fn capture_attributes(&mut self, e: &BytesStart<'_>) {
        for attr in e.attributes().flatten() {
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_default();
            match attr.key.as_ref() {
                b"schemeID" => self.current_scheme_id = Some(value),
                b"currencyID" => self.current_currency_id = Some(value),
                _ => {}
            }
        }
    }

    fn element_closed(&mut self, path: &[String]) {
        match path.last().map(String::as_str) {
            Some("IncludedSupplyChainTradeLineItem") => {
                if let Some(line) = self.current_line.take() {
                    self.lines.push(line);
                }
            }
            Some("ID") => self.current_scheme_id = None,
            Some("TaxTotalAmount") => self.current_currency_id = None,
            _ => {}
        }
    }

    fn handle_text(&mut self, path: &[String], text: &str) {
        let leaf = path.last().map(String::as_str).unwrap_or("");
        let parent = if path.len() >= 2 {
            path[path.len() - 2].as_str()
        } else {
            ""
        };
        let within = |name: &str| path.iter().any(|p| p == name);

        if within("IncludedSupplyChainTradeLineItem") {
            let line = self.current_line.get_or_insert_with(CiiLine::default);
            match leaf {
                "Name" if parent == "SpecifiedTradeProduct" => line.name = Some(text.to_string()),
                "ChargeAmount" if parent == "NetPriceProductTradePrice" => {
                    line.price = Some(text.to_string())
                }
                "BilledQuantity" => line.quantity = Some(text.to_string()),
                "RateApplicablePercent" => line.tax_rate = Some(text.to_string()),
                "LineTotalAmount" => line.line_total = Some(text.to_string()),
                _ => {}
            }
            return;
        }

        let party = if within("SellerTradeParty") {
            Some(&mut self.seller)
        } else if within("BuyerTradeParty") {
            Some(&mut self.buyer)
        } else {
            None
        };
        if let Some(party) = party {
            match (parent, leaf) {
                (_, "Name") if parent.ends_with("TradeParty") => {
                    party.name = Some(text.to_string())
                }
                ("SpecifiedLegalOrganization", "ID") => party.legal_id = Some(text.to_string()),
                ("SpecifiedTaxRegistration", "ID") => {
                    if self.current_scheme_id.as_deref() == Some("VA") {
                        party.vat_id = Some(text.to_string());
                    } else {
                        party.other_tax_id = Some(text.to_string());
                    }
                }
                ("PostalTradeAddress", "LineOne") => party.line_one = Some(text.to_string()),
                ("PostalTradeAddress", "PostcodeCode") => party.postcode = Some(text.to_string()),
                ("PostalTradeAddress", "CityName") => party.city = Some(text.to_string()),
                ("PostalTradeAddress", "CountryID") => party.country = Some(text.to_string()),
                _ => {}
            }
            return;
        }

        match (parent, leaf) {
            ("ExchangedDocument", "ID") => self.number = Some(text.to_string()),
            ("IssueDateTime", "DateTimeString") => self.issue_date = Some(text.to_string()),
            ("DueDateDateTime", "DateTimeString") => self.due_date = Some(text.to_string()),
            ("SpecifiedTradePaymentTerms", "Description") => {
                self.payment_terms = Some(text.to_string())
            }
            (_, "InvoiceCurrencyCode") => self.currency = Some(text.to_string()),
            ("SpecifiedTradeSettlementHeaderMonetarySummation", "LineTotalAmount") => {
                self.line_total = Some(text.to_string())
            }
            ("SpecifiedTradeSettlementHeaderMonetarySummation", "TaxBasisTotalAmount") => {
                self.tax_basis_total = Some(text.to_string())
            }
            ("SpecifiedTradeSettlementHeaderMonetarySummation", "TaxTotalAmount") => {
                // A second TaxTotalAmount may carry the tax currency.
                let invoice_currency = self.current_currency_id.as_deref()
                    == self.currency.as_deref()
                    || self.current_currency_id.is_none();
                if self.tax_total.is_none() || invoice_currency {
                    self.tax_total = Some(text.to_string());
                }
            }
            ("SpecifiedTradeSettlementHeaderMonetarySummation", "GrandTotalAmount") => {
                self.grand_total = Some(text.to_string())
            }
            _ => {}
        }
    }

    fn into_record(self) -> Result<InvoiceRecord, FacturxError> {
        let items = self
            .lines
            .into_iter()
            .map(|line| {
                Ok(LineItem {
                    designation: line.name.unwrap_or_default(),
                    quantity: parse_decimal(line.quantity.as_deref(), "BilledQuantity")?
                        .unwrap_or(Decimal::ONE),
                    unit_price: parse_decimal(line.price.as_deref(), "ChargeAmount")?
                        .unwrap_or(Decimal::ZERO),
                    discount: Decimal::ZERO,
                    vat_rate: parse_decimal(line.tax_rate.as_deref(), "RateApplicablePercent")?
                        .unwrap_or(DEFAULT_VAT_RATE),
                    montant_ht: parse_decimal(line.line_total.as_deref(), "LineTotalAmount")?,
                    montant_ttc: None,
                })
            })
            .collect::<Result<Vec<_>, FacturxError>>()?;

        let total_ht = match parse_decimal(self.tax_basis_total.as_deref(), "TaxBasisTotalAmount")? {
            Some(basis) => Some(basis),
            None => parse_decimal(self.line_total.as_deref(), "LineTotalAmount")?,
        };

        Ok(InvoiceRecord {
            invoice_number: self.number.unwrap_or_default(),
            invoice_date: parse_date(self.issue_date.as_deref())?,
            due_date: parse_date(self.due_date.as_deref())?,
            currency: self
                .currency
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            seller: self.seller.into_party(),
            buyer: self.buyer.into_party(),
            items,
            total_ht,
            total_tva: parse_decimal(self.tax_total.as_deref(), "TaxTotalAmount")?,
            total_ttc: parse_decimal(self.grand_total.as_deref(), "GrandTotalAmount")?,
            payment_terms: self.payment_terms,
        })
    }
}

impl CiiParty {
    fn into_party(self) -> Party {
        let (siret, vat_number) = match (self.legal_id, self.vat_id, self.other_tax_id) {
            (Some(legal), vat, _) => (Some(legal), vat),
            (None, Some(vat), None) => (Some(vat), None),
            (None, vat, other) => (other, vat),
        };

        let postcode_city = [self.postcode.as_deref(), self.city.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let line_one = self.line_one.unwrap_or_default();
        let address = if line_one.is_empty() && postcode_city.is_empty() {
            None
        } else {
            let mut parts = vec![line_one, postcode_city];
            if let Some(country) = &self.country {
                parts.push(country.clone());
            }
            Some(parts.join(", "))
        };

        Party {
            name: self.name.unwrap_or_default(),
            address,
            siret,
            vat_number,
            country: self.country,
        }
    }
}

fn parse_decimal(value: Option<&str>, element: &str) -> Result<Option<Decimal>, FacturxError> {
    value
        .map(|v| {
            Decimal::from_str(v.trim())
                .map_err(|_| FacturxError::Xml(format!("invalid decimal '{v}' in {element}")))
        })
        .transpose()
}

/// CII format 102 (`YYYYMMDD`); ISO dates are accepted too.
fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>, FacturxError> {
    value
        .map(|v| {
            let v = v.trim();
            NaiveDate::parse_from_str(v, "%Y%m%d")
                .ok()
                .or_else(|| parse_iso_date(v))
                .ok_or_else(|| FacturxError::Xml(format!("invalid date '{v}'")))
        })
        .transpose()
}
