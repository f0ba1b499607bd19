use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::xml_utils::{XmlResult, XmlWriter, format_amount, format_decimal};
use super::{COMMERCIAL_INVOICE, UNIT_PIECE};
use crate::core::*;

/// How the header-level `ApplicableTradeTax` breakdown is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VatBreakdownMode {
    /// One block per distinct line VAT rate: category `S` for positive
    /// rates, `Z` for 0%.
    #[default]
    PerRate,
    /// A single block with basis = net total and a fixed 20% standard rate,
    /// whatever the line rates are. Kept for byte compatibility with
    /// documents produced by earlier releases.
    LegacyFlat,
}

/// Generation options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CiiOptions {
    pub vat_breakdown: VatBreakdownMode,
}

/// Generate Factur-X CII XML for the given profile with default options.
///
/// Never fails on incomplete data: missing optional values omit their
/// elements, so run [`validate_invoice`] first to know what is missing.
pub fn to_cii_xml(record: &InvoiceRecord, profile: Profile) -> XmlResult {
    to_cii_xml_with(record, profile, &CiiOptions::default())
}

/// Generate Factur-X CII XML.
///
/// Output is deterministic: the only date written is the invoice's own.
pub fn to_cii_xml_with(record: &InvoiceRecord, profile: Profile, options: &CiiOptions) -> XmlResult {
    let currency = record.currency_code();
    let mut w = XmlWriter::cii()?;

    // --- ExchangedDocumentContext ---
    w.start_element("rsm:ExchangedDocumentContext")?;
    w.start_element("ram:GuidelineSpecifiedDocumentContextParameter")?;
    w.text_element("ram:ID", profile.urn())?;
    w.end_element("ram:GuidelineSpecifiedDocumentContextParameter")?;
    w.end_element("rsm:ExchangedDocumentContext")?;

    // --- ExchangedDocument ---
    let number = record.invoice_number.trim();
    w.start_element("rsm:ExchangedDocument")?;
    w.text_element("ram:ID", if number.is_empty() { "UNKNOWN" } else { number })?;
    w.text_element("ram:TypeCode", COMMERCIAL_INVOICE)?;
    if let Some(date) = record.invoice_date {
        w.date_element("ram:IssueDateTime", date)?;
    }
    w.end_element("rsm:ExchangedDocument")?;

    // --- SupplyChainTradeTransaction ---
    w.start_element("rsm:SupplyChainTradeTransaction")?;

    for (i, item) in record.items.iter().enumerate() {
        write_line(&mut w, item, i + 1)?;
    }

    w.start_element("ram:ApplicableHeaderTradeAgreement")?;
    write_party(&mut w, &record.seller, "ram:SellerTradeParty")?;
    write_party(&mut w, &record.buyer, "ram:BuyerTradeParty")?;
    w.end_element("ram:ApplicableHeaderTradeAgreement")?;

    w.start_element("ram:ApplicableHeaderTradeDelivery")?;
    if let Some(date) = record.invoice_date {
        w.start_element("ram:ActualDeliverySupplyChainEvent")?;
        w.date_element("ram:OccurrenceDateTime", date)?;
        w.end_element("ram:ActualDeliverySupplyChainEvent")?;
    }
    w.end_element("ram:ApplicableHeaderTradeDelivery")?;

    // --- ApplicableHeaderTradeSettlement ---
    let net_total = record.total_ht.unwrap_or_else(|| record.line_net_total());
    let stated_tax = record.total_tva.or_else(|| {
        record
            .total_ttc
            .map(|gross| gross.saturating_sub(net_total))
    });
    let blocks = vat_breakdown(record, options.vat_breakdown, net_total, stated_tax);
    // Header totals are the block sums so the breakdown always adds up.
    let basis_total = blocks
        .iter()
        .fold(Decimal::ZERO, |sum, block| sum.saturating_add(block.basis));
    let tax_total = blocks
        .iter()
        .fold(Decimal::ZERO, |sum, block| sum.saturating_add(block.tax_amount));
    let gross_total = record
        .total_ttc
        .unwrap_or_else(|| basis_total.saturating_add(tax_total));

    w.start_element("ram:ApplicableHeaderTradeSettlement")?;
    w.text_element("ram:InvoiceCurrencyCode", currency)?;

    for block in &blocks {
        w.start_element("ram:ApplicableTradeTax")?;
        w.amount_element("ram:CalculatedAmount", block.tax_amount)?;
        w.text_element("ram:TypeCode", "VAT")?;
        w.amount_element("ram:BasisAmount", block.basis)?;
        w.text_element("ram:CategoryCode", block.category)?;
        w.text_element("ram:RateApplicablePercent", &format_decimal(block.rate))?;
        w.end_element("ram:ApplicableTradeTax")?;
    }

    let terms = record.payment_terms.as_deref().map(str::trim).unwrap_or("");
    let due = record.due_date.or(record.invoice_date);
    if !terms.is_empty() || due.is_some() {
        w.start_element("ram:SpecifiedTradePaymentTerms")?;
        w.optional_text_element("ram:Description", terms)?;
        if let Some(due) = due {
            w.date_element("ram:DueDateDateTime", due)?;
        }
        w.end_element("ram:SpecifiedTradePaymentTerms")?;
    }

    w.start_element("ram:SpecifiedTradeSettlementHeaderMonetarySummation")?;
    w.amount_element("ram:LineTotalAmount", net_total)?;
    w.amount_element("ram:TaxBasisTotalAmount", basis_total)?;
    w.text_element_with_attrs(
        "ram:TaxTotalAmount",
        &format_amount(tax_total),
        &[("currencyID", currency)],
    )?;
    w.amount_element("ram:GrandTotalAmount", gross_total)?;
    w.amount_element("ram:DuePayableAmount", gross_total)?;
    w.end_element("ram:SpecifiedTradeSettlementHeaderMonetarySummation")?;

    w.end_element("ram:ApplicableHeaderTradeSettlement")?;
    w.end_element("rsm:SupplyChainTradeTransaction")?;

    let xml = w.finish()?;
    tracing::debug!(
        invoice = %record.invoice_number,
        %profile,
        lines = record.items.len(),
        bytes = xml.len(),
        "generated CII document"
    );
    Ok(xml)
}

fn write_party(w: &mut XmlWriter, party: &Party, element: &str) -> Result<(), FacturxError> {
    // TradeParty element order: Name, SpecifiedLegalOrganization,
    // PostalTradeAddress, SpecifiedTaxRegistration.
    let address = parse_address(party.address());
    let vat_number = party.vat_number();
    let siret = party.siret();

    w.start_element(element)?;
    w.text_element("ram:Name", party.name.trim())?;

    // The VA registration takes the VAT number when there is one. The SIRET
    // then moves to the legal organization under scheme 0002, so both
    // identifiers survive. Without a VAT number the SIRET stays under VA.
    if let (Some(siret), Some(_)) = (siret, vat_number) {
        w.start_element("ram:SpecifiedLegalOrganization")?;
        w.text_element_with_attrs("ram:ID", siret, &[("schemeID", "0002")])?;
        w.end_element("ram:SpecifiedLegalOrganization")?;
    }

    w.start_element("ram:PostalTradeAddress")?;
    w.optional_text_element("ram:PostcodeCode", &address.postcode)?;
    w.optional_text_element("ram:LineOne", &address.line_one)?;
    w.optional_text_element("ram:CityName", &address.city)?;
    w.text_element("ram:CountryID", party.country().unwrap_or(&address.country))?;
    w.end_element("ram:PostalTradeAddress")?;

    if let Some(tax_id) = vat_number.or(siret) {
        w.start_element("ram:SpecifiedTaxRegistration")?;
        w.text_element_with_attrs("ram:ID", tax_id, &[("schemeID", "VA")])?;
        w.end_element("ram:SpecifiedTaxRegistration")?;
    }

    w.end_element(element)?;
    Ok(())
}

fn write_line(w: &mut XmlWriter, item: &LineItem, line_id: usize) -> Result<(), FacturxError> {
    let designation = item.designation.trim();

    w.start_element("ram:IncludedSupplyChainTradeLineItem")?;

    w.start_element("ram:AssociatedDocumentLineDocument")?;
    w.text_element("ram:LineID", &line_id.to_string())?;
    w.end_element("ram:AssociatedDocumentLineDocument")?;

    w.start_element("ram:SpecifiedTradeProduct")?;
    w.text_element("ram:Name", if designation.is_empty() { "Item" } else { designation })?;
    w.end_element("ram:SpecifiedTradeProduct")?;

    w.start_element("ram:SpecifiedLineTradeAgreement")?;
    w.start_element("ram:NetPriceProductTradePrice")?;
    w.amount_element("ram:ChargeAmount", item.unit_price)?;
    w.end_element("ram:NetPriceProductTradePrice")?;
    w.end_element("ram:SpecifiedLineTradeAgreement")?;

    w.start_element("ram:SpecifiedLineTradeDelivery")?;
    w.text_element_with_attrs(
        "ram:BilledQuantity",
        &format_decimal(item.quantity),
        &[("unitCode", UNIT_PIECE)],
    )?;
    w.end_element("ram:SpecifiedLineTradeDelivery")?;

    w.start_element("ram:SpecifiedLineTradeSettlement")?;
    w.start_element("ram:ApplicableTradeTax")?;
    w.text_element("ram:TypeCode", "VAT")?;
    w.text_element("ram:CategoryCode", category_code(item.vat_rate))?;
    w.text_element("ram:RateApplicablePercent", &format_decimal(item.vat_rate))?;
    w.end_element("ram:ApplicableTradeTax")?;
    w.start_element("ram:SpecifiedTradeSettlementLineMonetarySummation")?;
    w.amount_element("ram:LineTotalAmount", item.net_amount())?;
    w.end_element("ram:SpecifiedTradeSettlementLineMonetarySummation")?;
    w.end_element("ram:SpecifiedLineTradeSettlement")?;

    w.end_element("ram:IncludedSupplyChainTradeLineItem")?;
    Ok(())
}

/// VAT category: `Z` (zero rated) for 0%, `S` (standard) otherwise.
fn category_code(rate: Decimal) -> &'static str {
    if rate.is_zero() { "Z" } else { "S" }
}

#[derive(Debug, PartialEq)]
struct TaxBlock {
    basis: Decimal,
    tax_amount: Decimal,
    category: &'static str,
    rate: Decimal,
}

/// Header VAT breakdown, rounded to cents.
///
/// `PerRate` groups the lines by rate, then scales the per-rate bases to
/// `net_total` and the per-rate taxes to `stated_tax` (the invoice's own VAT
/// total, when it has one). Any rounding residue lands on the largest block,
/// so the blocks always sum to the stated totals.
fn vat_breakdown(
    record: &InvoiceRecord,
    mode: VatBreakdownMode,
    net_total: Decimal,
    stated_tax: Option<Decimal>,
) -> Vec<TaxBlock> {
    if mode == VatBreakdownMode::LegacyFlat || record.items.is_empty() {
        return vec![TaxBlock {
            basis: cents(net_total),
            tax_amount: cents(stated_tax.unwrap_or_else(|| line_tax(record))),
            category: "S",
            rate: DEFAULT_VAT_RATE,
        }];
    }

    // Keyed by normalized rate so 20 and 20.00 group together.
    let mut groups: BTreeMap<Decimal, Decimal> = BTreeMap::new();
    for item in &record.items {
        let basis = groups.entry(item.vat_rate.normalize()).or_default();
        *basis = basis.saturating_add(item.net_amount());
    }

    let (rates, bases): (Vec<Decimal>, Vec<Decimal>) = groups.into_iter().unzip();
    let taxes: Vec<Decimal> = rates
        .iter()
        .zip(&bases)
        .map(|(rate, basis)| basis.saturating_mul(*rate) / Decimal::ONE_HUNDRED)
        .collect();
    let tax_target = stated_tax.unwrap_or_else(|| {
        taxes
            .iter()
            .fold(Decimal::ZERO, |sum, tax| sum.saturating_add(cents(*tax)))
    });

    let bases = scale_to(&bases, net_total);
    let taxes = scale_to(&taxes, tax_target);

    rates
        .into_iter()
        .zip(bases.into_iter().zip(taxes))
        .map(|(rate, (basis, tax_amount))| TaxBlock {
            basis,
            tax_amount,
            category: category_code(rate),
            rate,
        })
        .collect()
}

/// Sum of per-line VAT, each line rounded to cents.
fn line_tax(record: &InvoiceRecord) -> Decimal {
    record
        .items
        .iter()
        .map(|item| cents(item.net_amount().saturating_mul(item.vat_rate) / Decimal::ONE_HUNDRED))
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

/// Round `parts` to cents so that they sum to `target` (itself rounded).
///
/// Parts keep their proportions. When they sum to zero, or when the target is
/// already met, only the rounding residue moves.
fn scale_to(parts: &[Decimal], target: Decimal) -> Vec<Decimal> {
    let target = cents(target);
    let sum = parts
        .iter()
        .fold(Decimal::ZERO, |acc, part| acc.saturating_add(*part));

    let mut scaled: Vec<Decimal> = if sum.is_zero() || cents(sum) == target {
        parts.iter().copied().map(cents).collect()
    } else {
        parts
            .iter()
            .map(|part| {
                let share = target.saturating_mul(*part).checked_div(sum).unwrap_or(*part);
                cents(share)
            })
            .collect()
    };

    let residue = scaled
        .iter()
        .fold(target, |rest, part| rest.saturating_sub(*part));
    if !residue.is_zero() {
        let largest = scaled
            .iter()
            .enumerate()
            .max_by_key(|(_, part)| part.abs())
            .map(|(i, _)| i);
        if let Some(i) = largest {
            scaled[i] = scaled[i].saturating_add(residue);
        }
    }
    scaled
}

fn cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
