//! Semicolon-separated CSV renderers.
//!
//! One header row, then one row per invoice or per line. Amounts use a dot
//! and two decimals. Fields containing a separator, a quote or a line break
//! are quoted, with inner quotes doubled.

use rust_decimal::{Decimal, RoundingStrategy};

use super::{AccountingExport, ExportInvoice};
use crate::core::FacturxError;

const SEPARATOR: char = ';';

/// One row per invoice with parties, totals and status.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvoiceCsv;

/// One row per invoice line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineItemCsv;

impl AccountingExport for InvoiceCsv {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn file_extension(&self) -> &'static str {
        "csv"
    }

    fn render(&self, invoices: &[ExportInvoice]) -> Result<String, FacturxError> {
        let mut out = String::new();
        write_row(
            &mut out,
            &[
                "Numero Facture",
                "Date Facture",
                "Date Echeance",
                "Vendeur",
                "SIRET Vendeur",
                "Acheteur",
                "SIRET Acheteur",
                "Total HT",
                "TVA",
                "Total TTC",
                "Devise",
                "Statut",
            ],
        );

        for (i, invoice) in invoices.iter().enumerate() {
            let number = require_number(invoice, i)?;
            let record = &invoice.record;
            write_row(
                &mut out,
                &[
                    number,
                    &date(record.invoice_date),
                    &date(record.due_date),
                    &record.seller.name,
                    record.seller.siret().unwrap_or(""),
                    &record.buyer.name,
                    record.buyer.siret().unwrap_or(""),
                    &amount(record.total_ht.unwrap_or(Decimal::ZERO)),
                    &amount(record.tax_total()),
                    &amount(record.total_ttc.unwrap_or(Decimal::ZERO)),
                    record.currency_code(),
                    invoice.status.as_str(),
                ],
            );
        }
        Ok(out)
    }
}

impl AccountingExport for LineItemCsv {
    fn name(&self) -> &'static str {
        "csv-items"
    }

    fn file_extension(&self) -> &'static str {
        "csv"
    }

    fn render(&self, invoices: &[ExportInvoice]) -> Result<String, FacturxError> {
        let mut out = String::new();
        write_row(
            &mut out,
            &[
                "Numero Facture",
                "Ligne",
                "Designation",
                "Quantite",
                "Prix Unitaire HT",
                "Taux TVA",
                "Montant HT",
            ],
        );

        for (i, invoice) in invoices.iter().enumerate() {
            let number = require_number(invoice, i)?;
            for (line, item) in invoice.record.items.iter().enumerate() {
                write_row(
                    &mut out,
                    &[
                        number,
                        &(line + 1).to_string(),
                        &item.designation,
                        &item.quantity.normalize().to_string(),
                        &amount(item.unit_price),
                        &format!("{}%", item.vat_rate.normalize()),
                        &amount(item.net_amount()),
                    ],
                );
            }
        }
        Ok(out)
    }
}

fn require_number(invoice: &ExportInvoice, index: usize) -> Result<&str, FacturxError> {
    match invoice.number() {
        "" => Err(FacturxError::Export(format!(
            "invoice at position {index} has no invoice number"
        ))),
        number => Ok(number),
    }
}

fn write_row(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        write_field(out, field);
    }
    out.push_str("\r\n");
}

fn write_field(out: &mut String, value: &str) {
    if !value.contains([SEPARATOR, '"', '\n', '\r']) {
        out.push_str(value);
        return;
    }
    out.push('"');
    for ch in value.chars() {
        if ch == '"' {
            out.push_str("\"\"");
        } else {
            out.push(ch);
        }
    }
    out.push('"');
}

fn amount(d: Decimal) -> String {
    let mut rounded = d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

fn date(d: Option<chrono::NaiveDate>) -> String {
    d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}
