#![cfg(feature = "export")]

use chrono::NaiveDate;
use facturx::core::*;
use facturx::export::*;
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn record() -> InvoiceRecord {
    InvoiceRecordBuilder::new("F-2024-0042")
        .invoice_date(date(2024, 3, 15))
        .due_date(date(2024, 4, 14))
        .seller(
            PartyBuilder::new("Dupont; Fils")
                .siret("73282932000074")
                .build(),
        )
        .buyer(PartyBuilder::new("Le \"Bon\" Client").build())
        .add_item(LineItemBuilder::new("Conseil", dec!(10), dec!(80)).build())
        .add_item(
            LineItemBuilder::new("Livres", dec!(4), dec!(12.5))
                .vat_rate(dec!(5.5))
                .build(),
        )
        .total_ht(dec!(850))
        .total_ttc(dec!(1012.75))
        .build()
}

#[test]
fn invoice_csv_header_and_row() {
    let invoices = [ExportInvoice::new(record(), InvoiceStatus::Validated)];
    let csv = InvoiceCsv.render(&invoices).unwrap();
    let rows: Vec<&str> = csv.split("\r\n").collect();

    assert_eq!(
        rows[0],
        "Numero Facture;Date Facture;Date Echeance;Vendeur;SIRET Vendeur;Acheteur;\
         SIRET Acheteur;Total HT;TVA;Total TTC;Devise;Statut"
    );
    assert_eq!(
        rows[1],
        "F-2024-0042;2024-03-15;2024-04-14;\"Dupont; Fils\";73282932000074;\
         \"Le \"\"Bon\"\" Client\";;850.00;162.75;1012.75;EUR;validated"
    );
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2], "");
}

#[test]
fn line_csv_has_one_row_per_item() {
    let mut second = record();
    second.invoice_number = "F-2024-0043".into();
    second.items.truncate(1);
    let invoices = [
        ExportInvoice::new(record(), InvoiceStatus::Exported),
        ExportInvoice::new(second, InvoiceStatus::Draft),
    ];

    let csv = LineItemCsv.render(&invoices).unwrap();
    let rows: Vec<&str> = csv.lines().collect();
    assert_eq!(rows.len(), 1 + 3);
    assert_eq!(
        rows[0],
        "Numero Facture;Ligne;Designation;Quantite;Prix Unitaire HT;Taux TVA;Montant HT"
    );
    assert_eq!(rows[1], "F-2024-0042;1;Conseil;10;80.00;20%;800.00");
    assert_eq!(rows[2], "F-2024-0042;2;Livres;4;12.50;5.5%;50.00");
    assert_eq!(rows[3], "F-2024-0043;1;Conseil;10;80.00;20%;800.00");
}

#[test]
fn empty_input_renders_header_only() {
    let csv = InvoiceCsv.render(&[]).unwrap();
    assert_eq!(csv.lines().count(), 1);
    assert!(csv.ends_with("Statut\r\n"));
}

#[test]
fn missing_optional_values_render_empty() {
    let record = InvoiceRecordBuilder::new("F-1")
        .seller(PartyBuilder::new("Dupont SARL").build())
        .buyer(PartyBuilder::new("Martin SA").build())
        .total_ttc(dec!(120))
        .build();
    let csv = InvoiceCsv
        .render(&[ExportInvoice::new(record, InvoiceStatus::Draft)])
        .unwrap();
    assert_eq!(
        csv.lines().nth(1).unwrap(),
        "F-1;;;Dupont SARL;;Martin SA;;0.00;0.00;120.00;EUR;draft"
    );
}

#[test]
fn stored_reference_used_when_record_has_no_number() {
    let mut invoice = ExportInvoice::new(record(), InvoiceStatus::Validated);
    invoice.record.invoice_number.clear();
    invoice.invoice_number = "REF-77".into();

    let csv = InvoiceCsv.render(&[invoice]).unwrap();
    assert!(csv.lines().nth(1).unwrap().starts_with("REF-77;"));
}

#[test]
fn invoice_without_any_number_is_rejected() {
    let mut invoice = ExportInvoice::new(record(), InvoiceStatus::Validated);
    invoice.record.invoice_number.clear();
    invoice.invoice_number.clear();

    for format in ["csv", "csv-items"] {
        let err = exporter(format)
            .unwrap()
            .render(std::slice::from_ref(&invoice))
            .unwrap_err();
        assert!(matches!(err, FacturxError::Export(_)), "{format}");
    }
}

#[test]
fn exporters_describe_their_output() {
    for format in ["csv", "csv-items"] {
        let export = exporter(format).unwrap();
        assert_eq!(export.name(), format);
        assert_eq!(export.file_extension(), "csv");
        assert_eq!(export.mime_type(), "text/csv");
    }
    assert!(exporter("sage").is_err());
}

#[test]
fn export_invoice_serializes_in_camel_case() {
    let invoice =
        ExportInvoice::new(record(), InvoiceStatus::Validated).with_profile(Profile::Comfort);
    let value = serde_json::to_value(&invoice).unwrap();
    assert_eq!(value["invoiceNumber"], "F-2024-0042");
    assert_eq!(value["status"], "validated");
    assert_eq!(value["profile"], "comfort");
}
