use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::types::*;

/// Builder for constructing invoice records.
///
/// Building never fails: run [`validate_invoice`](crate::core::validate_invoice)
/// to find out what the record is missing for a given profile.
///
/// ```
/// use facturx::core::*;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let record = InvoiceRecordBuilder::new("INV-001")
///     .invoice_date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
///     .seller(PartyBuilder::new("ACME").siret("73282932000074").build())
///     .buyer(PartyBuilder::new("Client SARL").build())
///     .add_item(LineItemBuilder::new("Service", dec!(1), dec!(1000)).build())
///     .totals(dec!(1000), dec!(200), dec!(1200))
///     .build();
///
/// assert_eq!(record.line_net_total(), dec!(1000));
/// ```
pub struct InvoiceRecordBuilder {
    record: InvoiceRecord,
}

impl InvoiceRecordBuilder {
    pub fn new(invoice_number: impl Into<String>) -> Self {
        Self {
            record: InvoiceRecord {
                invoice_number: invoice_number.into(),
                currency: DEFAULT_CURRENCY.to_string(),
                ..InvoiceRecord::default()
            },
        }
    }

    pub fn invoice_date(mut self, date: NaiveDate) -> Self {
        self.record.invoice_date = Some(date);
        self
    }

    pub fn due_date(mut self, date: NaiveDate) -> Self {
        self.record.due_date = Some(date);
        self
    }

    pub fn currency(mut self, code: impl Into<String>) -> Self {
        self.record.currency = code.into();
        self
    }

    pub fn seller(mut self, party: Party) -> Self {
        self.record.seller = party;
        self
    }

    pub fn buyer(mut self, party: Party) -> Self {
        self.record.buyer = party;
        self
    }

    pub fn add_item(mut self, item: LineItem) -> Self {
        self.record.items.push(item);
        self
    }

    pub fn total_ht(mut self, amount: Decimal) -> Self {
        self.record.total_ht = Some(amount);
        self
    }

    pub fn total_tva(mut self, amount: Decimal) -> Self {
        self.record.total_tva = Some(amount);
        self
    }

    pub fn total_ttc(mut self, amount: Decimal) -> Self {
        self.record.total_ttc = Some(amount);
        self
    }

    /// Set net, VAT and gross totals at once.
    pub fn totals(self, ht: Decimal, tva: Decimal, ttc: Decimal) -> Self {
        self.total_ht(ht).total_tva(tva).total_ttc(ttc)
    }

    pub fn payment_terms(mut self, terms: impl Into<String>) -> Self {
        self.record.payment_terms = Some(terms.into());
        self
    }

    pub fn build(self) -> InvoiceRecord {
        self.record
    }
}

/// Builder for Party (seller/buyer).
pub struct PartyBuilder {
    party: Party,
}

impl PartyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            party: Party {
                name: name.into(),
                ..Party::default()
            },
        }
    }

    /// Free-text postal address, e.g. `"12 Rue de la Paix, 75002 Paris, France"`.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.party.address = Some(address.into());
        self
    }

    pub fn siret(mut self, siret: impl Into<String>) -> Self {
        self.party.siret = Some(siret.into());
        self
    }

    pub fn vat_number(mut self, vat: impl Into<String>) -> Self {
        self.party.vat_number = Some(vat.into());
        self
    }

    pub fn country(mut self, code: impl Into<String>) -> Self {
        self.party.country = Some(code.into());
        self
    }

    pub fn build(self) -> Party {
        self.party
    }
}

/// Builder for LineItem. The VAT rate defaults to 20%.
pub struct LineItemBuilder {
    item: LineItem,
}

impl LineItemBuilder {
    pub fn new(designation: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            item: LineItem {
                designation: designation.into(),
                quantity,
                unit_price,
                ..LineItem::default()
            },
        }
    }

    pub fn vat_rate(mut self, rate: Decimal) -> Self {
        self.item.vat_rate = rate;
        self
    }

    pub fn discount(mut self, amount: Decimal) -> Self {
        self.item.discount = amount;
        self
    }

    pub fn montant_ht(mut self, amount: Decimal) -> Self {
        self.item.montant_ht = Some(amount);
        self
    }

    pub fn montant_ttc(mut self, amount: Decimal) -> Self {
        self.item.montant_ttc = Some(amount);
        self
    }

    pub fn build(self) -> LineItem {
        self.item
    }
}
