use chrono::NaiveDate;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use rust_decimal::{Decimal, RoundingStrategy};
use std::io::Cursor;

use super::cii_ns;
use crate::core::FacturxError;

pub type XmlResult = Result<String, FacturxError>;

fn xml_io(e: std::io::Error) -> FacturxError {
    FacturxError::Xml(format!("write error: {e}"))
}

/// Root element of every generated document.
pub const CII_ROOT: &str = "rsm:CrossIndustryInvoice";

/// Indented CII document writer.
///
/// Open elements are tracked, so closing the wrong element is an error
/// rather than malformed output, and [`finish`](Self::finish) closes
/// whatever is still open.
pub struct XmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
    open: Vec<String>,
}

impl XmlWriter {
    /// Start a document: XML declaration, then the CII root element declaring
    /// the `rsm`, `ram` and `udt` namespaces.
    pub fn cii() -> Result<Self, FacturxError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_io)?;
        let mut w = Self {
            writer,
            open: Vec::new(),
        };
        w.start_element_with_attrs(
            CII_ROOT,
            &[
                ("xmlns:rsm", cii_ns::RSM),
                ("xmlns:ram", cii_ns::RAM),
                ("xmlns:udt", cii_ns::UDT),
            ],
        )?;
        Ok(w)
    }

    /// Close every open element (the root included) and return the document.
    pub fn finish(mut self) -> Result<String, FacturxError> {
        while let Some(name) = self.open.pop() {
            self.write(Event::End(BytesEnd::new(name)))?;
        }
        let buf = self.writer.into_inner().into_inner();
        String::from_utf8(buf).map_err(|e| FacturxError::Xml(format!("UTF-8 error: {e}")))
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), FacturxError> {
        self.writer.write_event(event).map_err(xml_io)
    }

    pub fn start_element(&mut self, name: &str) -> Result<&mut Self, FacturxError> {
        self.start_element_with_attrs(name, &[])
    }

    pub fn start_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, FacturxError> {
        let elem = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.write(Event::Start(elem))?;
        self.open.push(name.to_string());
        Ok(self)
    }

    pub fn end_element(&mut self, name: &str) -> Result<&mut Self, FacturxError> {
        match self.open.pop() {
            Some(open) if open == name => {}
            open => {
                return Err(FacturxError::Xml(format!(
                    "closing <{name}> while <{}> is open",
                    open.as_deref().unwrap_or("nothing")
                )));
            }
        }
        self.write(Event::End(BytesEnd::new(name)))?;
        Ok(self)
    }

    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self, FacturxError> {
        self.text_element_with_attrs(name, text, &[])
    }

    /// Write the element only when `text` is non-empty.
    pub fn optional_text_element(
        &mut self,
        name: &str,
        text: &str,
    ) -> Result<&mut Self, FacturxError> {
        if text.is_empty() {
            return Ok(self);
        }
        self.text_element(name, text)
    }

    pub fn text_element_with_attrs(
        &mut self,
        name: &str,
        text: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, FacturxError> {
        self.start_element_with_attrs(name, attrs)?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end_element(name)
    }

    /// Monetary amount, see [`format_amount`].
    pub fn amount_element(&mut self, name: &str, amount: Decimal) -> Result<&mut Self, FacturxError> {
        self.text_element(name, &format_amount(amount))
    }

    /// Write a `udt:DateTimeString` (format 102) wrapped in `element`.
    pub fn date_element(&mut self, element: &str, date: NaiveDate) -> Result<&mut Self, FacturxError> {
        self.start_element(element)?;
        self.text_element_with_attrs(
            "udt:DateTimeString",
            &date.format("%Y%m%d").to_string(),
            &[("format", "102")],
        )?;
        self.end_element(element)
    }
}

/// Format a monetary amount with exactly 2 decimal places, rounding half away from zero.
pub fn format_amount(d: Decimal) -> String {
    let mut rounded = d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

/// Format a quantity or percentage: trailing zeros dropped, but never fewer
/// than 2 decimal places.
pub fn format_decimal(d: Decimal) -> String {
    let mut d = d.normalize();
    if d.scale() < 2 {
        d.rescale(2);
    }
    d.to_string()
}

/// Local part of a possibly prefixed element name (`ram:ID` -> `ID`).
pub fn local_name(qualified: &[u8]) -> &[u8] {
    match qualified.iter().position(|b| *b == b':') {
        Some(i) => &qualified[i + 1..],
        None => qualified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn format_amount_cases() {
        assert_eq!(format_amount(dec!(1200)), "1200.00");
        assert_eq!(format_amount(dec!(49.9)), "49.90");
        assert_eq!(format_amount(dec!(0.005)), "0.01");
        assert_eq!(format_amount(dec!(2.345)), "2.35");
        assert_eq!(format_amount(dec!(-2.345)), "-2.35");
        assert_eq!(format_amount(dec!(1833.484)), "1833.48");
        assert_eq!(format_amount(Decimal::ZERO), "0.00");
    }

    #[test]
    fn format_decimal_cases() {
        assert_eq!(format_decimal(dec!(1)), "1.00");
        assert_eq!(format_decimal(dec!(20)), "20.00");
        assert_eq!(format_decimal(dec!(5.5)), "5.50");
        assert_eq!(format_decimal(dec!(2.500)), "2.50");
        assert_eq!(format_decimal(dec!(0.125)), "0.125");
    }

    #[test]
    fn local_names() {
        assert_eq!(local_name(b"ram:ID"), b"ID");
        assert_eq!(local_name(b"ID"), b"ID");
    }

    #[test]
    fn writer_escapes_text() {
        let mut w = XmlWriter::cii().unwrap();
        w.text_element("ram:Name", "Dupont & Fils <SARL>").unwrap();
        w.optional_text_element("ram:Empty", "").unwrap();
        let xml = w.finish().unwrap();
        assert!(xml.contains("<ram:Name>Dupont &amp; Fils &lt;SARL&gt;</ram:Name>"));
        assert!(!xml.contains("Empty"));
    }

    #[test]
    fn root_declares_cii_namespaces_and_is_closed_on_finish() {
        let mut w = XmlWriter::cii().unwrap();
        w.start_element("rsm:ExchangedDocument").unwrap();
        w.amount_element("ram:Amount", dec!(12.5)).unwrap();
        let xml = w.finish().unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(&format!("xmlns:rsm=\"{}\"", cii_ns::RSM)));
        assert!(xml.contains(&format!("xmlns:ram=\"{}\"", cii_ns::RAM)));
        assert!(xml.contains(&format!("xmlns:udt=\"{}\"", cii_ns::UDT)));
        assert!(xml.contains("<ram:Amount>12.50</ram:Amount>"));
        assert!(xml.trim_end().ends_with("</rsm:ExchangedDocument>\n</rsm:CrossIndustryInvoice>"));
    }

    #[test]
    fn mismatched_close_is_an_error() {
        let mut w = XmlWriter::cii().unwrap();
        w.start_element("ram:A").unwrap();
        let err = w.end_element("ram:B").err().unwrap();
        assert!(matches!(err, FacturxError::Xml(_)));
        assert!(err.to_string().contains("<ram:A>"));
    }
}
