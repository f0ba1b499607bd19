//! Best-effort decomposition of free-text postal addresses.
//!
//! Tuned for French addresses of the form `street, postcode city, country`.
//! Other layouts degrade to partially empty fields; callers must not rely on
//! the result for non-French formats.

use serde::{Deserialize, Serialize};

/// Country assumed when the address does not name one.
pub const DEFAULT_COUNTRY: &str = "FR";

/// Structured postal address as written into the CII `PostalTradeAddress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    pub line_one: String,
    pub postcode: String,
    pub city: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
}

impl Default for PostalAddress {
    fn default() -> Self {
        Self {
            line_one: String::new(),
            postcode: String::new(),
            city: String::new(),
            country: DEFAULT_COUNTRY.to_string(),
        }
    }
}

/// Split a free-text address into line, postcode, city and country.
///
/// Never fails: absent or empty input yields empty fields and country `FR`.
///
/// ```
/// use facturx::core::parse_address;
///
/// let addr = parse_address(Some("12 Rue de la Paix, 75002 Paris, France"));
/// assert_eq!(addr.line_one, "12 Rue de la Paix");
/// assert_eq!(addr.postcode, "75002");
/// assert_eq!(addr.city, "Paris");
/// assert_eq!(addr.country, "FR");
/// ```
pub fn parse_address(address: Option<&str>) -> PostalAddress {
    let Some(address) = address.filter(|a| !a.trim().is_empty()) else {
        return PostalAddress::default();
    };

    let parts: Vec<&str> = address.split(',').map(str::trim).collect();
    let mut parsed = PostalAddress {
        line_one: parts[0].to_string(),
        ..PostalAddress::default()
    };

    if let Some((postcode, city)) = parts.get(1).and_then(|p| split_postcode_city(p)) {
        parsed.postcode = postcode.to_string();
        parsed.city = city.to_string();
    }

    if parts.len() >= 3 {
        if let Some(code) = parts.last().and_then(|p| country_code(p)) {
            parsed.country = code;
        }
    }

    parsed
}

/// Find a 5-digit postcode followed by whitespace and a city name.
fn split_postcode_city(segment: &str) -> Option<(&str, &str)> {
    let bytes = segment.as_bytes();
    // First 5-digit run followed by whitespace, wherever it starts.
    (0..bytes.len().saturating_sub(5)).find_map(|start| {
        let candidate = bytes.get(start..start + 5)?;
        if !candidate.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let rest = &segment[start + 5..];
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let city = rest.trim();
        (!city.is_empty()).then(|| (&segment[start..start + 5], city))
    })
}

fn country_code(segment: &str) -> Option<String> {
    let upper = segment.to_uppercase();
    match upper.as_str() {
        "FRANCE" => Some("FR".to_string()),
        "GERMANY" | "DEUTSCHLAND" => Some("DE".to_string()),
        _ if upper.chars().count() == 2 => Some(upper),
        _ => None,
    }
}
