//! Format and checksum checks for French and EU business identifiers.

/// Validate the Luhn checksum of a 14-digit SIRET.
///
/// Digits at even (0-based) positions are doubled, reduced by 9 when above 9,
/// and the total must be divisible by 10. Anything that is not exactly
/// 14 ASCII digits fails.
///
/// ```
/// use facturx::core::validate_siret_checksum;
///
/// assert!(validate_siret_checksum("73282932000074"));
/// assert!(!validate_siret_checksum("73282932000075"));
/// ```
pub fn validate_siret_checksum(siret: &str) -> bool {
    if !is_siret_shaped(siret) {
        return false;
    }

    let sum: u32 = siret
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let digit = u32::from(b - b'0');
            if i % 2 == 0 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                digit
            }
        })
        .sum();

    sum % 10 == 0
}

/// Exactly 14 ASCII digits.
pub fn is_siret_shaped(value: &str) -> bool {
    value.len() == 14 && value.bytes().all(|b| b.is_ascii_digit())
}

/// Tax identifier accepted in the SIRET slot: 14 digits, or a 2-letter
/// prefix followed by 9–13 uppercase alphanumerics (VAT-shaped).
pub fn is_tax_identifier(value: &str) -> bool {
    if is_siret_shaped(value) {
        return true;
    }
    let bytes = value.as_bytes();
    bytes.len() >= 11
        && bytes.len() <= 15
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..]
            .iter()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
}

/// Generic EU VAT number shape: 2 letters and 2–12 alphanumerics.
/// Whitespace is ignored and letters are compared case-insensitively.
pub fn is_eu_vat_format(value: &str) -> bool {
    let cleaned = clean_vat(value);
    let bytes = cleaned.as_bytes();
    (4..=14).contains(&bytes.len())
        && bytes[..2].iter().all(u8::is_ascii_alphabetic)
        && bytes[2..].iter().all(u8::is_ascii_alphanumeric)
}

/// Check the numeric key of a French VAT number (`FR` + 2-char key + SIREN).
///
/// Returns `None` when the check does not apply: not a French number, not
/// `FR` + 2 chars + 9 digits, or an alphanumeric key (which cannot be
/// verified offline). Otherwise returns whether
/// `key == (12 + 3 * (SIREN mod 97)) mod 97`.
pub fn check_french_vat_key(value: &str) -> Option<bool> {
    let cleaned = clean_vat(value);
    let rest = cleaned.strip_prefix("FR")?;
    if rest.len() != 11 || !rest.is_ascii() {
        return None;
    }
    let (key, siren) = rest.split_at(2);
    if !siren.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let siren: u64 = siren.parse().ok()?;
    let key: u64 = key.parse().ok()?;
    Some(key == (12 + 3 * (siren % 97)) % 97)
}

fn clean_vat(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}
