//! Spanish tax identifier (NIF) format and check-character validation.

use std::fmt;

const DNI_LETTERS: &[u8; 23] = b"TRWAGMYFPDXBNJZSQVHLCKE";
const CIF_CONTROL_LETTERS: &[u8; 10] = b"JABCDEFGHI";

/// Which family of NIF a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NifKind {
    /// Spanish national (8 digits + letter).
    Dni,
    /// Foreign resident (X/Y/Z + 7 digits + letter).
    Nie,
    /// Legal entity (letter + 7 digits + control character).
    Cif,
}

/// Error returned when a NIF fails validation.
#[derive(Debug, Clone)]
pub struct NifError {
    /// The invalid input value.
    pub value: String,
    /// Why the value failed validation.
    pub reason: String,
}

impl fmt::Display for NifError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid NIF '{}': {}", self.value, self.reason)
    }
}

impl std::error::Error for NifError {}

/// Strip whitespace, hyphens and an "ES" VAT prefix; uppercase the rest.
pub fn normalize_nif(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.')
        .collect::<String>()
        .to_uppercase();
    match cleaned.strip_prefix("ES") {
        Some(rest) if rest.len() == 9 => rest.to_string(),
        _ => cleaned,
    }
}

/// Validate a Spanish NIF (DNI, NIE or CIF), including its check character.
pub fn validate_nif(value: &str) -> Result<NifKind, NifError> {
    let nif = normalize_nif(value);
    let err = |reason: &str| NifError {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if nif.len() != 9 || !nif.is_ascii() {
        return Err(err("must be 9 characters"));
    }
    let bytes = nif.as_bytes();
    let first = bytes[0];
    let last = bytes[8];

    match first {
        b'0'..=b'9' => {
            let number: u32 = nif[..8]
                .parse()
                .map_err(|_| err("DNI must start with 8 digits"))?;
            if DNI_LETTERS[(number % 23) as usize] != last {
                return Err(err("DNI check letter does not match"));
            }
            Ok(NifKind::Dni)
        }
        b'X' | b'Y' | b'Z' => {
            let prefix = match first {
                b'X' => '0',
                b'Y' => '1',
                _ => '2',
            };
            let number: u32 = format!("{prefix}{}", &nif[1..8])
                .parse()
                .map_err(|_| err("NIE must have 7 digits after the prefix letter"))?;
            if DNI_LETTERS[(number % 23) as usize] != last {
                return Err(err("NIE check letter does not match"));
            }
            Ok(NifKind::Nie)
        }
        b'A'..=b'H' | b'J' | b'N' | b'P' | b'Q' | b'R' | b'S' | b'U' | b'V' | b'W' => {
            let digits = &nif[1..8];
            if !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err("CIF must have 7 digits after the entity letter"));
            }
            let control = cif_control_digit(digits);
            let as_digit = b'0' + control;
            let as_letter = CIF_CONTROL_LETTERS[control as usize];
            let ok = match first {
                // Entities whose control character is always a letter.
                b'N' | b'P' | b'Q' | b'R' | b'S' | b'W' => last == as_letter,
                // Always a digit.
                b'A' | b'B' | b'E' | b'H' => last == as_digit,
                _ => last == as_digit || last == as_letter,
            };
            if !ok {
                return Err(err("CIF control character does not match"));
            }
            Ok(NifKind::Cif)
        }
        _ => Err(err("unknown NIF prefix")),
    }
}

/// True if `value` is a valid Spanish NIF.
pub fn is_valid_nif(value: &str) -> bool {
    validate_nif(value).is_ok()
}

fn cif_control_digit(digits: &str) -> u8 {
    let mut sum = 0u32;
    for (i, b) in digits.bytes().enumerate() {
        let d = u32::from(b - b'0');
        if i % 2 == 1 {
            sum += d;
        } else {
            let doubled = d * 2;
            sum += doubled / 10 + doubled % 10;
        }
    }
    ((10 - sum % 10) % 10) as u8
}

/// DNI check letter for an 8-digit number.
pub fn dni_letter(number: u32) -> char {
    DNI_LETTERS[(number % 23) as usize] as char
}
