use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat};
use sha2::{Digest, Sha256};

use crate::core::FacturaError;

/// Uppercase hex SHA-256 of the canonical record string.
pub fn fingerprint(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode_upper(hasher.finalize())
}

/// Join `key=value` pairs with `&`, trimming every value.
pub(crate) fn canonical_string(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={}", value.trim()))
        .collect::<Vec<_>>()
        .join("&")
}

/// Dates as the AEAT writes them: `dd-mm-yyyy`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, FacturaError> {
    NaiveDate::parse_from_str(s.trim(), "%d-%m-%Y")
        .map_err(|e| FacturaError::Xml(format!("invalid date '{s}': {e}")))
}

/// RFC 3339 with whole seconds and an explicit offset, e.g. `2024-01-01T19:20:30+01:00`.
pub fn format_timestamp(at: &DateTime<FixedOffset>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<FixedOffset>, FacturaError> {
    DateTime::parse_from_rfc3339(s.trim())
        .map_err(|e| FacturaError::Xml(format!("invalid timestamp '{s}': {e}")))
}
