use chrono::{Datelike, NaiveDate};

use super::error::FacturaError;

/// Gapless invoice number sequence generator.
///
/// Generates invoice numbers in the format `{prefix}{year}-{sequential}`,
/// e.g. "F2024-0001", "F2024-0002", etc.
///
/// RD 1619/2012 art. 6.1.a requires correlative numbering within each
/// series; rectifying invoices live in their own series (conventionally "R").
#[derive(Debug, Clone)]
pub struct InvoiceSeries {
    prefix: String,
    year: i32,
    next_number: u64,
    zero_pad: usize,
}

impl InvoiceSeries {
    /// Create a new sequence starting at 1.
    pub fn new(prefix: impl Into<String>, year: i32) -> Self {
        Self {
            prefix: prefix.into(),
            year,
            next_number: 1,
            zero_pad: 4,
        }
    }

    /// Create a sequence continuing from a given number.
    pub fn starting_at(prefix: impl Into<String>, year: i32, next_number: u64) -> Self {
        Self {
            next_number,
            ..Self::new(prefix, year)
        }
    }

    /// Continue after the highest number already issued in this prefix/year.
    ///
    /// Numbers from other prefixes or years, and numbers that do not follow
    /// the `{prefix}{year}-{n}` pattern, are ignored.
    pub fn resume<'a>(
        prefix: impl Into<String>,
        year: i32,
        existing: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let prefix = prefix.into();
        let head = format!("{prefix}{year}-");
        let last = existing
            .into_iter()
            .filter_map(|n| n.strip_prefix(head.as_str()))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Self::starting_at(prefix, year, last + 1)
    }

    /// Set zero-padding width (default: 4, so "0001").
    pub fn with_padding(mut self, width: usize) -> Self {
        self.zero_pad = width;
        self
    }

    /// Generate the next invoice number.
    pub fn next_number(&mut self) -> String {
        let number = self.peek();
        self.next_number += 1;
        number
    }

    /// Preview the next number without consuming it.
    pub fn peek(&self) -> String {
        format!(
            "{}{}-{:0>width$}",
            self.prefix,
            self.year,
            self.next_number,
            width = self.zero_pad
        )
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Get the current year of the sequence.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Get the next number that will be issued (without prefix/formatting).
    pub fn next_raw(&self) -> u64 {
        self.next_number
    }

    /// Advance to a new year, resetting the counter to 1.
    pub fn advance_year(&mut self, new_year: i32) -> Result<(), FacturaError> {
        if new_year <= self.year {
            return Err(FacturaError::Numbering(format!(
                "new year {new_year} must be greater than current year {}",
                self.year
            )));
        }
        self.year = new_year;
        self.next_number = 1;
        Ok(())
    }

    /// Auto-advance year if the given date is in a new year.
    /// Returns true if the year was advanced.
    pub fn auto_advance(&mut self, date: NaiveDate) -> bool {
        let date_year = date.year();
        if date_year > self.year {
            self.year = date_year;
            self.next_number = 1;
            true
        } else {
            false
        }
    }
}
