use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::codec::{read_records, write_record};
use super::record::{ChainLink, RecordKind, RegistrationRecord};
use crate::core::{FacturaError, Invoice};
use crate::xml::XmlWriter;

/// Outcome of [`AuditLog::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub total: usize,
    pub valid: bool,
    /// Index of the first record that fails verification.
    pub broken_at: Option<usize>,
    pub reason: Option<String>,
}

/// Append-only, hash-chained Veri*Factu record log stored as one XML file.
///
/// Every append rewrites the file through a temporary sibling and a rename,
/// so readers see either the old or the new log, never a partial one.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    entries: Vec<RegistrationRecord>,
}

impl AuditLog {
    /// Open the log at `path`; a missing file is an empty log.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FacturaError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(xml) => read_records(&xml)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), records = entries.len(), "audit log opened");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[RegistrationRecord] {
        &self.entries
    }

    pub fn last(&self) -> Option<&RegistrationRecord> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All records for invoice `number` (series included), oldest first.
    pub fn find(&self, number: &str) -> Vec<&RegistrationRecord> {
        self.entries.iter().filter(|r| r.number == number).collect()
    }

    /// True if `number` has an alta that has not been cancelled since.
    pub fn is_registered(&self, number: &str) -> bool {
        self.find(number)
            .last()
            .is_some_and(|r| r.kind == RecordKind::Registration)
    }

    /// Append the alta record for `invoice`.
    pub fn append_registration(
        &mut self,
        invoice: &Invoice,
        at: DateTime<FixedOffset>,
    ) -> Result<&RegistrationRecord, FacturaError> {
        let number = invoice.full_number();
        if self.is_registered(&number) {
            return Err(FacturaError::Conflict(format!(
                "invoice {number} is already registered"
            )));
        }
        let record = RegistrationRecord::registration(invoice, self.last(), at)?;
        self.append(record)
    }

    /// Append the anulación record for `invoice`; it must be registered.
    pub fn append_cancellation(
        &mut self,
        invoice: &Invoice,
        at: DateTime<FixedOffset>,
    ) -> Result<&RegistrationRecord, FacturaError> {
        let number = invoice.full_number();
        if !self.is_registered(&number) {
            return Err(FacturaError::Conflict(format!(
                "invoice {number} has no active registration to cancel"
            )));
        }
        let record = RegistrationRecord::cancellation(invoice, self.last(), at)?;
        self.append(record)
    }

    fn append(&mut self, record: RegistrationRecord) -> Result<&RegistrationRecord, FacturaError> {
        let report = self.verify();
        if !report.valid {
            tracing::warn!(
                path = %self.path.display(),
                broken_at = ?report.broken_at,
                reason = ?report.reason,
                "refusing to extend a broken audit chain"
            );
            return Err(FacturaError::Chain(format!(
                "audit log is broken at record {}: {}",
                report.broken_at.unwrap_or_default(),
                report.reason.unwrap_or_default()
            )));
        }

        self.entries.push(record);
        if let Err(e) = self.persist() {
            self.entries.pop();
            return Err(e);
        }
        let index = self.entries.len() - 1;
        let appended = &self.entries[index];
        tracing::info!(
            index,
            kind = ?appended.kind,
            number = %appended.number,
            fingerprint = %appended.fingerprint,
            "audit record appended"
        );
        Ok(appended)
    }

    /// Recompute every fingerprint and previous-record link.
    pub fn verify(&self) -> ChainReport {
        let broken = |index: usize, reason: String| ChainReport {
            total: self.entries.len(),
            valid: false,
            broken_at: Some(index),
            reason: Some(reason),
        };

        for (index, record) in self.entries.iter().enumerate() {
            let expected_link = index.checked_sub(1).map(|i| ChainLink::to(&self.entries[i]));
            match (&record.previous, &expected_link) {
                (None, None) => {}
                (None, Some(_)) => {
                    return broken(index, "record claims to be first but is not".into());
                }
                (Some(_), None) => {
                    return broken(index, "first record references a previous record".into());
                }
                (Some(actual), Some(expected)) if actual != expected => {
                    return broken(
                        index,
                        format!(
                            "previous link {} / {} does not match record {} / {}",
                            actual.number, actual.fingerprint, expected.number, expected.fingerprint
                        ),
                    );
                }
                _ => {}
            }

            let computed = record.expected_fingerprint();
            if computed != record.fingerprint {
                return broken(
                    index,
                    format!(
                        "fingerprint mismatch: stored {}, computed {computed}",
                        record.fingerprint
                    ),
                );
            }
        }

        ChainReport {
            total: self.entries.len(),
            valid: true,
            broken_at: None,
            reason: None,
        }
    }

    /// The log as XML, exactly as written to disk.
    pub fn to_xml(&self) -> Result<String, FacturaError> {
        let mut w = XmlWriter::new()?;
        w.start_element("RegistrosFacturacion")?;
        for record in &self.entries {
            w.start_element("RegistroFactura")?;
            write_record(&mut w, record, "", None)?;
            w.end_element("RegistroFactura")?;
        }
        w.end_element("RegistrosFacturacion")?;
        w.into_string()
    }

    fn persist(&self) -> Result<(), FacturaError> {
        let xml = self.to_xml()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("xml.tmp");
        fs::write(&tmp, xml.as_bytes())?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
