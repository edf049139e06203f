use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::hash::{canonical_string, fingerprint, format_date, format_timestamp};
use crate::core::{FacturaError, Invoice, InvoiceKind, normalize_nif};
use crate::xml::format_amount;

/// Alta (registration) or anulación (cancellation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Registration,
    Cancellation,
}

/// Identity and fingerprint of the record a new record chains onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub issuer_nif: String,
    pub number: String,
    pub issue_date: NaiveDate,
    pub fingerprint: String,
}

impl ChainLink {
    pub fn to(record: &RegistrationRecord) -> Self {
        Self {
            issuer_nif: record.issuer_nif.clone(),
            number: record.number.clone(),
            issue_date: record.issue_date,
            fingerprint: record.fingerprint.clone(),
        }
    }
}

/// Invoice corrected by a rectifying registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectifiedInvoice {
    pub number: String,
    pub issue_date: NaiveDate,
    /// TipoRectificativa: `S` substitution, `I` differences.
    pub method: String,
    pub base: Option<Decimal>,
    pub tax: Option<Decimal>,
}

/// One line of the tax breakdown (Desglose).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownLine {
    /// Impuesto: 01 IVA, 02 IPSI, 03 IGIC.
    pub tax_code: String,
    pub rate: Decimal,
    pub base: Decimal,
    pub amount: Decimal,
    pub surcharge_rate: Option<Decimal>,
    pub surcharge_amount: Option<Decimal>,
}

/// A Veri*Factu registration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub kind: RecordKind,
    pub issuer_nif: String,
    pub issuer_name: String,
    /// NumSerieFactura: series and number.
    pub number: String,
    pub issue_date: NaiveDate,
    /// TipoFactura (F1, F2, R1..R5); registrations only.
    pub invoice_type: Option<String>,
    pub description: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_nif: Option<String>,
    pub rectified: Option<RectifiedInvoice>,
    pub breakdown: Vec<BreakdownLine>,
    /// CuotaTotal.
    pub total_tax: Decimal,
    /// ImporteTotal.
    pub total_amount: Decimal,
    /// None for the first record of the chain.
    pub previous: Option<ChainLink>,
    pub generated_at: DateTime<FixedOffset>,
    /// Huella.
    pub fingerprint: String,
}

fn seller_nif(invoice: &Invoice) -> Result<String, FacturaError> {
    invoice
        .seller
        .tax_id
        .as_deref()
        .map(normalize_nif)
        .ok_or_else(|| FacturaError::Chain("seller NIF is required for Veri*Factu records".into()))
}

/// The fingerprint covers whole seconds only.
fn whole_seconds(at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    at.with_nanosecond(0).unwrap_or(at)
}

impl RegistrationRecord {
    /// Build the alta record for `invoice`, chained onto `previous`.
    pub fn registration(
        invoice: &Invoice,
        previous: Option<&RegistrationRecord>,
        at: DateTime<FixedOffset>,
    ) -> Result<Self, FacturaError> {
        let totals = invoice.totals.as_ref().ok_or_else(|| {
            FacturaError::Builder("totals must be calculated before registration".into())
        })?;
        let at = whole_seconds(at);

        let rectified = match (&invoice.kind, &invoice.corrective) {
            (InvoiceKind::Rectifying(_), Some(c)) => Some(RectifiedInvoice {
                number: c.original_full_number(),
                issue_date: c.original_issue_date,
                method: c.method.verifactu_code().to_string(),
                base: c.original_base,
                tax: c.original_tax,
            }),
            _ => None,
        };

        let breakdown = totals
            .taxes
            .iter()
            .map(|t| BreakdownLine {
                tax_code: t.tax_type.code().to_string(),
                rate: t.rate,
                base: t.taxable_base,
                amount: t.tax_amount,
                surcharge_rate: t.surcharge_rate,
                surcharge_amount: t.surcharge_amount,
            })
            .collect();

        let description = invoice
            .lines
            .first()
            .map(|l| l.description.chars().take(500).collect::<String>());

        let mut record = Self {
            kind: RecordKind::Registration,
            issuer_nif: seller_nif(invoice)?,
            issuer_name: invoice.seller.display_name(),
            number: invoice.full_number(),
            issue_date: invoice.issue_date,
            invoice_type: Some(invoice.kind.code().to_string()),
            description,
            recipient_name: invoice
                .buyer
                .tax_id
                .as_ref()
                .map(|_| invoice.buyer.display_name()),
            recipient_nif: invoice.buyer.tax_id.as_deref().map(normalize_nif),
            rectified,
            breakdown,
            total_tax: totals.total_tax_outputs,
            total_amount: totals.amount_with_taxes(),
            previous: previous.map(ChainLink::to),
            generated_at: at,
            fingerprint: String::new(),
        };
        record.fingerprint = record.expected_fingerprint();
        Ok(record)
    }

    /// Build the anulación record for `invoice`, chained onto `previous`.
    pub fn cancellation(
        invoice: &Invoice,
        previous: Option<&RegistrationRecord>,
        at: DateTime<FixedOffset>,
    ) -> Result<Self, FacturaError> {
        let at = whole_seconds(at);
        let mut record = Self {
            kind: RecordKind::Cancellation,
            issuer_nif: seller_nif(invoice)?,
            issuer_name: invoice.seller.display_name(),
            number: invoice.full_number(),
            issue_date: invoice.issue_date,
            invoice_type: None,
            description: None,
            recipient_name: None,
            recipient_nif: None,
            rectified: None,
            breakdown: Vec::new(),
            total_tax: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            previous: previous.map(ChainLink::to),
            generated_at: at,
            fingerprint: String::new(),
        };
        record.fingerprint = record.expected_fingerprint();
        Ok(record)
    }

    pub fn is_first(&self) -> bool {
        self.previous.is_none()
    }

    /// Huella of the previous record, empty for the first one.
    pub fn previous_fingerprint(&self) -> &str {
        self.previous
            .as_ref()
            .map(|p| p.fingerprint.as_str())
            .unwrap_or("")
    }

    /// The string whose SHA-256 is the record's fingerprint.
    pub fn canonical_input(&self) -> String {
        let date = format_date(self.issue_date);
        let generated = format_timestamp(&self.generated_at);
        match self.kind {
            RecordKind::Registration => canonical_string(&[
                ("IDEmisorFactura", &self.issuer_nif),
                ("NumSerieFactura", &self.number),
                ("FechaExpedicionFactura", &date),
                ("TipoFactura", self.invoice_type.as_deref().unwrap_or("")),
                ("CuotaTotal", &format_amount(self.total_tax)),
                ("ImporteTotal", &format_amount(self.total_amount)),
                ("Huella", self.previous_fingerprint()),
                ("FechaHoraHusoGenRegistro", &generated),
            ]),
            RecordKind::Cancellation => canonical_string(&[
                ("IDEmisorFacturaAnulada", &self.issuer_nif),
                ("NumSerieFacturaAnulada", &self.number),
                ("FechaExpedicionFacturaAnulada", &date),
                ("Huella", self.previous_fingerprint()),
                ("FechaHoraHusoGenRegistro", &generated),
            ]),
        }
    }

    /// Recompute the fingerprint from the record's own fields.
    pub fn expected_fingerprint(&self) -> String {
        fingerprint(&self.canonical_input())
    }
}
