//! Invoice status reconciliation.
//!
//! FACe, FACeB2B and the AEAT Veri*Factu service each report the life of
//! an invoice in their own shape: FACe nests Spanish-named `tramitacion`
//! and `anulacion` blocks, FACeB2B uses English camelCase names and may send
//! a status either as an object or as a bare code, and the AEAT reports
//! `EstadoEnvio`/`EstadoRegistro` literals. [`reconcile`] folds all of them,
//! together with the user's own marks, into one [`NormalizedStatus`].
//!
//! Codes are looked up numerically first, then parsed from text, and
//! finally inferred from keywords in the description.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// FACe/FACeB2B processing codes.
pub mod codes {
    pub const REGISTERED: u32 = 1200;
    pub const REGISTERED_RCF: u32 = 1300;
    pub const ACCEPTED: u32 = 2400;
    pub const PAID: u32 = 2500;
    pub const REJECTED: u32 = 2600;
    pub const CANCELLED: u32 = 3100;

    pub const CANCELLATION_NOT_REQUESTED: u32 = 4100;
    pub const CANCELLATION_REQUESTED: u32 = 4200;
    pub const CANCELLATION_ACCEPTED: u32 = 4300;
    pub const CANCELLATION_REJECTED: u32 = 4400;
}

/// Normalized lifecycle state of an issued invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceState {
    Issued,
    Submitted,
    Registered,
    Accepted,
    Paid,
    Rejected,
    Cancelled,
}

impl InvoiceState {
    /// Precedence when sources disagree; the highest rank wins.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Issued => 0,
            Self::Submitted => 1,
            Self::Registered => 2,
            Self::Accepted => 3,
            Self::Paid => 4,
            Self::Rejected => 5,
            Self::Cancelled => 6,
        }
    }

    /// No further upstream change is expected.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Paid | Self::Rejected | Self::Cancelled)
    }

    pub const ALL: [InvoiceState; 7] = [
        Self::Issued,
        Self::Submitted,
        Self::Registered,
        Self::Accepted,
        Self::Paid,
        Self::Rejected,
        Self::Cancelled,
    ];
}

impl fmt::Display for InvoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Issued => "Emitida",
            Self::Submitted => "Enviada",
            Self::Registered => "Registrada",
            Self::Accepted => "Aceptada",
            Self::Paid => "Pagada",
            Self::Rejected => "Rechazada",
            Self::Cancelled => "Anulada",
        })
    }
}

/// State of a cancellation (anulación) request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationState {
    #[default]
    None,
    Requested,
    Accepted,
    Rejected,
}

/// Which source decided the normalized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    Local,
    Face,
    FaceB2b,
    Verifactu,
}

/// Submission channel for an issued invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// B2G, through FACe.
    Face,
    /// B2B, through FACeB2B.
    FaceB2b,
}

/// A status code that may arrive as a number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusCode {
    Number(u32),
    Text(String),
}

impl StatusCode {
    /// Numeric value, parsing text codes like "2500".
    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

/// Detailed state block: FACe `{codigo, descripcion, motivo}` or
/// FACeB2B `{code|statusCode, name|description, reason}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDetail {
    #[serde(default, alias = "codigo", alias = "statusCode")]
    pub code: Option<StatusCode>,
    #[serde(default, alias = "descripcion", alias = "name")]
    pub description: Option<String>,
    #[serde(default, alias = "motivo")]
    pub reason: Option<String>,
}

/// A state reported either as a detailed block or as a bare code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpstreamState {
    Detailed(StateDetail),
    Bare(StatusCode),
}

impl UpstreamState {
    fn code(&self) -> Option<u32> {
        match self {
            Self::Detailed(d) => d.code.as_ref().and_then(StatusCode::as_number),
            Self::Bare(c) => c.as_number(),
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            Self::Detailed(d) => d
                .description
                .as_deref()
                .or_else(|| d.code.as_ref().and_then(StatusCode::as_text)),
            Self::Bare(c) => c.as_text(),
        }
    }

    fn reason(&self) -> Option<&str> {
        match self {
            Self::Detailed(d) => d.reason.as_deref().or(d.description.as_deref()),
            Self::Bare(_) => None,
        }
    }
}

impl From<u32> for UpstreamState {
    fn from(code: u32) -> Self {
        Self::Bare(StatusCode::Number(code))
    }
}

/// Status snapshot returned by FACe (`consultarFactura`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceStatus {
    #[serde(default, alias = "numeroRegistro")]
    pub registry_number: Option<String>,
    #[serde(default, alias = "tramitacion")]
    pub processing: Option<UpstreamState>,
    #[serde(default, alias = "anulacion")]
    pub cancellation: Option<UpstreamState>,
}

/// Status snapshot returned by FACeB2B (`GetInvoiceDetails`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceB2bStatus {
    #[serde(default, alias = "registryNumber", alias = "registryCode")]
    pub registry_number: Option<String>,
    #[serde(default, alias = "invoiceStatus")]
    pub status: Option<UpstreamState>,
    /// Flat shape: code at the top level instead of inside `status`.
    #[serde(default, alias = "statusCode")]
    pub status_code: Option<StatusCode>,
    #[serde(default, alias = "cancellationStatus")]
    pub cancellation: Option<UpstreamState>,
    #[serde(default, alias = "paymentStatus")]
    pub payment_status: Option<StatusCode>,
    #[serde(default, alias = "paymentDate")]
    pub payment_date: Option<NaiveDate>,
}

impl FaceB2bStatus {
    fn effective_status(&self) -> Option<UpstreamState> {
        self.status
            .clone()
            .or_else(|| self.status_code.clone().map(UpstreamState::Bare))
    }
}

/// AEAT EstadoEnvio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AeatSubmissionState {
    #[serde(rename = "Correcto")]
    Accepted,
    #[serde(rename = "ParcialmenteCorrecto")]
    PartiallyAccepted,
    #[serde(rename = "Incorrecto")]
    Rejected,
}

impl AeatSubmissionState {
    pub fn from_literal(s: &str) -> Option<Self> {
        match s.trim() {
            "Correcto" => Some(Self::Accepted),
            "ParcialmenteCorrecto" => Some(Self::PartiallyAccepted),
            "Incorrecto" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// AEAT EstadoRegistro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AeatRegistrationState {
    #[serde(rename = "Correcto")]
    Accepted,
    #[serde(rename = "AceptadoConErrores")]
    AcceptedWithErrors,
    #[serde(rename = "Incorrecto")]
    Rejected,
}

impl AeatRegistrationState {
    pub fn from_literal(s: &str) -> Option<Self> {
        match s.trim() {
            "Correcto" => Some(Self::Accepted),
            "AceptadoConErrores" => Some(Self::AcceptedWithErrors),
            "Incorrecto" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Veri*Factu submission response for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifactuStatus {
    #[serde(default, alias = "EstadoEnvio")]
    pub submission: Option<AeatSubmissionState>,
    #[serde(default, alias = "EstadoRegistro")]
    pub registration: Option<AeatRegistrationState>,
    /// Código seguro de verificación.
    #[serde(default, alias = "CSV")]
    pub csv: Option<String>,
    #[serde(default, alias = "CodigoErrorRegistro")]
    pub error_code: Option<String>,
    #[serde(default, alias = "DescripcionErrorRegistro")]
    pub error_description: Option<String>,
}

/// Marks set by the user or by this service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMarks {
    pub submitted_at: Option<DateTime<Utc>>,
    pub channel: Option<Channel>,
    pub registry_number: Option<String>,
    pub paid_at: Option<NaiveDate>,
    pub cancelled_at: Option<NaiveDate>,
}

/// Everything known about an invoice's status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSources {
    pub local: LocalMarks,
    pub face: Option<FaceStatus>,
    pub faceb2b: Option<FaceB2bStatus>,
    pub verifactu: Option<VerifactuStatus>,
}

/// Result of reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedStatus {
    pub state: InvoiceState,
    pub paid: bool,
    pub cancellation: CancellationState,
    pub source: StatusSource,
    /// Rejection/cancellation reason or upstream description, when known.
    pub reason: Option<String>,
    pub registry_number: Option<String>,
    pub aeat_csv: Option<String>,
}

impl Default for NormalizedStatus {
    fn default() -> Self {
        reconcile(&StatusSources::default())
    }
}

/// Classify a processing state: numeric code first, then keywords.
fn processing_state(state: &UpstreamState) -> Option<InvoiceState> {
    if let Some(code) = state.code() {
        let by_code = match code {
            codes::REGISTERED | codes::REGISTERED_RCF => Some(InvoiceState::Registered),
            codes::ACCEPTED => Some(InvoiceState::Accepted),
            codes::PAID => Some(InvoiceState::Paid),
            codes::REJECTED => Some(InvoiceState::Rejected),
            codes::CANCELLED => Some(InvoiceState::Cancelled),
            _ => None,
        };
        if by_code.is_some() {
            return by_code;
        }
    }
    let text = state.text()?.to_lowercase();
    let not_cancelled = text.contains("no anulad") || text.contains("not cancel");
    if !not_cancelled && (text.contains("anulad") || text.contains("cancel")) {
        Some(InvoiceState::Cancelled)
    } else if text.contains("rechaz") || text.contains("reject") || text_means_refused(&text) {
        Some(InvoiceState::Rejected)
    } else if text_means_paid(&text) {
        Some(InvoiceState::Paid)
    } else if text.contains("contabiliz")
        || text.contains("reconoc")
        || text.contains("acept")
        || text.contains("accept")
    {
        Some(InvoiceState::Accepted)
    } else if text.contains("registr") {
        Some(InvoiceState::Registered)
    } else {
        None
    }
}

fn cancellation_state(state: &UpstreamState) -> CancellationState {
    if let Some(code) = state.code() {
        match code {
            codes::CANCELLATION_NOT_REQUESTED => return CancellationState::None,
            codes::CANCELLATION_REQUESTED => return CancellationState::Requested,
            codes::CANCELLATION_ACCEPTED => return CancellationState::Accepted,
            codes::CANCELLATION_REJECTED => return CancellationState::Rejected,
            _ => {}
        }
    }
    let Some(text) = state.text().map(str::to_lowercase) else {
        return CancellationState::None;
    };
    if text.contains("no solicitada") || text.contains("not requested") {
        CancellationState::None
    } else if text.contains("rechaz") || text.contains("reject") || text_means_refused(&text) {
        CancellationState::Rejected
    } else if text.contains("acept") || text.contains("accept") {
        CancellationState::Accepted
    } else if text.contains("solicit") || text.contains("request") {
        CancellationState::Requested
    } else {
        CancellationState::None
    }
}

/// Negated acceptance ("no aceptada", "not accepted", "denegada").
fn text_means_refused(text: &str) -> bool {
    ["no acept", "not accept", "denegad", "denied", "no aprobad"]
        .iter()
        .any(|k| text.contains(k))
}

fn text_means_paid(text: &str) -> bool {
    let text = text.to_lowercase();
    if text.contains("unpaid") || text.contains("no pagad") || text.contains("pendiente") {
        return false;
    }
    text.contains("pagad") || text.contains("paid") || text.contains("cobrad")
}

fn payment_code_means_paid(code: &StatusCode) -> bool {
    match code.as_number() {
        Some(n) => n == codes::PAID,
        None => code.as_text().is_some_and(text_means_paid),
    }
}

struct Candidate {
    state: InvoiceState,
    source: StatusSource,
    reason: Option<String>,
}

/// Fold all status sources into one normalized status.
///
/// Precedence, highest first: Cancelled, Rejected, Paid, Accepted,
/// Registered, Submitted, Issued. On a tie the upstream report wins over a
/// local mark.
pub fn reconcile(sources: &StatusSources) -> NormalizedStatus {
    let local = &sources.local;
    let mut candidates = vec![Candidate {
        state: InvoiceState::Issued,
        source: StatusSource::Local,
        reason: None,
    }];
    let mut push = |state, source, reason: Option<&str>| {
        candidates.push(Candidate {
            state,
            source,
            reason: reason.map(str::to_string),
        })
    };
    let mut cancellation = CancellationState::None;

    // Local marks first so upstream reports win ties.
    if local.submitted_at.is_some() {
        push(InvoiceState::Submitted, StatusSource::Local, None);
    }
    if local.paid_at.is_some() {
        push(InvoiceState::Paid, StatusSource::Local, None);
    }
    if local.cancelled_at.is_some() {
        push(InvoiceState::Cancelled, StatusSource::Local, None);
        cancellation = CancellationState::Accepted;
    }

    if let Some(face) = &sources.face {
        match face.processing.as_ref() {
            Some(processing) => match processing_state(processing) {
                Some(state) => push(state, StatusSource::Face, processing.reason()),
                None => push(InvoiceState::Submitted, StatusSource::Face, None),
            },
            None if face.registry_number.is_some() => {
                push(InvoiceState::Submitted, StatusSource::Face, None)
            }
            None => {}
        }
        if let Some(c) = &face.cancellation {
            cancellation = merge_cancellation(cancellation, cancellation_state(c));
            if cancellation_state(c) == CancellationState::Accepted {
                push(InvoiceState::Cancelled, StatusSource::Face, c.reason());
            }
        }
    }

    if let Some(b2b) = &sources.faceb2b {
        match b2b.effective_status() {
            Some(status) => match processing_state(&status) {
                Some(state) => push(state, StatusSource::FaceB2b, status.reason()),
                None => push(InvoiceState::Submitted, StatusSource::FaceB2b, None),
            },
            None if b2b.registry_number.is_some() => {
                push(InvoiceState::Submitted, StatusSource::FaceB2b, None)
            }
            None => {}
        }
        if b2b.payment_status.as_ref().is_some_and(payment_code_means_paid)
            || b2b.payment_date.is_some()
        {
            push(InvoiceState::Paid, StatusSource::FaceB2b, None);
        }
        if let Some(c) = &b2b.cancellation {
            let state = cancellation_state(c);
            cancellation = merge_cancellation(cancellation, state);
            if state == CancellationState::Accepted {
                push(InvoiceState::Cancelled, StatusSource::FaceB2b, c.reason());
            }
        }
    }

    if let Some(vf) = &sources.verifactu {
        let rejected = vf.registration == Some(AeatRegistrationState::Rejected)
            || (vf.registration.is_none()
                && vf.submission == Some(AeatSubmissionState::Rejected));
        let channel_submitted =
            local.submitted_at.is_some() || sources.face.is_some() || sources.faceb2b.is_some();
        if rejected {
            push(
                InvoiceState::Rejected,
                StatusSource::Verifactu,
                vf.error_description.as_deref(),
            );
        } else if !channel_submitted
            && matches!(
                vf.registration,
                Some(AeatRegistrationState::Accepted | AeatRegistrationState::AcceptedWithErrors)
            )
        {
            push(
                InvoiceState::Registered,
                StatusSource::Verifactu,
                vf.error_description.as_deref(),
            );
        }
    }

    let paid = candidates.iter().any(|c| c.state == InvoiceState::Paid);
    // max_by_key keeps the last of equal elements, so later (upstream) sources win ties.
    let winner = candidates
        .into_iter()
        .max_by_key(|c| c.state.rank())
        .unwrap_or(Candidate {
            state: InvoiceState::Issued,
            source: StatusSource::Local,
            reason: None,
        });
    if winner.state == InvoiceState::Cancelled {
        cancellation = CancellationState::Accepted;
    }

    let registry_number = sources
        .face
        .as_ref()
        .and_then(|f| f.registry_number.clone())
        .or_else(|| sources.faceb2b.as_ref().and_then(|b| b.registry_number.clone()))
        .or_else(|| local.registry_number.clone());

    let status = NormalizedStatus {
        state: winner.state,
        paid,
        cancellation,
        source: winner.source,
        reason: winner.reason,
        registry_number,
        aeat_csv: sources.verifactu.as_ref().and_then(|v| v.csv.clone()),
    };
    tracing::debug!(
        state = ?status.state,
        source = ?status.source,
        paid = status.paid,
        cancellation = ?status.cancellation,
        "status reconciled"
    );
    status
}

/// A later, more advanced cancellation report replaces an earlier one.
fn merge_cancellation(current: CancellationState, next: CancellationState) -> CancellationState {
    let rank = |c: CancellationState| match c {
        CancellationState::None => 0,
        CancellationState::Requested => 1,
        CancellationState::Rejected => 2,
        CancellationState::Accepted => 3,
    };
    if rank(next) >= rank(current) { next } else { current }
}
