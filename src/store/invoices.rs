use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use super::config::AppConfig;
use super::data::{Client, DataManager, Product};
use super::json_store::{JsonStore, write_atomic};
use crate::core::status::{
    Channel, FaceB2bStatus, FaceStatus, InvoiceState, NormalizedStatus, StatusSources,
    VerifactuStatus, reconcile,
};
use crate::core::{
    CorrectionMethod, CorrectionReason, Corrective, FacturaError, Invoice, InvoiceBuilder,
    InvoiceKind, LineItem, LineItemBuilder, Party, PaymentInstructions, RectificationKind, TaxType,
};
use crate::facturae::to_facturae_xml;
use crate::verifactu::{AuditLog, ChainReport, RecordKind};

/// One line of an [`InvoiceDraft`]; unset fields come from the product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftLine {
    pub product_id: Option<String>,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
    pub discount_rate: Option<Decimal>,
    pub tax_type: Option<TaxType>,
    pub tax_rate: Option<Decimal>,
    pub surcharge_rate: Option<Decimal>,
    pub withholding_rate: Option<Decimal>,
}

/// What the user submits to issue an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceDraft {
    /// Stored client to invoice; takes precedence over `buyer`.
    pub client_id: Option<String>,
    /// Ad-hoc buyer, e.g. for simplified invoices.
    pub buyer: Option<Party>,
    pub kind: InvoiceKind,
    /// Defaults to today.
    pub issue_date: Option<NaiveDate>,
    pub operation_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub lines: Vec<DraftLine>,
    pub notes: Vec<String>,
    pub payment: Option<PaymentInstructions>,
    pub prepaid: Option<Decimal>,
}

impl Default for InvoiceDraft {
    fn default() -> Self {
        Self {
            client_id: None,
            buyer: None,
            kind: InvoiceKind::Complete,
            issue_date: None,
            operation_date: None,
            due_date: None,
            lines: Vec::new(),
            notes: Vec::new(),
            payment: None,
            prepaid: None,
        }
    }
}

/// Parameters of a rectifying invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RectifyRequest {
    pub reason: CorrectionReason,
    pub method: CorrectionMethod,
    /// Defaults to R5 for simplified originals and R1 otherwise.
    #[serde(default)]
    pub kind: Option<RectificationKind>,
    /// Lines of the rectifying invoice. A full rectification without lines
    /// repeats the original lines.
    #[serde(default)]
    pub lines: Vec<DraftLine>,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Upstream snapshots to merge into an invoice's status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusUpdate {
    pub face: Option<FaceStatus>,
    pub faceb2b: Option<FaceB2bStatus>,
    pub verifactu: Option<VerifactuStatus>,
}

/// An issued invoice with its links and status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: String,
    pub invoice: Invoice,
    pub client_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Id of the invoice this one rectifies.
    pub rectifies: Option<String>,
    /// Ids of invoices rectifying this one.
    pub rectified_by: Vec<String>,
    pub sources: StatusSources,
    pub status: NormalizedStatus,
    /// A Facturae file is stored; simplified invoices without buyer NIF have none.
    pub has_xml: bool,
    pub cancellation_reason: Option<String>,
}

impl InvoiceRecord {
    fn refresh_status(&mut self) -> bool {
        let status = reconcile(&self.sources);
        let changed = status.state != self.status.state;
        if changed {
            tracing::info!(
                id = %self.id,
                number = %self.invoice.full_number(),
                from = ?self.status.state,
                to = ?status.state,
                source = ?status.source,
                "invoice status changed"
            );
        }
        self.status = status;
        changed
    }

    fn ensure_not_cancelled(&self) -> Result<(), FacturaError> {
        if self.status.state == InvoiceState::Cancelled {
            return Err(FacturaError::Conflict(format!(
                "invoice {} is cancelled",
                self.invoice.full_number()
            )));
        }
        Ok(())
    }
}

/// Query for [`InvoiceManager::list`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceFilter {
    pub state: Option<InvoiceState>,
    pub client_id: Option<String>,
    pub year: Option<i32>,
    /// Case-insensitive match on number and buyer name.
    pub q: Option<String>,
}

impl InvoiceFilter {
    fn matches(&self, record: &InvoiceRecord) -> bool {
        if self.state.is_some_and(|s| s != record.status.state) {
            return false;
        }
        if self.client_id.is_some() && self.client_id != record.client_id {
            return false;
        }
        if self.year.is_some_and(|y| y != record.invoice.issue_date.year()) {
            return false;
        }
        match self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let q = q.to_lowercase();
                record.invoice.full_number().to_lowercase().contains(&q)
                    || record.invoice.buyer.display_name().to_lowercase().contains(&q)
            }
            None => true,
        }
    }
}

fn now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

/// Issues, rectifies and tracks invoices, keeping the audit log in step.
#[derive(Debug)]
pub struct InvoiceManager {
    store: JsonStore,
    xml_dir: PathBuf,
    clients: DataManager<Client>,
    products: DataManager<Product>,
    log: AuditLog,
}

impl InvoiceManager {
    pub fn new(
        store: JsonStore,
        xml_dir: impl Into<PathBuf>,
        clients: DataManager<Client>,
        products: DataManager<Product>,
        log: AuditLog,
    ) -> Result<Self, FacturaError> {
        let xml_dir = xml_dir.into();
        fs::create_dir_all(&xml_dir)?;
        Ok(Self {
            store,
            xml_dir,
            clients,
            products,
            log,
        })
    }

    pub fn get(&self, id: &str) -> Result<InvoiceRecord, FacturaError> {
        self.store
            .get(id)?
            .ok_or_else(|| FacturaError::NotFound(format!("invoice '{id}'")))
    }

    /// Matching invoices, newest first.
    pub fn list(&self, filter: &InvoiceFilter) -> Result<Vec<InvoiceRecord>, FacturaError> {
        let mut records: Vec<InvoiceRecord> = self.store.list()?;
        records.retain(|r| filter.matches(r));
        records.sort_by(|a, b| {
            b.invoice
                .issue_date
                .cmp(&a.invoice.issue_date)
                .then_with(|| b.invoice.number.cmp(&a.invoice.number))
        });
        Ok(records)
    }

    fn save(&self, record: &InvoiceRecord) -> Result<(), FacturaError> {
        self.store.put(&record.id, record)
    }

    /// Best-effort removal of a half-issued invoice.
    fn discard(&self, id: &str) {
        if let Err(e) = self.store.delete(id) {
            tracing::warn!(%id, error = %e, "could not remove unissued invoice record");
        }
        if let Err(e) = fs::remove_file(self.xml_path(id, "")) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(%id, error = %e, "could not remove unissued Facturae document");
            }
        }
    }

    fn xml_path(&self, id: &str, suffix: &str) -> PathBuf {
        self.xml_dir.join(format!("{id}{suffix}.xml"))
    }

    fn read_xml(&self, id: &str, suffix: &str) -> Result<String, FacturaError> {
        self.get(id)?;
        match fs::read_to_string(self.xml_path(id, suffix)) {
            Ok(xml) => Ok(xml),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FacturaError::NotFound(
                format!("no Facturae document for invoice '{id}'"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// The unsigned Facturae document.
    pub fn xml(&self, id: &str) -> Result<String, FacturaError> {
        self.read_xml(id, "")
    }

    /// The signed Facturae document, once the invoice was signed.
    pub fn signed_xml(&self, id: &str) -> Result<String, FacturaError> {
        self.read_xml(id, ".signed")
    }

    pub fn save_signed_xml(&self, id: &str, xml: &str) -> Result<(), FacturaError> {
        self.get(id)?;
        write_atomic(&self.xml_path(id, ".signed"), xml.as_bytes())
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.log
    }

    pub fn verify_log(&self) -> ChainReport {
        let report = self.log.verify();
        if !report.valid {
            tracing::warn!(
                broken_at = ?report.broken_at,
                reason = ?report.reason,
                "audit chain verification failed"
            );
        }
        report
    }

    fn next_number(&self, config: &AppConfig, prefix: &str, date: NaiveDate) -> Result<String, FacturaError> {
        let existing: Vec<InvoiceRecord> = self.store.list()?;
        // The log may hold numbers whose record was never stored.
        let registered = self.log.entries().iter().map(|r| r.number.as_str());
        let mut series = config.series.sequence(
            prefix,
            date.year(),
            existing
                .iter()
                .map(|r| r.invoice.number.as_str())
                .chain(registered),
        );
        Ok(series.next_number())
    }

    fn resolve_line(&self, line: &DraftLine) -> Result<LineItem, FacturaError> {
        let product = line
            .product_id
            .as_deref()
            .map(|id| self.products.get(id))
            .transpose()?;

        let description = line
            .description
            .clone()
            .or_else(|| product.as_ref().map(|p| p.description.clone()))
            .ok_or_else(|| FacturaError::Builder("line needs a description or a product".into()))?;
        let unit_price = line
            .unit_price
            .or(product.as_ref().map(|p| p.unit_price))
            .ok_or_else(|| FacturaError::Builder(format!("line '{description}' has no price")))?;

        let mut builder = LineItemBuilder::new(description, line.quantity, unit_price);
        let tax_type = line.tax_type.or(product.as_ref().map(|p| p.tax_type));
        let tax_rate = line.tax_rate.or(product.as_ref().map(|p| p.tax_rate));
        if let Some(rate) = tax_rate {
            builder = builder.tax(tax_type.unwrap_or(TaxType::Iva), rate);
        }
        if let Some(rate) = line.discount_rate {
            builder = builder.discount(rate);
        }
        if let Some(rate) = line.surcharge_rate {
            builder = builder.surcharge(rate);
        }
        if let Some(rate) = line.withholding_rate {
            builder = builder.withholding(rate);
        }
        if let Some(product) = &product {
            builder = builder.product(product.id.clone());
        }
        Ok(builder.build())
    }

    fn resolve_buyer(&self, draft: &InvoiceDraft) -> Result<Party, FacturaError> {
        if let Some(id) = &draft.client_id {
            return Ok(self.clients.get(id)?.party);
        }
        draft
            .buyer
            .clone()
            .ok_or_else(|| FacturaError::Builder("a client or a buyer is required".into()))
    }

    /// Issue an invoice from `draft`: number it, validate it, store its
    /// Facturae document and register it in the audit log.
    pub fn create(&mut self, draft: InvoiceDraft, config: &AppConfig) -> Result<InvoiceRecord, FacturaError> {
        let issuer = config.issuer()?.clone();
        let at = now();
        let issue_date = draft.issue_date.unwrap_or_else(|| at.date_naive());
        let buyer = self.resolve_buyer(&draft)?;
        let number = self.next_number(config, &config.series.prefix, issue_date)?;

        let mut builder = InvoiceBuilder::new(number, issue_date)
            .kind(draft.kind)
            .seller(issuer)
            .buyer(buyer);
        for line in &draft.lines {
            builder = builder.add_line(self.resolve_line(line)?);
        }
        for note in draft.notes {
            builder = builder.note(note);
        }
        if let Some(date) = draft.operation_date {
            builder = builder.operation_date(date);
        }
        if let Some(date) = draft.due_date {
            builder = builder.due_date(date);
        }
        if let Some(payment) = draft.payment {
            builder = builder.payment(payment);
        }
        if let Some(prepaid) = draft.prepaid {
            builder = builder.prepaid(prepaid);
        }

        let invoice = builder.build()?;
        self.issue(invoice, draft.client_id, None, at)
    }

    fn issue(
        &mut self,
        invoice: Invoice,
        client_id: Option<String>,
        rectifies: Option<String>,
        at: DateTime<FixedOffset>,
    ) -> Result<InvoiceRecord, FacturaError> {
        let xml = match invoice.buyer.tax_id {
            Some(_) => Some(to_facturae_xml(&invoice)?),
            None => None,
        };
        let id = uuid::Uuid::new_v4().to_string();
        if let Some(xml) = &xml {
            write_atomic(&self.xml_path(&id, ""), xml.as_bytes())?;
        }
        let sources = StatusSources::default();
        let record = InvoiceRecord {
            id,
            status: reconcile(&sources),
            sources,
            invoice,
            client_id,
            created_at: Utc::now(),
            rectifies,
            rectified_by: Vec::new(),
            has_xml: xml.is_some(),
            cancellation_reason: None,
        };
        if let Err(e) = self.save(&record) {
            self.discard(&record.id);
            return Err(e);
        }
        // The alta goes last so a failed write never leaves a registered
        // number without its invoice.
        let appended = self.log.append_registration(&record.invoice, at).map(|_| ());
        if let Err(e) = appended {
            self.discard(&record.id);
            return Err(e);
        }
        tracing::info!(
            id = %record.id,
            number = %record.invoice.full_number(),
            kind = record.invoice.kind.code(),
            total = ?record.invoice.totals.as_ref().map(|t| t.invoice_total),
            "invoice issued"
        );
        Ok(record)
    }

    /// Issue a rectifying invoice for `original_id` in the rectifying series.
    pub fn rectify(
        &mut self,
        original_id: &str,
        request: RectifyRequest,
        config: &AppConfig,
    ) -> Result<InvoiceRecord, FacturaError> {
        let mut original = self.get(original_id)?;
        original.ensure_not_cancelled()?;

        let kind = request.kind.unwrap_or(match original.invoice.kind {
            InvoiceKind::Simplified | InvoiceKind::Rectifying(RectificationKind::Simplified) => {
                RectificationKind::Simplified
            }
            _ => RectificationKind::LegalError,
        });
        let corrective = Corrective::for_invoice(&original.invoice, request.reason, request.method, kind);

        let lines = if request.lines.is_empty() {
            if request.method != CorrectionMethod::Full {
                return Err(FacturaError::Builder(
                    "a rectification by differences needs its own lines".into(),
                ));
            }
            original.invoice.lines.clone()
        } else {
            request
                .lines
                .iter()
                .map(|l| self.resolve_line(l))
                .collect::<Result<Vec<_>, _>>()?
        };

        let at = now();
        let issue_date = request.issue_date.unwrap_or_else(|| at.date_naive());
        let number = self.next_number(config, &config.series.rectifying_prefix, issue_date)?;
        let mut builder = InvoiceBuilder::new(number, issue_date)
            .corrects(corrective)
            .seller(original.invoice.seller.clone())
            .buyer(original.invoice.buyer.clone())
            .currency(original.invoice.currency_code.clone());
        for line in lines {
            builder = builder.add_line(line);
        }
        for note in request.notes {
            builder = builder.note(note);
        }
        let invoice = builder.build()?;

        let record = self.issue(
            invoice,
            original.client_id.clone(),
            Some(original.id.clone()),
            at,
        )?;
        original.rectified_by.push(record.id.clone());
        self.save(&original)?;
        Ok(record)
    }

    /// Note that the invoice was handed to a channel.
    pub fn record_submission(
        &self,
        id: &str,
        channel: Channel,
        registry_number: Option<String>,
    ) -> Result<InvoiceRecord, FacturaError> {
        let mut record = self.get(id)?;
        record.ensure_not_cancelled()?;
        record.sources.local.submitted_at = Some(Utc::now());
        record.sources.local.channel = Some(channel);
        if registry_number.is_some() {
            record.sources.local.registry_number = registry_number;
        }
        record.refresh_status();
        self.save(&record)?;
        tracing::info!(id, channel = ?channel, "invoice submission recorded");
        Ok(record)
    }

    /// Merge upstream snapshots and reconcile.
    pub fn apply_status(&self, id: &str, update: StatusUpdate) -> Result<InvoiceRecord, FacturaError> {
        let mut record = self.get(id)?;
        if let Some(face) = update.face {
            record.sources.face = Some(face);
        }
        if let Some(b2b) = update.faceb2b {
            record.sources.faceb2b = Some(b2b);
        }
        if let Some(vf) = update.verifactu {
            record.sources.verifactu = Some(vf);
        }
        record.refresh_status();
        self.save(&record)?;
        Ok(record)
    }

    pub fn mark_paid(&self, id: &str, date: Option<NaiveDate>) -> Result<InvoiceRecord, FacturaError> {
        let mut record = self.get(id)?;
        record.ensure_not_cancelled()?;
        record.sources.local.paid_at = Some(date.unwrap_or_else(|| now().date_naive()));
        record.refresh_status();
        self.save(&record)?;
        Ok(record)
    }

    /// Cancel the invoice: audit-log anulación plus the local mark.
    pub fn cancel(&mut self, id: &str, reason: Option<String>) -> Result<InvoiceRecord, FacturaError> {
        let mut record = self.get(id)?;
        record.ensure_not_cancelled()?;
        let at = now();
        // A previous attempt may have logged the anulación but failed to save.
        let logged = self
            .log
            .find(&record.invoice.full_number())
            .last()
            .is_some_and(|r| r.kind == RecordKind::Cancellation);
        if !logged {
            self.log.append_cancellation(&record.invoice, at)?;
        }
        record.sources.local.cancelled_at = Some(at.date_naive());
        record.cancellation_reason = reason;
        record.refresh_status();
        self.save(&record)?;
        Ok(record)
    }
}
