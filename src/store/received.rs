use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::json_store::JsonStore;
use crate::core::{FacturaError, Invoice, normalize_nif};
use crate::facturae::{from_facturae_xml, is_signed};

/// Review state of a supplier invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceivedState {
    Pending,
    Accepted,
    Rejected,
    Paid,
}

impl ReceivedState {
    /// Pending → Accepted | Rejected, Accepted → Paid.
    pub fn can_become(self, next: ReceivedState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted | Self::Rejected) | (Self::Accepted, Self::Paid)
        )
    }
}

impl fmt::Display for ReceivedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "Pendiente",
            Self::Accepted => "Aceptada",
            Self::Rejected => "Rechazada",
            Self::Paid => "Pagada",
        })
    }
}

/// One entry of a received invoice's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedEvent {
    pub at: DateTime<Utc>,
    pub from: Option<ReceivedState>,
    pub to: ReceivedState,
    pub note: Option<String>,
}

/// A supplier invoice imported from Facturae.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedInvoice {
    pub id: String,
    pub supplier_nif: String,
    /// Series and number as issued by the supplier.
    pub number: String,
    pub invoice: Invoice,
    pub signed: bool,
    pub state: ReceivedState,
    pub received_at: DateTime<Utc>,
    pub history: Vec<ReceivedEvent>,
    /// The document as received.
    pub source_xml: String,
}

/// Imports supplier invoices and walks them through review.
#[derive(Debug, Clone)]
pub struct ReceivedManager {
    store: JsonStore,
}

impl ReceivedManager {
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }

    /// Parse and store a Facturae document; duplicates are rejected.
    pub fn import(&self, xml: &str) -> Result<ReceivedInvoice, FacturaError> {
        let invoice = from_facturae_xml(xml)?;
        let supplier_nif = invoice
            .seller
            .tax_id
            .as_deref()
            .map(normalize_nif)
            .ok_or_else(|| FacturaError::Validation("received invoice has no seller NIF".into()))?;
        let number = invoice.full_number();

        if self
            .list()?
            .iter()
            .any(|r| r.supplier_nif == supplier_nif && r.number == number)
        {
            return Err(FacturaError::Conflict(format!(
                "invoice {number} from {supplier_nif} was already imported"
            )));
        }

        let now = Utc::now();
        let record = ReceivedInvoice {
            id: uuid::Uuid::new_v4().to_string(),
            supplier_nif,
            number,
            signed: is_signed(xml),
            invoice,
            state: ReceivedState::Pending,
            received_at: now,
            history: vec![ReceivedEvent {
                at: now,
                from: None,
                to: ReceivedState::Pending,
                note: None,
            }],
            source_xml: xml.to_string(),
        };
        self.store.put(&record.id, &record)?;
        tracing::info!(
            id = %record.id,
            supplier = %record.supplier_nif,
            number = %record.number,
            signed = record.signed,
            "received invoice imported"
        );
        Ok(record)
    }

    /// All received invoices, most recent first.
    pub fn list(&self) -> Result<Vec<ReceivedInvoice>, FacturaError> {
        let mut records: Vec<ReceivedInvoice> = self.store.list()?;
        records.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<ReceivedInvoice, FacturaError> {
        self.store
            .get(id)?
            .ok_or_else(|| FacturaError::NotFound(format!("received invoice '{id}'")))
    }

    /// Move the invoice to `to`, recording the change in its history.
    pub fn transition(
        &self,
        id: &str,
        to: ReceivedState,
        note: Option<String>,
    ) -> Result<ReceivedInvoice, FacturaError> {
        let mut record = self.get(id)?;
        let from = record.state;
        if !from.can_become(to) {
            return Err(FacturaError::Conflict(format!(
                "received invoice {} cannot go from {from} to {to}",
                record.number
            )));
        }
        record.state = to;
        record.history.push(ReceivedEvent {
            at: Utc::now(),
            from: Some(from),
            to,
            note,
        });
        self.store.put(id, &record)?;
        tracing::info!(id, from = ?from, to = ?to, "received invoice transitioned");
        Ok(record)
    }
}
