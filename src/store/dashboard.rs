use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use super::invoices::InvoiceRecord;
use super::received::{ReceivedInvoice, ReceivedState};
use crate::core::InvoiceState;
use crate::verifactu::ChainReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateCount {
    pub state: InvoiceState,
    pub count: usize,
}

/// Summary figures for the landing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub year: i32,
    /// One entry per state, in precedence order.
    pub counts: Vec<StateCount>,
    /// Invoice totals issued this year, cancelled invoices excluded.
    pub issued_total: Decimal,
    /// Amount still to be collected on live invoices.
    pub outstanding: Decimal,
    pub received_pending: usize,
    pub audit_records: usize,
    pub audit_chain_valid: bool,
}

pub fn dashboard(
    invoices: &[InvoiceRecord],
    received: &[ReceivedInvoice],
    chain: &ChainReport,
    today: NaiveDate,
) -> Dashboard {
    let year = today.year();
    let counts = InvoiceState::ALL
        .iter()
        .map(|&state| StateCount {
            state,
            count: invoices.iter().filter(|r| r.status.state == state).count(),
        })
        .collect();

    let live = |r: &&InvoiceRecord| {
        !matches!(r.status.state, InvoiceState::Cancelled | InvoiceState::Rejected)
    };
    let issued_total = invoices
        .iter()
        .filter(|r| r.invoice.issue_date.year() == year)
        .filter(|r| r.status.state != InvoiceState::Cancelled)
        .filter_map(|r| r.invoice.totals.as_ref())
        .map(|t| t.invoice_total)
        .sum();
    let outstanding = invoices
        .iter()
        .filter(live)
        .filter(|r| !r.status.paid)
        .filter_map(|r| r.invoice.totals.as_ref())
        .map(|t| t.total_outstanding)
        .sum();

    Dashboard {
        year,
        counts,
        issued_total,
        outstanding,
        received_pending: received
            .iter()
            .filter(|r| r.state == ReceivedState::Pending)
            .count(),
        audit_records: chain.total,
        audit_chain_valid: chain.valid,
    }
}
