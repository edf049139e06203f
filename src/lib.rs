//! # facturador
//!
//! Spanish e-invoicing: Facturae 3.2.2 documents, submission through FACe
//! (public sector) and FACeB2B (private sector), Veri*Factu registration
//! records in a hash-chained audit log, and one normalized invoice status
//! reconciled from all of them.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use facturador::core::*;
//! use rust_decimal_macros::dec;
//!
//! let invoice = InvoiceBuilder::new("0001", NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
//!     .series("F2024-")
//!     .seller(PartyBuilder::new("Ejemplo SL", AddressBuilder::new("Calle Mayor 1", "28013", "Madrid", "Madrid").build())
//!         .tax_id("B12345674").build())
//!     .buyer(PartyBuilder::new("Cliente SA", AddressBuilder::new("Gran Vía 2", "48001", "Bilbao", "Bizkaia").build())
//!         .tax_id("A58818501").build())
//!     .add_line(LineItemBuilder::new("Consultoría", dec!(10), dec!(60)).tax(TaxType::Iva, dec!(21)).build())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(invoice.full_number(), "F2024-0001");
//! assert!(validate_invoice(&invoice).is_empty());
//! assert_eq!(invoice.totals.unwrap().invoice_total, dec!(726.00));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Invoice types, NIF/DIR3 validation, numbering, status reconciliation |
//! | `facturae` | Facturae 3.2.2 generation, parsing and the signing boundary |
//! | `verifactu` | Veri*Factu records, fingerprints, audit log, AEAT request codec |
//! | `channels` | SOAP clients for FACe, FACeB2B and the AEAT |
//! | `store` | File-backed configuration, user, clients, products and invoices |
//! | `server` | JSON HTTP API and the `facturador` binary |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "facturae")]
pub mod facturae;

#[cfg(feature = "verifactu")]
pub mod verifactu;

#[cfg(feature = "channels")]
pub mod channels;

#[cfg(feature = "store")]
pub mod store;

#[cfg(feature = "server")]
pub mod server;

#[cfg(any(feature = "facturae", feature = "verifactu"))]
mod xml;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
