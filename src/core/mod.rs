//! Core invoice types, validation, numbering and status reconciliation.
//!
//! This module provides the foundational types for Spanish invoicing
//! (RD 1619/2012), NIF and DIR3 validation, and the reconciliation of
//! upstream channel status into one normalized state.

mod builder;
mod error;
pub mod nif;
mod numbering;
pub mod status;
mod types;
mod validation;

pub use builder::*;
pub use error::*;
pub use nif::{NifError, NifKind, is_valid_nif, normalize_nif, validate_nif};
pub use numbering::*;
pub use status::{InvoiceState, NormalizedStatus, StatusSources, reconcile};
pub use types::*;
pub use validation::*;
