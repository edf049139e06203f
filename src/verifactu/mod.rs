//! Veri*Factu registration records and the hash-chained audit log.
//!
//! Every issued or cancelled invoice produces a [`RegistrationRecord`] whose
//! fingerprint (huella) is the SHA-256 of a canonical string that includes
//! the previous record's fingerprint. [`AuditLog`] keeps the chain on disk
//! and [`AuditLog::verify`] recomputes it end to end.
//!
//! ```
//! use facturador::verifactu::fingerprint;
//!
//! let input = "IDEmisorFactura=B12345674&NumSerieFactura=F2024-0001\
//!     &FechaExpedicionFactura=15-01-2024&TipoFactura=F1&CuotaTotal=126.00\
//!     &ImporteTotal=726.00&Huella=&FechaHoraHusoGenRegistro=2024-01-15T10:00:00+01:00";
//! assert_eq!(fingerprint(input).len(), 64);
//! ```

mod aeat;
mod codec;
mod hash;
mod log;
mod record;

pub use aeat::{
    AEAT_TEST_ENDPOINT, AeatResponseLine, SUMINISTRO_INFO_NS, SUMINISTRO_LR_NS, VerifactuConfig,
    parse_aeat_lines, parse_aeat_response, to_aeat_request,
};
pub use hash::{fingerprint, format_date, format_timestamp};
pub use log::{AuditLog, ChainReport};
pub use record::{BreakdownLine, ChainLink, RecordKind, RectifiedInvoice, RegistrationRecord};

/// Default file name of the audit log inside the data directory.
pub const LOG_FILE_NAME: &str = "verifactu.xml";
