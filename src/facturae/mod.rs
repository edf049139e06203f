//! Facturae 3.2.2 XML generation, parsing and the signing boundary.
//!
//! Facturae is the XML format FACe and FACeB2B accept. Documents are
//! produced unsigned by [`to_facturae_xml`]; the XAdES signature is applied
//! by an external [`XmlSigner`] (see [`sign_facturae`]).
//!
//! # Example
//!
//! ```no_run
//! use facturador::core::*;
//! use facturador::facturae;
//!
//! let invoice: Invoice = todo!(); // build via InvoiceBuilder
//! let xml = facturae::to_facturae_xml(&invoice).unwrap();
//! let parsed = facturae::from_facturae_xml(&xml).unwrap();
//! assert_eq!(parsed.number, invoice.number);
//! ```

mod generate;
mod parse;
mod sign;

pub use generate::to_facturae_xml;
pub use parse::from_facturae_xml;
pub use sign::{CommandSigner, XmlSigner, is_signed, sign_facturae};

/// Facturae schema version written to `FileHeader/SchemaVersion`.
pub const SCHEMA_VERSION: &str = "3.2.2";

/// Facturae 3.2.2 namespace URI.
pub const FACTURAE_NS: &str = "http://www.facturae.gob.es/formato/Versiones/Facturaev3_2_2.xml";

/// XML-DSig namespace URI.
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
