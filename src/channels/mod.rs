//! Submission channels: FACe (B2G), FACeB2B (B2B) and the AEAT
//! Veri*Factu web service.
//!
//! Every client talks SOAP through a [`SoapTransport`]; [`HttpTransport`]
//! is the production implementation and tests plug in their own.

mod aeat;
mod face;
mod faceb2b;
mod transport;

pub use aeat::AeatClient;
pub use face::{FACE_NS, FACE_STAGING_ENDPOINT, FaceClient, parse_face_status};
pub use faceb2b::{FACEB2B_NS, FACEB2B_STAGING_ENDPOINT, FaceB2bClient, parse_faceb2b_status};
pub use transport::{HttpTransport, SOAP_ENV_NS, SoapTransport, soap_envelope, soap_fault};

use std::borrow::Cow;

use crate::core::FacturaError;
use crate::xml::{XmlEvent, walk};

pub(crate) fn escape(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}

/// Fail unless the `container` block of a response carries code `0`.
///
/// FACe answers with `resultado/{codigo, descripcion}`, FACeB2B with
/// `resultStatus/{code, message}`.
pub(crate) fn check_result(
    xml: &str,
    container: &str,
    code_field: &str,
    message_field: &str,
) -> Result<(), FacturaError> {
    let mut code = None;
    let mut message = None;
    walk(xml, |event| {
        if let XmlEvent::Text(path, text) = event {
            let [.., parent, leaf] = path else {
                return;
            };
            if parent == container && leaf == code_field {
                code = Some(text.trim().to_string());
            } else if parent == container && leaf == message_field {
                message = Some(text.to_string());
            }
        }
    })?;

    match code.as_deref() {
        Some("0") => Ok(()),
        Some(code) => Err(FacturaError::Channel(format!(
            "upstream error {code}: {}",
            message.unwrap_or_default()
        ))),
        None => Err(FacturaError::Channel(format!(
            "response without {container}/{code_field}"
        ))),
    }
}
