use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::transport::{SoapTransport, soap_envelope};
use super::{check_result, escape};
use crate::core::FacturaError;
use crate::core::status::{FaceStatus, StateDetail, StatusCode, UpstreamState};
use crate::xml::{XmlEvent, walk};

/// FACe web-service namespace.
pub const FACE_NS: &str = "https://webservice.face.gob.es";

/// FACe staging endpoint.
pub const FACE_STAGING_ENDPOINT: &str = "https://se-face-webservice.redsara.es/facturasrcf2";

/// Client for FACe, the general entry point for invoices to public administrations.
#[derive(Clone)]
pub struct FaceClient {
    transport: Arc<dyn SoapTransport>,
    endpoint: String,
}

impl FaceClient {
    pub fn new(transport: Arc<dyn SoapTransport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }

    async fn call(&self, action: &str, body: String) -> Result<String, FacturaError> {
        let envelope = soap_envelope(&body)?;
        let response = self
            .transport
            .call(&self.endpoint, &format!("{FACE_NS}#{action}"), &envelope)
            .await?;
        check_result(&response, "resultado", "codigo", "descripcion")?;
        Ok(response)
    }

    /// Send a signed Facturae file; returns the FACe registry number.
    pub async fn send_invoice(
        &self,
        signed_xml: &str,
        file_name: &str,
        email: &str,
    ) -> Result<String, FacturaError> {
        let body = format!(
            "<web:enviarFactura xmlns:web=\"{FACE_NS}\"><request>\
             <correo>{}</correo>\
             <factura><factura>{}</factura><nombre>{}</nombre><mime>application/xml</mime></factura>\
             <anexos/></request></web:enviarFactura>",
            escape(email),
            STANDARD.encode(signed_xml.as_bytes()),
            escape(file_name),
        );
        let response = self.call("enviarFactura", body).await?;
        let status = parse_face_status(&response)?;
        let registry = status
            .registry_number
            .ok_or_else(|| FacturaError::Channel("FACe response without numeroRegistro".into()))?;
        tracing::info!(registry = %registry, file_name, "invoice sent to FACe");
        Ok(registry)
    }

    /// Current processing and cancellation state of a registered invoice.
    pub async fn query_invoice(&self, registry_number: &str) -> Result<FaceStatus, FacturaError> {
        let body = format!(
            "<web:consultarFactura xmlns:web=\"{FACE_NS}\"><request>\
             <numeroRegistro>{}</numeroRegistro></request></web:consultarFactura>",
            escape(registry_number),
        );
        let response = self.call("consultarFactura", body).await?;
        parse_face_status(&response)
    }

    /// Request cancellation of a registered invoice.
    pub async fn cancel_invoice(
        &self,
        registry_number: &str,
        reason: &str,
    ) -> Result<FaceStatus, FacturaError> {
        let body = format!(
            "<web:anularFactura xmlns:web=\"{FACE_NS}\"><request>\
             <numeroRegistro>{}</numeroRegistro><motivo>{}</motivo></request></web:anularFactura>",
            escape(registry_number),
            escape(reason),
        );
        let response = self.call("anularFactura", body).await?;
        let mut status = parse_face_status(&response)?;
        status.registry_number.get_or_insert_with(|| registry_number.to_string());
        tracing::info!(registry = %registry_number, "FACe cancellation requested");
        Ok(status)
    }
}

/// Read `numeroRegistro`, `tramitacion` and `anulacion` from a FACe response.
pub fn parse_face_status(xml: &str) -> Result<FaceStatus, FacturaError> {
    let mut status = FaceStatus::default();
    let mut processing = StateDetail::default();
    let mut cancellation = StateDetail::default();

    walk(xml, |event| {
        let XmlEvent::Text(path, text) = event else {
            return;
        };
        let leaf = path.last().map(String::as_str).unwrap_or("");
        let target = if path.iter().any(|p| p == "tramitacion") {
            Some(&mut processing)
        } else if path.iter().any(|p| p == "anulacion") {
            Some(&mut cancellation)
        } else {
            None
        };
        match (target, leaf) {
            (Some(detail), "codigo") => detail.code = Some(StatusCode::Text(text.to_string())),
            (Some(detail), "descripcion") => detail.description = Some(text.to_string()),
            (Some(detail), "motivo") => detail.reason = Some(text.to_string()),
            (None, "numeroRegistro") => status.registry_number = Some(text.to_string()),
            _ => {}
        }
    })?;

    let present = |d: &StateDetail| d.code.is_some() || d.description.is_some();
    if present(&processing) {
        status.processing = Some(UpstreamState::Detailed(processing));
    }
    if present(&cancellation) {
        status.cancellation = Some(UpstreamState::Detailed(cancellation));
    }
    Ok(status)
}
