use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;

use super::transport::{SoapTransport, soap_envelope};
use super::{check_result, escape};
use crate::core::FacturaError;
use crate::core::status::{FaceB2bStatus, StateDetail, StatusCode, UpstreamState};
use crate::xml::{XmlEvent, walk};

/// FACeB2B web-service namespace.
pub const FACEB2B_NS: &str = "https://ws.faceb2b.gob.es";

/// FACeB2B staging endpoint.
pub const FACEB2B_STAGING_ENDPOINT: &str = "https://se-faceb2b.redsara.es/ws/v1.0/invoice";

/// Client for FACeB2B, the registry for invoices between private companies.
#[derive(Clone)]
pub struct FaceB2bClient {
    transport: Arc<dyn SoapTransport>,
    endpoint: String,
}

impl FaceB2bClient {
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
            .call(&self.endpoint, &format!("{FACEB2B_NS}/{action}"), &envelope)
            .await?;
        check_result(&response, "resultStatus", "code", "message")?;
        Ok(response)
    }

    /// Send a signed Facturae file; returns the FACeB2B registry number.
    pub async fn send_invoice(
        &self,
        signed_xml: &str,
        file_name: &str,
        email: Option<&str>,
    ) -> Result<String, FacturaError> {
        let notification = email
            .map(|e| format!("<notificationEmail>{}</notificationEmail>", escape(e)))
            .unwrap_or_default();
        let body = format!(
            "<web:SendInvoice xmlns:web=\"{FACEB2B_NS}\"><request>\
             <invoiceFile><content>{}</content><name>{}</name><mime>text/xml</mime></invoiceFile>\
             {notification}</request></web:SendInvoice>",
            STANDARD.encode(signed_xml.as_bytes()),
            escape(file_name),
        );
        let response = self.call("SendInvoice", body).await?;
        let registry = parse_faceb2b_status(&response)?
            .registry_number
            .ok_or_else(|| FacturaError::Channel("FACeB2B response without registryNumber".into()))?;
        tracing::info!(registry = %registry, file_name, "invoice sent to FACeB2B");
        Ok(registry)
    }

    /// Status, payment and cancellation details of a registered invoice.
    pub async fn invoice_details(&self, registry_number: &str) -> Result<FaceB2bStatus, FacturaError> {
        let body = format!(
            "<web:GetInvoiceDetails xmlns:web=\"{FACEB2B_NS}\"><request>\
             <registryNumber>{}</registryNumber></request></web:GetInvoiceDetails>",
            escape(registry_number),
        );
        let response = self.call("GetInvoiceDetails", body).await?;
        parse_faceb2b_status(&response)
    }

    /// Ask the receiver to cancel a registered invoice.
    pub async fn request_cancellation(
        &self,
        registry_number: &str,
        reason: &str,
    ) -> Result<FaceB2bStatus, FacturaError> {
        let body = format!(
            "<web:RequestInvoiceCancellation xmlns:web=\"{FACEB2B_NS}\"><request>\
             <registryNumber>{}</registryNumber><reason>{}</reason>\
             </request></web:RequestInvoiceCancellation>",
            escape(registry_number),
            escape(reason),
        );
        let response = self.call("RequestInvoiceCancellation", body).await?;
        let mut status = parse_faceb2b_status(&response)?;
        status.registry_number.get_or_insert_with(|| registry_number.to_string());
        tracing::info!(registry = %registry_number, "FACeB2B cancellation requested");
        Ok(status)
    }
}

/// Read an `invoiceDetail` block from a FACeB2B response.
pub fn parse_faceb2b_status(xml: &str) -> Result<FaceB2bStatus, FacturaError> {
    let mut status = FaceB2bStatus::default();
    let mut processing = StateDetail::default();
    let mut cancellation = StateDetail::default();
    let mut payment_date = None;

    walk(xml, |event| {
        let XmlEvent::Text(path, text) = event else {
            return;
        };
        if !path.iter().any(|p| p == "invoiceDetail") {
            return;
        }
        let [.., parent, leaf] = path else {
            return;
        };
        let target = match parent.as_str() {
            "status" => Some(&mut processing),
            "cancellationStatus" => Some(&mut cancellation),
            _ => None,
        };
        match (target, leaf.as_str()) {
            (Some(detail), "code") => detail.code = Some(StatusCode::Text(text.to_string())),
            (Some(detail), "name" | "description") => detail.description = Some(text.to_string()),
            (Some(detail), "reason") => detail.reason = Some(text.to_string()),
            (None, "registryNumber") => status.registry_number = Some(text.to_string()),
            (None, "statusCode") => status.status_code = Some(StatusCode::Text(text.to_string())),
            (None, "paymentStatus") => status.payment_status = Some(StatusCode::Text(text.to_string())),
            (None, "paymentDate") => payment_date = Some(text.to_string()),
            _ => {}
        }
    })?;

    let present = |d: &StateDetail| d.code.is_some() || d.description.is_some();
    if present(&processing) {
        status.status = Some(UpstreamState::Detailed(processing));
    }
    if present(&cancellation) {
        status.cancellation = Some(UpstreamState::Detailed(cancellation));
    }
    if let Some(date) = payment_date {
        let day = date.get(..10).unwrap_or(&date);
        status.payment_date = Some(
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map_err(|e| FacturaError::Xml(format!("invalid paymentDate '{date}': {e}")))?,
        );
    }
    Ok(status)
}
