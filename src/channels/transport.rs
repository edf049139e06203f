use std::time::Duration;

use crate::core::FacturaError;
use crate::xml::{XmlWriter, first_text, has_element};

/// SOAP 1.1 envelope namespace.
pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Carries a SOAP envelope to an endpoint and returns the response body.
///
/// WS-Security and certificate handling live in the implementation; the
/// clients only build bodies and read responses.
#[async_trait::async_trait]
pub trait SoapTransport: Send + Sync {
    async fn call(&self, endpoint: &str, action: &str, envelope: &str) -> Result<String, FacturaError>;
}

/// Wrap a body fragment in a SOAP 1.1 envelope.
pub fn soap_envelope(body: &str) -> Result<String, FacturaError> {
    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs("soapenv:Envelope", &[("xmlns:soapenv", SOAP_ENV_NS)])?;
    w.start_element("soapenv:Header")?;
    w.end_element("soapenv:Header")?;
    w.start_element("soapenv:Body")?;
    w.raw(body)?;
    w.end_element("soapenv:Body")?;
    w.end_element("soapenv:Envelope")?;
    w.into_string()
}

/// The fault message if `xml` is a SOAP fault.
pub fn soap_fault(xml: &str) -> Option<String> {
    if !has_element(xml, "Fault") {
        return None;
    }
    let message = first_text(xml, "faultstring")
        .ok()
        .flatten()
        .or_else(|| first_text(xml, "Text").ok().flatten())
        .unwrap_or_else(|| "SOAP fault".to_string());
    Some(message)
}

/// [`SoapTransport`] over HTTPS with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FacturaError> {
        Self::build(None)
    }

    /// Authenticate with a client certificate: PEM with the private key and
    /// certificate chain concatenated.
    pub fn with_identity(pem: &[u8]) -> Result<Self, FacturaError> {
        let identity = reqwest::Identity::from_pem(pem)
            .map_err(|e| FacturaError::Channel(format!("invalid client certificate: {e}")))?;
        Self::build(Some(identity))
    }

    fn build(identity: Option<reqwest::Identity>) -> Result<Self, FacturaError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(30));
        if let Some(identity) = identity {
            builder = builder.identity(identity);
        }
        let client = builder
            .build()
            .map_err(|e| FacturaError::Channel(format!("HTTP client error: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl SoapTransport for HttpTransport {
    async fn call(&self, endpoint: &str, action: &str, envelope: &str) -> Result<String, FacturaError> {
        let resp = self
            .client
            .post(endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{action}\""))
            .body(envelope.to_string())
            .send()
            .await
            .map_err(|e| FacturaError::Channel(format!("{endpoint}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FacturaError::Channel(format!("{endpoint}: {e}")))?;
        tracing::debug!(%endpoint, action, status = status.as_u16(), "SOAP call");

        if let Some(fault) = soap_fault(&body) {
            return Err(FacturaError::Channel(format!("SOAP fault from {endpoint}: {fault}")));
        }
        if !status.is_success() {
            return Err(FacturaError::Channel(format!("HTTP {status} from {endpoint}")));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wraps_body() {
        let env = soap_envelope("<a:Ping xmlns:a=\"urn:a\">1</a:Ping>").unwrap();
        assert!(env.contains("<soapenv:Body>"));
        assert!(env.contains("<a:Ping xmlns:a=\"urn:a\">1</a:Ping>"));
        assert_eq!(first_text(&env, "Ping").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn fault_message_is_extracted() {
        let fault = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><s:Fault><faultcode>s:Server</faultcode><faultstring>Certificado no válido</faultstring></s:Fault></s:Body></s:Envelope>"#;
        assert_eq!(soap_fault(fault).as_deref(), Some("Certificado no válido"));
        assert_eq!(soap_fault("<ok/>"), None);
    }
}
