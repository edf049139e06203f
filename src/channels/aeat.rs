use std::sync::Arc;

use super::transport::{SoapTransport, soap_envelope};
use crate::core::status::VerifactuStatus;
use crate::core::{FacturaError, Party};
use crate::verifactu::{
    AeatResponseLine, RegistrationRecord, VerifactuConfig, parse_aeat_lines, parse_aeat_response,
    to_aeat_request,
};

const ACTION: &str = "RegFactuSistemaFacturacion";

/// Submits Veri*Factu records to the AEAT.
#[derive(Clone)]
pub struct AeatClient {
    transport: Arc<dyn SoapTransport>,
    config: VerifactuConfig,
}

impl AeatClient {
    pub fn new(transport: Arc<dyn SoapTransport>, config: VerifactuConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &VerifactuConfig {
        &self.config
    }

    async fn post(&self, records: &[RegistrationRecord], issuer: &Party) -> Result<String, FacturaError> {
        if !self.config.enabled {
            return Err(FacturaError::Channel("Veri*Factu submission is disabled".into()));
        }
        let body = to_aeat_request(records, &self.config, issuer)?;
        let envelope = soap_envelope(&body)?;
        let response = self
            .transport
            .call(&self.config.endpoint, ACTION, &envelope)
            .await?;
        tracing::info!(
            records = records.len(),
            endpoint = %self.config.endpoint,
            "Veri*Factu records submitted"
        );
        Ok(response)
    }

    /// Submit `records`; the result is the worst per-record outcome.
    pub async fn submit(
        &self,
        records: &[RegistrationRecord],
        issuer: &Party,
    ) -> Result<VerifactuStatus, FacturaError> {
        let response = self.post(records, issuer).await?;
        parse_aeat_response(&response)
    }

    /// Submit `records` and return the AEAT's answer for each of them.
    pub async fn submit_lines(
        &self,
        records: &[RegistrationRecord],
        issuer: &Party,
    ) -> Result<Vec<AeatResponseLine>, FacturaError> {
        let response = self.post(records, issuer).await?;
        parse_aeat_lines(&response)
    }
}
