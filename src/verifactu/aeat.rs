use serde::{Deserialize, Serialize};

use super::codec::write_record;
use super::record::RegistrationRecord;
use crate::core::status::{AeatRegistrationState, AeatSubmissionState, VerifactuStatus};
use crate::core::{FacturaError, Party, normalize_nif};
use crate::xml::{XmlEvent, XmlWriter, walk};

/// SuministroLR namespace (request wrapper).
pub const SUMINISTRO_LR_NS: &str = "https://www2.agenciatributaria.gob.es/static_files/common/internet/dep/aplicaciones/es/aeat/tike/cont/ws/SuministroLR.xsd";

/// SuministroInformacion namespace (record contents).
pub const SUMINISTRO_INFO_NS: &str = "https://www2.agenciatributaria.gob.es/static_files/common/internet/dep/aplicaciones/es/aeat/tike/cont/ws/SuministroInformacion.xsd";

/// AEAT test-environment endpoint for Veri*Factu submissions.
pub const AEAT_TEST_ENDPOINT: &str =
    "https://prewww1.aeat.es/wlpl/TIKE-CONT/ws/SistemaFacturacion/VerifactuSOAP";

/// Veri*Factu settings: where to submit and how the software identifies itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifactuConfig {
    pub enabled: bool,
    pub endpoint: String,
    /// Producer of the invoicing software.
    pub producer_name: String,
    pub producer_nif: String,
    pub software_name: String,
    /// Two-character IdSistemaInformatico.
    pub software_id: String,
    pub software_version: String,
    pub installation_number: String,
}

impl Default for VerifactuConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: AEAT_TEST_ENDPOINT.to_string(),
            producer_name: String::new(),
            producer_nif: String::new(),
            software_name: env!("CARGO_PKG_NAME").to_string(),
            software_id: "FD".to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            installation_number: "1".to_string(),
        }
    }
}

/// Build the `RegFactuSistemaFacturacion` body for `records`.
///
/// `issuer` is the obligado a emitir; every record must belong to it.
pub fn to_aeat_request(
    records: &[RegistrationRecord],
    config: &VerifactuConfig,
    issuer: &Party,
) -> Result<String, FacturaError> {
    if records.is_empty() {
        return Err(FacturaError::Builder("no records to submit".into()));
    }
    if records.len() > 1000 {
        return Err(FacturaError::Builder(
            "the AEAT accepts at most 1000 records per submission".into(),
        ));
    }
    let issuer_nif = issuer
        .tax_id
        .as_deref()
        .map(normalize_nif)
        .ok_or_else(|| FacturaError::Builder("issuer NIF is required".into()))?;
    if let Some(foreign) = records.iter().find(|r| r.issuer_nif != issuer_nif) {
        return Err(FacturaError::Builder(format!(
            "record {} belongs to issuer {}, not {issuer_nif}",
            foreign.number, foreign.issuer_nif
        )));
    }

    let mut w = XmlWriter::fragment();
    w.start_element_with_attrs(
        "sum:RegFactuSistemaFacturacion",
        &[("xmlns:sum", SUMINISTRO_LR_NS), ("xmlns:sum1", SUMINISTRO_INFO_NS)],
    )?;
    w.start_element("sum:Cabecera")?;
    w.start_element("sum1:ObligadoEmision")?;
    w.text_element("sum1:NombreRazon", &issuer.display_name())?;
    w.text_element("sum1:NIF", &issuer_nif)?;
    w.end_element("sum1:ObligadoEmision")?;
    w.end_element("sum:Cabecera")?;

    for record in records {
        w.start_element("sum:RegistroFactura")?;
        write_record(&mut w, record, "sum1:", Some(config))?;
        w.end_element("sum:RegistroFactura")?;
    }
    w.end_element("sum:RegFactuSistemaFacturacion")?;
    w.into_string()
}

/// Per-record result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AeatResponseLine {
    pub number: Option<String>,
    pub status: VerifactuStatus,
}

/// Parse every RespuestaLinea of a `RespuestaRegFactuSistemaFacturacion`.
pub fn parse_aeat_lines(xml: &str) -> Result<Vec<AeatResponseLine>, FacturaError> {
    let mut submission = None;
    let mut csv = None;
    let mut lines: Vec<AeatResponseLine> = Vec::new();

    walk(xml, |event| match event {
        XmlEvent::Start(path) => {
            if path.last().is_some_and(|leaf| leaf == "RespuestaLinea") {
                lines.push(AeatResponseLine {
                    number: None,
                    status: VerifactuStatus::default(),
                });
            }
        }
        XmlEvent::Text(path, text) => {
            let leaf = path.last().map(String::as_str).unwrap_or("");
            let in_line = path.iter().any(|p| p == "RespuestaLinea");
            match (in_line, leaf) {
                (false, "EstadoEnvio") => submission = AeatSubmissionState::from_literal(text),
                (false, "CSV") => csv = Some(text.to_string()),
                (true, _) => {
                    if let Some(line) = lines.last_mut() {
                        match leaf {
                            "NumSerieFactura" => line.number = Some(text.to_string()),
                            "EstadoRegistro" => {
                                line.status.registration = AeatRegistrationState::from_literal(text)
                            }
                            "CodigoErrorRegistro" => line.status.error_code = Some(text.to_string()),
                            "DescripcionErrorRegistro" => {
                                line.status.error_description = Some(text.to_string())
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        XmlEvent::End(..) => {}
    })?;

    if submission.is_none() {
        return Err(FacturaError::Xml("AEAT response without EstadoEnvio".into()));
    }
    for line in &mut lines {
        line.status.submission = submission;
        line.status.csv = csv.clone();
    }
    if lines.is_empty() {
        lines.push(AeatResponseLine {
            number: None,
            status: VerifactuStatus {
                submission,
                csv,
                ..VerifactuStatus::default()
            },
        });
    }
    Ok(lines)
}

/// Parse a submission response into one status: the worst line wins.
pub fn parse_aeat_response(xml: &str) -> Result<VerifactuStatus, FacturaError> {
    let severity = |s: &VerifactuStatus| match s.registration {
        Some(AeatRegistrationState::Rejected) => 2,
        Some(AeatRegistrationState::AcceptedWithErrors) => 1,
        _ => 0,
    };
    parse_aeat_lines(xml)?
        .into_iter()
        .map(|line| line.status)
        .max_by_key(severity)
        .ok_or_else(|| FacturaError::Xml("empty AEAT response".into()))
}
