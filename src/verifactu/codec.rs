//! RegistroAlta / RegistroAnulacion XML, shared by the audit log file and
//! the AEAT submission payload.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::aeat::VerifactuConfig;
use super::hash::{format_date, format_timestamp, parse_date, parse_timestamp};
use super::record::{BreakdownLine, ChainLink, RecordKind, RectifiedInvoice, RegistrationRecord};
use crate::core::FacturaError;
use crate::xml::{XmlEvent, XmlWriter, walk};

/// Write one record. `prefix` is the namespace prefix including the colon
/// (empty for the log file); `system` adds the SistemaInformatico block.
pub(crate) fn write_record(
    w: &mut XmlWriter,
    record: &RegistrationRecord,
    prefix: &str,
    system: Option<&VerifactuConfig>,
) -> Result<(), FacturaError> {
    let n = |name: &str| format!("{prefix}{name}");
    let date = format_date(record.issue_date);

    match record.kind {
        RecordKind::Registration => {
            w.start_element(&n("RegistroAlta"))?;
            w.text_element(&n("IDVersion"), "1.0")?;
            w.start_element(&n("IDFactura"))?;
            w.text_element(&n("IDEmisorFactura"), &record.issuer_nif)?;
            w.text_element(&n("NumSerieFactura"), &record.number)?;
            w.text_element(&n("FechaExpedicionFactura"), &date)?;
            w.end_element(&n("IDFactura"))?;
            w.text_element(&n("NombreRazonEmisor"), &record.issuer_name)?;
            w.text_element(&n("TipoFactura"), record.invoice_type.as_deref().unwrap_or("F1"))?;

            if let Some(r) = &record.rectified {
                w.text_element(&n("TipoRectificativa"), &r.method)?;
                w.start_element(&n("FacturasRectificadas"))?;
                w.start_element(&n("IDFacturaRectificada"))?;
                w.text_element(&n("IDEmisorFactura"), &record.issuer_nif)?;
                w.text_element(&n("NumSerieFactura"), &r.number)?;
                w.text_element(&n("FechaExpedicionFactura"), &format_date(r.issue_date))?;
                w.end_element(&n("IDFacturaRectificada"))?;
                w.end_element(&n("FacturasRectificadas"))?;
                if let (Some(base), Some(tax)) = (r.base, r.tax) {
                    w.start_element(&n("ImporteRectificacion"))?;
                    w.amount_element(&n("BaseRectificada"), base)?;
                    w.amount_element(&n("CuotaRectificada"), tax)?;
                    w.end_element(&n("ImporteRectificacion"))?;
                }
            }

            w.text_element(
                &n("DescripcionOperacion"),
                record.description.as_deref().unwrap_or("Operación"),
            )?;
            if let (Some(name), Some(nif)) = (&record.recipient_name, &record.recipient_nif) {
                w.start_element(&n("Destinatarios"))?;
                w.start_element(&n("IDDestinatario"))?;
                w.text_element(&n("NombreRazon"), name)?;
                w.text_element(&n("NIF"), nif)?;
                w.end_element(&n("IDDestinatario"))?;
                w.end_element(&n("Destinatarios"))?;
            }

            w.start_element(&n("Desglose"))?;
            for line in &record.breakdown {
                w.start_element(&n("DetalleDesglose"))?;
                w.text_element(&n("Impuesto"), &line.tax_code)?;
                w.text_element(&n("ClaveRegimen"), "01")?;
                w.text_element(&n("CalificacionOperacion"), "S1")?;
                w.amount_element(&n("TipoImpositivo"), line.rate)?;
                w.amount_element(&n("BaseImponibleOimporteNoSujeto"), line.base)?;
                w.amount_element(&n("CuotaRepercutida"), line.amount)?;
                if let (Some(rate), Some(amount)) = (line.surcharge_rate, line.surcharge_amount) {
                    w.amount_element(&n("TipoRecargoEquivalencia"), rate)?;
                    w.amount_element(&n("CuotaRecargoEquivalencia"), amount)?;
                }
                w.end_element(&n("DetalleDesglose"))?;
            }
            w.end_element(&n("Desglose"))?;
            w.amount_element(&n("CuotaTotal"), record.total_tax)?;
            w.amount_element(&n("ImporteTotal"), record.total_amount)?;
            write_chain(w, record, &n)?;
            write_tail(w, record, &n, system)?;
            w.end_element(&n("RegistroAlta"))?;
        }
        RecordKind::Cancellation => {
            w.start_element(&n("RegistroAnulacion"))?;
            w.text_element(&n("IDVersion"), "1.0")?;
            w.start_element(&n("IDFactura"))?;
            w.text_element(&n("IDEmisorFacturaAnulada"), &record.issuer_nif)?;
            w.text_element(&n("NumSerieFacturaAnulada"), &record.number)?;
            w.text_element(&n("FechaExpedicionFacturaAnulada"), &date)?;
            w.end_element(&n("IDFactura"))?;
            write_chain(w, record, &n)?;
            write_tail(w, record, &n, system)?;
            w.end_element(&n("RegistroAnulacion"))?;
        }
    }
    Ok(())
}

fn write_chain(
    w: &mut XmlWriter,
    record: &RegistrationRecord,
    n: &dyn Fn(&str) -> String,
) -> Result<(), FacturaError> {
    w.start_element(&n("Encadenamiento"))?;
    match &record.previous {
        None => {
            w.text_element(&n("PrimerRegistro"), "S")?;
        }
        Some(prev) => {
            w.start_element(&n("RegistroAnterior"))?;
            w.text_element(&n("IDEmisorFactura"), &prev.issuer_nif)?;
            w.text_element(&n("NumSerieFactura"), &prev.number)?;
            w.text_element(&n("FechaExpedicionFactura"), &format_date(prev.issue_date))?;
            w.text_element(&n("Huella"), &prev.fingerprint)?;
            w.end_element(&n("RegistroAnterior"))?;
        }
    }
    w.end_element(&n("Encadenamiento"))?;
    Ok(())
}

fn write_tail(
    w: &mut XmlWriter,
    record: &RegistrationRecord,
    n: &dyn Fn(&str) -> String,
    system: Option<&VerifactuConfig>,
) -> Result<(), FacturaError> {
    if let Some(system) = system {
        w.start_element(&n("SistemaInformatico"))?;
        w.text_element(&n("NombreRazon"), &system.producer_name)?;
        w.text_element(&n("NIF"), &system.producer_nif)?;
        w.text_element(&n("NombreSistemaInformatico"), &system.software_name)?;
        w.text_element(&n("IdSistemaInformatico"), &system.software_id)?;
        w.text_element(&n("Version"), &system.software_version)?;
        w.text_element(&n("NumeroInstalacion"), &system.installation_number)?;
        w.text_element(&n("TipoUsoPosibleSoloVerifactu"), "S")?;
        w.text_element(&n("TipoUsoPosibleMultiOT"), "N")?;
        w.text_element(&n("IndicadorMultiplesOT"), "N")?;
        w.end_element(&n("SistemaInformatico"))?;
    }
    w.text_element(
        &n("FechaHoraHusoGenRegistro"),
        &format_timestamp(&record.generated_at),
    )?;
    w.text_element(&n("TipoHuella"), "01")?;
    w.text_element(&n("Huella"), &record.fingerprint)?;
    Ok(())
}

/// Read every RegistroAlta / RegistroAnulacion in `xml`, in document order.
pub(crate) fn read_records(xml: &str) -> Result<Vec<RegistrationRecord>, FacturaError> {
    let mut records = Vec::new();
    let mut current: Option<ParsedRecord> = None;
    let mut failure: Option<FacturaError> = None;

    walk(xml, |event| match event {
        XmlEvent::Start(path) => match path.last().map(String::as_str) {
            Some("RegistroAlta") => current = Some(ParsedRecord::new(RecordKind::Registration)),
            Some("RegistroAnulacion") => current = Some(ParsedRecord::new(RecordKind::Cancellation)),
            Some("DetalleDesglose") => {
                if let Some(r) = current.as_mut() {
                    r.breakdown.push(ParsedBreakdown::default());
                }
            }
            _ => {}
        },
        XmlEvent::Text(path, text) => {
            if let Some(r) = current.as_mut() {
                r.handle_text(path, text);
            }
        }
        XmlEvent::End(_, name) => {
            if name == "RegistroAlta" || name == "RegistroAnulacion" {
                if let Some(r) = current.take() {
                    match r.into_record() {
                        Ok(record) => records.push(record),
                        Err(e) => {
                            failure.get_or_insert(e);
                        }
                    }
                }
            }
        }
    })?;

    match failure {
        Some(e) => Err(e),
        None => Ok(records),
    }
}

#[derive(Default)]
struct ParsedBreakdown {
    tax_code: Option<String>,
    rate: Option<String>,
    base: Option<String>,
    amount: Option<String>,
    surcharge_rate: Option<String>,
    surcharge_amount: Option<String>,
}

struct ParsedRecord {
    kind: RecordKind,
    issuer_nif: Option<String>,
    issuer_name: Option<String>,
    number: Option<String>,
    issue_date: Option<String>,
    invoice_type: Option<String>,
    rectification_method: Option<String>,
    rectified_number: Option<String>,
    rectified_date: Option<String>,
    rectified_base: Option<String>,
    rectified_tax: Option<String>,
    description: Option<String>,
    recipient_name: Option<String>,
    recipient_nif: Option<String>,
    breakdown: Vec<ParsedBreakdown>,
    total_tax: Option<String>,
    total_amount: Option<String>,
    prev_nif: Option<String>,
    prev_number: Option<String>,
    prev_date: Option<String>,
    prev_fingerprint: Option<String>,
    generated_at: Option<String>,
    fingerprint: Option<String>,
}

fn set(slot: &mut Option<String>, text: &str) {
    *slot = Some(text.to_string());
}

impl ParsedRecord {
    fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            issuer_nif: None,
            issuer_name: None,
            number: None,
            issue_date: None,
            invoice_type: None,
            rectification_method: None,
            rectified_number: None,
            rectified_date: None,
            rectified_base: None,
            rectified_tax: None,
            description: None,
            recipient_name: None,
            recipient_nif: None,
            breakdown: Vec::new(),
            total_tax: None,
            total_amount: None,
            prev_nif: None,
            prev_number: None,
            prev_date: None,
            prev_fingerprint: None,
            generated_at: None,
            fingerprint: None,
        }
    }

    fn handle_text(&mut self, path: &[String], text: &str) {
        let leaf = path.last().map(String::as_str).unwrap_or("");
        let within = |name: &str| path.iter().any(|p| p == name);

        if within("SistemaInformatico") {
            return;
        }
        if within("RegistroAnterior") {
            match leaf {
                "IDEmisorFactura" => set(&mut self.prev_nif, text),
                "NumSerieFactura" => set(&mut self.prev_number, text),
                "FechaExpedicionFactura" => set(&mut self.prev_date, text),
                "Huella" => set(&mut self.prev_fingerprint, text),
                _ => {}
            }
            return;
        }
        if within("IDFacturaRectificada") {
            match leaf {
                "NumSerieFactura" => set(&mut self.rectified_number, text),
                "FechaExpedicionFactura" => set(&mut self.rectified_date, text),
                _ => {}
            }
            return;
        }
        if within("IDDestinatario") {
            match leaf {
                "NombreRazon" => set(&mut self.recipient_name, text),
                "NIF" => set(&mut self.recipient_nif, text),
                _ => {}
            }
            return;
        }
        if within("DetalleDesglose") {
            if let Some(line) = self.breakdown.last_mut() {
                match leaf {
                    "Impuesto" => set(&mut line.tax_code, text),
                    "TipoImpositivo" => set(&mut line.rate, text),
                    "BaseImponibleOimporteNoSujeto" => set(&mut line.base, text),
                    "CuotaRepercutida" => set(&mut line.amount, text),
                    "TipoRecargoEquivalencia" => set(&mut line.surcharge_rate, text),
                    "CuotaRecargoEquivalencia" => set(&mut line.surcharge_amount, text),
                    _ => {}
                }
            }
            return;
        }
        match leaf {
            "IDEmisorFactura" | "IDEmisorFacturaAnulada" => set(&mut self.issuer_nif, text),
            "NumSerieFactura" | "NumSerieFacturaAnulada" => set(&mut self.number, text),
            "FechaExpedicionFactura" | "FechaExpedicionFacturaAnulada" => {
                set(&mut self.issue_date, text)
            }
            "NombreRazonEmisor" => set(&mut self.issuer_name, text),
            "TipoFactura" => set(&mut self.invoice_type, text),
            "TipoRectificativa" => set(&mut self.rectification_method, text),
            "BaseRectificada" => set(&mut self.rectified_base, text),
            "CuotaRectificada" => set(&mut self.rectified_tax, text),
            "DescripcionOperacion" => set(&mut self.description, text),
            "CuotaTotal" => set(&mut self.total_tax, text),
            "ImporteTotal" => set(&mut self.total_amount, text),
            "FechaHoraHusoGenRegistro" => set(&mut self.generated_at, text),
            "Huella" => set(&mut self.fingerprint, text),
            _ => {}
        }
    }

    fn into_record(self) -> Result<RegistrationRecord, FacturaError> {
        let required = |value: Option<String>, name: &str| {
            value.ok_or_else(|| FacturaError::Xml(format!("record without {name}")))
        };

        let previous = match (self.prev_nif, self.prev_number, self.prev_date, self.prev_fingerprint) {
            (Some(issuer_nif), Some(number), Some(date), Some(fingerprint)) => Some(ChainLink {
                issuer_nif,
                number,
                issue_date: parse_date(&date)?,
                fingerprint,
            }),
            (None, None, None, None) => None,
            _ => return Err(FacturaError::Xml("incomplete RegistroAnterior".into())),
        };

        let rectified = match (self.rectified_number, self.rectified_date) {
            (Some(number), Some(date)) => Some(RectifiedInvoice {
                number,
                issue_date: parse_date(&date)?,
                method: self.rectification_method.unwrap_or_else(|| "I".into()),
                base: opt_decimal(self.rectified_base.as_deref())?,
                tax: opt_decimal(self.rectified_tax.as_deref())?,
            }),
            _ => None,
        };

        let breakdown = self
            .breakdown
            .into_iter()
            .map(|b| {
                Ok(BreakdownLine {
                    tax_code: b.tax_code.unwrap_or_else(|| "01".into()),
                    rate: opt_decimal(b.rate.as_deref())?.unwrap_or_default(),
                    base: opt_decimal(b.base.as_deref())?.unwrap_or_default(),
                    amount: opt_decimal(b.amount.as_deref())?.unwrap_or_default(),
                    surcharge_rate: opt_decimal(b.surcharge_rate.as_deref())?,
                    surcharge_amount: opt_decimal(b.surcharge_amount.as_deref())?,
                })
            })
            .collect::<Result<Vec<_>, FacturaError>>()?;

        Ok(RegistrationRecord {
            kind: self.kind,
            issuer_nif: required(self.issuer_nif, "issuer NIF")?,
            issuer_name: self.issuer_name.unwrap_or_default(),
            number: required(self.number, "invoice number")?,
            issue_date: parse_date(&required(self.issue_date, "issue date")?)?,
            invoice_type: self.invoice_type,
            description: self.description,
            recipient_name: self.recipient_name,
            recipient_nif: self.recipient_nif,
            rectified,
            breakdown,
            total_tax: opt_decimal(self.total_tax.as_deref())?.unwrap_or_default(),
            total_amount: opt_decimal(self.total_amount.as_deref())?.unwrap_or_default(),
            previous,
            generated_at: parse_timestamp(&required(self.generated_at, "generation timestamp")?)?,
            fingerprint: required(self.fingerprint, "Huella")?,
        })
    }
}

fn opt_decimal(s: Option<&str>) -> Result<Option<Decimal>, FacturaError> {
    s.map(|s| {
        Decimal::from_str(s.trim())
            .map_err(|e| FacturaError::Xml(format!("invalid decimal '{s}': {e}")))
    })
    .transpose()
}

