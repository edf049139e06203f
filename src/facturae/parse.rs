use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::core::*;
use crate::xml::{XmlEvent, walk};

/// Parse a Facturae document (signed or unsigned) into an [`Invoice`].
///
/// The signature block is skipped and totals are recomputed from the lines;
/// a mismatch with the document's own `InvoiceTotal` is logged, not fatal.
/// Only single-invoice batches are accepted.
pub fn from_facturae_xml(xml: &str) -> Result<Invoice, FacturaError> {
    let mut parsed = ParsedFacturae::default();
    walk(xml, |event| match event {
        XmlEvent::Start(path) => parsed.handle_start(path),
        XmlEvent::Text(path, text) => parsed.handle_text(path, text),
        XmlEvent::End(path, name) => parsed.handle_end(path, name),
    })?;
    parsed.into_invoice()
}

#[derive(Default)]
struct ParsedParty {
    person_type: Option<String>,
    residence: Option<String>,
    tax_id: Option<String>,
    name: Option<String>,
    first_surname: Option<String>,
    second_surname: Option<String>,
    street: Option<String>,
    postal_code: Option<String>,
    town: Option<String>,
    province: Option<String>,
    country: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    contact_person: Option<String>,
    centres: Vec<AdministrativeCentre>,
    current_centre: Option<(Option<String>, Option<String>, Option<String>)>,
}

#[derive(Default)]
struct ParsedLine {
    description: Option<String>,
    quantity: Option<String>,
    unit_price: Option<String>,
    discount_rate: Option<String>,
    tax_type: Option<String>,
    tax_rate: Option<String>,
    surcharge_rate: Option<String>,
    withholding_rate: Option<String>,
    article_code: Option<String>,
}

#[derive(Default)]
struct ParsedCorrective {
    number: Option<String>,
    series: Option<String>,
    reason_code: Option<String>,
    period_start: Option<String>,
    period_end: Option<String>,
    method: Option<String>,
    additional: Option<String>,
    issue_date: Option<String>,
}

#[derive(Default)]
struct ParsedFacturae {
    root_seen: bool,
    root_ok: bool,
    invoice_count: usize,
    number: Option<String>,
    series: Option<String>,
    document_type: Option<String>,
    invoice_class: Option<String>,
    corrective: Option<ParsedCorrective>,
    issue_date: Option<String>,
    operation_date: Option<String>,
    currency: Option<String>,
    document_total: Option<String>,
    prepaid: Option<String>,
    due_date: Option<String>,
    payment_means: Option<String>,
    iban: Option<String>,
    bic: Option<String>,
    notes: Option<String>,
    seller: ParsedParty,
    buyer: ParsedParty,
    lines: Vec<ParsedLine>,
    current_line: Option<ParsedLine>,
}

fn set(slot: &mut Option<String>, text: &str) {
    *slot = Some(text.to_string());
}

impl ParsedFacturae {
    fn handle_start(&mut self, path: &[String]) {
        if !self.root_seen {
            self.root_seen = true;
            self.root_ok = path.first().is_some_and(|root| root == "Facturae");
        }
        let leaf = path.last().map(String::as_str).unwrap_or("");
        let parent = path.len().checked_sub(2).map(|i| path[i].as_str()).unwrap_or("");
        match (parent, leaf) {
            ("Invoices", "Invoice") => self.invoice_count += 1,
            ("Items", "InvoiceLine") if self.invoice_count == 1 => {
                self.current_line = Some(ParsedLine::default())
            }
            ("InvoiceHeader", "Corrective") if self.invoice_count == 1 => {
                self.corrective = Some(ParsedCorrective::default())
            }
            ("AdministrativeCentres", "AdministrativeCentre") => {
                if let Some(party) = self.party_mut(path) {
                    party.current_centre = Some((None, None, None));
                }
            }
            _ => {}
        }
    }

    fn handle_end(&mut self, path: &[String], name: &str) {
        match name {
            "InvoiceLine" => {
                if let Some(line) = self.current_line.take() {
                    self.lines.push(line);
                }
            }
            "AdministrativeCentre" => {
                if let Some(party) = self.party_mut(path) {
                    if let Some((Some(code), role, centre_name)) = party.current_centre.take() {
                        party.centres.push(AdministrativeCentre {
                            code,
                            role: role
                                .as_deref()
                                .and_then(CentreRole::from_code)
                                .unwrap_or(CentreRole::ProcessingUnit),
                            name: centre_name,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    fn party_mut(&mut self, path: &[String]) -> Option<&mut ParsedParty> {
        if path.iter().any(|p| p == "SellerParty") {
            Some(&mut self.seller)
        } else if path.iter().any(|p| p == "BuyerParty") {
            Some(&mut self.buyer)
        } else {
            None
        }
    }

    fn handle_text(&mut self, path: &[String], text: &str) {
        if path.iter().any(|p| p == "Signature") {
            return;
        }
        let leaf = path.last().map(String::as_str).unwrap_or("");
        let parent = path.len().checked_sub(2).map(|i| path[i].as_str()).unwrap_or("");
        let grandparent = path.len().checked_sub(3).map(|i| path[i].as_str()).unwrap_or("");

        if path.iter().any(|p| p == "Parties") {
            let in_centre = path.iter().any(|p| p == "AdministrativeCentre");
            if let Some(party) = self.party_mut(path) {
                party.handle_text(parent, leaf, text, in_centre);
            }
            return;
        }

        // Only the first invoice of a batch is read.
        if self.invoice_count != 1 || !path.iter().any(|p| p == "Invoices") {
            return;
        }

        if let Some(line) = self.current_line.as_mut() {
            let in_withheld = path.iter().any(|p| p == "TaxesWithheld");
            match leaf {
                "ItemDescription" => set(&mut line.description, text),
                "Quantity" => set(&mut line.quantity, text),
                "UnitPriceWithoutTax" => set(&mut line.unit_price, text),
                "DiscountRate" => set(&mut line.discount_rate, text),
                "TaxRate" if in_withheld => set(&mut line.withholding_rate, text),
                "TaxTypeCode" if !in_withheld => set(&mut line.tax_type, text),
                "TaxRate" => set(&mut line.tax_rate, text),
                "EquivalenceSurcharge" => set(&mut line.surcharge_rate, text),
                "ArticleCode" => set(&mut line.article_code, text),
                _ => {}
            }
            return;
        }

        let in_corrective = parent == "Corrective" || grandparent == "Corrective";
        if let Some(c) = self.corrective.as_mut().filter(|_| in_corrective) {
            match leaf {
                "InvoiceNumber" => set(&mut c.number, text),
                "InvoiceSeriesCode" => set(&mut c.series, text),
                "ReasonCode" => set(&mut c.reason_code, text),
                "StartDate" => set(&mut c.period_start, text),
                "EndDate" => set(&mut c.period_end, text),
                "CorrectionMethod" => set(&mut c.method, text),
                "AdditionalReasonDescription" => set(&mut c.additional, text),
                "InvoiceIssueDate" => set(&mut c.issue_date, text),
                _ => {}
            }
            return;
        }

        match (parent, leaf) {
            ("InvoiceHeader", "InvoiceNumber") => set(&mut self.number, text),
            ("InvoiceHeader", "InvoiceSeriesCode") => set(&mut self.series, text),
            ("InvoiceHeader", "InvoiceDocumentType") => set(&mut self.document_type, text),
            ("InvoiceHeader", "InvoiceClass") => set(&mut self.invoice_class, text),
            ("InvoiceIssueData", "IssueDate") => set(&mut self.issue_date, text),
            ("InvoiceIssueData", "OperationDate") => set(&mut self.operation_date, text),
            ("InvoiceIssueData", "InvoiceCurrencyCode") => set(&mut self.currency, text),
            ("InvoiceTotals", "InvoiceTotal") => set(&mut self.document_total, text),
            ("InvoiceTotals", "TotalPaymentsOnAccount") => set(&mut self.prepaid, text),
            ("Installment", "InstallmentDueDate") => set(&mut self.due_date, text),
            ("Installment", "PaymentMeans") => set(&mut self.payment_means, text),
            ("AccountToBeCredited", "IBAN") => set(&mut self.iban, text),
            ("AccountToBeCredited", "BIC") => set(&mut self.bic, text),
            ("AdditionalData", "InvoiceAdditionalInformation") => set(&mut self.notes, text),
            _ => {}
        }
    }

    fn into_invoice(self) -> Result<Invoice, FacturaError> {
        if !self.root_ok {
            return Err(FacturaError::Xml("document root is not fe:Facturae".into()));
        }
        if self.invoice_count > 1 {
            return Err(FacturaError::Xml(format!(
                "batches with {} invoices are not supported",
                self.invoice_count
            )));
        }

        let number = self
            .number
            .ok_or_else(|| FacturaError::Xml("missing InvoiceNumber".into()))?;
        let issue_date = parse_date(
            self.issue_date
                .as_deref()
                .ok_or_else(|| FacturaError::Xml("missing IssueDate".into()))?,
        )?;

        let mut builder = InvoiceBuilder::new(number, issue_date)
            .seller(self.seller.into_party()?)
            .buyer(self.buyer.into_party()?);
        if let Some(series) = self.series {
            builder = builder.series(series);
        }
        if let Some(currency) = self.currency {
            builder = builder.currency(currency);
        }
        if let Some(op) = self.operation_date.as_deref() {
            builder = builder.operation_date(parse_date(op)?);
        }
        if let Some(due) = self.due_date.as_deref() {
            builder = builder.due_date(parse_date(due)?);
        }
        if let Some(prepaid) = self.prepaid.as_deref() {
            builder = builder.prepaid(parse_decimal(prepaid)?);
        }
        if let Some(means) = self.payment_means.as_deref().and_then(PaymentMeans::from_code) {
            builder = builder.payment(PaymentInstructions {
                means,
                iban: self.iban,
                bic: self.bic,
            });
        }
        if let Some(notes) = self.notes {
            for note in notes.lines().map(str::trim).filter(|n| !n.is_empty()) {
                builder = builder.note(note);
            }
        }

        let simplified = self.document_type.as_deref() == Some("FA");
        let rectifying = matches!(self.invoice_class.as_deref(), Some("OR" | "CR"));
        builder = match (self.corrective, rectifying, simplified) {
            (Some(c), _, _) => builder.corrects(c.into_corrective(simplified, issue_date)?),
            (None, true, _) => {
                return Err(FacturaError::Xml(
                    "rectifying invoice without Corrective block".into(),
                ));
            }
            (None, false, true) => builder.kind(InvoiceKind::Simplified),
            (None, false, false) => builder.kind(InvoiceKind::Complete),
        };

        for line in self.lines {
            builder = builder.add_line(line.into_line_item()?);
        }

        let invoice = builder.build_unchecked()?;
        if let (Some(stated), Some(totals)) = (self.document_total.as_deref(), &invoice.totals) {
            if parse_decimal(stated)? != totals.invoice_total {
                tracing::warn!(
                    number = %invoice.number,
                    stated,
                    computed = %totals.invoice_total,
                    "Facturae InvoiceTotal differs from recomputed total"
                );
            }
        }
        Ok(invoice)
    }
}

impl ParsedParty {
    fn handle_text(&mut self, parent: &str, leaf: &str, text: &str, in_centre: bool) {
        if in_centre {
            if let Some((code, role, name)) = self.current_centre.as_mut() {
                match leaf {
                    "CentreCode" => set(code, text),
                    "RoleTypeCode" => set(role, text),
                    "Name" if parent == "AdministrativeCentre" => set(name, text),
                    _ => {}
                }
            }
            return;
        }
        let in_address = parent == "AddressInSpain" || parent == "OverseasAddress";
        match leaf {
            "PersonTypeCode" => set(&mut self.person_type, text),
            "ResidenceTypeCode" => set(&mut self.residence, text),
            "TaxIdentificationNumber" => set(&mut self.tax_id, text),
            "CorporateName" => set(&mut self.name, text),
            "Name" if parent == "Individual" => set(&mut self.name, text),
            "FirstSurname" => set(&mut self.first_surname, text),
            "SecondSurname" => set(&mut self.second_surname, text),
            "Address" if in_address => set(&mut self.street, text),
            "PostCode" if in_address => set(&mut self.postal_code, text),
            "Town" if in_address => set(&mut self.town, text),
            "PostCodeAndTown" if in_address => match text.split_once(' ') {
                Some((code, town)) => {
                    set(&mut self.postal_code, code);
                    set(&mut self.town, town);
                }
                None => set(&mut self.town, text),
            },
            "Province" if in_address => set(&mut self.province, text),
            "CountryCode" if in_address => set(&mut self.country, text),
            "Telephone" => set(&mut self.phone, text),
            "ElectronicMail" => set(&mut self.email, text),
            "ContactPersons" => set(&mut self.contact_person, text),
            _ => {}
        }
    }

    fn into_party(self) -> Result<Party, FacturaError> {
        let name = self
            .name
            .ok_or_else(|| FacturaError::Xml("party without name".into()))?;
        let address = AddressBuilder::new(
            self.street.unwrap_or_default(),
            self.postal_code.unwrap_or_default(),
            self.town.unwrap_or_default(),
            self.province.unwrap_or_default(),
        )
        .country(self.country.unwrap_or_else(|| "ESP".into()))
        .build();

        let mut builder = PartyBuilder::new(name, address);
        if let Some(id) = self.tax_id {
            builder = builder.tax_id(id);
        }
        if let Some(residence) = self.residence.as_deref().and_then(ResidenceType::from_code) {
            builder = builder.residence(residence);
        }
        if self.person_type.as_deref().and_then(PersonType::from_code) == Some(PersonType::Individual) {
            builder = builder.individual(self.first_surname.unwrap_or_default(), self.second_surname);
        }
        if self.phone.is_some() || self.email.is_some() || self.contact_person.is_some() {
            builder = builder.contact(self.contact_person, self.phone, self.email);
        }
        let mut party = builder.build();
        party.administrative_centres = self.centres;
        Ok(party)
    }
}

impl ParsedLine {
    fn into_line_item(self) -> Result<LineItem, FacturaError> {
        let quantity = parse_decimal(
            self.quantity
                .as_deref()
                .ok_or_else(|| FacturaError::Xml("line without Quantity".into()))?,
        )?;
        let unit_price = parse_decimal(
            self.unit_price
                .as_deref()
                .ok_or_else(|| FacturaError::Xml("line without UnitPriceWithoutTax".into()))?,
        )?;
        let tax_type = match self.tax_type.as_deref() {
            Some(code) => TaxType::from_code(code)
                .ok_or_else(|| FacturaError::Xml(format!("unsupported TaxTypeCode '{code}'")))?,
            None => TaxType::Iva,
        };
        let tax_rate = match self.tax_rate.as_deref() {
            Some(rate) => parse_decimal(rate)?,
            None => Decimal::ZERO,
        };

        let mut builder = LineItemBuilder::new(self.description.unwrap_or_default(), quantity, unit_price)
            .tax(tax_type, tax_rate);
        if let Some(rate) = self.discount_rate.as_deref() {
            builder = builder.discount(parse_decimal(rate)?);
        }
        if let Some(rate) = self.surcharge_rate.as_deref() {
            builder = builder.surcharge(parse_decimal(rate)?);
        }
        if let Some(rate) = self.withholding_rate.as_deref() {
            builder = builder.withholding(parse_decimal(rate)?);
        }
        if let Some(code) = self.article_code {
            builder = builder.product(code);
        }
        Ok(builder.build())
    }
}

impl ParsedCorrective {
    fn into_corrective(self, simplified: bool, fallback_date: NaiveDate) -> Result<Corrective, FacturaError> {
        let original_number = self
            .number
            .ok_or_else(|| FacturaError::Xml("Corrective without InvoiceNumber".into()))?;
        let reason = self
            .reason_code
            .as_deref()
            .and_then(CorrectionReason::from_code)
            .ok_or_else(|| FacturaError::Xml("Corrective with unknown ReasonCode".into()))?;
        let method = self
            .method
            .as_deref()
            .and_then(CorrectionMethod::from_code)
            .unwrap_or(CorrectionMethod::Differences);

        let stated_kind = self.additional.as_deref().and_then(|text| {
            text.split_whitespace()
                .find_map(RectificationKind::from_code)
        });
        let kind = stated_kind.unwrap_or(if simplified {
            RectificationKind::Simplified
        } else {
            match reason {
                CorrectionReason::UnpaidOutputTax => RectificationKind::Insolvency,
                CorrectionReason::OutputTaxCalculation
                | CorrectionReason::WithheldTaxCalculation
                | CorrectionReason::ReturnedPackaging
                | CorrectionReason::Discounts
                | CorrectionReason::CourtRuling => RectificationKind::Other,
                _ => RectificationKind::LegalError,
            }
        });

        let period = match (self.period_start.as_deref(), self.period_end.as_deref()) {
            (Some(start), Some(end)) => Some(Period {
                start: parse_date(start)?,
                end: parse_date(end)?,
            }),
            _ => None,
        };
        let original_issue_date = match self.issue_date.as_deref() {
            Some(date) => parse_date(date)?,
            None => period.as_ref().map(|p| p.start).unwrap_or(fallback_date),
        };

        Ok(Corrective {
            original_number,
            original_series: self.series,
            original_issue_date,
            reason,
            method,
            kind,
            period,
            original_base: None,
            original_tax: None,
        })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, FacturaError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| FacturaError::Xml(format!("invalid date '{s}': {e}")))
}

fn parse_decimal(s: &str) -> Result<Decimal, FacturaError> {
    Decimal::from_str(s.trim()).map_err(|e| FacturaError::Xml(format!("invalid decimal '{s}': {e}")))
}
