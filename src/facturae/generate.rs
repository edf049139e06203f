use rust_decimal::{Decimal, RoundingStrategy};

use super::{DSIG_NS, FACTURAE_NS, SCHEMA_VERSION};
use crate::core::*;
use crate::xml::{XmlWriter, format_price};

/// Generate an unsigned Facturae 3.2.2 document for a single invoice.
pub fn to_facturae_xml(invoice: &Invoice) -> Result<String, FacturaError> {
    let totals = invoice.totals.as_ref().ok_or_else(|| {
        FacturaError::Builder("totals must be calculated before XML generation".into())
    })?;
    let seller_id = invoice
        .seller
        .tax_id
        .as_deref()
        .ok_or_else(|| FacturaError::Builder("Facturae requires the seller NIF".into()))?;
    if invoice.buyer.tax_id.is_none() {
        return Err(FacturaError::Builder(
            "Facturae requires the buyer tax identification".into(),
        ));
    }

    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs(
        "fe:Facturae",
        &[("xmlns:ds", DSIG_NS), ("xmlns:fe", FACTURAE_NS)],
    )?;

    // FileHeader: one invoice per batch
    w.start_element("FileHeader")?;
    w.text_element("SchemaVersion", SCHEMA_VERSION)?;
    w.text_element("Modality", "I")?;
    w.text_element("InvoiceIssuerType", "EM")?;
    w.start_element("Batch")?;
    w.text_element(
        "BatchIdentifier",
        &format!("{}{}", normalize_nif(seller_id), invoice.full_number()),
    )?;
    w.text_element("InvoicesCount", "1")?;
    for (name, amount) in [
        ("TotalInvoicesAmount", totals.invoice_total),
        ("TotalOutstandingAmount", totals.total_outstanding),
        ("TotalExecutableAmount", totals.total_outstanding),
    ] {
        w.start_element(name)?;
        w.amount_element("TotalAmount", amount)?;
        w.end_element(name)?;
    }
    w.text_element("InvoiceCurrencyCode", &invoice.currency_code)?;
    w.end_element("Batch")?;
    w.end_element("FileHeader")?;

    w.start_element("Parties")?;
    write_party(&mut w, "SellerParty", &invoice.seller)?;
    write_party(&mut w, "BuyerParty", &invoice.buyer)?;
    w.end_element("Parties")?;

    w.start_element("Invoices")?;
    w.start_element("Invoice")?;
    write_header(&mut w, invoice)?;

    w.start_element("InvoiceIssueData")?;
    w.text_element("IssueDate", &invoice.issue_date.to_string())?;
    if let Some(op) = invoice.operation_date {
        w.text_element("OperationDate", &op.to_string())?;
    }
    w.text_element("InvoiceCurrencyCode", &invoice.currency_code)?;
    w.text_element("TaxCurrencyCode", &invoice.currency_code)?;
    w.text_element("LanguageName", "es")?;
    w.end_element("InvoiceIssueData")?;

    w.start_element("TaxesOutputs")?;
    for tax in &totals.taxes {
        write_tax(
            &mut w,
            tax.tax_type.code(),
            tax.rate,
            tax.taxable_base,
            tax.tax_amount,
            tax.surcharge_rate.zip(tax.surcharge_amount),
        )?;
    }
    w.end_element("TaxesOutputs")?;

    if !totals.withholdings.is_empty() {
        w.start_element("TaxesWithheld")?;
        for wh in &totals.withholdings {
            write_tax(&mut w, IRPF_TAX_CODE, wh.rate, wh.taxable_base, wh.amount, None)?;
        }
        w.end_element("TaxesWithheld")?;
    }

    w.start_element("InvoiceTotals")?;
    w.amount_element("TotalGrossAmount", totals.total_gross_amount)?;
    w.amount_element("TotalGrossAmountBeforeTaxes", totals.gross_before_taxes)?;
    w.amount_element("TotalTaxOutputs", totals.total_tax_outputs)?;
    w.amount_element("TotalTaxesWithheld", totals.total_taxes_withheld)?;
    w.amount_element("InvoiceTotal", totals.invoice_total)?;
    w.amount_element("TotalOutstandingAmount", totals.total_outstanding)?;
    if !totals.prepaid.is_zero() {
        w.amount_element("TotalPaymentsOnAccount", totals.prepaid)?;
    }
    w.amount_element("TotalExecutableAmount", totals.total_outstanding)?;
    w.end_element("InvoiceTotals")?;

    w.start_element("Items")?;
    for line in &invoice.lines {
        write_line(&mut w, line)?;
    }
    w.end_element("Items")?;

    if let Some(payment) = &invoice.payment {
        w.start_element("PaymentDetails")?;
        w.start_element("Installment")?;
        let due = invoice.due_date.unwrap_or(invoice.issue_date);
        w.text_element("InstallmentDueDate", &due.to_string())?;
        w.amount_element("InstallmentAmount", totals.total_outstanding)?;
        w.text_element("PaymentMeans", &payment.means.code())?;
        if payment.iban.is_some() {
            w.start_element("AccountToBeCredited")?;
            w.optional_element("IBAN", payment.iban.as_deref())?;
            w.optional_element("BIC", payment.bic.as_deref())?;
            w.end_element("AccountToBeCredited")?;
        }
        w.end_element("Installment")?;
        w.end_element("PaymentDetails")?;
    }

    if !invoice.notes.is_empty() {
        w.start_element("AdditionalData")?;
        w.text_element("InvoiceAdditionalInformation", &invoice.notes.join("\n"))?;
        w.end_element("AdditionalData")?;
    }

    w.end_element("Invoice")?;
    w.end_element("Invoices")?;
    w.end_element("fe:Facturae")?;
    w.into_string()
}

fn write_header(w: &mut XmlWriter, invoice: &Invoice) -> Result<(), FacturaError> {
    w.start_element("InvoiceHeader")?;
    w.text_element("InvoiceNumber", &invoice.number)?;
    w.optional_element("InvoiceSeriesCode", invoice.series.as_deref())?;
    w.text_element("InvoiceDocumentType", invoice.kind.document_type())?;
    w.text_element("InvoiceClass", invoice.kind.invoice_class())?;

    if let Some(c) = &invoice.corrective {
        w.start_element("Corrective")?;
        w.text_element("InvoiceNumber", &c.original_number)?;
        w.optional_element("InvoiceSeriesCode", c.original_series.as_deref())?;
        w.text_element("ReasonCode", c.reason.code())?;
        w.text_element("ReasonDescription", c.reason.description())?;
        let (start, end) = c
            .period
            .as_ref()
            .map(|p| (p.start, p.end))
            .unwrap_or((c.original_issue_date, c.original_issue_date));
        w.start_element("TaxPeriod")?;
        w.text_element("StartDate", &start.to_string())?;
        w.text_element("EndDate", &end.to_string())?;
        w.end_element("TaxPeriod")?;
        w.text_element("CorrectionMethod", c.method.code())?;
        w.text_element("CorrectionMethodDescription", c.method.description())?;
        w.text_element(
            "AdditionalReasonDescription",
            &format!("Factura rectificativa {}", c.kind.code()),
        )?;
        w.text_element("InvoiceIssueDate", &c.original_issue_date.to_string())?;
        w.end_element("Corrective")?;
    }
    w.end_element("InvoiceHeader")?;
    Ok(())
}

fn write_party(w: &mut XmlWriter, tag: &str, party: &Party) -> Result<(), FacturaError> {
    w.start_element(tag)?;
    w.start_element("TaxIdentification")?;
    w.text_element("PersonTypeCode", party.person_type.code())?;
    w.text_element("ResidenceTypeCode", party.residence.code())?;
    w.text_element(
        "TaxIdentificationNumber",
        &party.tax_id.as_deref().map(normalize_nif).unwrap_or_default(),
    )?;
    w.end_element("TaxIdentification")?;

    if !party.administrative_centres.is_empty() {
        w.start_element("AdministrativeCentres")?;
        for centre in &party.administrative_centres {
            w.start_element("AdministrativeCentre")?;
            w.text_element("CentreCode", &centre.code)?;
            w.text_element("RoleTypeCode", centre.role.code())?;
            w.optional_element("Name", centre.name.as_deref())?;
            write_address(w, &party.address)?;
            w.end_element("AdministrativeCentre")?;
        }
        w.end_element("AdministrativeCentres")?;
    }

    match party.person_type {
        PersonType::Legal => {
            w.start_element("LegalEntity")?;
            w.text_element("CorporateName", &party.name)?;
            write_address(w, &party.address)?;
            write_contact(w, party.contact.as_ref())?;
            w.end_element("LegalEntity")?;
        }
        PersonType::Individual => {
            w.start_element("Individual")?;
            w.text_element("Name", &party.name)?;
            w.text_element("FirstSurname", party.first_surname.as_deref().unwrap_or(""))?;
            w.optional_element("SecondSurname", party.second_surname.as_deref())?;
            write_address(w, &party.address)?;
            write_contact(w, party.contact.as_ref())?;
            w.end_element("Individual")?;
        }
    }
    w.end_element(tag)?;
    Ok(())
}

fn write_address(w: &mut XmlWriter, address: &Address) -> Result<(), FacturaError> {
    if address.is_spanish() {
        w.start_element("AddressInSpain")?;
        w.text_element("Address", &address.street)?;
        w.text_element("PostCode", &address.postal_code)?;
        w.text_element("Town", &address.town)?;
        w.text_element("Province", &address.province)?;
        w.text_element("CountryCode", &address.country_code)?;
        w.end_element("AddressInSpain")?;
    } else {
        w.start_element("OverseasAddress")?;
        w.text_element("Address", &address.street)?;
        w.text_element(
            "PostCodeAndTown",
            &format!("{} {}", address.postal_code, address.town),
        )?;
        w.text_element("Province", &address.province)?;
        w.text_element("CountryCode", &address.country_code)?;
        w.end_element("OverseasAddress")?;
    }
    Ok(())
}

fn write_contact(w: &mut XmlWriter, contact: Option<&Contact>) -> Result<(), FacturaError> {
    let Some(contact) = contact else {
        return Ok(());
    };
    if contact.person.is_none() && contact.phone.is_none() && contact.email.is_none() {
        return Ok(());
    }
    w.start_element("ContactDetails")?;
    w.optional_element("Telephone", contact.phone.as_deref())?;
    w.optional_element("ElectronicMail", contact.email.as_deref())?;
    w.optional_element("ContactPersons", contact.person.as_deref())?;
    w.end_element("ContactDetails")?;
    Ok(())
}

fn write_tax(
    w: &mut XmlWriter,
    code: &str,
    rate: Decimal,
    base: Decimal,
    amount: Decimal,
    surcharge: Option<(Decimal, Decimal)>,
) -> Result<(), FacturaError> {
    w.start_element("Tax")?;
    w.text_element("TaxTypeCode", code)?;
    w.amount_element("TaxRate", rate)?;
    w.start_element("TaxableBase")?;
    w.amount_element("TotalAmount", base)?;
    w.end_element("TaxableBase")?;
    w.start_element("TaxAmount")?;
    w.amount_element("TotalAmount", amount)?;
    w.end_element("TaxAmount")?;
    if let Some((rate, amount)) = surcharge {
        w.amount_element("EquivalenceSurcharge", rate)?;
        w.start_element("EquivalenceSurchargeAmount")?;
        w.amount_element("TotalAmount", amount)?;
        w.end_element("EquivalenceSurchargeAmount")?;
    }
    w.end_element("Tax")?;
    Ok(())
}

fn percent_of(base: Decimal, rate: Decimal) -> Decimal {
    (base * rate / Decimal::ONE_HUNDRED).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn write_line(w: &mut XmlWriter, line: &LineItem) -> Result<(), FacturaError> {
    let total_cost = line.total_cost.unwrap_or(line.quantity * line.unit_price);
    let gross = line.gross_amount.unwrap_or(total_cost);

    w.start_element("InvoiceLine")?;
    w.text_element("ItemDescription", &line.description)?;
    w.text_element("Quantity", &format_price(line.quantity))?;
    w.text_element("UnitOfMeasure", "01")?;
    w.text_element("UnitPriceWithoutTax", &format_price(line.unit_price))?;
    w.amount_element("TotalCost", total_cost)?;

    if let (Some(rate), Some(amount)) = (line.discount_rate, line.discount_amount) {
        w.start_element("DiscountsAndRebates")?;
        w.start_element("Discount")?;
        w.text_element("DiscountReason", "Descuento")?;
        w.text_element("DiscountRate", &format_price(rate))?;
        w.amount_element("DiscountAmount", amount)?;
        w.end_element("Discount")?;
        w.end_element("DiscountsAndRebates")?;
    }
    w.amount_element("GrossAmount", gross)?;

    if let Some(rate) = line.withholding_rate {
        w.start_element("TaxesWithheld")?;
        write_tax(w, IRPF_TAX_CODE, rate, gross, percent_of(gross, rate), None)?;
        w.end_element("TaxesWithheld")?;
    }

    w.start_element("TaxesOutputs")?;
    write_tax(
        w,
        line.tax_type.code(),
        line.tax_rate,
        gross,
        percent_of(gross, line.tax_rate),
        line.surcharge_rate.map(|s| (s, percent_of(gross, s))),
    )?;
    w.end_element("TaxesOutputs")?;

    w.optional_element("ArticleCode", line.product_id.as_deref())?;
    w.end_element("InvoiceLine")?;
    Ok(())
}
