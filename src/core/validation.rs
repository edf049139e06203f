use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use super::error::{FacturaError, ValidationError};
use super::nif::validate_nif;
use super::types::*;

/// Simplified invoices are capped at 3 000 € (art. 4.1 RD 1619/2012).
pub const SIMPLIFIED_INVOICE_LIMIT: Decimal = dec!(3000);

/// Validate an invoice against the content rules of RD 1619/2012 and the
/// FACe addressing rules for public-administration buyers.
/// Returns all validation errors found (not just the first).
pub fn validate_invoice(invoice: &Invoice) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if invoice.number.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            "number",
            "invoice number must not be empty",
            "RD1619/2012 art.6.1.a",
        ));
    }

    if invoice.currency_code.len() != 3
        || !invoice
            .currency_code
            .chars()
            .all(|c| c.is_ascii_uppercase())
    {
        errors.push(ValidationError::new(
            "currency_code",
            format!(
                "currency code must be 3 uppercase letters (ISO 4217), got '{}'",
                invoice.currency_code
            ),
        ));
    }

    if let Some(due) = invoice.due_date {
        if due < invoice.issue_date {
            errors.push(ValidationError::new(
                "due_date",
                format!("due date {due} is before issue date {}", invoice.issue_date),
            ));
        }
    }

    validate_party(&invoice.seller, "seller", true, &mut errors);
    let buyer_id_required = !matches!(
        invoice.kind,
        InvoiceKind::Simplified | InvoiceKind::Rectifying(RectificationKind::Simplified)
    );
    validate_party(&invoice.buyer, "buyer", buyer_id_required, &mut errors);

    if invoice.is_b2g() {
        validate_dir3_centres(&invoice.buyer, &mut errors);
    }

    validate_kind(invoice, &mut errors);

    for (i, line) in invoice.lines.iter().enumerate() {
        validate_line(line, i, &mut errors);
    }
    if invoice.lines.is_empty() {
        errors.push(ValidationError::new(
            "lines",
            "invoice must have at least one line item",
        ));
    }

    errors.extend(validate_arithmetic(invoice));

    errors
}

/// Validate totals against the lines they were calculated from.
pub fn validate_arithmetic(invoice: &Invoice) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let Some(totals) = &invoice.totals else {
        errors.push(ValidationError::new(
            "totals",
            "totals must be calculated before validation (call calculate_totals first)",
        ));
        return errors;
    };

    let expected_gross: Decimal = invoice.lines.iter().filter_map(|l| l.gross_amount).sum();
    if totals.total_gross_amount != expected_gross {
        errors.push(ValidationError::new(
            "totals.total_gross_amount",
            format!(
                "total gross amount {} does not match sum of line amounts {}",
                totals.total_gross_amount, expected_gross
            ),
        ));
    }

    let breakdown_outputs: Decimal = totals
        .taxes
        .iter()
        .map(|t| t.tax_amount + t.surcharge_amount.unwrap_or(Decimal::ZERO))
        .sum();
    if totals.total_tax_outputs != breakdown_outputs {
        errors.push(ValidationError::new(
            "totals.total_tax_outputs",
            format!(
                "tax outputs {} do not match breakdown sum {}",
                totals.total_tax_outputs, breakdown_outputs
            ),
        ));
    }

    let breakdown_withheld: Decimal = totals.withholdings.iter().map(|w| w.amount).sum();
    if totals.total_taxes_withheld != breakdown_withheld {
        errors.push(ValidationError::new(
            "totals.total_taxes_withheld",
            format!(
                "taxes withheld {} do not match breakdown sum {}",
                totals.total_taxes_withheld, breakdown_withheld
            ),
        ));
    }

    let expected_total =
        totals.gross_before_taxes + totals.total_tax_outputs - totals.total_taxes_withheld;
    if totals.invoice_total != expected_total {
        errors.push(ValidationError::new(
            "totals.invoice_total",
            format!(
                "invoice total {} does not match base {} + taxes {} - withheld {}",
                totals.invoice_total,
                totals.gross_before_taxes,
                totals.total_tax_outputs,
                totals.total_taxes_withheld
            ),
        ));
    }

    if totals.total_outstanding != totals.invoice_total - totals.prepaid {
        errors.push(ValidationError::new(
            "totals.total_outstanding",
            format!(
                "outstanding {} does not match total {} - prepaid {}",
                totals.total_outstanding, totals.invoice_total, totals.prepaid
            ),
        ));
    }

    errors
}

fn overflow(what: &str) -> FacturaError {
    FacturaError::Validation(format!("{what} exceeds the representable amount range"))
}

fn checked_sum(values: impl IntoIterator<Item = Decimal>, what: &str) -> Result<Decimal, FacturaError> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or_else(|| overflow(what))
}

/// `rate` percent of `base`, rounded to cents.
fn percent_of(base: Decimal, rate: Decimal, what: &str) -> Result<Decimal, FacturaError> {
    base.checked_mul(rate)
        .and_then(|v| v.checked_div(dec!(100)))
        .map(|v| round_half_up(v, 2))
        .ok_or_else(|| overflow(what))
}

/// Calculate line amounts, tax breakdowns and document totals.
///
/// Fails with [`FacturaError::Validation`] instead of overflowing when
/// quantities, prices or rates are too large to total.
pub fn calculate_totals(invoice: &mut Invoice) -> Result<(), FacturaError> {
    for (i, line) in invoice.lines.iter_mut().enumerate() {
        let what = format!("line {}", i + 1);
        let total_cost = line
            .quantity
            .checked_mul(line.unit_price)
            .map(|v| round_half_up(v, 2))
            .ok_or_else(|| overflow(&what))?;
        let discount = match line.discount_rate {
            Some(rate) => percent_of(total_cost, rate, &what)?,
            None => Decimal::ZERO,
        };
        line.total_cost = Some(total_cost);
        line.discount_amount = line.discount_rate.map(|_| discount);
        line.gross_amount = Some(total_cost.checked_sub(discount).ok_or_else(|| overflow(&what))?);
    }

    let total_gross_amount = checked_sum(
        invoice.lines.iter().filter_map(|l| l.gross_amount),
        "invoice gross amount",
    )?;
    let total_line_discounts = checked_sum(
        invoice.lines.iter().filter_map(|l| l.discount_amount),
        "invoice discounts",
    )?;
    let gross_before_taxes = total_gross_amount;

    // Group output taxes by (type, rate, surcharge) and withholdings by rate
    let mut tax_groups: HashMap<(TaxType, Decimal, Option<Decimal>), Decimal> = HashMap::new();
    let mut withholding_groups: HashMap<Decimal, Decimal> = HashMap::new();
    for line in &invoice.lines {
        let base = line.gross_amount.unwrap_or(Decimal::ZERO);
        let group = tax_groups
            .entry((
                line.tax_type,
                line.tax_rate.normalize(),
                line.surcharge_rate.map(|s| s.normalize()),
            ))
            .or_insert(Decimal::ZERO);
        *group = group.checked_add(base).ok_or_else(|| overflow("taxable base"))?;
        if let Some(rate) = line.withholding_rate.filter(|r| !r.is_zero()) {
            let group = withholding_groups
                .entry(rate.normalize())
                .or_insert(Decimal::ZERO);
            *group = group.checked_add(base).ok_or_else(|| overflow("withholding base"))?;
        }
    }

    let mut taxes = Vec::with_capacity(tax_groups.len());
    for ((tax_type, rate, surcharge_rate), taxable_base) in tax_groups {
        taxes.push(TaxBreakdown {
            tax_type,
            rate,
            taxable_base,
            tax_amount: percent_of(taxable_base, rate, "tax amount")?,
            surcharge_rate,
            surcharge_amount: surcharge_rate
                .map(|s| percent_of(taxable_base, s, "surcharge amount"))
                .transpose()?,
        });
    }
    taxes.sort_by(|a, b| {
        a.tax_type
            .code()
            .cmp(b.tax_type.code())
            .then(a.rate.cmp(&b.rate))
            .then(a.surcharge_rate.cmp(&b.surcharge_rate))
    });

    let mut withholdings = Vec::with_capacity(withholding_groups.len());
    for (rate, taxable_base) in withholding_groups {
        withholdings.push(WithholdingBreakdown {
            rate,
            taxable_base,
            amount: percent_of(taxable_base, rate, "withholding amount")?,
        });
    }
    withholdings.sort_by(|a, b| a.rate.cmp(&b.rate));

    let total_tax_outputs = checked_sum(
        taxes
            .iter()
            .flat_map(|t| [t.tax_amount, t.surcharge_amount.unwrap_or(Decimal::ZERO)]),
        "output taxes",
    )?;
    let total_taxes_withheld = checked_sum(withholdings.iter().map(|w| w.amount), "withholdings")?;
    let invoice_total = gross_before_taxes
        .checked_add(total_tax_outputs)
        .and_then(|v| v.checked_sub(total_taxes_withheld))
        .ok_or_else(|| overflow("invoice total"))?;
    let total_outstanding = invoice_total
        .checked_sub(invoice.prepaid)
        .ok_or_else(|| overflow("outstanding amount"))?;

    invoice.totals = Some(Totals {
        total_gross_amount,
        total_line_discounts,
        gross_before_taxes,
        total_tax_outputs,
        total_taxes_withheld,
        invoice_total,
        prepaid: invoice.prepaid,
        total_outstanding,
        taxes,
        withholdings,
    });
    Ok(())
}

pub(crate) fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// DIR3 unit codes: 9 characters, a leading uppercase letter and alphanumerics.
///
/// Examples: "L01281230" (local entity), "EA0008547" (state agency),
/// "A01002820" (autonomous community), "GE0000001".
pub fn is_valid_dir3(code: &str) -> bool {
    let code = code.trim();
    code.len() == 9
        && code.as_bytes()[0].is_ascii_uppercase()
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

fn validate_party(party: &Party, prefix: &str, id_required: bool, errors: &mut Vec<ValidationError>) {
    if party.name.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.name"),
            "name must not be empty",
            "RD1619/2012 art.6.1.c",
        ));
    }
    if party.person_type == PersonType::Individual
        && party
            .first_surname
            .as_deref()
            .is_none_or(|s| s.trim().is_empty())
    {
        errors.push(ValidationError::new(
            format!("{prefix}.first_surname"),
            "individuals must have a first surname",
        ));
    }

    match party.tax_id.as_deref().map(str::trim) {
        None | Some("") => {
            if id_required {
                errors.push(ValidationError::with_rule(
                    format!("{prefix}.tax_id"),
                    "tax identifier (NIF) is required",
                    "RD1619/2012 art.6.1.d",
                ));
            }
        }
        Some(id) if party.residence == ResidenceType::Resident => {
            if let Err(e) = validate_nif(id) {
                errors.push(ValidationError::with_rule(
                    format!("{prefix}.tax_id"),
                    e.to_string(),
                    "RD1619/2012 art.6.1.d",
                ));
            }
        }
        Some(_) => {}
    }

    let address = &party.address;
    if address.town.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.address.town"),
            "town must not be empty",
            "RD1619/2012 art.6.1.e",
        ));
    }
    if address.country_code.len() != 3
        || !address.country_code.chars().all(|c| c.is_ascii_uppercase())
    {
        errors.push(ValidationError::new(
            format!("{prefix}.address.country_code"),
            format!(
                "country code must be ISO 3166-1 alpha-3 (e.g. ESP), got '{}'",
                address.country_code
            ),
        ));
    }
    if address.is_spanish()
        && (address.postal_code.len() != 5
            || !address.postal_code.chars().all(|c| c.is_ascii_digit()))
    {
        errors.push(ValidationError::new(
            format!("{prefix}.address.postal_code"),
            format!(
                "Spanish postal code must be 5 digits, got '{}'",
                address.postal_code
            ),
        ));
    }
}

fn validate_dir3_centres(buyer: &Party, errors: &mut Vec<ValidationError>) {
    for role in [
        CentreRole::AccountingOffice,
        CentreRole::ManagementBody,
        CentreRole::ProcessingUnit,
    ] {
        if buyer.centre(role).is_none() {
            errors.push(ValidationError::with_rule(
                "buyer.administrative_centres",
                format!("public-administration buyer is missing its {} DIR3 unit", role.label()),
                "HAP/1074/2014 art.7",
            ));
        }
    }
    for (i, centre) in buyer.administrative_centres.iter().enumerate() {
        if !is_valid_dir3(&centre.code) {
            errors.push(ValidationError::with_rule(
                format!("buyer.administrative_centres[{i}].code"),
                format!("'{}' is not a valid DIR3 code", centre.code),
                "HAP/1074/2014 art.7",
            ));
        }
    }
}

fn validate_kind(invoice: &Invoice, errors: &mut Vec<ValidationError>) {
    match (&invoice.kind, &invoice.corrective) {
        (InvoiceKind::Rectifying(kind), Some(corrective)) => {
            if corrective.kind != *kind {
                errors.push(ValidationError::new(
                    "corrective.kind",
                    format!(
                        "rectification kind {} does not match invoice kind {}",
                        corrective.kind.code(),
                        kind.code()
                    ),
                ));
            }
            if corrective.original_number.trim().is_empty() {
                errors.push(ValidationError::with_rule(
                    "corrective.original_number",
                    "rectifying invoice must reference the rectified invoice",
                    "RD1619/2012 art.15",
                ));
            }
            if corrective.original_issue_date > invoice.issue_date {
                errors.push(ValidationError::new(
                    "corrective.original_issue_date",
                    "rectified invoice cannot be issued after the rectifying invoice",
                ));
            }
        }
        (InvoiceKind::Rectifying(_), None) => {
            errors.push(ValidationError::with_rule(
                "corrective",
                "rectifying invoice must reference the rectified invoice",
                "RD1619/2012 art.15",
            ));
        }
        (_, Some(_)) => {
            errors.push(ValidationError::new(
                "corrective",
                "only rectifying invoices may carry a corrective reference",
            ));
        }
        (_, None) => {}
    }

    if invoice.kind == InvoiceKind::Simplified {
        if let Some(totals) = &invoice.totals {
            if totals.invoice_total > SIMPLIFIED_INVOICE_LIMIT {
                errors.push(ValidationError::with_rule(
                    "kind",
                    format!(
                        "simplified invoices cannot exceed {SIMPLIFIED_INVOICE_LIMIT} €, total is {}",
                        totals.invoice_total
                    ),
                    "RD1619/2012 art.4.1",
                ));
            }
        }
    }
}

fn validate_line(line: &LineItem, index: usize, errors: &mut Vec<ValidationError>) {
    let prefix = format!("lines[{index}]");

    if line.description.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.description"),
            "line description must not be empty",
            "RD1619/2012 art.6.1.f",
        ));
    }
    if line.quantity.is_zero() {
        errors.push(ValidationError::new(
            format!("{prefix}.quantity"),
            "quantity must not be zero",
        ));
    }
    if line.unit_price.is_sign_negative() {
        errors.push(ValidationError::new(
            format!("{prefix}.unit_price"),
            "unit price must not be negative (use a negative quantity for returns)",
        ));
    }
    for (field, value) in [
        ("tax_rate", Some(line.tax_rate)),
        ("discount_rate", line.discount_rate),
        ("surcharge_rate", line.surcharge_rate),
        ("withholding_rate", line.withholding_rate),
    ] {
        if let Some(rate) = value {
            if rate < Decimal::ZERO || rate > dec!(100) {
                errors.push(ValidationError::new(
                    format!("{prefix}.{field}"),
                    format!("{field} must be between 0 and 100, got {rate}"),
                ));
            }
        }
    }
}
