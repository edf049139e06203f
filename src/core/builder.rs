use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::error::FacturaError;
use super::types::*;
use super::validation;

/// Builder for constructing valid invoices.
///
/// ```
/// use facturador::core::*;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let invoice = InvoiceBuilder::new("F2024-0001", NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
///     .seller(PartyBuilder::new("Acme SL", AddressBuilder::new("Calle Mayor 1", "28013", "Madrid", "Madrid").build())
///         .tax_id("B12345674")
///         .build())
///     .buyer(PartyBuilder::new("Cliente SA", AddressBuilder::new("Gran Via 2", "08001", "Barcelona", "Barcelona").build())
///         .tax_id("A58818501")
///         .build())
///     .add_line(LineItemBuilder::new("Consultoría", dec!(10), dec!(60)).build())
///     .build()
///     .unwrap();
/// assert_eq!(invoice.totals.unwrap().invoice_total, dec!(726.00));
/// ```
pub struct InvoiceBuilder {
    number: String,
    series: Option<String>,
    issue_date: NaiveDate,
    operation_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    kind: InvoiceKind,
    currency_code: String,
    seller: Option<Party>,
    buyer: Option<Party>,
    lines: Vec<LineItem>,
    notes: Vec<String>,
    payment: Option<PaymentInstructions>,
    corrective: Option<Corrective>,
    prepaid: Decimal,
}

impl InvoiceBuilder {
    pub fn new(number: impl Into<String>, issue_date: NaiveDate) -> Self {
        Self {
            number: number.into(),
            series: None,
            issue_date,
            operation_date: None,
            due_date: None,
            kind: InvoiceKind::Complete,
            currency_code: "EUR".to_string(),
            seller: None,
            buyer: None,
            lines: Vec::new(),
            notes: Vec::new(),
            payment: None,
            corrective: None,
            prepaid: Decimal::ZERO,
        }
    }

    pub fn series(mut self, series: impl Into<String>) -> Self {
        self.series = Some(series.into());
        self
    }

    pub fn operation_date(mut self, date: NaiveDate) -> Self {
        self.operation_date = Some(date);
        self
    }

    pub fn due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn kind(mut self, kind: InvoiceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn currency(mut self, code: impl Into<String>) -> Self {
        self.currency_code = code.into();
        self
    }

    pub fn seller(mut self, party: Party) -> Self {
        self.seller = Some(party);
        self
    }

    pub fn buyer(mut self, party: Party) -> Self {
        self.buyer = Some(party);
        self
    }

    pub fn add_line(mut self, line: LineItem) -> Self {
        self.lines.push(line);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn payment(mut self, payment: PaymentInstructions) -> Self {
        self.payment = Some(payment);
        self
    }

    /// Mark the invoice as rectifying `corrective`; the kind follows the corrective block.
    pub fn corrects(mut self, corrective: Corrective) -> Self {
        self.kind = InvoiceKind::Rectifying(corrective.kind);
        self.corrective = Some(corrective);
        self
    }

    pub fn prepaid(mut self, amount: Decimal) -> Self {
        self.prepaid = amount;
        self
    }

    /// Build the invoice, calculating totals and running validation.
    /// Returns all validation errors (not just the first).
    pub fn build(self) -> Result<Invoice, FacturaError> {
        if self.lines.is_empty() {
            return Err(FacturaError::Builder(
                "at least one line item is required".into(),
            ));
        }
        if self.lines.len() > 10_000 {
            return Err(FacturaError::Builder(
                "invoice cannot have more than 10,000 line items".into(),
            ));
        }
        // Veri*Factu NumSerieFactura is limited to 60 characters.
        if self.number.len() > 60 {
            return Err(FacturaError::Builder(
                "invoice number cannot exceed 60 characters".into(),
            ));
        }
        if self.notes.len() > 100 {
            return Err(FacturaError::Builder(
                "invoice cannot have more than 100 notes".into(),
            ));
        }

        let invoice = self.build_unchecked()?;

        let errors = validation::validate_invoice(&invoice);
        if !errors.is_empty() {
            let msg = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FacturaError::Validation(msg));
        }

        Ok(invoice)
    }

    /// Build without validation — used when importing received invoices.
    pub fn build_unchecked(self) -> Result<Invoice, FacturaError> {
        let seller = self
            .seller
            .ok_or_else(|| FacturaError::Builder("seller is required".into()))?;
        let buyer = self
            .buyer
            .ok_or_else(|| FacturaError::Builder("buyer is required".into()))?;

        let mut invoice = Invoice {
            number: self.number,
            series: self.series,
            issue_date: self.issue_date,
            operation_date: self.operation_date,
            due_date: self.due_date,
            kind: self.kind,
            currency_code: self.currency_code,
            seller,
            buyer,
            lines: self.lines,
            notes: self.notes,
            payment: self.payment,
            corrective: self.corrective,
            prepaid: self.prepaid,
            totals: None,
        };

        validation::calculate_totals(&mut invoice)?;
        Ok(invoice)
    }
}

/// Builder for Party (seller/buyer).
pub struct PartyBuilder {
    name: String,
    tax_id: Option<String>,
    person_type: PersonType,
    residence: ResidenceType,
    first_surname: Option<String>,
    second_surname: Option<String>,
    address: Address,
    contact: Option<Contact>,
    administrative_centres: Vec<AdministrativeCentre>,
}

impl PartyBuilder {
    /// A Spanish-resident legal entity; adjust with the setters below.
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        let residence = if address.is_spanish() {
            ResidenceType::Resident
        } else {
            ResidenceType::Foreign
        };
        Self {
            name: name.into(),
            tax_id: None,
            person_type: PersonType::Legal,
            residence,
            first_surname: None,
            second_surname: None,
            address,
            contact: None,
            administrative_centres: Vec::new(),
        }
    }

    pub fn tax_id(mut self, id: impl Into<String>) -> Self {
        self.tax_id = Some(id.into());
        self
    }

    /// Natural person with the given surnames.
    pub fn individual(
        mut self,
        first_surname: impl Into<String>,
        second_surname: Option<String>,
    ) -> Self {
        self.person_type = PersonType::Individual;
        self.first_surname = Some(first_surname.into());
        self.second_surname = second_surname;
        self
    }

    pub fn residence(mut self, residence: ResidenceType) -> Self {
        self.residence = residence;
        self
    }

    pub fn contact(
        mut self,
        person: Option<String>,
        phone: Option<String>,
        email: Option<String>,
    ) -> Self {
        self.contact = Some(Contact {
            person,
            phone,
            email,
        });
        self
    }

    /// Add a DIR3 unit (public-administration buyers).
    pub fn centre(mut self, role: CentreRole, code: impl Into<String>) -> Self {
        self.administrative_centres.push(AdministrativeCentre {
            code: code.into(),
            role,
            name: None,
        });
        self
    }

    /// Add the three DIR3 units FACe requires in one go.
    pub fn dir3(
        self,
        accounting_office: impl Into<String>,
        management_body: impl Into<String>,
        processing_unit: impl Into<String>,
    ) -> Self {
        self.centre(CentreRole::AccountingOffice, accounting_office)
            .centre(CentreRole::ManagementBody, management_body)
            .centre(CentreRole::ProcessingUnit, processing_unit)
    }

    pub fn build(self) -> Party {
        Party {
            name: self.name,
            tax_id: self.tax_id,
            person_type: self.person_type,
            residence: self.residence,
            first_surname: self.first_surname,
            second_surname: self.second_surname,
            address: self.address,
            contact: self.contact,
            administrative_centres: self.administrative_centres,
        }
    }
}

/// Builder for Address. Country defaults to Spain.
pub struct AddressBuilder {
    street: String,
    postal_code: String,
    town: String,
    province: String,
    country_code: String,
}

impl AddressBuilder {
    pub fn new(
        street: impl Into<String>,
        postal_code: impl Into<String>,
        town: impl Into<String>,
        province: impl Into<String>,
    ) -> Self {
        Self {
            street: street.into(),
            postal_code: postal_code.into(),
            town: town.into(),
            province: province.into(),
            country_code: "ESP".to_string(),
        }
    }

    /// ISO 3166-1 alpha-3 country code.
    pub fn country(mut self, code: impl Into<String>) -> Self {
        self.country_code = code.into();
        self
    }

    pub fn build(self) -> Address {
        Address {
            street: self.street,
            postal_code: self.postal_code,
            town: self.town,
            province: self.province,
            country_code: self.country_code,
        }
    }
}

/// Builder for LineItem. Defaults to IVA at 21 %.
pub struct LineItemBuilder {
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    discount_rate: Option<Decimal>,
    tax_type: TaxType,
    tax_rate: Decimal,
    surcharge_rate: Option<Decimal>,
    withholding_rate: Option<Decimal>,
    product_id: Option<String>,
}

impl LineItemBuilder {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            discount_rate: None,
            tax_type: TaxType::Iva,
            tax_rate: Decimal::new(21, 0),
            surcharge_rate: None,
            withholding_rate: None,
            product_id: None,
        }
    }

    pub fn tax(mut self, tax_type: TaxType, rate: Decimal) -> Self {
        self.tax_type = tax_type;
        self.tax_rate = rate;
        self
    }

    pub fn discount(mut self, rate: Decimal) -> Self {
        self.discount_rate = Some(rate);
        self
    }

    pub fn surcharge(mut self, rate: Decimal) -> Self {
        self.surcharge_rate = Some(rate);
        self
    }

    pub fn withholding(mut self, rate: Decimal) -> Self {
        self.withholding_rate = Some(rate);
        self
    }

    pub fn product(mut self, id: impl Into<String>) -> Self {
        self.product_id = Some(id.into());
        self
    }

    pub fn build(self) -> LineItem {
        LineItem {
            description: self.description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount_rate: self.discount_rate,
            tax_type: self.tax_type,
            tax_rate: self.tax_rate,
            surcharge_rate: self.surcharge_rate,
            withholding_rate: self.withholding_rate,
            product_id: self.product_id,
            total_cost: None,
            discount_amount: None,
            gross_amount: None,
        }
    }
}
