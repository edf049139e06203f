use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An issued (or received) invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice number, unique and gapless within its series.
    pub number: String,
    /// Series code, when the number itself does not carry it.
    pub series: Option<String>,
    /// Date of issue (fecha de expedición).
    pub issue_date: NaiveDate,
    /// Date the operation took place, when different from the issue date.
    pub operation_date: Option<NaiveDate>,
    /// Payment due date.
    pub due_date: Option<NaiveDate>,
    /// Complete, simplified or rectifying.
    pub kind: InvoiceKind,
    /// ISO 4217 currency code, "EUR" unless stated otherwise.
    pub currency_code: String,
    pub seller: Party,
    pub buyer: Party,
    pub lines: Vec<LineItem>,
    /// Free text printed as additional information.
    pub notes: Vec<String>,
    pub payment: Option<PaymentInstructions>,
    /// Reference to the invoice being rectified. Present iff `kind` is rectifying.
    pub corrective: Option<Corrective>,
    /// Amount already paid in advance.
    pub prepaid: Decimal,
    /// Calculated totals (set by `calculate_totals()`).
    pub totals: Option<Totals>,
}

impl Invoice {
    /// Series code followed by number, as reported to the tax agency.
    pub fn full_number(&self) -> String {
        match &self.series {
            Some(series) => format!("{series}{}", self.number),
            None => self.number.clone(),
        }
    }

    /// True when the buyer is a public administration addressed through DIR3 codes.
    pub fn is_b2g(&self) -> bool {
        !self.buyer.administrative_centres.is_empty()
    }
}

/// Invoice type as understood by Veri*Factu (TipoFactura) and Facturae.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceKind {
    /// F1 — complete invoice (art. 6 RD 1619/2012).
    Complete,
    /// F2 — simplified invoice (art. 7 RD 1619/2012).
    Simplified,
    /// R1..R5 — rectifying invoice.
    Rectifying(RectificationKind),
}

impl InvoiceKind {
    /// Veri*Factu TipoFactura code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Complete => "F1",
            Self::Simplified => "F2",
            Self::Rectifying(kind) => kind.code(),
        }
    }

    /// Parse from a Veri*Factu TipoFactura code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "F1" => Some(Self::Complete),
            "F2" => Some(Self::Simplified),
            other => RectificationKind::from_code(other).map(Self::Rectifying),
        }
    }

    /// Facturae InvoiceDocumentType: FC complete, FA simplified.
    pub fn document_type(&self) -> &'static str {
        match self {
            Self::Simplified | Self::Rectifying(RectificationKind::Simplified) => "FA",
            _ => "FC",
        }
    }

    /// Facturae InvoiceClass: OO original, OR rectifying.
    pub fn invoice_class(&self) -> &'static str {
        match self {
            Self::Rectifying(_) => "OR",
            _ => "OO",
        }
    }

    pub fn is_rectifying(&self) -> bool {
        matches!(self, Self::Rectifying(_))
    }
}

/// Legal ground of a rectifying invoice (art. 80 Ley 37/1992).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RectificationKind {
    /// R1 — error founded in law and art. 80 One, Two and Six.
    LegalError,
    /// R2 — art. 80 Three (insolvency proceedings).
    Insolvency,
    /// R3 — art. 80 Four (bad debts).
    BadDebt,
    /// R4 — any other cause.
    Other,
    /// R5 — rectification of a simplified invoice.
    Simplified,
}

impl RectificationKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::LegalError => "R1",
            Self::Insolvency => "R2",
            Self::BadDebt => "R3",
            Self::Other => "R4",
            Self::Simplified => "R5",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "R1" => Some(Self::LegalError),
            "R2" => Some(Self::Insolvency),
            "R3" => Some(Self::BadDebt),
            "R4" => Some(Self::Other),
            "R5" => Some(Self::Simplified),
            _ => None,
        }
    }
}

/// Seller or buyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    /// Corporate name, or given name for individuals.
    pub name: String,
    /// NIF / foreign tax identifier. Optional only for simplified-invoice buyers.
    pub tax_id: Option<String>,
    pub person_type: PersonType,
    pub residence: ResidenceType,
    /// Individuals only.
    pub first_surname: Option<String>,
    /// Individuals only.
    pub second_surname: Option<String>,
    pub address: Address,
    pub contact: Option<Contact>,
    /// DIR3 units (OC/OG/UT) for public-administration buyers.
    pub administrative_centres: Vec<AdministrativeCentre>,
}

impl Party {
    /// Name as printed: corporate name, or name plus surnames for individuals.
    pub fn display_name(&self) -> String {
        let mut out = self.name.clone();
        if self.person_type == PersonType::Individual {
            for surname in [&self.first_surname, &self.second_surname]
                .into_iter()
                .flatten()
            {
                out.push(' ');
                out.push_str(surname);
            }
        }
        out
    }

    pub fn centre(&self, role: CentreRole) -> Option<&AdministrativeCentre> {
        self.administrative_centres.iter().find(|c| c.role == role)
    }
}

/// Facturae PersonTypeCode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonType {
    /// J — legal entity.
    Legal,
    /// F — natural person.
    Individual,
}

impl PersonType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Legal => "J",
            Self::Individual => "F",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "J" => Some(Self::Legal),
            "F" => Some(Self::Individual),
            _ => None,
        }
    }
}

/// Facturae ResidenceTypeCode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResidenceType {
    /// R — resident in Spain.
    Resident,
    /// U — resident in another EU member state.
    EuResident,
    /// E — foreign (non-EU).
    Foreign,
}

impl ResidenceType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Resident => "R",
            Self::EuResident => "U",
            Self::Foreign => "E",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "R" => Some(Self::Resident),
            "U" => Some(Self::EuResident),
            "E" => Some(Self::Foreign),
            _ => None,
        }
    }
}

/// Postal address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub postal_code: String,
    pub town: String,
    pub province: String,
    /// ISO 3166-1 alpha-3, as Facturae requires (e.g. "ESP").
    pub country_code: String,
}

impl Address {
    pub fn is_spanish(&self) -> bool {
        self.country_code == "ESP"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// A DIR3 unit of a public-administration buyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdministrativeCentre {
    /// DIR3 code, e.g. "L01281230".
    pub code: String,
    pub role: CentreRole,
    pub name: Option<String>,
}

/// Facturae RoleTypeCode for administrative centres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CentreRole {
    /// 01 — Oficina contable (OC).
    AccountingOffice,
    /// 02 — Órgano gestor (OG).
    ManagementBody,
    /// 03 — Unidad tramitadora (UT).
    ProcessingUnit,
    /// 04 — Órgano proponente.
    ProposingBody,
}

impl CentreRole {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccountingOffice => "01",
            Self::ManagementBody => "02",
            Self::ProcessingUnit => "03",
            Self::ProposingBody => "04",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Self::AccountingOffice),
            "02" => Some(Self::ManagementBody),
            "03" => Some(Self::ProcessingUnit),
            "04" => Some(Self::ProposingBody),
            _ => None,
        }
    }

    /// Short label used on FACe forms.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AccountingOffice => "OC",
            Self::ManagementBody => "OG",
            Self::ProcessingUnit => "UT",
            Self::ProposingBody => "OP",
        }
    }
}

/// Invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    /// Unit price without taxes.
    pub unit_price: Decimal,
    /// Line discount percentage.
    pub discount_rate: Option<Decimal>,
    pub tax_type: TaxType,
    /// Output tax rate percentage (e.g. 21).
    pub tax_rate: Decimal,
    /// Recargo de equivalencia percentage.
    pub surcharge_rate: Option<Decimal>,
    /// IRPF withholding percentage.
    pub withholding_rate: Option<Decimal>,
    /// Catalogue product this line was taken from.
    pub product_id: Option<String>,
    /// quantity × unit_price, rounded. Set by `calculate_totals()`.
    pub total_cost: Option<Decimal>,
    /// Discount amount. Set by `calculate_totals()`.
    pub discount_amount: Option<Decimal>,
    /// total_cost − discount_amount. Set by `calculate_totals()`.
    pub gross_amount: Option<Decimal>,
}

/// Indirect tax applied to a line (Facturae TaxTypeCode / Veri*Factu Impuesto).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxType {
    /// 01 — IVA.
    Iva,
    /// 02 — IPSI (Ceuta and Melilla).
    Ipsi,
    /// 03 — IGIC (Canary Islands).
    Igic,
}

impl TaxType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Iva => "01",
            Self::Ipsi => "02",
            Self::Igic => "03",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Self::Iva),
            "02" => Some(Self::Ipsi),
            "03" => Some(Self::Igic),
            _ => None,
        }
    }
}

/// Facturae code for IRPF in TaxesWithheld.
pub const IRPF_TAX_CODE: &str = "04";

/// Calculated totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Totals {
    /// Sum of line gross amounts (after line discounts).
    pub total_gross_amount: Decimal,
    /// Sum of line discounts.
    pub total_line_discounts: Decimal,
    /// Taxable amount of the whole invoice.
    pub gross_before_taxes: Decimal,
    /// Output taxes including equivalence surcharge.
    pub total_tax_outputs: Decimal,
    /// IRPF withheld.
    pub total_taxes_withheld: Decimal,
    /// gross_before_taxes + total_tax_outputs − total_taxes_withheld.
    pub invoice_total: Decimal,
    pub prepaid: Decimal,
    /// invoice_total − prepaid.
    pub total_outstanding: Decimal,
    pub taxes: Vec<TaxBreakdown>,
    pub withholdings: Vec<WithholdingBreakdown>,
}

impl Totals {
    /// Taxable base plus output taxes, ignoring withholdings (Veri*Factu ImporteTotal).
    pub fn amount_with_taxes(&self) -> Decimal {
        self.gross_before_taxes + self.total_tax_outputs
    }
}

/// Output tax per (type, rate, surcharge) group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub tax_type: TaxType,
    pub rate: Decimal,
    pub taxable_base: Decimal,
    pub tax_amount: Decimal,
    pub surcharge_rate: Option<Decimal>,
    pub surcharge_amount: Option<Decimal>,
}

/// Withholding per rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithholdingBreakdown {
    pub rate: Decimal,
    pub taxable_base: Decimal,
    pub amount: Decimal,
}

/// Payment instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInstructions {
    pub means: PaymentMeans,
    /// Account to be credited.
    pub iban: Option<String>,
    pub bic: Option<String>,
}

/// Facturae PaymentMeans codes (subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMeans {
    /// 01 — Cash.
    Cash,
    /// 02 — Direct debit.
    DirectDebit,
    /// 04 — Credit transfer.
    Transfer,
    /// 11 — Cheque.
    Cheque,
    /// 19 — Card payment.
    Card,
    /// Other code value.
    Other(u8),
}

impl PaymentMeans {
    pub fn code(&self) -> String {
        let n = match self {
            Self::Cash => 1,
            Self::DirectDebit => 2,
            Self::Transfer => 4,
            Self::Cheque => 11,
            Self::Card => 19,
            Self::Other(c) => *c,
        };
        format!("{n:02}")
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let n: u8 = code.trim().parse().ok()?;
        Some(match n {
            1 => Self::Cash,
            2 => Self::DirectDebit,
            4 => Self::Transfer,
            11 => Self::Cheque,
            19 => Self::Card,
            c => Self::Other(c),
        })
    }
}

/// Period of the operations being invoiced or rectified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Link from a rectifying invoice to the invoice it corrects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corrective {
    pub original_number: String,
    pub original_series: Option<String>,
    pub original_issue_date: NaiveDate,
    pub reason: CorrectionReason,
    pub method: CorrectionMethod,
    pub kind: RectificationKind,
    pub period: Option<Period>,
    /// Base of the original invoice (substitution rectifications).
    pub original_base: Option<Decimal>,
    /// Tax of the original invoice (substitution rectifications).
    pub original_tax: Option<Decimal>,
}

impl Corrective {
    /// Build the corrective block pointing at `original`.
    pub fn for_invoice(
        original: &Invoice,
        reason: CorrectionReason,
        method: CorrectionMethod,
        kind: RectificationKind,
    ) -> Self {
        let (original_base, original_tax) = match (&original.totals, method) {
            (Some(t), CorrectionMethod::Full) => {
                (Some(t.gross_before_taxes), Some(t.total_tax_outputs))
            }
            _ => (None, None),
        };
        Self {
            original_number: original.number.clone(),
            original_series: original.series.clone(),
            original_issue_date: original.issue_date,
            reason,
            method,
            kind,
            period: None,
            original_base,
            original_tax,
        }
    }

    pub fn original_full_number(&self) -> String {
        match &self.original_series {
            Some(series) => format!("{series}{}", self.original_number),
            None => self.original_number.clone(),
        }
    }
}

/// Facturae CorrectionMethod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionMethod {
    /// 01 — Full rectification (substitution).
    Full,
    /// 02 — Rectification by differences.
    Differences,
    /// 03 — Rectification by volume discount.
    VolumeDiscount,
    /// 04 — Authorised by the tax agency.
    Authorized,
}

impl CorrectionMethod {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Full => "01",
            Self::Differences => "02",
            Self::VolumeDiscount => "03",
            Self::Authorized => "04",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Self::Full),
            "02" => Some(Self::Differences),
            "03" => Some(Self::VolumeDiscount),
            "04" => Some(Self::Authorized),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Full => "Rectificación íntegra",
            Self::Differences => "Rectificación por diferencias",
            Self::VolumeDiscount => "Rectificación por descuento por volumen de operaciones durante un periodo",
            Self::Authorized => "Autorizadas por la Agencia Tributaria",
        }
    }

    /// Veri*Factu TipoRectificativa: S substitution, I differences.
    pub fn verifactu_code(&self) -> &'static str {
        match self {
            Self::Full => "S",
            _ => "I",
        }
    }
}

/// Facturae ReasonCode for rectifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionReason {
    InvoiceNumber,
    InvoiceSeries,
    IssueDate,
    IssuerName,
    ReceiverName,
    IssuerTaxId,
    ReceiverTaxId,
    IssuerAddress,
    ReceiverAddress,
    OperationDetail,
    TaxRate,
    TaxAmount,
    Period,
    InvoiceClass,
    LegalLiterals,
    TaxableBase,
    OutputTaxCalculation,
    WithheldTaxCalculation,
    ReturnedPackaging,
    Discounts,
    CourtRuling,
    UnpaidOutputTax,
}

impl CorrectionReason {
    const TABLE: [(Self, &'static str, &'static str); 22] = [
        (Self::InvoiceNumber, "01", "Número de la factura"),
        (Self::InvoiceSeries, "02", "Serie de la factura"),
        (Self::IssueDate, "03", "Fecha expedición"),
        (Self::IssuerName, "04", "Nombre y apellidos/Razón Social-Emisor"),
        (Self::ReceiverName, "05", "Nombre y apellidos/Razón Social-Receptor"),
        (Self::IssuerTaxId, "06", "Identificación fiscal Emisor/obligado"),
        (Self::ReceiverTaxId, "07", "Identificación fiscal Receptor"),
        (Self::IssuerAddress, "08", "Domicilio Emisor/Obligado"),
        (Self::ReceiverAddress, "09", "Domicilio Receptor"),
        (Self::OperationDetail, "10", "Detalle Operación"),
        (Self::TaxRate, "11", "Porcentaje impositivo a aplicar"),
        (Self::TaxAmount, "12", "Cuota tributaria a aplicar"),
        (Self::Period, "13", "Fecha/Periodo a aplicar"),
        (Self::InvoiceClass, "14", "Clase de factura"),
        (Self::LegalLiterals, "15", "Literales legales"),
        (Self::TaxableBase, "16", "Base imponible"),
        (Self::OutputTaxCalculation, "80", "Cálculo de cuotas repercutidas"),
        (Self::WithheldTaxCalculation, "81", "Cálculo de cuotas retenidas"),
        (Self::ReturnedPackaging, "82", "Base imponible modificada por devolución de envases / embalajes"),
        (Self::Discounts, "83", "Base imponible modificada por descuentos y bonificaciones"),
        (Self::CourtRuling, "84", "Base imponible modificada por resolución firme, judicial o administrativa"),
        (Self::UnpaidOutputTax, "85", "Base imponible modificada cuotas repercutidas no satisfechas. Auto de declaración de concurso"),
    ];

    pub fn code(&self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(r, _, _)| r == self)
            .map(|(_, code, _)| *code)
            .unwrap_or("16")
    }

    pub fn description(&self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(r, _, _)| r == self)
            .map(|(_, _, desc)| *desc)
            .unwrap_or_default()
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(r, _, _)| *r)
    }
}
