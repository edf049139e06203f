use chrono::NaiveDate;
use facturador::core::*;
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn seller() -> Party {
    PartyBuilder::new(
        "Ejemplo Servicios SL",
        AddressBuilder::new("Calle Mayor 1", "28013", "Madrid", "Madrid").build(),
    )
    .tax_id("B12345674")
    .contact(
        Some("Ana García".into()),
        Some("+34 910 000 000".into()),
        Some("facturas@ejemplo.es".into()),
    )
    .build()
}

fn buyer() -> Party {
    PartyBuilder::new(
        "Cliente SA",
        AddressBuilder::new("Gran Vía 2", "48001", "Bilbao", "Bizkaia").build(),
    )
    .tax_id("A58818501")
    .build()
}

fn ayuntamiento() -> Party {
    PartyBuilder::new(
        "Ayuntamiento de Ejemplo",
        AddressBuilder::new("Plaza Mayor 1", "28001", "Madrid", "Madrid").build(),
    )
    .tax_id("P2807900B")
    .dir3("L01280796", "L01280796", "L01280796")
    .build()
}

// --- Complete invoices ---

#[test]
fn complete_invoice_totals() {
    let inv = InvoiceBuilder::new("0001", date(2024, 6, 15))
        .series("F2024-")
        .due_date(date(2024, 7, 15))
        .seller(seller())
        .buyer(buyer())
        .add_line(LineItemBuilder::new("Desarrollo de software", dec!(80), dec!(45)).build())
        .add_line(
            LineItemBuilder::new("Libros", dec!(2), dec!(25))
                .tax(TaxType::Iva, dec!(4))
                .build(),
        )
        .build()
        .unwrap();

    assert_eq!(inv.full_number(), "F2024-0001");
    assert_eq!(inv.kind.code(), "F1");
    let totals = inv.totals.as_ref().unwrap();
    assert_eq!(totals.gross_before_taxes, dec!(3650.00));
    assert_eq!(totals.taxes.len(), 2);
    // Breakdown is ordered by tax type, then rate.
    assert_eq!(totals.taxes[0].rate, dec!(4));
    assert_eq!(totals.taxes[0].tax_amount, dec!(2.00));
    assert_eq!(totals.taxes[1].rate, dec!(21));
    assert_eq!(totals.taxes[1].tax_amount, dec!(756.00));
    assert_eq!(totals.total_tax_outputs, dec!(758.00));
    assert_eq!(totals.invoice_total, dec!(4408.00));
    assert_eq!(totals.total_outstanding, dec!(4408.00));
}

#[test]
fn irpf_withholding_reduces_total() {
    let inv = InvoiceBuilder::new("F2024-0002", date(2024, 6, 15))
        .seller(seller())
        .buyer(buyer())
        .add_line(
            LineItemBuilder::new("Asesoría", dec!(1), dec!(1000))
                .withholding(dec!(15))
                .build(),
        )
        .build()
        .unwrap();

    let totals = inv.totals.as_ref().unwrap();
    assert_eq!(totals.total_tax_outputs, dec!(210.00));
    assert_eq!(totals.total_taxes_withheld, dec!(150.00));
    assert_eq!(totals.invoice_total, dec!(1060.00));
    // Veri*Factu ImporteTotal ignores withholdings.
    assert_eq!(totals.amount_with_taxes(), dec!(1210.00));
    assert_eq!(totals.withholdings.len(), 1);
}

#[test]
fn equivalence_surcharge_is_an_output_tax() {
    let inv = InvoiceBuilder::new("F2024-0003", date(2024, 6, 15))
        .seller(seller())
        .buyer(buyer())
        .add_line(
            LineItemBuilder::new("Mercancía", dec!(1), dec!(100))
                .surcharge(dec!(5.2))
                .build(),
        )
        .build()
        .unwrap();

    let totals = inv.totals.as_ref().unwrap();
    assert_eq!(totals.taxes[0].surcharge_amount, Some(dec!(5.20)));
    assert_eq!(totals.total_tax_outputs, dec!(26.20));
    assert_eq!(totals.invoice_total, dec!(126.20));
}

#[test]
fn line_discount_rounds_half_up() {
    let inv = InvoiceBuilder::new("F2024-0004", date(2024, 6, 15))
        .seller(seller())
        .buyer(buyer())
        .add_line(
            LineItemBuilder::new("Horas", dec!(3), dec!(33.33))
                .discount(dec!(10))
                .build(),
        )
        .build()
        .unwrap();

    let line = &inv.lines[0];
    assert_eq!(line.total_cost, Some(dec!(99.99)));
    assert_eq!(line.discount_amount, Some(dec!(10.00)));
    assert_eq!(line.gross_amount, Some(dec!(89.99)));
    let totals = inv.totals.as_ref().unwrap();
    assert_eq!(totals.total_line_discounts, dec!(10.00));
    assert_eq!(totals.total_tax_outputs, dec!(18.90));
    assert_eq!(totals.invoice_total, dec!(108.89));
}

#[test]
fn prepaid_amount_is_outstanding_difference() {
    let inv = InvoiceBuilder::new("F2024-0005", date(2024, 6, 15))
        .seller(seller())
        .buyer(buyer())
        .add_line(LineItemBuilder::new("Servicio", dec!(1), dec!(100)).build())
        .prepaid(dec!(21))
        .build()
        .unwrap();
    assert_eq!(inv.totals.unwrap().total_outstanding, dec!(100.00));
}

// --- Builder and validation errors ---

#[test]
fn builder_requires_lines() {
    let err = InvoiceBuilder::new("F2024-0006", date(2024, 6, 15))
        .seller(seller())
        .buyer(buyer())
        .build()
        .unwrap_err();
    assert!(matches!(err, FacturaError::Builder(_)));
}

#[test]
fn oversized_amounts_fail_instead_of_overflowing() {
    let line = |qty, price| {
        InvoiceBuilder::new("F2024-0012", date(2024, 6, 15))
            .seller(seller())
            .buyer(buyer())
            .add_line(
                LineItemBuilder::new("Servicio", qty, price)
                    .tax(TaxType::Iva, dec!(21))
                    .build(),
            )
    };

    let err = line(rust_decimal::Decimal::MAX, dec!(2)).build().unwrap_err();
    assert!(matches!(err, FacturaError::Validation(_)));
    assert!(err.to_string().contains("line 1"));

    // The line fits but its 21 % tax does not.
    let err = line(rust_decimal::Decimal::MAX, dec!(1)).build_unchecked().unwrap_err();
    assert!(err.to_string().contains("tax amount"));
}

#[test]
fn builder_requires_parties() {
    let err = InvoiceBuilder::new("F2024-0007", date(2024, 6, 15))
        .seller(seller())
        .add_line(LineItemBuilder::new("x", dec!(1), dec!(1)).build())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("buyer is required"));
}

#[test]
fn invalid_seller_nif_is_rejected() {
    let bad = PartyBuilder::new(
        "Ejemplo SL",
        AddressBuilder::new("Calle Mayor 1", "28013", "Madrid", "Madrid").build(),
    )
    .tax_id("B12345670")
    .build();
    let err = InvoiceBuilder::new("F2024-0008", date(2024, 6, 15))
        .seller(bad)
        .buyer(buyer())
        .add_line(LineItemBuilder::new("x", dec!(1), dec!(1)).build())
        .build()
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("seller.tax_id"), "{msg}");
    assert!(msg.contains("RD1619/2012"), "{msg}");
}

#[test]
fn complete_invoice_needs_buyer_nif() {
    let anonymous = PartyBuilder::new(
        "Consumidor final",
        AddressBuilder::new("Calle Sol 3", "41001", "Sevilla", "Sevilla").build(),
    )
    .build();
    let line = LineItemBuilder::new("Producto", dec!(1), dec!(10)).build();

    let err = InvoiceBuilder::new("F2024-0009", date(2024, 6, 15))
        .seller(seller())
        .buyer(anonymous.clone())
        .add_line(line.clone())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("buyer.tax_id"));

    let simplified = InvoiceBuilder::new("T2024-0001", date(2024, 6, 15))
        .kind(InvoiceKind::Simplified)
        .seller(seller())
        .buyer(anonymous)
        .add_line(line)
        .build()
        .unwrap();
    assert_eq!(simplified.kind.code(), "F2");
    assert_eq!(simplified.kind.document_type(), "FA");
}

#[test]
fn simplified_invoice_limit() {
    let err = InvoiceBuilder::new("T2024-0002", date(2024, 6, 15))
        .kind(InvoiceKind::Simplified)
        .seller(seller())
        .buyer(buyer())
        .add_line(LineItemBuilder::new("Equipo", dec!(1), dec!(3000)).build())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("art.4.1"));
}

#[test]
fn due_date_before_issue_date() {
    let err = InvoiceBuilder::new("F2024-0010", date(2024, 6, 15))
        .due_date(date(2024, 6, 1))
        .seller(seller())
        .buyer(buyer())
        .add_line(LineItemBuilder::new("x", dec!(1), dec!(1)).build())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("due_date"));
}

#[test]
fn all_line_errors_are_reported() {
    let mut inv = InvoiceBuilder::new("F2024-0011", date(2024, 6, 15))
        .seller(seller())
        .buyer(buyer())
        .add_line(LineItemBuilder::new("", dec!(0), dec!(-1)).build())
        .add_line(
            LineItemBuilder::new("ok", dec!(1), dec!(1))
                .tax(TaxType::Iva, dec!(150))
                .build(),
        )
        .build_unchecked()
        .unwrap();
    calculate_totals(&mut inv).unwrap();

    let fields: Vec<String> = validate_invoice(&inv).into_iter().map(|e| e.field).collect();
    assert!(fields.contains(&"lines[0].description".to_string()));
    assert!(fields.contains(&"lines[0].quantity".to_string()));
    assert!(fields.contains(&"lines[0].unit_price".to_string()));
    assert!(fields.contains(&"lines[1].tax_rate".to_string()));
}

#[test]
fn tampered_totals_fail_arithmetic_check() {
    let mut inv = InvoiceBuilder::new("F2024-0012", date(2024, 6, 15))
        .seller(seller())
        .buyer(buyer())
        .add_line(LineItemBuilder::new("x", dec!(1), dec!(100)).build())
        .build()
        .unwrap();
    assert!(validate_arithmetic(&inv).is_empty());

    inv.totals.as_mut().unwrap().invoice_total = dec!(999);
    let errors = validate_arithmetic(&inv);
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].field, "totals.invoice_total");
}

// --- Public administration buyers ---

#[test]
fn b2g_invoice_needs_all_dir3_units() {
    let inv = InvoiceBuilder::new("F2024-0013", date(2024, 6, 15))
        .seller(seller())
        .buyer(ayuntamiento())
        .add_line(LineItemBuilder::new("Mantenimiento", dec!(1), dec!(500)).build())
        .build()
        .unwrap();
    assert!(inv.is_b2g());
    assert_eq!(
        inv.buyer.centre(CentreRole::ProcessingUnit).map(|c| c.code.as_str()),
        Some("L01280796")
    );

    let partial = PartyBuilder::new(
        "Ayuntamiento de Ejemplo",
        AddressBuilder::new("Plaza Mayor 1", "28001", "Madrid", "Madrid").build(),
    )
    .tax_id("P2807900B")
    .centre(CentreRole::AccountingOffice, "L01280796")
    .centre(CentreRole::ManagementBody, "bad")
    .build();
    let err = InvoiceBuilder::new("F2024-0014", date(2024, 6, 15))
        .seller(seller())
        .buyer(partial)
        .add_line(LineItemBuilder::new("Mantenimiento", dec!(1), dec!(500)).build())
        .build()
        .unwrap_err()
        .to_string();
    assert!(err.contains("missing its UT DIR3 unit"), "{err}");
    assert!(err.contains("'bad' is not a valid DIR3 code"), "{err}");
}

#[test]
fn dir3_codes() {
    assert!(is_valid_dir3("L01281230"));
    assert!(is_valid_dir3("EA0008547"));
    assert!(!is_valid_dir3("l01281230"));
    assert!(!is_valid_dir3("01281230A"));
    assert!(!is_valid_dir3("L0128123"));
}

// --- Rectifying invoices ---

#[test]
fn rectifying_invoice_references_original() {
    let original = InvoiceBuilder::new("0001", date(2024, 6, 15))
        .series("F2024-")
        .seller(seller())
        .buyer(buyer())
        .add_line(LineItemBuilder::new("Servicio", dec!(1), dec!(100)).build())
        .build()
        .unwrap();

    let corrective = Corrective::for_invoice(
        &original,
        CorrectionReason::TaxableBase,
        CorrectionMethod::Differences,
        RectificationKind::LegalError,
    );
    assert_eq!(corrective.original_full_number(), "F2024-0001");
    assert_eq!(corrective.original_base, None);

    let rectifying = InvoiceBuilder::new("R2024-0001", date(2024, 7, 1))
        .seller(seller())
        .buyer(buyer())
        .corrects(corrective)
        .add_line(LineItemBuilder::new("Abono", dec!(-1), dec!(20)).build())
        .build()
        .unwrap();
    assert_eq!(rectifying.kind.code(), "R1");
    assert_eq!(rectifying.kind.invoice_class(), "OR");
    assert_eq!(rectifying.totals.unwrap().invoice_total, dec!(-24.20));
}

#[test]
fn substitution_keeps_original_amounts() {
    let original = InvoiceBuilder::new("F2024-0001", date(2024, 6, 15))
        .seller(seller())
        .buyer(buyer())
        .add_line(LineItemBuilder::new("Servicio", dec!(1), dec!(100)).build())
        .build()
        .unwrap();
    let corrective = Corrective::for_invoice(
        &original,
        CorrectionReason::TaxRate,
        CorrectionMethod::Full,
        RectificationKind::Other,
    );
    assert_eq!(corrective.original_base, Some(dec!(100.00)));
    assert_eq!(corrective.original_tax, Some(dec!(21.00)));
}

#[test]
fn rectifying_without_reference_is_invalid() {
    let err = InvoiceBuilder::new("R2024-0002", date(2024, 7, 1))
        .kind(InvoiceKind::Rectifying(RectificationKind::LegalError))
        .seller(seller())
        .buyer(buyer())
        .add_line(LineItemBuilder::new("Abono", dec!(-1), dec!(20)).build())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("art.15"));
}

#[test]
fn invoice_kind_codes() {
    for code in ["F1", "F2", "R1", "R2", "R3", "R4", "R5"] {
        assert_eq!(InvoiceKind::from_code(code).unwrap().code(), code);
    }
    assert_eq!(InvoiceKind::from_code("F3"), None);
}

// --- NIF ---

#[test]
fn nif_families() {
    assert_eq!(validate_nif("12345678Z").unwrap(), NifKind::Dni);
    assert_eq!(validate_nif("X1234567L").unwrap(), NifKind::Nie);
    assert_eq!(validate_nif("B12345674").unwrap(), NifKind::Cif);
    assert_eq!(validate_nif("A58818501").unwrap(), NifKind::Cif);
    assert!(!is_valid_nif("12345678A"));
    assert!(!is_valid_nif("B12345670"));
    assert!(!is_valid_nif("K1234567"));
}

#[test]
fn nif_normalization() {
    assert_eq!(normalize_nif(" es-b1234567 4"), "B12345674");
    assert_eq!(normalize_nif("12.345.678-z"), "12345678Z");
    assert!(is_valid_nif("ESB12345674"));
    assert_eq!(nif::dni_letter(12345678), 'Z');
}

// --- Numbering ---

#[test]
fn numbering_resumes_per_series_and_year() {
    let issued = ["F2024-0001", "F2024-0002", "R2024-0001"];
    let mut invoices = InvoiceSeries::resume("F", 2024, issued);
    let mut rectifying = InvoiceSeries::resume("R", 2024, issued);
    assert_eq!(invoices.next_number(), "F2024-0003");
    assert_eq!(rectifying.next_number(), "R2024-0002");
}
