#![cfg(feature = "facturae")]

use chrono::NaiveDate;
use facturador::core::*;
use facturador::facturae::{self, XmlSigner};
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
    .contact(None, Some("+34 910 000 000".into()), Some("facturas@ejemplo.es".into()))
    .build()
}

fn buyer() -> Party {
    PartyBuilder::new(
        "Cliente & Hijos SA",
        AddressBuilder::new("Gran Vía 2", "48001", "Bilbao", "Bizkaia").build(),
    )
    .tax_id("A58818501")
    .build()
}

fn invoice() -> Invoice {
    InvoiceBuilder::new("0001", date(2024, 6, 15))
        .series("F2024-")
        .operation_date(date(2024, 6, 10))
        .due_date(date(2024, 7, 15))
        .seller(seller())
        .buyer(buyer())
        .add_line(
            LineItemBuilder::new("Desarrollo <backend>", dec!(10), dec!(60))
                .discount(dec!(10))
                .withholding(dec!(15))
                .product("DEV-01")
                .build(),
        )
        .add_line(
            LineItemBuilder::new("Material", dec!(3), dec!(12.5))
                .tax(TaxType::Iva, dec!(10))
                .surcharge(dec!(1.4))
                .build(),
        )
        .payment(PaymentInstructions {
            means: PaymentMeans::Transfer,
            iban: Some("ES9121000418450200051332".into()),
            bic: None,
        })
        .note("Pago a 30 días")
        .build()
        .unwrap()
}

#[test]
fn document_header_and_totals() {
    let inv = invoice();
    let xml = facturae::to_facturae_xml(&inv).unwrap();

    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(xml.contains(facturae::FACTURAE_NS));
    assert!(xml.contains("<SchemaVersion>3.2.2</SchemaVersion>"));
    assert!(xml.contains("<BatchIdentifier>B12345674F2024-0001</BatchIdentifier>"));
    assert!(xml.contains("<InvoiceNumber>0001</InvoiceNumber>"));
    assert!(xml.contains("<InvoiceSeriesCode>F2024-</InvoiceSeriesCode>"));
    assert!(xml.contains("<InvoiceDocumentType>FC</InvoiceDocumentType>"));
    assert!(xml.contains("<InvoiceClass>OO</InvoiceClass>"));
    assert!(xml.contains("<OperationDate>2024-06-10</OperationDate>"));

    let totals = inv.totals.as_ref().unwrap();
    assert_eq!(totals.invoice_total, dec!(614.18));
    assert!(xml.contains("<InvoiceTotal>614.18</InvoiceTotal>"));
    assert!(xml.contains("<TaxesWithheld>"));
    assert!(xml.contains("<EquivalenceSurcharge>1.40</EquivalenceSurcharge>"));
    assert!(xml.contains("<ArticleCode>DEV-01</ArticleCode>"));
    assert!(xml.contains("<PaymentMeans>04</PaymentMeans>"));
    assert!(xml.contains("<IBAN>ES9121000418450200051332</IBAN>"));
}

#[test]
fn special_characters_are_escaped() {
    let xml = facturae::to_facturae_xml(&invoice()).unwrap();
    assert!(xml.contains("Cliente &amp; Hijos SA"));
    assert!(xml.contains("Desarrollo &lt;backend&gt;"));
}

#[test]
fn round_trip_keeps_amounts_and_parties() {
    let original = invoice();
    let xml = facturae::to_facturae_xml(&original).unwrap();
    let parsed = facturae::from_facturae_xml(&xml).unwrap();

    assert_eq!(parsed.full_number(), "F2024-0001");
    assert_eq!(parsed.issue_date, original.issue_date);
    assert_eq!(parsed.operation_date, original.operation_date);
    assert_eq!(parsed.due_date, original.due_date);
    assert_eq!(parsed.kind, InvoiceKind::Complete);
    assert_eq!(parsed.seller, original.seller);
    assert_eq!(parsed.buyer, original.buyer);
    assert_eq!(parsed.notes, vec!["Pago a 30 días".to_string()]);
    assert_eq!(parsed.lines.len(), 2);
    assert_eq!(parsed.lines[0].description, "Desarrollo <backend>");
    assert_eq!(parsed.lines[0].product_id.as_deref(), Some("DEV-01"));
    assert_eq!(parsed.lines[1].surcharge_rate, Some(dec!(1.4)));

    let (a, b) = (original.totals.unwrap(), parsed.totals.unwrap());
    assert_eq!(a.invoice_total, b.invoice_total);
    assert_eq!(a.total_tax_outputs, b.total_tax_outputs);
    assert_eq!(a.total_taxes_withheld, b.total_taxes_withheld);
}

#[test]
fn public_administration_centres_round_trip() {
    let buyer = PartyBuilder::new(
        "Ayuntamiento de Ejemplo",
        AddressBuilder::new("Plaza Mayor 1", "28001", "Madrid", "Madrid").build(),
    )
    .tax_id("P2807900B")
    .dir3("L01280796", "L01280797", "L01280798")
    .build();
    let inv = InvoiceBuilder::new("F2024-0002", date(2024, 6, 15))
        .seller(seller())
        .buyer(buyer)
        .add_line(LineItemBuilder::new("Mantenimiento", dec!(1), dec!(500)).build())
        .build()
        .unwrap();

    let xml = facturae::to_facturae_xml(&inv).unwrap();
    assert!(xml.contains("<CentreCode>L01280798</CentreCode>"));
    assert!(xml.contains("<RoleTypeCode>03</RoleTypeCode>"));

    let parsed = facturae::from_facturae_xml(&xml).unwrap();
    assert!(parsed.is_b2g());
    assert_eq!(parsed.buyer.administrative_centres, inv.buyer.administrative_centres);
    assert!(validate_invoice(&parsed).is_empty());
}

#[test]
fn individuals_and_foreign_buyers() {
    let seller = PartyBuilder::new(
        "Lucía",
        AddressBuilder::new("Calle Luna 5", "46001", "Valencia", "Valencia").build(),
    )
    .tax_id("12345678Z")
    .individual("Martínez", Some("Ruiz".into()))
    .build();
    let buyer = PartyBuilder::new(
        "Kunde GmbH",
        AddressBuilder::new("Hauptstraße 1", "10115", "Berlin", "Berlin")
            .country("DEU")
            .build(),
    )
    .tax_id("DE123456789")
    .residence(ResidenceType::EuResident)
    .build();
    let inv = InvoiceBuilder::new("F2024-0003", date(2024, 6, 15))
        .seller(seller)
        .buyer(buyer)
        .add_line(
            LineItemBuilder::new("Traducción", dec!(1), dec!(300))
                .tax(TaxType::Iva, dec!(0))
                .build(),
        )
        .build()
        .unwrap();

    let xml = facturae::to_facturae_xml(&inv).unwrap();
    assert!(xml.contains("<PersonTypeCode>F</PersonTypeCode>"));
    assert!(xml.contains("<FirstSurname>Martínez</FirstSurname>"));
    assert!(xml.contains("<OverseasAddress>"));
    assert!(xml.contains("<PostCodeAndTown>10115 Berlin</PostCodeAndTown>"));

    let parsed = facturae::from_facturae_xml(&xml).unwrap();
    assert_eq!(parsed.seller.display_name(), "Lucía Martínez Ruiz");
    assert_eq!(parsed.buyer.address.country_code, "DEU");
    assert_eq!(parsed.buyer.address.town, "Berlin");
    assert_eq!(parsed.buyer.residence, ResidenceType::EuResident);
}

#[test]
fn rectifying_invoice_round_trip() {
    let original = invoice();
    let corrective = Corrective::for_invoice(
        &original,
        CorrectionReason::TaxableBase,
        CorrectionMethod::Differences,
        RectificationKind::LegalError,
    );
    let rectifying = InvoiceBuilder::new("0001", date(2024, 7, 1))
        .series("R2024-")
        .seller(seller())
        .buyer(buyer())
        .corrects(corrective)
        .add_line(LineItemBuilder::new("Abono parcial", dec!(-1), dec!(50)).build())
        .build()
        .unwrap();

    let xml = facturae::to_facturae_xml(&rectifying).unwrap();
    assert!(xml.contains("<InvoiceClass>OR</InvoiceClass>"));
    assert!(xml.contains("<Corrective>"));
    assert!(xml.contains("<ReasonCode>16</ReasonCode>"));
    assert!(xml.contains("<CorrectionMethod>02</CorrectionMethod>"));

    let parsed = facturae::from_facturae_xml(&xml).unwrap();
    assert_eq!(parsed.kind, InvoiceKind::Rectifying(RectificationKind::LegalError));
    let c = parsed.corrective.unwrap();
    assert_eq!(c.original_full_number(), "F2024-0001");
    assert_eq!(c.original_issue_date, date(2024, 6, 15));
    assert_eq!(c.method, CorrectionMethod::Differences);
    assert_eq!(c.reason, CorrectionReason::TaxableBase);
}

#[test]
fn simplified_invoice_without_buyer_nif_has_no_document() {
    let anonymous = PartyBuilder::new(
        "Consumidor final",
        AddressBuilder::new("Calle Sol 3", "41001", "Sevilla", "Sevilla").build(),
    )
    .build();
    let inv = InvoiceBuilder::new("T2024-0001", date(2024, 6, 15))
        .kind(InvoiceKind::Simplified)
        .seller(seller())
        .buyer(anonymous)
        .add_line(LineItemBuilder::new("Café", dec!(2), dec!(1.5)).build())
        .build()
        .unwrap();
    assert!(matches!(
        facturae::to_facturae_xml(&inv),
        Err(FacturaError::Builder(_))
    ));
}

#[test]
fn parser_rejects_foreign_documents() {
    let err = facturae::from_facturae_xml("<Invoice><ID>1</ID></Invoice>").unwrap_err();
    assert!(err.to_string().contains("fe:Facturae"));
    assert!(facturae::from_facturae_xml("<fe:Facturae xmlns:fe=\"x\">").is_err());
    assert!(facturae::from_facturae_xml("").is_err());
}

#[test]
fn parser_rejects_batches() {
    let xml = facturae::to_facturae_xml(&invoice()).unwrap();
    let start = xml.find("<Invoice>").unwrap();
    let end = xml.find("</Invoice>").unwrap() + "</Invoice>".len();
    let doubled = format!("{}{}{}", &xml[..end], &xml[start..end], &xml[end..]);
    let err = facturae::from_facturae_xml(&doubled).unwrap_err();
    assert!(err.to_string().contains("batches with 2 invoices"));
}

struct FakeSigner;

impl XmlSigner for FakeSigner {
    fn sign(&self, xml: &str) -> Result<String, FacturaError> {
        Ok(xml.replace(
            "</fe:Facturae>",
            "<ds:Signature Id=\"Signature-1\"><ds:SignatureValue>QUJD</ds:SignatureValue></ds:Signature></fe:Facturae>",
        ))
    }
}

struct NoopSigner;

impl XmlSigner for NoopSigner {
    fn sign(&self, xml: &str) -> Result<String, FacturaError> {
        Ok(xml.to_string())
    }
}

#[test]
fn signing_boundary() {
    let inv = invoice();
    let signed = facturae::sign_facturae(&inv, &FakeSigner).unwrap();
    assert!(facturae::is_signed(&signed));
    assert!(!facturae::is_signed(&facturae::to_facturae_xml(&inv).unwrap()));

    // Signed documents parse like unsigned ones.
    let parsed = facturae::from_facturae_xml(&signed).unwrap();
    assert_eq!(parsed.full_number(), "F2024-0001");

    let err = facturae::sign_facturae(&inv, &NoopSigner).unwrap_err();
    assert!(matches!(err, FacturaError::Signature(_)));
}
