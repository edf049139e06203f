use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rust_decimal_macros::dec;

use facturador::core::*;
use facturador::facturae;
use facturador::verifactu::{self, AuditLog, RegistrationRecord};

fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

fn test_time() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-06-15T10:00:00+02:00").unwrap()
}

fn seller() -> Party {
    PartyBuilder::new(
        "Ejemplo Servicios SL",
        AddressBuilder::new("Calle Mayor 1", "28013", "Madrid", "Madrid").build(),
    )
    .tax_id("B12345674")
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

fn build_invoice(number: &str, lines: usize) -> Invoice {
    let mut builder = InvoiceBuilder::new(number, test_date())
        .seller(seller())
        .buyer(buyer());

    for i in 1..=lines {
        builder = builder.add_line(
            LineItemBuilder::new(format!("Servicio {i}"), dec!(5), dec!(120))
                .tax(TaxType::Iva, dec!(21))
                .build(),
        );
    }

    builder.build().unwrap()
}

fn bench_build_invoice(c: &mut Criterion) {
    c.bench_function("build_invoice_10_lines", |b| {
        b.iter(|| black_box(build_invoice("F2024-0001", 10)));
    });
}

fn bench_validate_nif(c: &mut Criterion) {
    c.bench_function("validate_nif", |b| {
        b.iter(|| {
            black_box(validate_nif(black_box("B12345674")));
            black_box(validate_nif(black_box("X1234567L")));
            black_box(validate_nif(black_box("12345678Z")));
        });
    });
}

fn bench_facturae_serialize(c: &mut Criterion) {
    let invoice = build_invoice("F2024-0001", 10);
    c.bench_function("facturae_serialize", |b| {
        b.iter(|| black_box(facturae::to_facturae_xml(black_box(&invoice))));
    });
}

fn bench_facturae_parse(c: &mut Criterion) {
    let invoice = build_invoice("F2024-0001", 10);
    let xml = facturae::to_facturae_xml(&invoice).unwrap();
    c.bench_function("facturae_parse", |b| {
        b.iter(|| black_box(facturae::from_facturae_xml(black_box(&xml))));
    });
}

fn bench_facturae_1000_lines(c: &mut Criterion) {
    let invoice = build_invoice("F2024-0001", 1000);
    let xml = facturae::to_facturae_xml(&invoice).unwrap();
    c.bench_function("facturae_serialize_1000_lines", |b| {
        b.iter(|| black_box(facturae::to_facturae_xml(black_box(&invoice))));
    });
    c.bench_function("facturae_parse_1000_lines", |b| {
        b.iter(|| black_box(facturae::from_facturae_xml(black_box(&xml))));
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    let invoice = build_invoice("F2024-0001", 10);
    let record = RegistrationRecord::registration(&invoice, None, test_time()).unwrap();
    let canonical = record.canonical_input();
    c.bench_function("verifactu_fingerprint", |b| {
        b.iter(|| black_box(verifactu::fingerprint(black_box(&canonical))));
    });
}

fn bench_audit_log_100(c: &mut Criterion) {
    let invoices: Vec<Invoice> = (1..=100)
        .map(|n| build_invoice(&format!("F2024-{n:04}"), 2))
        .collect();

    c.bench_function("audit_log_append_100", |b| {
        b.iter(|| {
            let dir = tempfile::tempdir().unwrap();
            let mut log = AuditLog::open(dir.path().join(verifactu::LOG_FILE_NAME)).unwrap();
            for (i, invoice) in invoices.iter().enumerate() {
                let at = test_time() + Duration::seconds(i as i64);
                log.append_registration(invoice, at).unwrap();
            }
            black_box(log.verify())
        });
    });
}

criterion_group!(
    benches,
    bench_build_invoice,
    bench_validate_nif,
    bench_facturae_serialize,
    bench_facturae_parse,
    bench_facturae_1000_lines,
    bench_fingerprint,
    bench_audit_log_100,
);
criterion_main!(benches);
