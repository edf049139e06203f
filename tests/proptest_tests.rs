//! Property-based tests for NIF validation, totals, Facturae and the
//! Veri*Factu chain.
//!
//! Run with: `cargo test --features all --test proptest_tests`

use chrono::NaiveDate;
use facturador::core::nif::dni_letter;
use facturador::core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
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

fn build(number: &str, lines: Vec<LineItem>) -> Invoice {
    let mut builder = InvoiceBuilder::new(number, date(2024, 6, 15))
        .seller(seller())
        .buyer(buyer());
    for line in lines {
        builder = builder.add_line(line);
    }
    builder.build().unwrap()
}

// ── Strategies ──────────────────────────────────────────────────────────────

/// 0.01 to 99999.99.
fn arb_price() -> impl Strategy<Value = Decimal> {
    (1u64..10_000_000u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

fn arb_quantity() -> impl Strategy<Value = Decimal> {
    (1u32..=100u32).prop_map(Decimal::from)
}

/// IVA rates in force: exempt, super-reduced, reduced, general.
fn arb_iva() -> impl Strategy<Value = Decimal> {
    prop_oneof![Just(dec!(0)), Just(dec!(4)), Just(dec!(10)), Just(dec!(21))]
}

fn arb_line() -> impl Strategy<Value = LineItem> {
    (
        arb_quantity(),
        arb_price(),
        arb_iva(),
        prop::option::of(prop_oneof![Just(dec!(5)), Just(dec!(12.5))]),
        prop::option::of(prop_oneof![Just(dec!(7)), Just(dec!(15))]),
    )
        .prop_map(|(qty, price, rate, discount, irpf)| {
            let mut line = LineItemBuilder::new("Servicio", qty, price).tax(TaxType::Iva, rate);
            if let Some(d) = discount {
                line = line.discount(d);
            }
            if let Some(w) = irpf {
                line = line.withholding(w);
            }
            line.build()
        })
}

fn arb_lines() -> impl Strategy<Value = Vec<LineItem>> {
    prop::collection::vec(arb_line(), 1..=6)
}

// ── NIF properties ──────────────────────────────────────────────────────────

proptest! {
    /// Every 8-digit number with its check letter is a valid DNI.
    #[test]
    fn dni_with_its_letter_is_valid(n in 0u32..100_000_000u32) {
        let nif = format!("{n:08}{}", dni_letter(n));
        prop_assert_eq!(validate_nif(&nif).unwrap(), NifKind::Dni);
    }

    /// Any other letter is rejected.
    #[test]
    fn dni_with_another_letter_is_invalid(n in 0u32..100_000_000u32, shift in 1u32..23u32) {
        let wrong = dni_letter(n + shift);
        let nif = format!("{n:08}{wrong}");
        prop_assert!(!is_valid_nif(&nif));
    }

    /// Case, separators and the ES prefix do not affect validity.
    #[test]
    fn formatting_does_not_affect_validity(n in 0u32..100_000_000u32) {
        let nif = format!("{n:08}{}", dni_letter(n));
        let decorated = format!("es-{}.{}", &nif[..4], nif[4..].to_lowercase());
        prop_assert_eq!(normalize_nif(&decorated), nif.clone());
        prop_assert!(is_valid_nif(&decorated));
        prop_assert_eq!(normalize_nif(&normalize_nif(&decorated)), nif);
    }
}

// ── Totals properties ───────────────────────────────────────────────────────

proptest! {
    /// calculate_totals() output always satisfies validate_arithmetic().
    #[test]
    fn totals_satisfy_arithmetic(lines in arb_lines()) {
        let inv = build("F2024-0001", lines);
        let errors = validate_arithmetic(&inv);
        prop_assert!(errors.is_empty(), "arithmetic errors: {:?}", errors);
    }

    /// Invoice total is base plus tax minus withholding.
    #[test]
    fn invoice_total_decomposes(lines in arb_lines()) {
        let inv = build("F2024-0001", lines);
        let t = inv.totals.as_ref().unwrap();
        prop_assert_eq!(
            t.invoice_total,
            t.gross_before_taxes + t.total_tax_outputs - t.total_taxes_withheld
        );
        prop_assert_eq!(t.total_outstanding, t.invoice_total - t.prepaid);
        let by_rate: Decimal = t.taxes.iter().map(|b| b.taxable_base).sum();
        prop_assert_eq!(by_rate, t.gross_before_taxes);
    }

    /// Resuming a series never reuses a number.
    #[test]
    fn numbering_resumes_after_highest(issued in prop::collection::vec(1u64..5000u64, 0..20)) {
        let existing: Vec<String> = issued.iter().map(|n| format!("F2024-{n:04}")).collect();
        let mut series = InvoiceSeries::resume("F", 2024, existing.iter().map(String::as_str));
        let next = series.next_number();
        prop_assert!(!existing.contains(&next));
        let expected = issued.iter().max().copied().unwrap_or(0) + 1;
        prop_assert_eq!(next, format!("F2024-{expected:04}"));
    }
}

#[cfg(feature = "facturae")]
mod facturae_properties {
    use super::*;

    proptest! {
        /// to_facturae_xml() → from_facturae_xml() preserves lines and totals.
        #[test]
        fn facturae_round_trip(lines in arb_lines()) {
            let inv = build("F2024-0001", lines);
            let xml = facturador::facturae::to_facturae_xml(&inv).unwrap();
            let parsed = facturador::facturae::from_facturae_xml(&xml).unwrap();

            prop_assert_eq!(parsed.full_number(), inv.full_number());
            prop_assert_eq!(parsed.issue_date, inv.issue_date);
            prop_assert_eq!(parsed.lines.len(), inv.lines.len());
            prop_assert_eq!(&parsed.seller, &inv.seller);

            let (a, b) = (inv.totals.as_ref().unwrap(), parsed.totals.as_ref().unwrap());
            prop_assert_eq!(a.gross_before_taxes, b.gross_before_taxes);
            prop_assert_eq!(a.total_tax_outputs, b.total_tax_outputs);
            prop_assert_eq!(a.total_taxes_withheld, b.total_taxes_withheld);
            prop_assert_eq!(a.invoice_total, b.invoice_total);
        }
    }
}

#[cfg(feature = "verifactu")]
mod chain_properties {
    use super::*;
    use chrono::{DateTime, Duration};
    use facturador::verifactu::AuditLog;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Any sequence of registrations forms a chain that verifies, and
        /// each record links to its predecessor.
        #[test]
        fn appended_chains_verify(batches in prop::collection::vec(arb_lines(), 1..8)) {
            let dir = tempfile::tempdir().unwrap();
            let mut log = AuditLog::open(dir.path().join("verifactu.xml")).unwrap();
            let start = DateTime::parse_from_rfc3339("2024-06-15T09:00:00+02:00").unwrap();

            for (i, lines) in batches.into_iter().enumerate() {
                let inv = build(&format!("F2024-{:04}", i + 1), lines);
                log.append_registration(&inv, start + Duration::minutes(i as i64)).unwrap();
            }

            let report = log.verify();
            prop_assert!(report.valid, "{:?}", report);
            for pair in log.entries().windows(2) {
                prop_assert_eq!(pair[1].previous_fingerprint(), pair[0].fingerprint.as_str());
            }

            let reopened = AuditLog::open(log.path()).unwrap();
            prop_assert!(reopened.verify().valid);
        }
    }
}
