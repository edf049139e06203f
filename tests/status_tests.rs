//! Status reconciliation across FACe, FACeB2B, the AEAT and local marks.
//!
//! Upstream payloads are written as the services send them and
//! deserialized through the serde aliases.

use chrono::{NaiveDate, TimeZone, Utc};
use facturador::core::status::*;
use serde_json::json;

fn face(value: serde_json::Value) -> Option<FaceStatus> {
    Some(serde_json::from_value(value).unwrap())
}

fn faceb2b(value: serde_json::Value) -> Option<FaceB2bStatus> {
    Some(serde_json::from_value(value).unwrap())
}

fn verifactu(value: serde_json::Value) -> Option<VerifactuStatus> {
    Some(serde_json::from_value(value).unwrap())
}

fn submitted() -> LocalMarks {
    LocalMarks {
        submitted_at: Some(Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap()),
        channel: Some(Channel::Face),
        registry_number: Some("LOCAL-1".into()),
        ..LocalMarks::default()
    }
}

#[test]
fn local_submission_only() {
    let status = reconcile(&StatusSources {
        local: submitted(),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Submitted);
    assert_eq!(status.source, StatusSource::Local);
    assert_eq!(status.registry_number.as_deref(), Some("LOCAL-1"));
}

#[test]
fn face_processing_code_wins_over_local_mark() {
    let status = reconcile(&StatusSources {
        local: submitted(),
        face: face(json!({
            "numeroRegistro": "REGAGE24e00000001",
            "tramitacion": { "codigo": "2400", "descripcion": "Aceptada" }
        })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Accepted);
    assert_eq!(status.source, StatusSource::Face);
    assert_eq!(status.reason.as_deref(), Some("Aceptada"));
    assert_eq!(status.registry_number.as_deref(), Some("REGAGE24e00000001"));
    assert_eq!(status.cancellation, CancellationState::None);
}

#[test]
fn face_accepted_cancellation() {
    let status = reconcile(&StatusSources {
        local: submitted(),
        face: face(json!({
            "numeroRegistro": "REGAGE24e00000001",
            "tramitacion": { "codigo": "2400", "descripcion": "Aceptada" },
            "anulacion": { "codigo": "4300", "descripcion": "Aceptada la anulación", "motivo": "Duplicada" }
        })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Cancelled);
    assert_eq!(status.cancellation, CancellationState::Accepted);
    assert_eq!(status.reason.as_deref(), Some("Duplicada"));
}

#[test]
fn face_requested_cancellation_keeps_processing_state() {
    let status = reconcile(&StatusSources {
        face: face(json!({
            "tramitacion": { "codigo": "1200", "descripcion": "Registrada" },
            "anulacion": { "codigo": "4200", "descripcion": "Solicitada anulación" }
        })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Registered);
    assert_eq!(status.cancellation, CancellationState::Requested);
}

#[test]
fn faceb2b_refused_cancellation_is_not_final() {
    let status = reconcile(&StatusSources {
        faceb2b: faceb2b(json!({
            "status": { "code": "1200", "name": "Registered" },
            "cancellationStatus": { "description": "Anulación no aceptada" }
        })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Registered);
    assert_eq!(status.cancellation, CancellationState::Rejected);
}

#[test]
fn face_denied_cancellation_keeps_acceptance() {
    let status = reconcile(&StatusSources {
        face: face(json!({
            "tramitacion": { "codigo": "2400", "descripcion": "Aceptada" },
            "anulacion": { "descripcion": "Denegada la anulación" }
        })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Accepted);
    assert_eq!(status.cancellation, CancellationState::Rejected);
}

#[test]
fn face_description_keywords() {
    let status = reconcile(&StatusSources {
        face: face(json!({
            "tramitacion": { "descripcion": "Contabilizada la obligación de pago" }
        })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Accepted);
}

#[test]
fn unknown_code_with_registry_counts_as_submitted() {
    let status = reconcile(&StatusSources {
        face: face(json!({
            "numeroRegistro": "REGAGE24e00000002",
            "tramitacion": { "codigo": "9999" }
        })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Submitted);
    assert_eq!(status.source, StatusSource::Face);
}

#[test]
fn faceb2b_status_object_and_payment() {
    let status = reconcile(&StatusSources {
        faceb2b: faceb2b(json!({
            "registryNumber": "ES-B2B-0001",
            "status": { "code": "1200", "name": "Registered" },
            "paymentStatus": "paid",
            "paymentDate": "2024-07-01"
        })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Paid);
    assert_eq!(status.source, StatusSource::FaceB2b);
    assert!(status.paid);
    assert_eq!(status.registry_number.as_deref(), Some("ES-B2B-0001"));
}

#[test]
fn faceb2b_flat_status_code() {
    let status = reconcile(&StatusSources {
        faceb2b: faceb2b(json!({ "statusCode": "2600" })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Rejected);
}

#[test]
fn faceb2b_bare_numeric_status() {
    let parsed: FaceB2bStatus = serde_json::from_value(json!({ "status": 2500 })).unwrap();
    assert_eq!(parsed.status, Some(UpstreamState::from(2500)));
    assert_eq!(
        reconcile(&StatusSources {
            faceb2b: Some(parsed),
            ..StatusSources::default()
        })
        .state,
        InvoiceState::Paid
    );
}

#[test]
fn faceb2b_rejection_reason() {
    let status = reconcile(&StatusSources {
        faceb2b: faceb2b(json!({
            "status": { "statusCode": 2600, "reason": "Importe incorrecto" }
        })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Rejected);
    assert_eq!(status.reason.as_deref(), Some("Importe incorrecto"));
}

#[test]
fn unpaid_payment_status_is_ignored() {
    let status = reconcile(&StatusSources {
        faceb2b: faceb2b(json!({
            "status": { "code": 2400 },
            "paymentStatus": "Unpaid"
        })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Accepted);
    assert!(!status.paid);
}

#[test]
fn aeat_rejection() {
    let status = reconcile(&StatusSources {
        verifactu: verifactu(json!({
            "EstadoEnvio": "Incorrecto",
            "EstadoRegistro": "Incorrecto",
            "CodigoErrorRegistro": "1100",
            "DescripcionErrorRegistro": "Valor o tipo incorrecto del campo: NIF"
        })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Rejected);
    assert_eq!(status.source, StatusSource::Verifactu);
    assert_eq!(
        status.reason.as_deref(),
        Some("Valor o tipo incorrecto del campo: NIF")
    );
}

#[test]
fn aeat_acceptance_registers_unsent_invoice() {
    let accepted = verifactu(json!({
        "EstadoEnvio": "Correcto",
        "EstadoRegistro": "Correcto",
        "CSV": "A-YDSW8NLFLANWPM"
    }));

    let alone = reconcile(&StatusSources {
        verifactu: accepted.clone(),
        ..StatusSources::default()
    });
    assert_eq!(alone.state, InvoiceState::Registered);
    assert_eq!(alone.source, StatusSource::Verifactu);
    assert_eq!(alone.aeat_csv.as_deref(), Some("A-YDSW8NLFLANWPM"));

    // Once a channel is involved the AEAT acceptance says nothing about it.
    let sent = reconcile(&StatusSources {
        local: submitted(),
        verifactu: accepted,
        ..StatusSources::default()
    });
    assert_eq!(sent.state, InvoiceState::Submitted);
    assert_eq!(sent.source, StatusSource::Local);
}

#[test]
fn upstream_wins_ties_with_local_marks() {
    let status = reconcile(&StatusSources {
        local: LocalMarks {
            paid_at: NaiveDate::from_ymd_opt(2024, 7, 1),
            ..submitted()
        },
        faceb2b: faceb2b(json!({ "paymentStatus": 2500 })),
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Paid);
    assert_eq!(status.source, StatusSource::FaceB2b);
}

#[test]
fn cancellation_outranks_payment() {
    let status = reconcile(&StatusSources {
        local: LocalMarks {
            paid_at: NaiveDate::from_ymd_opt(2024, 7, 1),
            cancelled_at: NaiveDate::from_ymd_opt(2024, 7, 2),
            ..LocalMarks::default()
        },
        ..StatusSources::default()
    });
    assert_eq!(status.state, InvoiceState::Cancelled);
    assert_eq!(status.cancellation, CancellationState::Accepted);
    // The payment is still reported.
    assert!(status.paid);
}

#[test]
fn states_serialize_as_snake_case() {
    assert_eq!(serde_json::to_string(&InvoiceState::Paid).unwrap(), "\"paid\"");
    assert_eq!(serde_json::to_string(&Channel::FaceB2b).unwrap(), "\"face_b2b\"");
    assert_eq!(InvoiceState::Cancelled.to_string(), "Anulada");
    assert!(InvoiceState::Rejected.is_final());
    assert!(!InvoiceState::Accepted.is_final());
}
