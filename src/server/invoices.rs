use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use chrono::NaiveDate;
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::channels::{AeatClient, FaceB2bClient, FaceClient};
use crate::core::status::{Channel, InvoiceState};
use crate::core::FacturaError;
use crate::facturae::sign_facturae;
use crate::store::{AppConfig, InvoiceDraft, InvoiceFilter, InvoiceRecord, RectifyRequest, StatusUpdate};

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct PaidRequest {
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub channel: Channel,
    /// Notification address; FACe falls back to the configured one.
    #[serde(default)]
    pub email: Option<String>,
}

/// Send the latest audit record of `number` to the AEAT when Veri*Factu
/// is enabled and fold the answer into the invoice status.
///
/// The invoice is already issued at this point, so failures are logged
/// rather than returned.
async fn report_to_aeat(state: &AppState, config: &AppConfig, record: InvoiceRecord) -> InvoiceRecord {
    if !config.verifactu.enabled {
        return record;
    }
    let number = record.invoice.full_number();
    let entry = {
        let store = state.store.lock().await;
        store.invoices.audit_log().find(&number).last().copied().cloned()
    };
    let (Some(entry), Ok(issuer)) = (entry, config.issuer()) else {
        return record;
    };

    let client = AeatClient::new(state.transport.clone(), config.verifactu.clone());
    match client.submit(std::slice::from_ref(&entry), issuer).await {
        Ok(status) => {
            let update = StatusUpdate {
                verifactu: Some(status),
                ..StatusUpdate::default()
            };
            let store = state.store.lock().await;
            match store.invoices.apply_status(&record.id, update) {
                Ok(updated) => updated,
                Err(e) => {
                    tracing::warn!(id = %record.id, error = %e, "could not store AEAT answer");
                    record
                }
            }
        }
        Err(e) => {
            tracing::warn!(%number, error = %e, "Veri*Factu submission failed");
            record
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<InvoiceFilter>,
) -> Result<Json<Vec<InvoiceRecord>>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.invoices.list(&filter)?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(draft): Json<InvoiceDraft>,
) -> Result<(StatusCode, Json<InvoiceRecord>), ApiError> {
    let (record, config) = {
        let mut store = state.store.lock().await;
        let config = store.config.load()?;
        (store.invoices.create(draft, &config)?, config)
    };
    let record = report_to_aeat(&state, &config, record).await;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceRecord>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.invoices.get(&id)?))
}

/// The signed document once there is one, the generated one otherwise.
pub async fn xml(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.lock().await;
    let xml = match store.invoices.signed_xml(&id) {
        Err(FacturaError::NotFound(_)) => store.invoices.xml(&id)?,
        other => other?,
    };
    Ok(([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], xml))
}

pub async fn rectify(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RectifyRequest>,
) -> Result<(StatusCode, Json<InvoiceRecord>), ApiError> {
    let (record, config) = {
        let mut store = state.store.lock().await;
        let config = store.config.load()?;
        (store.invoices.rectify(&id, request, &config)?, config)
    };
    let record = report_to_aeat(&state, &config, record).await;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn mark_paid(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<PaidRequest>>,
) -> Result<Json<InvoiceRecord>, ApiError> {
    let date = body.and_then(|Json(b)| b.date);
    let store = state.store.lock().await;
    Ok(Json(store.invoices.mark_paid(&id, date)?))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<InvoiceRecord>, ApiError> {
    let reason = body.and_then(|Json(b)| b.reason);
    let (record, config) = {
        let mut store = state.store.lock().await;
        let config = store.config.load()?;
        (store.invoices.cancel(&id, reason)?, config)
    };
    Ok(Json(report_to_aeat(&state, &config, record).await))
}

pub async fn apply_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<InvoiceRecord>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.invoices.apply_status(&id, update)?))
}

/// Sign the Facturae document and send it through FACe or FACeB2B.
pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<InvoiceRecord>, ApiError> {
    let (record, config) = {
        let store = state.store.lock().await;
        (store.invoices.get(&id)?, store.config.load()?)
    };
    if record.status.state == InvoiceState::Cancelled {
        return Err(FacturaError::Conflict(format!(
            "invoice {} is cancelled",
            record.invoice.full_number()
        ))
        .into());
    }
    if !record.has_xml {
        return Err(FacturaError::Validation(
            "invoice has no Facturae document; the buyer NIF is missing".into(),
        )
        .into());
    }
    if request.channel == Channel::Face && !record.invoice.is_b2g() {
        return Err(FacturaError::Validation(
            "FACe needs the buyer's DIR3 units (OC, OG, UT)".into(),
        )
        .into());
    }

    let signer = state.signer(&config)?;
    let invoice = record.invoice.clone();
    let signed = tokio::task::spawn_blocking(move || sign_facturae(&invoice, signer.as_ref()))
        .await
        .map_err(|e| FacturaError::Signature(format!("signer task failed: {e}")))??;

    let file_name = format!("{}.xsig", record.invoice.full_number());
    let registry = match request.channel {
        Channel::Face => {
            let email = request
                .email
                .or_else(|| config.face.notification_email.clone())
                .ok_or_else(|| FacturaError::Validation("FACe needs a notification e-mail".into()))?;
            FaceClient::new(state.transport.clone(), config.face.endpoint.clone())
                .send_invoice(&signed, &file_name, &email)
                .await?
        }
        Channel::FaceB2b => {
            FaceB2bClient::new(state.transport.clone(), config.faceb2b.endpoint.clone())
                .send_invoice(&signed, &file_name, request.email.as_deref())
                .await?
        }
    };

    let store = state.store.lock().await;
    store.invoices.save_signed_xml(&id, &signed)?;
    Ok(Json(store.invoices.record_submission(&id, request.channel, Some(registry))?))
}

/// Ask the submission channel for the current status.
pub async fn refresh(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceRecord>, ApiError> {
    let (record, config) = {
        let store = state.store.lock().await;
        (store.invoices.get(&id)?, store.config.load()?)
    };
    let local = &record.sources.local;
    let (Some(channel), Some(registry)) = (local.channel, local.registry_number.as_deref()) else {
        return Err(FacturaError::Conflict("invoice has not been submitted to a channel".into()).into());
    };

    let update = match channel {
        Channel::Face => StatusUpdate {
            face: Some(
                FaceClient::new(state.transport.clone(), config.face.endpoint.clone())
                    .query_invoice(registry)
                    .await?,
            ),
            ..StatusUpdate::default()
        },
        Channel::FaceB2b => StatusUpdate {
            faceb2b: Some(
                FaceB2bClient::new(state.transport.clone(), config.faceb2b.endpoint.clone())
                    .invoice_details(registry)
                    .await?,
            ),
            ..StatusUpdate::default()
        },
    };

    let store = state.store.lock().await;
    Ok(Json(store.invoices.apply_status(&id, update)?))
}
