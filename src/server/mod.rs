//! JSON HTTP API over [`Store`](crate::store::Store) and the channels.
//!
//! `/health`, `/auth/register` and `/auth/login` are public; every other
//! route needs `Authorization: Bearer <token>` from a login.

mod auth;
mod error;
mod invoices;
mod received;
mod records;

pub use error::ApiError;

use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::channels::SoapTransport;
use crate::core::FacturaError;
use crate::facturae::{CommandSigner, XmlSigner};
use crate::store::{AppConfig, Client, Product, Store};

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<Store>>,
    pub transport: Arc<dyn SoapTransport>,
    signer: Option<Arc<dyn XmlSigner>>,
}

impl AppState {
    pub fn new(store: Store, transport: Arc<dyn SoapTransport>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            transport,
            signer: None,
        }
    }

    /// Use `signer` instead of the command configured in [`AppConfig`].
    pub fn with_signer(mut self, signer: Arc<dyn XmlSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    fn signer(&self, config: &AppConfig) -> Result<Arc<dyn XmlSigner>, FacturaError> {
        if let Some(signer) = &self.signer {
            return Ok(signer.clone());
        }
        let program = config
            .signer
            .program
            .as_deref()
            .ok_or_else(|| FacturaError::Signature("no signer is configured".into()))?;
        Ok(Arc::new(CommandSigner::new(program).args(config.signer.args.iter())))
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Build the full router. Used by the binary and the integration tests.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/config", get(records::get_config).put(records::put_config))
        .route("/clients", get(records::list::<Client>).post(records::create::<Client>))
        .route(
            "/clients/:id",
            get(records::get::<Client>)
                .put(records::update::<Client>)
                .delete(records::delete::<Client>),
        )
        .route("/products", get(records::list::<Product>).post(records::create::<Product>))
        .route(
            "/products/:id",
            get(records::get::<Product>)
                .put(records::update::<Product>)
                .delete(records::delete::<Product>),
        )
        .route("/invoices", get(invoices::list).post(invoices::create))
        .route("/invoices/:id", get(invoices::get))
        .route("/invoices/:id/xml", get(invoices::xml))
        .route("/invoices/:id/rectify", post(invoices::rectify))
        .route("/invoices/:id/paid", post(invoices::mark_paid))
        .route("/invoices/:id/cancel", post(invoices::cancel))
        .route("/invoices/:id/status", post(invoices::apply_status))
        .route("/invoices/:id/submit", post(invoices::submit))
        .route("/invoices/:id/refresh", post(invoices::refresh))
        .route("/received", get(received::list).post(received::import))
        .route("/received/:id", get(received::get))
        .route("/received/:id/transition", post(received::transition))
        .route("/verifactu/log", get(records::audit_log))
        .route("/verifactu/verify", get(records::verify_log))
        .route("/dashboard", get(records::dashboard))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_session));

    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .merge(protected)
        .with_state(state)
}
