#![cfg(feature = "server")]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use facturador::channels::SoapTransport;
use facturador::core::*;
use facturador::facturae::{XmlSigner, to_facturae_xml};
use facturador::server::{AppState, build_router};
use facturador::store::*;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};

/// Replays canned SOAP responses in order.
#[derive(Default)]
struct CannedTransport {
    responses: Mutex<VecDeque<String>>,
    actions: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl SoapTransport for CannedTransport {
    async fn call(&self, _endpoint: &str, action: &str, _envelope: &str) -> Result<String, FacturaError> {
        self.actions.lock().unwrap().push(action.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| FacturaError::Channel("no canned response".into()))
    }
}

struct FakeSigner;

impl XmlSigner for FakeSigner {
    fn sign(&self, xml: &str) -> Result<String, FacturaError> {
        Ok(xml.replace(
            "</fe:Facturae>",
            "<ds:Signature Id=\"Signature-1\"/></fe:Facturae>",
        ))
    }
}

struct Server {
    _dir: tempfile::TempDir,
    base: String,
    http: reqwest::Client,
    transport: Arc<CannedTransport>,
}

impl Server {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store.auth = Auth::new(store.config.clone()).with_iterations(10);

        let transport = Arc::new(CannedTransport::default());
        let state = AppState::new(store, transport.clone()).with_signer(Arc::new(FakeSigner));
        let app = build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            _dir: dir,
            base: format!("http://{addr}"),
            http: reqwest::Client::new(),
            transport,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn reply(&self, body: &str) {
        self.transport.responses.lock().unwrap().push_back(format!(
            "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\
             <soap:Body>{body}</soap:Body></soap:Envelope>"
        ));
    }

    /// Register, log in and store the issuer profile; returns the token.
    async fn login(&self) -> String {
        let credentials = json!({ "username": "admin", "password": "clave-segura" });
        let res = self
            .http
            .post(self.url("/auth/register"))
            .json(&credentials)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = self
            .http
            .post(self.url("/auth/login"))
            .json(&credentials)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let token = res.json::<Value>().await.unwrap()["token"]
            .as_str()
            .unwrap()
            .to_string();

        let config = AppConfig {
            issuer: Some(
                PartyBuilder::new("Ejemplo Servicios SL", address())
                    .tax_id("B12345674")
                    .build(),
            ),
            ..AppConfig::default()
        };
        let res = self
            .http
            .put(self.url("/config"))
            .bearer_auth(&token)
            .json(&config)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        token
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }
}

fn address() -> Address {
    AddressBuilder::new("Calle Mayor 1", "28013", "Madrid", "Madrid").build()
}

fn buyer() -> Party {
    PartyBuilder::new(
        "Cliente SA",
        AddressBuilder::new("Gran Vía 2", "48001", "Bilbao", "Bizkaia").build(),
    )
    .tax_id("A58818501")
    .build()
}

async fn issue_invoice(server: &Server, token: &str) -> Value {
    let (status, client) = server
        .post(token, "/clients", serde_json::to_value(Client::new(buyer())).unwrap())
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let draft = InvoiceDraft {
        client_id: client["id"].as_str().map(str::to_string),
        issue_date: NaiveDate::from_ymd_opt(2024, 3, 1),
        lines: vec![DraftLine {
            description: Some("Consultoría".into()),
            quantity: dec!(10),
            unit_price: Some(dec!(60)),
            tax_rate: Some(dec!(21)),
            ..DraftLine::default()
        }],
        ..InvoiceDraft::default()
    };
    let (status, record) = server
        .post(token, "/invoices", serde_json::to_value(draft).unwrap())
        .await;
    assert_eq!(status, StatusCode::CREATED, "{record}");
    record
}

#[tokio::test]
async fn health_is_public() {
    let server = Server::start().await;
    let res = server.http.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap()["status"], "ok");
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let server = Server::start().await;

    let res = server.http.get(server.url("/invoices")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(res.json::<Value>().await.unwrap()["error"].is_string());

    let (status, _) = server.get("not-a-token", "/dashboard").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = server.login().await;
    let (status, body) = server.get(&token, "/invoices").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let res = server
        .http
        .post(server.url("/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let (status, _) = server.get(&token, "/invoices").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_rules() {
    let server = Server::start().await;
    let res = server
        .http
        .post(server.url("/auth/register"))
        .json(&json!({ "username": "admin", "password": "corta" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    server.login().await;
    let res = server
        .http
        .post(server.url("/auth/register"))
        .json(&json!({ "username": "otro", "password": "otra-clave-larga" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = server
        .http
        .post(server.url("/auth/login"))
        .json(&json!({ "username": "admin", "password": "incorrecta" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn config_hides_credentials() {
    let server = Server::start().await;
    let token = server.login().await;
    let (status, config) = server.get(&token, "/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["user"], Value::Null);
    assert_eq!(config["issuer"]["tax_id"], "B12345674");
    assert_eq!(config["series"]["prefix"], "F");
}

#[tokio::test]
async fn clients_validate_and_404() {
    let server = Server::start().await;
    let token = server.login().await;

    let bad = Client::new(
        PartyBuilder::new("Mal SL", address())
            .tax_id("B12345670")
            .build(),
    );
    let (status, body) = server
        .post(&token, "/clients", serde_json::to_value(bad).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("party.tax_id"));

    let (status, _) = server.get(&token, "/clients/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.get(&token, "/invoices/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_amounts_are_unprocessable() {
    let server = Server::start().await;
    let token = server.login().await;

    let draft = InvoiceDraft {
        buyer: Some(buyer()),
        issue_date: NaiveDate::from_ymd_opt(2024, 3, 1),
        lines: vec![DraftLine {
            description: Some("Consultoría".into()),
            quantity: Decimal::MAX,
            unit_price: Some(dec!(2)),
            tax_rate: Some(dec!(21)),
            ..DraftLine::default()
        }],
        ..InvoiceDraft::default()
    };
    let (status, body) = server
        .post(&token, "/invoices", serde_json::to_value(draft).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert!(body["error"].as_str().unwrap().contains("line 1"));

    let record = issue_invoice(&server, &token).await;
    assert_eq!(record["invoice"]["number"], "F2024-0001");
}

#[tokio::test]
async fn invoice_lifecycle_over_http() {
    let server = Server::start().await;
    let token = server.login().await;
    let record = issue_invoice(&server, &token).await;
    let id = record["id"].as_str().unwrap().to_string();

    assert_eq!(record["invoice"]["number"], "F2024-0001");
    let total: Decimal = record["invoice"]["totals"]["invoice_total"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(total, dec!(726));
    assert_eq!(record["status"]["state"], "issued");
    assert_eq!(record["has_xml"], true);

    let res = server
        .http
        .get(server.url(&format!("/invoices/{id}/xml")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        res.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("application/xml")
    );
    assert!(res.text().await.unwrap().contains("<InvoiceTotal>726.00</InvoiceTotal>"));

    // FACe needs DIR3 units on the buyer.
    let (status, _) = server
        .post(&token, &format!("/invoices/{id}/submit"), json!({ "channel": "face" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    server.reply(
        "<r><resultStatus><code>0</code></resultStatus>\
         <invoiceDetail><registryNumber>ES-B2B-0001</registryNumber></invoiceDetail></r>",
    );
    let (status, submitted) = server
        .post(
            &token,
            &format!("/invoices/{id}/submit"),
            json!({ "channel": "face_b2b", "email": "ap@cliente.es" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{submitted}");
    assert_eq!(submitted["status"]["state"], "submitted");
    assert_eq!(submitted["sources"]["local"]["registry_number"], "ES-B2B-0001");

    // The signed document is served once it exists.
    let res = server
        .http
        .get(server.url(&format!("/invoices/{id}/xml")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert!(res.text().await.unwrap().contains("ds:Signature"));

    server.reply(
        "<r><resultStatus><code>0</code></resultStatus><invoiceDetail>\
         <registryNumber>ES-B2B-0001</registryNumber>\
         <status><code>2400</code><name>Accepted</name></status>\
         </invoiceDetail></r>",
    );
    let (status, refreshed) = server
        .post(&token, &format!("/invoices/{id}/refresh"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{refreshed}");
    assert_eq!(refreshed["status"]["state"], "accepted");
    assert_eq!(refreshed["status"]["source"], "face_b2b");

    let actions = server.transport.actions.lock().unwrap().clone();
    assert_eq!(actions.len(), 2);
    assert!(actions[0].ends_with("/SendInvoice"));
    assert!(actions[1].ends_with("/GetInvoiceDetails"));

    let (status, cancelled) = server
        .post(
            &token,
            &format!("/invoices/{id}/cancel"),
            json!({ "reason": "Duplicada" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"]["state"], "cancelled");
    assert_eq!(cancelled["cancellation_reason"], "Duplicada");

    let (status, _) = server
        .post(&token, &format!("/invoices/{id}/paid"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, report) = server.get(&token, "/verifactu/verify").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["valid"], true);
    assert_eq!(report["total"], 2);

    let (_, log) = server.get(&token, "/verifactu/log").await;
    assert_eq!(log[0]["kind"], "registration");
    assert_eq!(log[1]["kind"], "cancellation");
    assert_eq!(log[1]["previous"]["fingerprint"], log[0]["fingerprint"]);
}

#[tokio::test]
async fn rectify_and_mark_paid() {
    let server = Server::start().await;
    let token = server.login().await;
    let original = issue_invoice(&server, &token).await;
    let id = original["id"].as_str().unwrap();

    let (status, rectifying) = server
        .post(
            &token,
            &format!("/invoices/{id}/rectify"),
            json!({ "reason": "TaxRate", "method": "Full", "issue_date": "2024-03-05" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{rectifying}");
    assert_eq!(rectifying["invoice"]["number"], "R2024-0001");
    assert_eq!(rectifying["rectifies"], id);

    let (status, paid) = server
        .post(&token, &format!("/invoices/{id}/paid"), json!({ "date": "2024-04-01" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"]["state"], "paid");
    assert_eq!(paid["rectified_by"][0], rectifying["id"]);

    let (_, paid_only) = server.get(&token, "/invoices?state=paid").await;
    assert_eq!(paid_only.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn received_invoices_over_http() {
    let server = Server::start().await;
    let token = server.login().await;

    let supplier_invoice = InvoiceBuilder::new("P-0042", NaiveDate::from_ymd_opt(2024, 2, 20).unwrap())
        .seller(buyer())
        .buyer(
            PartyBuilder::new("Ejemplo Servicios SL", address())
                .tax_id("B12345674")
                .build(),
        )
        .add_line(LineItemBuilder::new("Licencias", dec!(5), dec!(100)).build())
        .build()
        .unwrap();
    let xml = to_facturae_xml(&supplier_invoice).unwrap();

    let res = server
        .http
        .post(server.url("/received"))
        .bearer_auth(&token)
        .body(xml.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let imported: Value = res.json().await.unwrap();
    assert_eq!(imported["state"], "pending");
    let id = imported["id"].as_str().unwrap();

    let res = server
        .http
        .post(server.url("/received"))
        .bearer_auth(&token)
        .body(xml)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let (status, _) = server
        .post(&token, &format!("/received/{id}/transition"), json!({ "to": "paid" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, accepted) = server
        .post(
            &token,
            &format!("/received/{id}/transition"),
            json!({ "to": "accepted", "note": "Conforme" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["history"].as_array().unwrap().len(), 2);

    let (status, dashboard) = server.get(&token, "/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["received_pending"], 0);
    assert_eq!(dashboard["audit_chain_valid"], true);
}
