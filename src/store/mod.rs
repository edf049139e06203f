//! File-backed persistence: configuration and secrets, the single user,
//! clients and products, issued and received invoices.
//!
//! Everything lives below one data directory:
//!
//! ```text
//! data/
//!   config.json      AppConfig
//!   master.key       secret-sealing key
//!   verifactu.xml    audit log
//!   clients/ products/ invoices/ received/   one JSON file per record
//!   facturae/        generated and signed Facturae documents
//! ```

mod auth;
mod config;
mod dashboard;
mod data;
mod invoices;
mod json_store;
mod received;

pub use auth::{Auth, MIN_PASSWORD_LEN, PASSWORD_ITERATIONS, SESSION_HOURS, Session, UserCredential};
pub use config::{
    AppConfig, ConfigStore, FaceB2bSettings, FaceSettings, SealedSecret, SecretVault, SeriesConfig,
    SignerSettings,
};
pub use dashboard::{Dashboard, StateCount, dashboard};
pub use data::{Client, DataManager, Product, Record};
pub use invoices::{
    DraftLine, InvoiceDraft, InvoiceFilter, InvoiceManager, InvoiceRecord, RectifyRequest,
    StatusUpdate,
};
pub use json_store::JsonStore;
pub use received::{ReceivedEvent, ReceivedInvoice, ReceivedManager, ReceivedState};

use chrono::Local;
use std::path::{Path, PathBuf};

use crate::core::FacturaError;
use crate::verifactu::{AuditLog, LOG_FILE_NAME};

/// All managers over one data directory.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    pub config: ConfigStore,
    pub vault: SecretVault,
    pub auth: Auth,
    pub clients: DataManager<Client>,
    pub products: DataManager<Product>,
    pub invoices: InvoiceManager,
    pub received: ReceivedManager,
}

impl Store {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FacturaError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let config = ConfigStore::new(root.join("config.json"));
        let clients = DataManager::new(JsonStore::open(root.join(Client::COLLECTION))?);
        let products = DataManager::new(JsonStore::open(root.join(Product::COLLECTION))?);
        let invoices = InvoiceManager::new(
            JsonStore::open(root.join("invoices"))?,
            root.join("facturae"),
            clients.clone(),
            products.clone(),
            AuditLog::open(root.join(LOG_FILE_NAME))?,
        )?;
        tracing::info!(root = %root.display(), "store opened");
        Ok(Self {
            vault: SecretVault::new(root.join("master.key")),
            auth: Auth::new(config.clone()),
            received: ReceivedManager::new(JsonStore::open(root.join("received"))?),
            config,
            clients,
            products,
            invoices,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dashboard(&self) -> Result<Dashboard, FacturaError> {
        let invoices = self.invoices.list(&InvoiceFilter::default())?;
        let received = self.received.list()?;
        Ok(dashboard(
            &invoices,
            &received,
            &self.invoices.verify_log(),
            Local::now().date_naive(),
        ))
    }
}
