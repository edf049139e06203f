use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use super::json_store::JsonStore;
use crate::core::{FacturaError, Party, ResidenceType, TaxType, ValidationError, is_valid_nif};

/// A document managed by a [`DataManager`].
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Directory name inside the data directory.
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn touch(&mut self, at: DateTime<Utc>);
    fn validate(&self) -> Vec<ValidationError>;
    /// Text matched by [`DataManager::search`] and used for ordering.
    fn search_text(&self) -> String;
}

/// A customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    #[serde(default)]
    pub id: String,
    pub party: Party,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn new(party: Party) -> Self {
        Self {
            id: String::new(),
            party,
            email: None,
            notes: None,
            updated_at: Utc::now(),
        }
    }
}

impl Record for Client {
    const COLLECTION: &'static str = "clients";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.party.name.trim().is_empty() {
            errors.push(ValidationError::new("party.name", "client name is required"));
        }
        if let Some(nif) = &self.party.tax_id {
            if self.party.residence == ResidenceType::Resident && !is_valid_nif(nif) {
                errors.push(ValidationError::new(
                    "party.tax_id",
                    format!("'{nif}' is not a valid NIF"),
                ));
            }
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                errors.push(ValidationError::new("email", format!("'{email}' is not an e-mail address")));
            }
        }
        errors
    }

    fn search_text(&self) -> String {
        let mut text = self.party.display_name();
        for extra in [&self.party.tax_id, &self.email].into_iter().flatten() {
            text.push(' ');
            text.push_str(extra);
        }
        text
    }
}

/// A catalogue product or service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: String,
    /// Internal reference (SKU).
    #[serde(default)]
    pub reference: Option<String>,
    pub description: String,
    pub unit_price: Decimal,
    #[serde(default = "default_tax_type")]
    pub tax_type: TaxType,
    pub tax_rate: Decimal,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_tax_type() -> TaxType {
    TaxType::Iva
}

impl Product {
    pub fn new(description: impl Into<String>, unit_price: Decimal, tax_rate: Decimal) -> Self {
        Self {
            id: String::new(),
            reference: None,
            description: description.into(),
            unit_price,
            tax_type: TaxType::Iva,
            tax_rate,
            updated_at: Utc::now(),
        }
    }
}

impl Record for Product {
    const COLLECTION: &'static str = "products";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.description.trim().is_empty() {
            errors.push(ValidationError::new("description", "product description is required"));
        }
        if self.unit_price < Decimal::ZERO {
            errors.push(ValidationError::new("unit_price", "price must not be negative"));
        }
        if self.tax_rate < Decimal::ZERO || self.tax_rate > Decimal::ONE_HUNDRED {
            errors.push(ValidationError::new("tax_rate", "tax rate must be between 0 and 100"));
        }
        errors
    }

    fn search_text(&self) -> String {
        match &self.reference {
            Some(reference) => format!("{} {reference}", self.description),
            None => self.description.clone(),
        }
    }
}

/// CRUD over one collection of [`Record`]s.
#[derive(Debug, Clone)]
pub struct DataManager<T> {
    store: JsonStore,
    _record: PhantomData<T>,
}

fn check<T: Record>(record: &T) -> Result<(), FacturaError> {
    let errors = record.validate();
    if errors.is_empty() {
        return Ok(());
    }
    Err(FacturaError::Validation(
        errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "),
    ))
}

impl<T: Record> DataManager<T> {
    pub fn new(store: JsonStore) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// All records ordered by their search text.
    pub fn list(&self) -> Result<Vec<T>, FacturaError> {
        let mut records: Vec<T> = self.store.list()?;
        records.sort_by_key(|r| r.search_text().to_lowercase());
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<T, FacturaError> {
        self.store
            .get(id)?
            .ok_or_else(|| FacturaError::NotFound(format!("{} '{id}'", T::COLLECTION)))
    }

    /// Validate and store a new record under a fresh id.
    pub fn create(&self, mut record: T) -> Result<T, FacturaError> {
        check(&record)?;
        record.set_id(uuid::Uuid::new_v4().to_string());
        record.touch(Utc::now());
        self.store.put(record.id(), &record)?;
        tracing::info!(collection = T::COLLECTION, id = record.id(), "record created");
        Ok(record)
    }

    /// Replace record `id`; the stored id is kept whatever `record` carries.
    pub fn update(&self, id: &str, mut record: T) -> Result<T, FacturaError> {
        self.get(id)?;
        check(&record)?;
        record.set_id(id.to_string());
        record.touch(Utc::now());
        self.store.put(id, &record)?;
        tracing::info!(collection = T::COLLECTION, id, "record updated");
        Ok(record)
    }

    pub fn delete(&self, id: &str) -> Result<(), FacturaError> {
        if !self.store.delete(id)? {
            return Err(FacturaError::NotFound(format!("{} '{id}'", T::COLLECTION)));
        }
        tracing::info!(collection = T::COLLECTION, id, "record deleted");
        Ok(())
    }

    /// Records whose search text contains `query`, ignoring case.
    pub fn search(&self, query: &str) -> Result<Vec<T>, FacturaError> {
        let needle = query.trim().to_lowercase();
        let mut records = self.list()?;
        if !needle.is_empty() {
            records.retain(|r| r.search_text().to_lowercase().contains(&needle));
        }
        Ok(records)
    }
}
