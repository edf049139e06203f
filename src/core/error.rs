use thiserror::Error;

/// Errors that can occur while building, storing, signing or submitting invoices.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FacturaError {
    /// One or more validation rules failed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Builder encountered invalid or missing configuration.
    #[error("builder error: {0}")]
    Builder(String),

    /// Invoice number sequencing error.
    #[error("numbering error: {0}")]
    Numbering(String),

    /// XML generation or parsing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// The external signer failed or returned an unsigned document.
    #[error("signature error: {0}")]
    Signature(String),

    /// The Veri*Factu audit chain is broken or cannot be extended.
    #[error("audit chain error: {0}")]
    Chain(String),

    /// FACe, FACeB2B or AEAT returned an error or could not be reached.
    #[error("channel error: {0}")]
    Channel(String),

    /// A stored document could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Authentication or session failure.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The operation conflicts with the current state of a record.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Secret sealing or opening failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "buyer.tax_id").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
    /// Legal reference if applicable (e.g. "RD1619/2012 art.6").
    pub rule: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "[{}] {}: {}", rule, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

impl ValidationError {
    /// Create a validation error without a rule reference.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: None,
        }
    }

    /// Create a validation error citing the rule it enforces.
    pub fn with_rule(
        field: impl Into<String>,
        message: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: Some(rule.into()),
        }
    }
}
