//! Error types for ReagentFlow
//!
//! One enum per concern, gathered under [`FlowError`] for the HTTP layer:
//! - Movement validation (rejected before any state change)
//! - Remote store access and row mapping
//! - Alert email delivery
//! - Label analysis
//! - Configuration and manager authentication

/// Reasons a stock movement is rejected before touching state
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransactionError {
    #[error("quantity must be a positive number, got {0}")]
    InvalidQuantity(f64),

    #[error("an analyst must be selected")]
    MissingAnalyst,

    #[error("reagent not found: {0}")]
    ReagentNotFound(String),

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: f64, available: f64 },

    #[error("invalid reagent descriptor: {0}")]
    InvalidDraft(String),
}

/// Remote relational store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("remote store request failed: {0}")]
    Request(String),

    #[error("remote store returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// A row could not be mapped to a domain type
    #[error("invalid {table} row: {reason}")]
    Mapping { table: &'static str, reason: String },

    #[error("remote store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "web")]
impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Request(err.to_string())
    }
}

/// Alert email errors
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("email not configured")]
    NotConfigured,

    #[error("no manager email configured")]
    NoRecipient,

    #[error("email delivery failed: {0}")]
    Delivery(String),

    #[error("email template error: {0}")]
    Template(String),
}

/// Label analysis errors
#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("label analysis not configured")]
    NotConfigured,

    #[error("invalid image data: {0}")]
    InvalidImage(String),

    #[error("label analysis request failed: {0}")]
    Request(String),

    #[error("could not read label analysis response: {0}")]
    Response(String),
}

/// Configuration loading and saving errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Manager authentication errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("password must have at least {0} characters")]
    PasswordTooShort(usize),

    #[error("incorrect password")]
    WrongPassword,

    #[error("password hashing failed")]
    HashingFailed,

    #[error("session expired or missing")]
    NoSession,

    #[error("manager role required")]
    Forbidden,
}

/// Top-level error for service operations
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Label(#[from] LabelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("backup error: {0}")]
    Backup(String),

    #[error("export error: {0}")]
    Export(String),
}

impl FlowError {
    /// Whether the error was caused by caller input rather than a collaborator
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Transaction(_) | Self::Auth(_) | Self::InvalidInput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_display() {
        let err = TransactionError::InsufficientStock {
            requested: 10.0,
            available: 4.0,
        };
        assert!(err.to_string().contains("insufficient stock"));
    }

    #[test]
    fn client_errors_are_classified() {
        assert!(FlowError::from(TransactionError::MissingAnalyst).is_client_error());
        assert!(FlowError::from(AuthError::WrongPassword).is_client_error());
        assert!(!FlowError::from(StoreError::Request("down".into())).is_client_error());
    }
}
