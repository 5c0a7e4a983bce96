//! Error Types

use std::time::Duration;

use thiserror::Error;

/// Result type alias for shop operations
pub type Result<T> = std::result::Result<T, ShopError>;

/// Checkout and reconciliation errors
#[derive(Error, Debug)]
pub enum ShopError {
    /// Payment provider rejected or failed the request
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// Payment provider did not answer in time
    #[error("Payment provider timed out after {0:?}")]
    ProviderTimeout(Duration),

    /// Cart has no purchasable lines
    #[error("Cart is empty")]
    EmptyCart,

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persistent store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl ShopError {
    /// Check if a later attempt could succeed
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::ProviderTimeout(_) | Self::Storage(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(detail) => format!("Error creating checkout session: {detail}"),
            Self::ProviderTimeout(_) => {
                "The payment service did not respond. Please try again.".into()
            }
            Self::EmptyCart => "Select at least one product.".into(),
            Self::WebhookSignature(_) => "Invalid signature.".into(),
            Self::WebhookParse(_) => "Malformed event payload.".into(),
            Self::NotFound(what) => format!("{what} not found."),
            Self::Config(_) => "Service configuration error.".into(),
            _ => "An error occurred processing your request.".into(),
        }
    }
}
