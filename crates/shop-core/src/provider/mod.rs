//! Hosted Payment Provider Strategy
//!
//! The checkout orchestrator and the redirect reconciler talk to the payment
//! provider only through [`PaymentProvider`]. The Stripe implementation lives
//! in `shop-payments`; [`MockPaymentProvider`] backs tests and local demos.

mod mock;

pub use mock::MockPaymentProvider;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShopError};

/// Placeholder the provider replaces with the real session id in the
/// success redirect
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// One priced line shown on the hosted checkout page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLineItem {
    pub name: String,
    pub currency: String,
    pub unit_amount_cents: i64,
    pub quantity: u32,
}

/// Request to open a hosted checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRequest {
    pub line_items: Vec<SessionLineItem>,

    /// Redirect after successful payment; contains [`SESSION_ID_PLACEHOLDER`]
    pub success_url: String,

    /// Redirect if the customer backs out
    pub cancel_url: String,

    /// Our order id, echoed back on the session and in webhooks
    pub client_reference_id: String,

    pub customer_email: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Collapses retried create calls into one session at the provider
    pub idempotency_key: String,
}

/// A freshly created session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedSession {
    pub id: String,
    pub url: String,
}

/// Payment state reported on a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

/// A session as retrieved from the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDetails {
    pub id: String,
    pub url: Option<String>,
    pub payment_status: PaymentStatus,
    pub client_reference_id: Option<String>,
    pub customer_email: Option<String>,
}

impl SessionDetails {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

/// Await a provider call, giving up after `limit`
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| ShopError::ProviderTimeout(limit))?
}

/// Strategy trait for hosted checkout providers
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Open a hosted checkout session
    async fn create_session(&self, request: &SessionRequest) -> Result<HostedSession>;

    /// Look up a session with payment and customer details
    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails>;

    /// Provider name for logs
    fn name(&self) -> &str;
}
