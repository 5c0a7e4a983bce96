//! Stripe Checkout Integration
//!
//! Implements [`PaymentProvider`] over Stripe Checkout (Hosted) in one-off
//! payment mode.

use async_trait::async_trait;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionId, CheckoutSessionMode,
    CheckoutSessionPaymentStatus, Client, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
    Currency, RequestStrategy,
};

use shop_core::error::{Result, ShopError};
use shop_core::provider::{
    HostedSession, PaymentProvider, PaymentStatus, SessionDetails, SessionLineItem,
    SessionRequest,
};

/// Fields expanded when retrieving a session for reconciliation
const RETRIEVE_EXPAND: &[&str] = &["payment_intent"];

/// Stripe client wrapper
///
/// Holds its own API key; nothing is configured process-wide.
pub struct StripeClient {
    client: Client,
    webhook_secret: Option<String>,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str, webhook_secret: Option<&str>) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }

    /// Create from environment variables.
    ///
    /// `STRIPE_SECRET_KEY` is required; `STRIPE_WEBHOOK_SECRET` is optional
    /// and its absence puts webhooks in unverified development mode.
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| ShopError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET").ok();

        Ok(Self::new(&secret_key, webhook_secret.as_deref()))
    }

    /// Get the webhook signing secret, if configured
    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_session(&self, request: &SessionRequest) -> Result<HostedSession> {
        let line_items = request
            .line_items
            .iter()
            .map(stripe_line_item)
            .collect::<Result<Vec<_>>>()?;

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.client_reference_id = Some(&request.client_reference_id);
        params.customer_email = request.customer_email.as_deref();
        params.metadata = Some(request.metadata.clone());
        params.line_items = Some(line_items);

        let client = self
            .client
            .clone()
            .with_strategy(RequestStrategy::Idempotent(request.idempotency_key.clone()));

        let session = StripeCheckoutSession::create(&client, params)
            .await
            .map_err(|e| ShopError::Provider(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| ShopError::Provider("No checkout URL returned".into()))?;

        Ok(HostedSession {
            id: session.id.to_string(),
            url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails> {
        let id: CheckoutSessionId = session_id
            .parse()
            .map_err(|e| ShopError::Provider(format!("Invalid session id '{session_id}': {e}")))?;

        let session = StripeCheckoutSession::retrieve(&self.client, &id, RETRIEVE_EXPAND)
            .await
            .map_err(|e| ShopError::Provider(e.to_string()))?;

        let payment_status = match session.payment_status {
            CheckoutSessionPaymentStatus::Paid => PaymentStatus::Paid,
            CheckoutSessionPaymentStatus::NoPaymentRequired => PaymentStatus::NoPaymentRequired,
            _ => PaymentStatus::Unpaid,
        };

        Ok(SessionDetails {
            id: session.id.to_string(),
            url: session.url,
            payment_status,
            client_reference_id: session.client_reference_id,
            customer_email: session.customer_details.and_then(|details| details.email),
        })
    }

    fn name(&self) -> &str {
        "Stripe"
    }
}

fn stripe_line_item(item: &SessionLineItem) -> Result<CreateCheckoutSessionLineItems> {
    Ok(CreateCheckoutSessionLineItems {
        quantity: Some(u64::from(item.quantity)),
        price_data: Some(CreateCheckoutSessionLineItemsPriceData {
            currency: parse_currency(&item.currency)?,
            unit_amount: Some(item.unit_amount_cents),
            product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                name: item.name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Map an ISO currency code (any case) onto Stripe's currency enum
pub fn parse_currency(code: &str) -> Result<Currency> {
    serde_json::from_value(serde_json::Value::String(code.trim().to_lowercase()))
        .map_err(|_| ShopError::Provider(format!("Unsupported currency: {code}")))
}
