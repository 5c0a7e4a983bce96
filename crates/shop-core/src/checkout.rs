//! Checkout Orchestration
//!
//! Turns a cart into a hosted checkout URL. Repeated submissions of the same
//! cart by the same customer collapse onto one order and one provider
//! session via the cart fingerprint:
//!
//! ```text
//! cart ──▶ fingerprint ──▶ open order with session? ──yes──▶ cached / retrieved URL
//!                                   │ no
//!                                   ▼
//!                      open order without session? ──yes──▶ resume it
//!                                   │ no
//!                                   ▼
//!                          create order + items ──▶ create session ──▶ URL
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cart::Cart;
use crate::error::{Result, ShopError};
use crate::model::{CustomerToken, NewOrder, Order};
use crate::provider::{
    bounded, HostedSession, PaymentProvider, SessionLineItem, SessionRequest,
    SESSION_ID_PLACEHOLDER,
};
use crate::store::OrderStore;

/// Settings shared by checkout and reconciliation
#[derive(Clone, Debug)]
pub struct CheckoutSettings {
    /// Absolute base used to build success/cancel redirects
    pub public_base_url: String,

    /// Currency for new orders
    pub currency: String,

    /// Email stored on new orders until the provider reports the real one
    pub placeholder_email: String,

    /// Upper bound on any single provider call
    pub provider_timeout: Duration,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:3000".into(),
            currency: "usd".into(),
            placeholder_email: "customer@example.com".into(),
            provider_timeout: Duration::from_secs(15),
        }
    }
}

impl CheckoutSettings {
    pub fn success_url(&self) -> String {
        format!(
            "{}/success/?session_id={SESSION_ID_PLACEHOLDER}",
            self.public_base_url.trim_end_matches('/')
        )
    }

    pub fn cancel_url(&self, order_id: i64) -> String {
        format!(
            "{}/cancel/?order_id={order_id}",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

/// Where to send the customer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutOutcome {
    pub order_id: i64,
    pub checkout_url: String,
    /// An existing session was reused; no provider session was created
    pub reused: bool,
}

/// Checkout orchestrator
pub struct CheckoutService {
    store: Arc<dyn OrderStore>,
    provider: Arc<dyn PaymentProvider>,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        provider: Arc<dyn PaymentProvider>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            store,
            provider,
            settings,
        }
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    /// Start (or resume) checkout for a cart.
    ///
    /// A provider failure leaves the order in `created` so that the next
    /// submission of the same cart resumes it.
    pub async fn start_checkout(
        &self,
        customer_token: &CustomerToken,
        cart: &Cart,
    ) -> Result<CheckoutOutcome> {
        if cart.is_empty() {
            return Err(ShopError::EmptyCart);
        }

        let fingerprint = cart.fingerprint(customer_token.as_str());

        let order = match self.store.reusable_order(&fingerprint).await? {
            Some(existing) if existing.session_id.is_some() => {
                if let Some(outcome) = self.reuse_session(&existing).await {
                    return Ok(outcome);
                }
                self.create_order(customer_token, cart, &fingerprint).await?
            }
            Some(existing) => {
                tracing::info!(order_id = existing.id, "Resuming order without a session");
                existing
            }
            None => self.create_order(customer_token, cart, &fingerprint).await?,
        };

        let request = self.session_request(&order, customer_token, &fingerprint);
        let session = bounded(
            self.settings.provider_timeout,
            self.provider.create_session(&request),
        )
        .await
        .inspect_err(|e| {
            tracing::error!(
                order_id = order.id,
                provider = self.provider.name(),
                error = %e,
                "Error creating checkout session"
            );
        })?;

        let checkout_url = self.attach(&order, &session).await?;

        tracing::info!(
            order_id = order.id,
            session_id = %session.id,
            total_cents = order.total_cents,
            "Checkout session created"
        );

        Ok(CheckoutOutcome {
            order_id: order.id,
            checkout_url,
            reused: false,
        })
    }

    /// Redirect target for an order that already has a session, if one can
    /// still be produced. Any failure here means "create a new order".
    async fn reuse_session(&self, order: &Order) -> Option<CheckoutOutcome> {
        if let Some(url) = &order.checkout_url {
            tracing::debug!(order_id = order.id, "Reusing cached checkout URL");
            return Some(CheckoutOutcome {
                order_id: order.id,
                checkout_url: url.clone(),
                reused: true,
            });
        }

        let session_id = order.session_id.as_deref()?;
        let details = match bounded(
            self.settings.provider_timeout,
            self.provider.retrieve_session(session_id),
        )
        .await
        {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!(
                    order_id = order.id,
                    session_id = %session_id,
                    error = %e,
                    "Could not retrieve existing session, creating a new order"
                );
                return None;
            }
        };

        let Some(url) = details.url else {
            tracing::warn!(order_id = order.id, "Existing session has no URL");
            return None;
        };

        if let Err(e) = self.store.cache_checkout_url(order.id, &url).await {
            tracing::warn!(order_id = order.id, error = %e, "Failed to cache checkout URL");
        }

        Some(CheckoutOutcome {
            order_id: order.id,
            checkout_url: url,
            reused: true,
        })
    }

    async fn create_order(
        &self,
        customer_token: &CustomerToken,
        cart: &Cart,
        fingerprint: &str,
    ) -> Result<Order> {
        let order = self
            .store
            .create_order(NewOrder {
                customer_token: customer_token.as_str().to_string(),
                email: self.settings.placeholder_email.clone(),
                currency: self.settings.currency.clone(),
                fingerprint: fingerprint.to_string(),
                lines: cart.order_lines(),
            })
            .await?;

        tracing::info!(
            order_id = order.id,
            items = order.items.len(),
            total_cents = order.total_cents,
            "Created order"
        );
        Ok(order)
    }

    fn session_request(
        &self,
        order: &Order,
        customer_token: &CustomerToken,
        fingerprint: &str,
    ) -> SessionRequest {
        let line_items = order
            .items
            .iter()
            .map(|item| SessionLineItem {
                name: item.product_name.clone(),
                currency: order.currency.clone(),
                unit_amount_cents: item.unit_price_cents,
                quantity: item.quantity,
            })
            .collect();

        let mut metadata = HashMap::new();
        metadata.insert("order_id".to_string(), order.id.to_string());
        metadata.insert(
            "customer_token".to_string(),
            customer_token.as_str().to_string(),
        );

        SessionRequest {
            line_items,
            success_url: self.settings.success_url(),
            cancel_url: self.settings.cancel_url(order.id),
            client_reference_id: order.id.to_string(),
            customer_email: Some(self.settings.placeholder_email.clone()),
            metadata,
            // Scoped to the order so a fresh order after a cancel gets a
            // fresh session, while retries for this order still collapse.
            idempotency_key: format!("{fingerprint}:{}", order.id),
        }
    }

    /// Persist the session id, then the URL, and return where to send the
    /// customer. Losing the URL only costs a retrieve call on the next reuse.
    ///
    /// If a concurrent request attached its session first, that session
    /// stays and its URL is returned instead of ours.
    async fn attach(&self, order: &Order, session: &HostedSession) -> Result<String> {
        if self.store.attach_session(order.id, &session.id).await? {
            if let Err(e) = self.store.cache_checkout_url(order.id, &session.url).await {
                tracing::warn!(order_id = order.id, error = %e, "Failed to cache checkout URL");
            }
            return Ok(session.url.clone());
        }

        tracing::warn!(
            order_id = order.id,
            session_id = %session.id,
            "Order already had a session id; keeping the original"
        );

        let current = self
            .store
            .order(order.id)
            .await?
            .ok_or_else(|| ShopError::NotFound(format!("Order {}", order.id)))?;
        match self.reuse_session(&current).await {
            Some(outcome) => Ok(outcome.checkout_url),
            None => {
                tracing::warn!(order_id = order.id, "Original session unavailable, using the new one");
                Ok(session.url.clone())
            }
        }
    }
}
