//! Stripe Webhook Handling
//!
//! Verifies `Stripe-Signature` headers and applies `checkout.session.completed`
//! events to the order ledger. Everything other than a bad signature or an
//! unparsable body is acknowledged, since the provider retries on non-2xx and
//! a retry cannot fix a processing problem on our side.

use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use shop_core::error::{Result, ShopError};
use shop_core::reconcile::Reconciler;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed payload, in seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Event type for a finished hosted checkout
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Verify a Stripe webhook signature against the current time.
///
/// Header format: `t=<unix timestamp>,v1=<hex hmac>[,v1=…]`, where the HMAC
/// is SHA-256 over `"{t}.{payload}"` keyed with the endpoint secret.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &str) -> Result<()> {
    verify_signature_at(payload, signature_header, secret, Utc::now().timestamp())
}

/// Verify a Stripe webhook signature as of `now` (unix seconds)
pub fn verify_signature_at(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now: i64,
) -> Result<()> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| ShopError::WebhookSignature("missing or invalid timestamp".into()))?;
    if candidates.is_empty() {
        return Err(ShopError::WebhookSignature("no v1 signature".into()));
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(ShopError::WebhookSignature(
            "timestamp outside the tolerance zone".into(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ShopError::WebhookSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|expected| mac.clone().verify_slice(&expected).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(ShopError::WebhookSignature(
            "no signature matches the payload".into(),
        ))
    }
}

/// Compute a `Stripe-Signature` header value for a payload
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ShopError::WebhookSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<RawEventData>,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawCheckoutSession {
    id: Option<String>,
    client_reference_id: Option<String>,
    customer_details: Option<RawCustomerDetails>,
}

#[derive(Deserialize)]
struct RawCustomerDetails {
    email: Option<String>,
}

/// The subset of webhook events the storefront consumes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Hosted checkout finished
    CheckoutCompleted {
        session_id: Option<String>,
        client_reference_id: Option<String>,
        customer_email: Option<String>,
    },

    /// Unhandled event type
    Other { event_type: String },
}

impl WebhookEvent {
    /// Parse a webhook body
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| ShopError::WebhookParse(e.to_string()))?;

        if raw.event_type != CHECKOUT_SESSION_COMPLETED {
            return Ok(Self::Other {
                event_type: raw.event_type,
            });
        }

        let session: RawCheckoutSession = raw
            .data
            .map(|data| serde_json::from_value(data.object))
            .transpose()
            .map_err(|e| ShopError::WebhookParse(format!("Invalid checkout session data: {e}")))?
            .unwrap_or(RawCheckoutSession {
                id: None,
                client_reference_id: None,
                customer_details: None,
            });

        Ok(Self::CheckoutCompleted {
            session_id: session.id,
            client_reference_id: session.client_reference_id,
            customer_email: session.customer_details.and_then(|d| d.email),
        })
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::CheckoutCompleted { .. } => CHECKOUT_SESSION_COMPLETED,
            Self::Other { event_type } => event_type,
        }
    }
}

/// Webhook handler
pub struct WebhookHandler {
    reconciler: Arc<Reconciler>,
    secret: Option<String>,
}

impl WebhookHandler {
    /// Without a secret, payloads are trusted as-is (local development only)
    pub fn new(reconciler: Arc<Reconciler>, secret: Option<String>) -> Self {
        Self {
            reconciler,
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub const fn verifies_signatures(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify and process a webhook delivery.
    ///
    /// Errors only for a bad signature or an unparsable body; both mean
    /// nothing was changed.
    pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookEvent> {
        if let Some(secret) = &self.secret {
            let signature = signature
                .ok_or_else(|| ShopError::WebhookSignature("missing signature header".into()))?;
            verify_signature(payload, signature, secret)?;
        }

        let event = WebhookEvent::parse(payload)?;
        tracing::info!(event_type = %event.event_type(), "Processing Stripe webhook");

        match &event {
            WebhookEvent::CheckoutCompleted {
                session_id,
                client_reference_id,
                customer_email,
            } => {
                let result = self
                    .reconciler
                    .record_completed_payment(
                        session_id.as_deref(),
                        client_reference_id.as_deref(),
                        customer_email.as_deref(),
                    )
                    .await;

                match result {
                    Ok(Some(record)) => tracing::info!(
                        order_id = record.order_id,
                        newly_paid = record.newly_paid,
                        "Checkout completion applied"
                    ),
                    Ok(None) => {}
                    Err(e) => tracing::error!(
                        session_id = ?session_id,
                        error = %e,
                        "Failed to apply checkout completion; acknowledging anyway"
                    ),
                }
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
            }
        }

        Ok(event)
    }
}
