//! # shop-payments
//!
//! Stripe Checkout (Hosted) for the storefront: a [`StripeClient`] that
//! implements `shop_core::PaymentProvider`, and webhook verification plus
//! dispatch into `shop_core::Reconciler`.
//!
//! ## Environment
//!
//! - `STRIPE_SECRET_KEY`: API secret key
//! - `STRIPE_WEBHOOK_SECRET`: endpoint signing secret (optional in development)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shop_payments::{StripeClient, WebhookHandler};
//!
//! let stripe = Arc::new(StripeClient::from_env()?);
//! let checkout = CheckoutService::new(store.clone(), stripe.clone(), settings);
//!
//! let webhooks = WebhookHandler::new(reconciler, stripe.webhook_secret().map(String::from));
//! webhooks.handle(&body, signature_header).await?;
//! ```

pub mod checkout;
pub mod webhook;

pub use checkout::{parse_currency, StripeClient};
pub use webhook::{
    sign_payload, verify_signature, WebhookEvent, WebhookHandler, SIGNATURE_HEADER,
};
