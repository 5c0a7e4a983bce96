//! Payment Reconciliation
//!
//! Two independent signals can report a completed payment for the same
//! order: the customer's browser returning to the success page and the
//! provider's webhook. Either may arrive first, both may arrive, and either
//! may be delivered twice. The store's conditional updates make the paid
//! transition happen exactly once regardless.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::Result;
use crate::model::{Order, OrderStatus};
use crate::provider::{bounded, PaymentProvider};
use crate::store::OrderStore;

/// Result of applying a completed-payment signal to an order
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentRecord {
    pub order_id: i64,
    /// This call moved the order to paid
    pub newly_paid: bool,
    /// This call replaced the placeholder email
    pub email_filled: bool,
}

/// What the success page should show
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// Nothing to confirm; send the customer back to the catalog
    Catalog,
    /// Session found at the provider
    Confirmed {
        session_id: String,
        order_id: Option<i64>,
        status: Option<OrderStatus>,
    },
}

/// Applies redirect, cancel and webhook signals to the order ledger
pub struct Reconciler {
    store: Arc<dyn OrderStore>,
    provider: Option<Arc<dyn PaymentProvider>>,
    placeholder_email: String,
    provider_timeout: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn OrderStore>, placeholder_email: impl Into<String>) -> Self {
        Self {
            store,
            provider: None,
            placeholder_email: placeholder_email.into(),
            provider_timeout: Duration::from_secs(15),
        }
    }

    /// Enable the redirect path, which has to ask the provider about the
    /// session
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>, timeout: Duration) -> Self {
        self.provider = Some(provider);
        self.provider_timeout = timeout;
        self
    }

    /// Confirm payment when the customer lands on the success page.
    ///
    /// Provider or store trouble never fails the page; it falls back to the
    /// catalog or to showing the order as it stands.
    pub async fn confirm_from_redirect(&self, session_id: Option<&str>) -> RedirectOutcome {
        let Some(session_id) = session_id.filter(|id| !id.is_empty()) else {
            return RedirectOutcome::Catalog;
        };
        let Some(provider) = &self.provider else {
            tracing::warn!("Payment provider not configured, cannot confirm redirect");
            return RedirectOutcome::Catalog;
        };

        let details = match bounded(self.provider_timeout, provider.retrieve_session(session_id))
            .await
        {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Session lookup failed on redirect");
                return RedirectOutcome::Catalog;
            }
        };

        let order = match self
            .locate(Some(&details.id), details.client_reference_id.as_deref())
            .await
        {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(session_id = %details.id, error = %e, "Order lookup failed on redirect");
                None
            }
        };

        let Some(order) = order else {
            tracing::warn!(session_id = %details.id, "No order matches returning session");
            return RedirectOutcome::Confirmed {
                session_id: details.id,
                order_id: None,
                status: None,
            };
        };

        let mut status = order.status;
        if details.is_paid() {
            match self
                .apply_payment(&order, details.customer_email.as_deref())
                .await
            {
                Ok(_) => status = OrderStatus::Paid,
                Err(e) => {
                    tracing::error!(order_id = order.id, error = %e, "Failed to record payment on redirect");
                }
            }
        }

        RedirectOutcome::Confirmed {
            session_id: details.id,
            order_id: Some(order.id),
            status: Some(status),
        }
    }

    /// Cancel an order the customer backed out of. Only orders still in
    /// `created` change; anything else, including an unknown or malformed
    /// id, is a no-op.
    pub async fn confirm_cancel(&self, order_id: Option<&str>) -> Result<bool> {
        let Some(order_id) = order_id.and_then(|raw| raw.trim().parse::<i64>().ok()) else {
            return Ok(false);
        };

        let canceled = self.store.cancel_if_created(order_id).await?;
        if canceled {
            tracing::info!(order_id, "Order canceled by customer");
        }
        Ok(canceled)
    }

    /// Record a completed payment reported by the provider webhook.
    ///
    /// Returns `Ok(None)` when no order matches.
    pub async fn record_completed_payment(
        &self,
        session_id: Option<&str>,
        client_reference_id: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<PaymentRecord>> {
        let Some(order) = self.locate(session_id, client_reference_id).await? else {
            tracing::warn!(
                session_id = ?session_id,
                client_reference_id = ?client_reference_id,
                "Completed session matches no order"
            );
            return Ok(None);
        };

        self.apply_payment(&order, email).await.map(Some)
    }

    /// Find an order by session id, falling back to the client reference
    /// (our order id)
    async fn locate(
        &self,
        session_id: Option<&str>,
        client_reference_id: Option<&str>,
    ) -> Result<Option<Order>> {
        if let Some(session_id) = session_id.filter(|id| !id.is_empty()) {
            if let Some(order) = self.store.order_by_session(session_id).await? {
                return Ok(Some(order));
            }
        }

        match client_reference_id.and_then(|raw| raw.trim().parse::<i64>().ok()) {
            Some(order_id) => self.store.order(order_id).await,
            None => Ok(None),
        }
    }

    async fn apply_payment(&self, order: &Order, email: Option<&str>) -> Result<PaymentRecord> {
        let newly_paid = self.store.mark_paid(order.id).await?;

        let email_filled = match email.map(str::trim).filter(|e| !e.is_empty()) {
            Some(email) => {
                self.store
                    .fill_email(order.id, email, &self.placeholder_email)
                    .await?
            }
            None => false,
        };

        if newly_paid {
            tracing::info!(
                order_id = order.id,
                previous_status = %order.status,
                email_filled,
                "Order paid"
            );
        } else {
            tracing::debug!(order_id = order.id, "Order already paid");
        }

        Ok(PaymentRecord {
            order_id: order.id,
            newly_paid,
            email_filled,
        })
    }
}
