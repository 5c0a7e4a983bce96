//! Mock Payment Provider
//!
//! Scripted in-memory provider for tests and demos. Honours idempotency keys
//! the way a hosted provider does: repeating a key returns the same session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{HostedSession, PaymentProvider, PaymentStatus, SessionDetails, SessionRequest};
use crate::error::{Result, ShopError};

#[derive(Default)]
struct Sessions {
    by_id: HashMap<String, (SessionRequest, SessionDetails)>,
    by_idempotency_key: HashMap<String, String>,
    next: usize,
}

/// Mock hosted checkout provider
#[derive(Default)]
pub struct MockPaymentProvider {
    sessions: Mutex<Sessions>,
    create_calls: AtomicUsize,
    retrieve_calls: AtomicUsize,
    fail_create: AtomicBool,
    fail_retrieve: AtomicBool,
    latency: Option<Duration>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call (for exercising timeouts)
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Make subsequent `create_session` calls fail
    pub fn fail_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `retrieve_session` calls fail
    pub fn fail_retrieves(&self, fail: bool) {
        self.fail_retrieve.store(fail, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    /// Simulate the customer paying on the hosted page
    pub async fn complete_payment(&self, session_id: &str, email: Option<&str>) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.by_id.get_mut(session_id) {
            Some((_, details)) => {
                details.payment_status = PaymentStatus::Paid;
                details.customer_email = email.map(str::to_string);
                true
            }
            None => false,
        }
    }

    /// The request a session was created from
    pub async fn request_for(&self, session_id: &str) -> Option<SessionRequest> {
        let sessions = self.sessions.lock().await;
        sessions.by_id.get(session_id).map(|(req, _)| req.clone())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_session(&self, request: &SessionRequest) -> Result<HostedSession> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ShopError::Provider("mock provider refused the session".into()));
        }

        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.by_idempotency_key.get(&request.idempotency_key) {
            if let Some((_, details)) = sessions.by_id.get(existing) {
                return Ok(HostedSession {
                    id: details.id.clone(),
                    url: details.url.clone().unwrap_or_default(),
                });
            }
        }

        sessions.next += 1;
        let id = format!("cs_test_{:04}", sessions.next);
        let url = format!("https://checkout.mock.test/pay/{id}");

        let details = SessionDetails {
            id: id.clone(),
            url: Some(url.clone()),
            payment_status: PaymentStatus::Unpaid,
            client_reference_id: Some(request.client_reference_id.clone()),
            customer_email: None,
        };
        sessions
            .by_idempotency_key
            .insert(request.idempotency_key.clone(), id.clone());
        sessions.by_id.insert(id.clone(), (request.clone(), details));

        Ok(HostedSession { id, url })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.fail_retrieve.load(Ordering::SeqCst) {
            return Err(ShopError::Provider("mock provider unavailable".into()));
        }

        let sessions = self.sessions.lock().await;
        sessions
            .by_id
            .get(session_id)
            .map(|(_, details)| details.clone())
            .ok_or_else(|| ShopError::Provider(format!("No such checkout session: {session_id}")))
    }

    fn name(&self) -> &str {
        "MockProvider"
    }
}
