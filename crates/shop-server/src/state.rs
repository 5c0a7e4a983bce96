//! Application State

use std::sync::Arc;

use shop_core::{CheckoutService, CheckoutSettings, OrderStore, PaymentProvider, Reconciler};
use shop_payments::WebhookHandler;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Catalog and order ledger (Postgres or in-memory)
    pub store: Arc<dyn OrderStore>,

    /// Checkout orchestrator (None if payments are not configured)
    pub checkout: Option<Arc<CheckoutService>>,

    /// Success and cancel redirect handling
    pub reconciler: Arc<Reconciler>,

    /// Provider webhook handling
    pub webhooks: Arc<WebhookHandler>,

    pub settings: Arc<CheckoutSettings>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn OrderStore>,
        provider: Option<Arc<dyn PaymentProvider>>,
        webhook_secret: Option<String>,
        settings: CheckoutSettings,
    ) -> Self {
        let mut reconciler = Reconciler::new(store.clone(), settings.placeholder_email.clone());
        if let Some(provider) = &provider {
            reconciler = reconciler.with_provider(provider.clone(), settings.provider_timeout);
        }
        let reconciler = Arc::new(reconciler);

        let checkout = provider.map(|provider| {
            Arc::new(CheckoutService::new(
                store.clone(),
                provider,
                settings.clone(),
            ))
        });

        Self {
            webhooks: Arc::new(WebhookHandler::new(reconciler.clone(), webhook_secret)),
            store,
            checkout,
            reconciler,
            settings: Arc::new(settings),
        }
    }

    pub const fn payments_enabled(&self) -> bool {
        self.checkout.is_some()
    }
}
