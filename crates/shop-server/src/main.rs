//! Storefront HTTP Server
//!
//! Axum server for the catalog, hosted checkout, the success/cancel
//! redirects and the Stripe webhook.

mod config;
mod handlers;
mod routes;
mod state;
mod token;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shop_core::{MemoryOrderStore, OrderStore, PaymentProvider};
use shop_payments::StripeClient;
use shop_postgres::PgOrderStore;

use crate::config::ShopConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = ShopConfig::from_env()?;

    // Initialize storage
    let store: Arc<dyn OrderStore> = match &config.database_url {
        Some(url) => {
            let store = PgOrderStore::connect(url).await?;
            store.migrate().await?;
            if config.seed_db {
                store.seed_demo_products(&config.currency).await?;
            }
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set - using in-memory store");
            if config.seed_db {
                Arc::new(MemoryOrderStore::with_demo_products(&config.currency).await)
            } else {
                Arc::new(MemoryOrderStore::new())
            }
        }
    };

    // Initialize payments
    let provider: Option<Arc<dyn PaymentProvider>> = match &config.stripe_secret_key {
        Some(key) => {
            tracing::info!("✓ Stripe configured");
            Some(Arc::new(StripeClient::new(
                key,
                config.stripe_webhook_secret.as_deref(),
            )))
        }
        None => {
            tracing::warn!("⚠ Stripe not configured - checkout disabled");
            tracing::warn!("  Set STRIPE_SECRET_KEY in .env");
            None
        }
    };

    if config.stripe_webhook_secret.is_none() {
        tracing::warn!("⚠ STRIPE_WEBHOOK_SECRET not set - webhook payloads are trusted unverified");
    }

    let state = AppState::new(
        store,
        provider,
        config.stripe_webhook_secret.clone(),
        config.checkout_settings(),
    );

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("🛒 Storefront running on http://{}", config.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /                         - Catalog and paid orders");
    tracing::info!("  POST /create-checkout-session/ - Start hosted checkout");
    tracing::info!("  GET  /success/                 - Payment return");
    tracing::info!("  GET  /cancel/                  - Checkout canceled");
    tracing::info!("  POST /webhooks/stripe/         - Stripe webhook");
    tracing::info!("  GET  /health                   - Health check");

    axum::serve(listener, app).await?;

    Ok(())
}
