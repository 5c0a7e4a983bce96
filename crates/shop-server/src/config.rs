//! Server Configuration
//!
//! Everything comes from environment variables (optionally via `.env`).

use std::time::Duration;

use shop_core::checkout::CheckoutSettings;
use shop_core::error::{Result, ShopError};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_CUSTOMER_EMAIL: &str = "customer@example.com";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;

/// Storefront server configuration
#[derive(Clone, Debug)]
pub struct ShopConfig {
    /// `STRIPE_SECRET_KEY`; payments are disabled without it
    pub stripe_secret_key: Option<String>,

    /// `STRIPE_WEBHOOK_SECRET`; webhooks are unverified without it
    pub stripe_webhook_secret: Option<String>,

    /// `DATABASE_URL`; the in-memory store is used without it
    pub database_url: Option<String>,

    pub public_base_url: String,
    pub currency: String,
    pub placeholder_email: String,
    pub provider_timeout: Duration,

    /// Insert demo products into an empty catalog
    pub seed_db: bool,

    pub bind_addr: String,
}

impl ShopConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = get("DATABASE_URL");

        let provider_timeout = match get("PROVIDER_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    ShopError::Config(format!("PROVIDER_TIMEOUT_SECS must be a number, got '{raw}'"))
                })?;
                if secs == 0 {
                    return Err(ShopError::Config(
                        "PROVIDER_TIMEOUT_SECS must be positive".into(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        };

        // Seeding defaults on for the throwaway in-memory store only
        let seed_db = match get("SEED_DB") {
            Some(raw) => parse_flag("SEED_DB", &raw)?,
            None => database_url.is_none(),
        };

        Ok(Self {
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            database_url,
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.into()),
            currency: get("CURRENCY")
                .map_or_else(|| DEFAULT_CURRENCY.into(), |c| c.to_lowercase()),
            placeholder_email: get("DEMO_CUSTOMER_EMAIL")
                .unwrap_or_else(|| DEFAULT_CUSTOMER_EMAIL.into()),
            provider_timeout,
            seed_db,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
        })
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            public_base_url: self.public_base_url.clone(),
            currency: self.currency.clone(),
            placeholder_email: self.placeholder_email.clone(),
            provider_timeout: self.provider_timeout,
        }
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ShopError::Config(format!(
            "{key} must be true or false, got '{raw}'"
        ))),
    }
}
