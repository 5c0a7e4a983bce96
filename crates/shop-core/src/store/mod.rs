//! Order Ledger Storage
//!
//! Defines the persistence seam for the catalog and order ledger. Every
//! status change is expressed as a single conditional update so that the
//! redirect and webhook paths can race without a lock.

mod memory;

pub use memory::MemoryOrderStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{NewOrder, Order, Product};

/// Products seeded into an empty catalog: (name, price in cents)
pub const DEMO_PRODUCTS: &[(&str, i64)] = &[
    ("Espresso Beans 1kg", 2400),
    ("Ceramic Mug", 1250),
    ("Pour-Over Kettle", 4900),
];

/// Catalog and order ledger storage
///
/// Lookups return `Ok(None)` when nothing matches; `Err` is reserved for
/// unexpected failures.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Active products ordered by id
    async fn active_products(&self) -> Result<Vec<Product>>;

    /// Insert an order and its items atomically, status `created`,
    /// total computed from the lines
    async fn create_order(&self, order: NewOrder) -> Result<Order>;

    /// Get order by id
    async fn order(&self, order_id: i64) -> Result<Option<Order>>;

    /// Get order by hosted checkout session id
    async fn order_by_session(&self, session_id: &str) -> Result<Option<Order>>;

    /// Most recently created order with this fingerprint that is not canceled
    async fn reusable_order(&self, fingerprint: &str) -> Result<Option<Order>>;

    /// Record the checkout session id. Returns `false` if the order already
    /// had one (the id is never overwritten) or does not exist.
    async fn attach_session(&self, order_id: i64, session_id: &str) -> Result<bool>;

    /// Cache the hosted checkout URL for reuse
    async fn cache_checkout_url(&self, order_id: i64, checkout_url: &str) -> Result<()>;

    /// Set status to paid unless it already is. Returns whether this call
    /// performed the transition.
    async fn mark_paid(&self, order_id: i64) -> Result<bool>;

    /// Replace the email only if it is empty or still `placeholder`
    async fn fill_email(&self, order_id: i64, email: &str, placeholder: &str) -> Result<bool>;

    /// Set status to canceled only if it is still created
    async fn cancel_if_created(&self, order_id: i64) -> Result<bool>;

    /// Paid orders for a customer, newest first, with items
    async fn paid_orders(&self, customer_token: &str) -> Result<Vec<Order>>;
}
