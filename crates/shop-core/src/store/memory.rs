//! In-memory order store (for development and tests)

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{OrderStore, DEMO_PRODUCTS};
use crate::error::{Result, ShopError};
use crate::model::{NewOrder, Order, OrderItem, OrderStatus, Product};

#[derive(Default)]
struct Ledger {
    products: BTreeMap<i64, Product>,
    orders: BTreeMap<i64, Order>,
    next_product_id: i64,
    next_order_id: i64,
    next_item_id: i64,
}

impl Ledger {
    fn bump(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

/// In-memory catalog and order ledger
///
/// A single write lock around the whole ledger makes every conditional
/// update atomic.
#[derive(Default)]
pub struct MemoryOrderStore {
    ledger: RwLock<Ledger>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with the demo catalog
    pub async fn with_demo_products(currency: &str) -> Self {
        let store = Self::new();
        for (name, price_cents) in DEMO_PRODUCTS {
            store.add_product(name, *price_cents, currency).await;
        }
        store
    }

    /// Add an active product to the catalog
    pub async fn add_product(&self, name: &str, price_cents: i64, currency: &str) -> Product {
        let mut ledger = self.ledger.write().await;
        let id = Ledger::bump(&mut ledger.next_product_id);
        let product = Product {
            id,
            name: name.to_string(),
            price_cents,
            currency: currency.to_string(),
            active: true,
        };
        ledger.products.insert(id, product.clone());
        product
    }

    /// Flip a product's active flag
    pub async fn set_product_active(&self, product_id: i64, active: bool) {
        if let Some(product) = self.ledger.write().await.products.get_mut(&product_id) {
            product.active = active;
        }
    }

    /// Number of orders ever created
    pub async fn order_count(&self) -> usize {
        self.ledger.read().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn active_products(&self) -> Result<Vec<Product>> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .products
            .values()
            .filter(|p| p.active)
            .cloned()
            .collect())
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let mut ledger = self.ledger.write().await;

        for line in &order.lines {
            if !ledger.products.contains_key(&line.product_id) {
                return Err(ShopError::Storage(format!(
                    "product {} does not exist",
                    line.product_id
                )));
            }
            if line.quantity == 0 {
                return Err(ShopError::Storage("quantity must be positive".into()));
            }
        }

        let total_cents = order.total_cents();
        let id = Ledger::bump(&mut ledger.next_order_id);
        let items = order
            .lines
            .into_iter()
            .map(|line| OrderItem {
                id: Ledger::bump(&mut ledger.next_item_id),
                order_id: id,
                product_id: line.product_id,
                product_name: line.product_name,
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
            })
            .collect();

        let now = Utc::now();
        let created = Order {
            id,
            created_at: now,
            updated_at: now,
            customer_token: order.customer_token,
            email: order.email,
            total_cents,
            currency: order.currency,
            status: OrderStatus::Created,
            session_id: None,
            checkout_url: None,
            fingerprint: order.fingerprint,
            items,
        };
        ledger.orders.insert(id, created.clone());
        Ok(created)
    }

    async fn order(&self, order_id: i64) -> Result<Option<Order>> {
        Ok(self.ledger.read().await.orders.get(&order_id).cloned())
    }

    async fn order_by_session(&self, session_id: &str) -> Result<Option<Order>> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .orders
            .values()
            .find(|o| o.session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn reusable_order(&self, fingerprint: &str) -> Result<Option<Order>> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .orders
            .values()
            .filter(|o| o.fingerprint == fingerprint && o.status != OrderStatus::Canceled)
            .max_by_key(|o| (o.created_at, o.id))
            .cloned())
    }

    async fn attach_session(&self, order_id: i64, session_id: &str) -> Result<bool> {
        let mut ledger = self.ledger.write().await;

        let taken = ledger
            .orders
            .values()
            .any(|o| o.id != order_id && o.session_id.as_deref() == Some(session_id));
        if taken {
            return Err(ShopError::Storage(format!(
                "session {session_id} already belongs to another order"
            )));
        }

        match ledger.orders.get_mut(&order_id) {
            Some(order) if order.session_id.is_none() => {
                order.session_id = Some(session_id.to_string());
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cache_checkout_url(&self, order_id: i64, checkout_url: &str) -> Result<()> {
        let mut ledger = self.ledger.write().await;
        let order = ledger
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| ShopError::NotFound(format!("Order {order_id}")))?;
        order.checkout_url = Some(checkout_url.to_string());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_paid(&self, order_id: i64) -> Result<bool> {
        let mut ledger = self.ledger.write().await;
        match ledger.orders.get_mut(&order_id) {
            Some(order) if order.status != OrderStatus::Paid => {
                order.status = OrderStatus::Paid;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fill_email(&self, order_id: i64, email: &str, placeholder: &str) -> Result<bool> {
        let mut ledger = self.ledger.write().await;
        match ledger.orders.get_mut(&order_id) {
            Some(order) if order.email.is_empty() || order.email == placeholder => {
                order.email = email.to_string();
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_if_created(&self, order_id: i64) -> Result<bool> {
        let mut ledger = self.ledger.write().await;
        match ledger.orders.get_mut(&order_id) {
            Some(order) if order.status == OrderStatus::Created => {
                order.status = OrderStatus::Canceled;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn paid_orders(&self, customer_token: &str) -> Result<Vec<Order>> {
        let ledger = self.ledger.read().await;
        let mut orders: Vec<Order> = ledger
            .orders
            .values()
            .filter(|o| o.customer_token == customer_token && o.is_paid())
            .cloned()
            .collect();
        orders.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewOrderLine;

    fn new_order(product: &Product, quantity: u32, fingerprint: &str) -> NewOrder {
        NewOrder {
            customer_token: "tok".into(),
            email: "customer@example.com".into(),
            currency: "usd".into(),
            fingerprint: fingerprint.into(),
            lines: vec![NewOrderLine {
                product_id: product.id,
                product_name: product.name.clone(),
                quantity,
                unit_price_cents: product.price_cents,
            }],
        }
    }

    #[tokio::test]
    async fn test_create_order_computes_total() {
        let store = MemoryOrderStore::new();
        let mug = store.add_product("Mug", 1250, "usd").await;

        let order = store.create_order(new_order(&mug, 3, "fp")).await.unwrap();
        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.total_cents, 3750);
        assert_eq!(order.items_total_cents(), order.total_cents);
    }

    #[tokio::test]
    async fn test_create_order_rejects_unknown_product() {
        let store = MemoryOrderStore::new();
        let ghost = Product {
            id: 42,
            name: "Ghost".into(),
            price_cents: 100,
            currency: "usd".into(),
            active: true,
        };
        assert!(store.create_order(new_order(&ghost, 1, "fp")).await.is_err());
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_attached_once() {
        let store = MemoryOrderStore::new();
        let mug = store.add_product("Mug", 1250, "usd").await;
        let order = store.create_order(new_order(&mug, 1, "fp")).await.unwrap();

        assert!(store.attach_session(order.id, "cs_first").await.unwrap());
        assert!(!store.attach_session(order.id, "cs_second").await.unwrap());

        let stored = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.session_id.as_deref(), Some("cs_first"));
        assert!(store.order_by_session("cs_first").await.unwrap().is_some());
        assert!(store.order_by_session("cs_second").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reusable_order_skips_canceled() {
        let store = MemoryOrderStore::new();
        let mug = store.add_product("Mug", 1250, "usd").await;
        let first = store.create_order(new_order(&mug, 1, "fp")).await.unwrap();

        assert_eq!(store.reusable_order("fp").await.unwrap().unwrap().id, first.id);

        store.cancel_if_created(first.id).await.unwrap();
        assert!(store.reusable_order("fp").await.unwrap().is_none());

        let second = store.create_order(new_order(&mug, 1, "fp")).await.unwrap();
        assert_eq!(store.reusable_order("fp").await.unwrap().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_mark_paid_transitions_once() {
        let store = MemoryOrderStore::new();
        let mug = store.add_product("Mug", 1250, "usd").await;
        let order = store.create_order(new_order(&mug, 1, "fp")).await.unwrap();

        assert!(store.mark_paid(order.id).await.unwrap());
        assert!(!store.mark_paid(order.id).await.unwrap());
        assert!(!store.cancel_if_created(order.id).await.unwrap());
        assert!(store.order(order.id).await.unwrap().unwrap().is_paid());
    }

    #[tokio::test]
    async fn test_canceled_order_can_still_be_paid() {
        let store = MemoryOrderStore::new();
        let mug = store.add_product("Mug", 1250, "usd").await;
        let order = store.create_order(new_order(&mug, 1, "fp")).await.unwrap();

        assert!(store.cancel_if_created(order.id).await.unwrap());
        assert!(store.mark_paid(order.id).await.unwrap());
        assert!(store.order(order.id).await.unwrap().unwrap().is_paid());
    }

    #[tokio::test]
    async fn test_fill_email_only_replaces_placeholder() {
        let store = MemoryOrderStore::new();
        let mug = store.add_product("Mug", 1250, "usd").await;
        let order = store.create_order(new_order(&mug, 1, "fp")).await.unwrap();

        assert!(store
            .fill_email(order.id, "buyer@example.com", "customer@example.com")
            .await
            .unwrap());
        assert!(!store
            .fill_email(order.id, "other@example.com", "customer@example.com")
            .await
            .unwrap());
        let stored = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.email, "buyer@example.com");
    }

    #[tokio::test]
    async fn test_paid_orders_filtered_by_token() {
        let store = MemoryOrderStore::with_demo_products("usd").await;
        let products = store.active_products().await.unwrap();
        assert_eq!(products.len(), DEMO_PRODUCTS.len());

        let paid = store.create_order(new_order(&products[0], 1, "a")).await.unwrap();
        store.create_order(new_order(&products[1], 1, "b")).await.unwrap();
        store.mark_paid(paid.id).await.unwrap();

        let orders = store.paid_orders("tok").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, paid.id);
        assert!(store.paid_orders("someone-else").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_products_hidden() {
        let store = MemoryOrderStore::new();
        let mug = store.add_product("Mug", 1250, "usd").await;
        store.add_product("Kettle", 4900, "usd").await;
        store.set_product_active(mug.id, false).await;

        let names: Vec<String> = store
            .active_products()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Kettle".to_string()]);
    }
}
