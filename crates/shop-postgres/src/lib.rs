//! # shop-postgres
//!
//! PostgreSQL implementation of `shop_core::OrderStore`.
//!
//! Every status change is a single conditional `UPDATE`, so concurrent
//! redirect and webhook confirmations resolve inside the database:
//!
//! ```sql
//! UPDATE orders SET status = 'paid' WHERE id = $1 AND status <> 'paid'
//! ```
//!
//! Migrations in `migrations/` are embedded and applied by [`PgOrderStore::migrate`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use shop_core::error::{Result, ShopError};
use shop_core::model::{NewOrder, Order, OrderItem, OrderStatus, Product};
use shop_core::store::{OrderStore, DEMO_PRODUCTS};

const ORDER_COLUMNS: &str = "id, created_at, updated_at, customer_token, email, total_cents, \
     currency, status, session_id, checkout_url, fingerprint";

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

fn storage(err: sqlx::Error) -> ShopError {
    ShopError::Storage(err.to_string())
}

#[derive(FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    price_cents: i64,
    currency: String,
    active: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            price_cents: row.price_cents,
            currency: row.currency,
            active: row.active,
        }
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    customer_token: String,
    email: String,
    total_cents: i64,
    currency: String,
    status: String,
    session_id: Option<String>,
    checkout_url: Option<String>,
    fingerprint: String,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        Ok(Order {
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            customer_token: self.customer_token,
            email: self.email,
            total_cents: self.total_cents,
            currency: self.currency,
            status: self.status.parse::<OrderStatus>()?,
            session_id: self.session_id,
            checkout_url: self.checkout_url,
            fingerprint: self.fingerprint,
            items,
        })
    }
}

#[derive(FromRow)]
struct ItemRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    product_name: String,
    quantity: i32,
    unit_price_cents: i64,
}

impl TryFrom<ItemRow> for OrderItem {
    type Error = ShopError;

    fn try_from(row: ItemRow) -> Result<Self> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            ShopError::Storage(format!("order item {} has quantity {}", row.id, row.quantity))
        })?;
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity,
            unit_price_cents: row.unit_price_cents,
        })
    }
}

/// PostgreSQL catalog and order ledger
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `database_url`
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(storage)?;

        tracing::info!("Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ShopError::Storage(e.to_string()))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Insert the demo catalog if there are no products yet.
    ///
    /// Returns the number of products inserted.
    pub async fn seed_demo_products(&self, currency: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?;
        if existing > 0 {
            return Ok(0);
        }

        for (name, price_cents) in DEMO_PRODUCTS {
            sqlx::query("INSERT INTO products (name, price_cents, currency) VALUES ($1, $2, $3)")
                .bind(*name)
                .bind(*price_cents)
                .bind(currency)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        tracing::info!(count = DEMO_PRODUCTS.len(), "Seeded demo products");
        Ok(DEMO_PRODUCTS.len())
    }

    async fn items_for(&self, order_ids: &[i64]) -> Result<BTreeMap<i64, Vec<OrderItem>>> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT id, order_id, product_id, product_name, quantity, unit_price_cents \
             FROM order_items WHERE order_id = ANY($1) ORDER BY id",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut grouped: BTreeMap<i64, Vec<OrderItem>> = BTreeMap::new();
        for row in rows {
            let order_id = row.order_id;
            grouped.entry(order_id).or_default().push(row.try_into()?);
        }
        Ok(grouped)
    }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut items = self.items_for(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let order_items = items.remove(&row.id).unwrap_or_default();
                row.into_order(order_items)
            })
            .collect()
    }

    async fn hydrate_one(&self, row: Option<OrderRow>) -> Result<Option<Order>> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn fetch_order_where(&self, clause: &str, bind: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {clause}");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        self.hydrate_one(row).await
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn active_products(&self) -> Result<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, name, price_cents, currency, active FROM products \
             WHERE active ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let order_id: i64 = sqlx::query_scalar(
            "INSERT INTO orders (customer_token, email, currency, fingerprint, total_cents, status) \
             VALUES ($1, $2, $3, $4, 0, 'created') RETURNING id",
        )
        .bind(&order.customer_token)
        .bind(&order.email)
        .bind(&order.currency)
        .bind(&order.fingerprint)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage)?;

        for line in &order.lines {
            let quantity = i32::try_from(line.quantity)
                .map_err(|_| ShopError::Storage(format!("quantity {} too large", line.quantity)))?;
            sqlx::query(
                "INSERT INTO order_items \
                 (order_id, product_id, product_name, quantity, unit_price_cents) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(order_id)
            .bind(line.product_id)
            .bind(&line.product_name)
            .bind(quantity)
            .bind(line.unit_price_cents)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        sqlx::query("UPDATE orders SET total_cents = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(order.total_cents())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        tracing::debug!(order_id, fingerprint = %order.fingerprint, "Order inserted");
        self.order(order_id)
            .await?
            .ok_or_else(|| ShopError::NotFound(format!("Order {order_id}")))
    }

    async fn order(&self, order_id: i64) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        self.hydrate_one(row).await
    }

    async fn order_by_session(&self, session_id: &str) -> Result<Option<Order>> {
        self.fetch_order_where("session_id = $1", session_id).await
    }

    async fn reusable_order(&self, fingerprint: &str) -> Result<Option<Order>> {
        self.fetch_order_where(
            "fingerprint = $1 AND status <> 'canceled' ORDER BY created_at DESC, id DESC LIMIT 1",
            fingerprint,
        )
        .await
    }

    async fn attach_session(&self, order_id: i64, session_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET session_id = $2, updated_at = NOW() \
             WHERE id = $1 AND session_id IS NULL",
        )
        .bind(order_id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected() == 1)
    }

    async fn cache_checkout_url(&self, order_id: i64, checkout_url: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE orders SET checkout_url = $2, updated_at = NOW() WHERE id = $1")
                .bind(order_id)
                .bind(checkout_url)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(ShopError::NotFound(format!("Order {order_id}")));
        }
        Ok(())
    }

    async fn mark_paid(&self, order_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'paid', updated_at = NOW() \
             WHERE id = $1 AND status <> 'paid'",
        )
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected() == 1)
    }

    async fn fill_email(&self, order_id: i64, email: &str, placeholder: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET email = $2, updated_at = NOW() \
             WHERE id = $1 AND (email = '' OR email = $3)",
        )
        .bind(order_id)
        .bind(email)
        .bind(placeholder)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected() == 1)
    }

    async fn cancel_if_created(&self, order_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'canceled', updated_at = NOW() \
             WHERE id = $1 AND status = 'created'",
        )
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected() == 1)
    }

    async fn paid_orders(&self, customer_token: &str) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_token = $1 AND status = 'paid' \
             ORDER BY created_at DESC, id DESC"
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(customer_token)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        self.hydrate(rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> OrderRow {
        OrderRow {
            id: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            customer_token: "tok".into(),
            email: String::new(),
            total_cents: 1300,
            currency: "usd".into(),
            status: status.into(),
            session_id: Some("cs_1".into()),
            checkout_url: None,
            fingerprint: "fp".into(),
        }
    }

    #[test]
    fn test_order_row_conversion() {
        let order = row("paid").into_order(Vec::new()).unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.session_id.as_deref(), Some("cs_1"));
        assert!(row("refunded").into_order(Vec::new()).is_err());
    }

    #[test]
    fn test_item_row_rejects_negative_quantity() {
        let item = ItemRow {
            id: 1,
            order_id: 3,
            product_id: 2,
            product_name: "Mug".into(),
            quantity: -1,
            unit_price_cents: 1250,
        };
        assert!(OrderItem::try_from(item).is_err());
    }

    #[test]
    fn test_item_row_conversion() {
        let item = OrderItem::try_from(ItemRow {
            id: 1,
            order_id: 3,
            product_id: 2,
            product_name: "Mug".into(),
            quantity: 2,
            unit_price_cents: 1250,
        })
        .unwrap();
        assert_eq!(item.line_total_cents(), 2500);
        assert_eq!(item.product_name, "Mug");
    }

    // Requires a live database:
    //   DATABASE_URL=postgres://... cargo test -p shop-postgres -- --ignored
    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_ledger_roundtrip_against_postgres() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PgOrderStore::connect(&url).await.unwrap();
        store.migrate().await.unwrap();
        store.seed_demo_products("usd").await.unwrap();

        let token = format!("test-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let product_id: i64 = sqlx::query_scalar(
            "INSERT INTO products (name, price_cents, currency, active) \
             VALUES ($1, 1250, 'usd', FALSE) RETURNING id",
        )
        .bind(format!("Mug {token}"))
        .fetch_one(&store.pool)
        .await
        .unwrap();
        let product = Product {
            id: product_id,
            name: format!("Mug {token}"),
            price_cents: 1250,
            currency: "usd".into(),
            active: false,
        };
        let order = store
            .create_order(NewOrder {
                customer_token: token.clone(),
                email: "customer@example.com".into(),
                currency: "usd".into(),
                fingerprint: format!("fp-{token}"),
                lines: vec![shop_core::model::NewOrderLine {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    quantity: 2,
                    unit_price_cents: product.price_cents,
                }],
            })
            .await
            .unwrap();

        assert_eq!(order.total_cents, product.price_cents * 2);
        assert_eq!(order.items_total_cents(), order.total_cents);

        // Items keep the name the customer saw
        sqlx::query("UPDATE products SET name = 'Renamed' WHERE id = $1")
            .bind(product.id)
            .execute(&store.pool)
            .await
            .unwrap();
        let reloaded = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.items[0].product_name, product.name);

        let session = format!("cs_{token}");
        assert!(store.attach_session(order.id, &session).await.unwrap());
        assert!(!store.attach_session(order.id, "cs_other").await.unwrap());

        assert!(store.mark_paid(order.id).await.unwrap());
        assert!(!store.mark_paid(order.id).await.unwrap());
        assert!(!store.cancel_if_created(order.id).await.unwrap());
        assert!(store
            .fill_email(order.id, "buyer@example.com", "customer@example.com")
            .await
            .unwrap());

        let paid = store.paid_orders(&token).await.unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].email, "buyer@example.com");
        assert_eq!(
            store.order_by_session(&session).await.unwrap().unwrap().id,
            order.id
        );
    }
}
