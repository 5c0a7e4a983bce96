//! Catalog and Order Ledger Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ShopError;

/// Anonymous per-browser identity used to group carts and orders
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerToken(String);

impl CustomerToken {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wrap a token previously issued to the browser
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A purchasable product
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    /// Price in minor currency units
    pub price_cents: i64,
    pub currency: String,
    pub active: bool,
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} {})",
            self.name,
            decimal_amount(self.price_cents),
            self.currency.to_uppercase()
        )
    }
}

/// Order lifecycle status
///
/// `Canceled` is reached only from `Created`. `Paid` is reached from
/// any non-paid status once the provider reports a completed payment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Created,
    Paid,
    Canceled,
}

impl OrderStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Paid => "paid",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "paid" => Ok(Self::Paid),
            "canceled" => Ok(Self::Canceled),
            other => Err(ShopError::Storage(format!("unknown order status '{other}'"))),
        }
    }
}

/// A line of a persisted order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: u32,
    /// Product price captured when the order was placed
    pub unit_price_cents: i64,
}

impl OrderItem {
    pub fn line_total_cents(&self) -> i64 {
        i64::from(self.quantity) * self.unit_price_cents
    }
}

impl std::fmt::Display for OrderItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} x {}", self.product_name, self.quantity)
    }
}

/// A persisted order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub customer_token: String,
    /// Empty or the configured placeholder until payment reports one
    pub email: String,
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    /// Hosted checkout session id, written at most once
    pub session_id: Option<String>,
    pub checkout_url: Option<String>,
    /// Cart fingerprint used to collapse repeated submissions
    pub fingerprint: String,
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.status == OrderStatus::Paid
    }

    /// Sum of line totals, which must equal `total_cents`
    pub fn items_total_cents(&self) -> i64 {
        self.items.iter().map(OrderItem::line_total_cents).sum()
    }
}

impl std::fmt::Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Order #{} - {} - {} {}",
            self.id,
            self.status,
            decimal_amount(self.total_cents),
            self.currency.to_uppercase()
        )
    }
}

/// A line to persist with a new order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrderLine {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

/// Everything needed to insert an order and its items in one step
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub customer_token: String,
    pub email: String,
    pub currency: String,
    pub fingerprint: String,
    pub lines: Vec<NewOrderLine>,
}

impl NewOrder {
    pub fn total_cents(&self) -> i64 {
        self.lines
            .iter()
            .map(|line| i64::from(line.quantity) * line.unit_price_cents)
            .sum()
    }
}

/// Format minor units as a money string, e.g. `$1,234.56`
pub fn format_money(cents: i64, currency_symbol: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let major = (abs / 100).to_string();

    let mut grouped = String::with_capacity(major.len() + major.len() / 3);
    for (i, ch) in major.chars().enumerate() {
        if i > 0 && (major.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}{currency_symbol}{grouped}.{:02}", abs % 100)
}

fn decimal_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0, "$"), "$0.00");
        assert_eq!(format_money(1300, "$"), "$13.00");
        assert_eq!(format_money(123_456_789, "$"), "$1,234,567.89");
        assert_eq!(format_money(-250, "€"), "-€2.50");
    }

    #[test]
    fn test_status_round_trip() {
        for status in [OrderStatus::Created, OrderStatus::Paid, OrderStatus::Canceled] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_display_strings() {
        let product = Product {
            id: 1,
            name: "Mug".into(),
            price_cents: 1250,
            currency: "usd".into(),
            active: true,
        };
        assert_eq!(product.to_string(), "Mug (12.50 USD)");

        let item = OrderItem {
            id: 1,
            order_id: 7,
            product_id: 1,
            product_name: "Mug".into(),
            quantity: 2,
            unit_price_cents: 1250,
        };
        assert_eq!(item.line_total_cents(), 2500);
        assert_eq!(item.to_string(), "Mug x 2");
    }

    #[test]
    fn test_customer_token_is_opaque_hex() {
        let token = CustomerToken::generate();
        assert_eq!(token.as_str().len(), 32);
        assert_ne!(token, CustomerToken::generate());
    }
}
