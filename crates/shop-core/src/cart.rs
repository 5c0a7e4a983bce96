//! Cart Building and Fingerprints
//!
//! A fingerprint is a SHA-256 over a canonical JSON rendering of
//! `(customer token, cart lines)`. Lines are sorted by product id and
//! quantity first, so the same multiset of lines always hashes the same no
//! matter which order the form submitted them in.

use std::collections::HashMap;

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::model::{NewOrderLine, Product};

/// Form field prefix carrying a per-product quantity (`qty_<id>`)
pub const QUANTITY_FIELD_PREFIX: &str = "qty_";

/// One purchasable cart line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
}

impl CartLine {
    pub fn line_total_cents(&self) -> i64 {
        i64::from(self.quantity) * self.product.price_cents
    }
}

/// A validated cart: only active products with positive quantities
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Build a cart from candidate lines, silently dropping inactive
    /// products and zero quantities
    pub fn new(candidates: impl IntoIterator<Item = (Product, u32)>) -> Self {
        let lines = candidates
            .into_iter()
            .filter(|(product, quantity)| product.active && *quantity > 0)
            .map(|(product, quantity)| CartLine { product, quantity })
            .collect();
        Self { lines }
    }

    /// Build a cart from submitted form fields keyed `qty_<product id>`.
    ///
    /// `products` is walked in the order given; quantities that are missing,
    /// unparsable or not positive are ignored.
    pub fn from_form(products: &[Product], form: &HashMap<String, String>) -> Self {
        Self::new(products.iter().filter_map(|product| {
            let quantity = form
                .get(&format!("{QUANTITY_FIELD_PREFIX}{}", product.id))
                .and_then(|raw| raw.trim().parse::<u32>().ok())?;
            Some((product.clone(), quantity))
        }))
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_cents(&self) -> i64 {
        self.lines.iter().map(CartLine::line_total_cents).sum()
    }

    /// Lines as they are persisted, capturing today's prices
    pub fn order_lines(&self) -> Vec<NewOrderLine> {
        self.lines
            .iter()
            .map(|line| NewOrderLine {
                product_id: line.product.id,
                product_name: line.product.name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.product.price_cents,
            })
            .collect()
    }

    pub fn fingerprint(&self, customer_token: &str) -> String {
        let pairs: Vec<(i64, u32)> = self
            .lines
            .iter()
            .map(|line| (line.product.id, line.quantity))
            .collect();
        fingerprint(customer_token, &pairs)
    }
}

/// Derive the idempotency fingerprint for a customer's cart
pub fn fingerprint(customer_token: &str, items: &[(i64, u32)]) -> String {
    let mut items = items.to_vec();
    items.sort_unstable();

    // serde_json maps keep keys sorted
    let canonical = json!({
        "customer_token": customer_token,
        "items": items,
    });

    let digest = Sha256::digest(canonical.to_string().as_bytes());
    hex::encode(digest)
}
