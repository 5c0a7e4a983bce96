//! # shop-core
//!
//! Catalog, order ledger, checkout orchestration and payment reconciliation
//! for a hosted-checkout storefront.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐  cart   ┌──────────────────┐ session ┌──────────────────┐
//! │ Browser  │────────▶│ CheckoutService  │────────▶│ PaymentProvider  │
//! └──────────┘         └──────────────────┘         │ (hosted page)    │
//!      ▲                        │ order             └──────────────────┘
//!      │ redirect               ▼                      │          │
//!      │               ┌──────────────────┐  redirect  │          │ webhook
//!      └───────────────│    OrderStore    │◀───────────┘          │
//!                      └──────────────────┘◀──────────────────────┘
//!                               ▲          Reconciler
//! ```
//!
//! The `OrderStore` and `PaymentProvider` traits are the seams: the in-memory
//! store and mock provider here back tests, while `shop-postgres` and
//! `shop-payments` provide the production implementations.

pub mod cart;
pub mod checkout;
pub mod error;
pub mod model;
pub mod provider;
pub mod reconcile;
pub mod store;

pub use cart::{fingerprint, Cart, CartLine};
pub use checkout::{CheckoutOutcome, CheckoutService, CheckoutSettings};
pub use error::{Result, ShopError};
pub use model::{format_money, CustomerToken, NewOrder, NewOrderLine, Order, OrderItem, OrderStatus, Product};
pub use provider::{
    HostedSession, MockPaymentProvider, PaymentProvider, PaymentStatus, SessionDetails,
    SessionLineItem, SessionRequest,
};
pub use reconcile::{PaymentRecord, Reconciler, RedirectOutcome};
pub use store::{MemoryOrderStore, OrderStore};
