//! HTTP Handlers

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Form, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shop_core::{format_money, Cart, Order, OrderItem, OrderStatus, Product, RedirectOutcome, ShopError};
use shop_payments::SIGNATURE_HEADER;

use crate::state::AppState;
use crate::token;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Handler failures, each with a stable error code
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payments are not configured")]
    PaymentsDisabled,

    #[error(transparent)]
    Checkout(ShopError),

    #[error(transparent)]
    Webhook(ShopError),

    #[error(transparent)]
    Internal(ShopError),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::PaymentsDisabled => StatusCode::SERVICE_UNAVAILABLE,
            Self::Checkout(_) | Self::Webhook(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::PaymentsDisabled => "PAYMENTS_DISABLED",
            Self::Checkout(_) => "CHECKOUT_ERROR",
            Self::Webhook(ShopError::WebhookSignature(_)) => "INVALID_SIGNATURE",
            Self::Webhook(_) => "INVALID_PAYLOAD",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match &self {
            Self::PaymentsDisabled => "Payments not configured".to_string(),
            Self::Checkout(e) | Self::Webhook(e) | Self::Internal(e) => e.user_message(),
        };
        (
            self.status(),
            Json(ErrorResponse {
                error,
                code: self.code().into(),
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub payments_enabled: bool,
    pub webhook_verification: bool,
}

fn currency_symbol(currency: &str) -> &'static str {
    match currency.to_ascii_lowercase().as_str() {
        "usd" | "cad" | "aud" => "$",
        "eur" => "€",
        "gbp" => "£",
        "jpy" => "¥",
        _ => "",
    }
}

#[derive(Debug, Serialize)]
pub struct ProductView {
    pub id: i64,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub display_price: String,
    /// Form field carrying this product's quantity
    pub quantity_field: String,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            price_cents: product.price_cents,
            currency: product.currency.clone(),
            display_price: format_money(product.price_cents, currency_symbol(&product.currency)),
            quantity_field: format!("{}{}", shop_core::cart::QUANTITY_FIELD_PREFIX, product.id),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderItemView {
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl From<&OrderItem> for OrderItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            line_total_cents: item.line_total_cents(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub email: String,
    pub total_cents: i64,
    pub currency: String,
    pub display_total: String,
    pub items: Vec<OrderItemView>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            created_at: order.created_at,
            status: order.status,
            email: order.email.clone(),
            total_cents: order.total_cents,
            currency: order.currency.clone(),
            display_total: format_money(order.total_cents, currency_symbol(&order.currency)),
            items: order.items.iter().map(OrderItemView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub products: Vec<ProductView>,
    pub paid_orders: Vec<OrderView>,
    pub currency: String,
    pub payments_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub session_id: String,
    pub order_id: Option<i64>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub order_id: Option<String>,
    pub canceled: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelQuery {
    pub order_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        payments_enabled: state.payments_enabled(),
        webhook_verification: state.webhooks.verifies_signatures(),
    })
}

/// Catalog plus this browser's paid orders
pub async fn catalog(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let resolved = token::resolve(&headers);

    let products = state.store.active_products().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to load products");
        ApiError::Internal(e)
    })?;

    let paid_orders = if resolved.issued {
        Vec::new()
    } else {
        state
            .store
            .paid_orders(resolved.token.as_str())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to load paid orders");
                ApiError::Internal(e)
            })?
    };

    let body = CatalogResponse {
        products: products.iter().map(ProductView::from).collect(),
        paid_orders: paid_orders.iter().map(OrderView::from).collect(),
        currency: state.settings.currency.clone(),
        payments_enabled: state.payments_enabled(),
    };

    Ok(token::attach(Json(body).into_response(), &resolved))
}

/// Start (or resume) hosted checkout for the submitted cart
pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let checkout = state.checkout.as_ref().ok_or(ApiError::PaymentsDisabled)?;
    let resolved = token::resolve(&headers);

    let products = state.store.active_products().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to load products");
        ApiError::Internal(e)
    })?;
    let cart = Cart::from_form(&products, &form);

    let response = match checkout.start_checkout(&resolved.token, &cart).await {
        Ok(outcome) => {
            tracing::info!(
                order_id = outcome.order_id,
                reused = outcome.reused,
                "Redirecting to hosted checkout"
            );
            Redirect::to(&outcome.checkout_url).into_response()
        }
        Err(ShopError::EmptyCart) => Redirect::to("/").into_response(),
        Err(e @ (ShopError::Provider(_) | ShopError::ProviderTimeout(_))) => {
            ApiError::Checkout(e).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Checkout failed");
            ApiError::Internal(e).into_response()
        }
    };

    // A failed attempt may already have stored an order under a fresh
    // token; the browser needs it to resume that order on retry.
    Ok(token::attach(response, &resolved))
}

/// Customer returned from the hosted page after paying
pub async fn checkout_success(
    State(state): State<AppState>,
    Query(query): Query<SuccessQuery>,
) -> Response {
    match state
        .reconciler
        .confirm_from_redirect(query.session_id.as_deref())
        .await
    {
        RedirectOutcome::Catalog => Redirect::to("/").into_response(),
        RedirectOutcome::Confirmed {
            session_id,
            order_id,
            status,
        } => Json(SuccessResponse {
            session_id,
            order_id,
            status,
        })
        .into_response(),
    }
}

/// Customer backed out of the hosted page
pub async fn checkout_cancel(
    State(state): State<AppState>,
    Query(query): Query<CancelQuery>,
) -> Json<CancelResponse> {
    let canceled = match state.reconciler.confirm_cancel(query.order_id.as_deref()).await {
        Ok(canceled) => canceled,
        Err(e) => {
            tracing::error!(order_id = ?query.order_id, error = %e, "Failed to cancel order");
            false
        }
    };

    Json(CancelResponse {
        order_id: query.order_id,
        canceled,
    })
}

/// Stripe webhook endpoint
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    state
        .webhooks
        .handle(&body, signature)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Rejected webhook delivery");
            ApiError::Webhook(e)
        })?;

    Ok(Json(WebhookAck { received: true }))
}
