//! Router

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    catalog, checkout_cancel, checkout_success, create_checkout_session, health_check,
    stripe_webhook,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Storefront
        .route("/", get(catalog))
        .route("/create-checkout-session/", post(create_checkout_session))
        .route("/success/", get(checkout_success))
        .route("/cancel/", get(checkout_cancel))
        // Provider callbacks
        .route("/webhooks/stripe/", post(stripe_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use shop_core::{
        CheckoutSettings, MemoryOrderStore, MockPaymentProvider, OrderStatus, OrderStore,
        PaymentProvider,
    };
    use shop_payments::sign_payload;

    use super::router;
    use crate::state::AppState;

    const TOKEN: &str = "testtoken";
    const SECRET: &str = "whsec_test";

    struct Harness {
        store: Arc<MemoryOrderStore>,
        provider: Arc<MockPaymentProvider>,
        state: AppState,
    }

    async fn harness(payments: bool, webhook_secret: Option<&str>) -> Harness {
        let store = Arc::new(MemoryOrderStore::new());
        store.add_product("Product A", 500, "usd").await;
        store.add_product("Product B", 300, "usd").await;
        let provider = Arc::new(MockPaymentProvider::new());

        let payment_provider: Option<Arc<dyn PaymentProvider>> = if payments {
            Some(provider.clone())
        } else {
            None
        };
        let state = AppState::new(
            store.clone(),
            payment_provider,
            webhook_secret.map(str::to_string),
            CheckoutSettings::default(),
        );

        Harness {
            store,
            provider,
            state,
        }
    }

    async fn send(state: &AppState, request: Request<Body>) -> Response {
        router(state.clone()).oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn checkout_request(form: &str) -> Request<Body> {
        Request::post("/create-checkout-session/")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(COOKIE, format!("customer_token={TOKEN}"))
            .body(Body::from(form.to_string()))
            .unwrap()
    }

    fn location(response: &Response) -> String {
        response.headers()[LOCATION].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(true, Some(SECRET)).await;
        let response = send(&h.state, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["payments_enabled"], true);
        assert_eq!(body["webhook_verification"], true);
    }

    #[tokio::test]
    async fn test_catalog_issues_cookie() {
        let h = harness(true, None).await;
        let response = send(&h.state, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("customer_token="));
        assert!(cookie.contains("HttpOnly"));

        let body = json_body(response).await;
        let products = body["products"].as_array().unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0]["display_price"], "$5.00");
        assert_eq!(products[0]["quantity_field"], "qty_1");
        assert!(body["paid_orders"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_redirects_and_reuses_session() {
        let h = harness(true, None).await;

        let first = send(&h.state, checkout_request("qty_1=2&qty_2=1")).await;
        assert_eq!(first.status(), StatusCode::SEE_OTHER);
        assert!(first.headers().get(SET_COOKIE).is_none());
        let url = location(&first);
        assert!(url.starts_with("https://checkout.mock.test/pay/"));

        let order = h.store.order(1).await.unwrap().unwrap();
        assert_eq!(order.total_cents, 1300);
        assert_eq!(order.customer_token, TOKEN);

        let second = send(&h.state, checkout_request("qty_2=1&qty_1=2")).await;
        assert_eq!(location(&second), url);
        assert_eq!(h.store.order_count().await, 1);
        assert_eq!(h.provider.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_cart_goes_home() {
        let h = harness(true, None).await;
        let response = send(&h.state, checkout_request("qty_1=0&qty_2=-3&qty_9=4")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_checkout_without_payments_is_unavailable() {
        let h = harness(false, None).await;
        let response = send(&h.state, checkout_request("qty_1=1")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["code"], "PAYMENTS_DISABLED");
    }

    #[tokio::test]
    async fn test_provider_failure_is_client_error() {
        let h = harness(true, None).await;
        h.provider.fail_creates(true);

        let response = send(&h.state, checkout_request("qty_1=1")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "CHECKOUT_ERROR");
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Error creating checkout session"));

        let order = h.store.order(1).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn test_failed_checkout_still_issues_cookie_for_retry() {
        let h = harness(true, None).await;
        h.provider.fail_creates(true);

        let response = send(
            &h.state,
            Request::post("/create-checkout-session/")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("qty_1=1"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        let pair = cookie.split(';').next().unwrap().to_string();

        h.provider.fail_creates(false);
        let retry = send(
            &h.state,
            Request::post("/create-checkout-session/")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(COOKIE, pair)
                .body(Body::from("qty_1=1"))
                .unwrap(),
        )
        .await;
        assert_eq!(retry.status(), StatusCode::SEE_OTHER);
        assert_eq!(h.store.order_count().await, 1);

        let order = h.store.order(1).await.unwrap().unwrap();
        assert!(order.session_id.is_some());
        assert_eq!(order.status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn test_success_redirect_marks_paid_and_lists_order() {
        let h = harness(true, None).await;
        send(&h.state, checkout_request("qty_1=2&qty_2=1")).await;
        let session_id = h.store.order(1).await.unwrap().unwrap().session_id.unwrap();
        h.provider
            .complete_payment(&session_id, Some("buyer@example.com"))
            .await;

        let response = send(
            &h.state,
            Request::get(format!("/success/?session_id={session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["order_id"], 1);
        assert_eq!(body["status"], "paid");

        let catalog = send(
            &h.state,
            Request::get("/")
                .header(COOKIE, format!("customer_token={TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        let body = json_body(catalog).await;
        let paid = body["paid_orders"].as_array().unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0]["display_total"], "$13.00");
        assert_eq!(paid[0]["email"], "buyer@example.com");
        assert_eq!(paid[0]["items"][0]["line_total_cents"], 1000);
    }

    #[tokio::test]
    async fn test_success_without_session_goes_home() {
        let h = harness(true, None).await;
        for uri in ["/success/", "/success/?session_id=cs_missing"] {
            let response = send(&h.state, Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
            assert_eq!(location(&response), "/");
        }
    }

    #[tokio::test]
    async fn test_cancel_only_touches_created_orders() {
        let h = harness(true, None).await;
        send(&h.state, checkout_request("qty_1=1")).await;

        let response = send(
            &h.state,
            Request::get("/cancel/?order_id=1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(json_body(response).await["canceled"], true);

        for uri in ["/cancel/?order_id=1", "/cancel/?order_id=abc", "/cancel/"] {
            let response = send(&h.state, Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["canceled"], false);
        }
        assert_eq!(
            h.store.order(1).await.unwrap().unwrap().status,
            OrderStatus::Canceled
        );
    }

    #[tokio::test]
    async fn test_signed_webhook_marks_paid() {
        let h = harness(true, Some(SECRET)).await;
        send(&h.state, checkout_request("qty_1=1")).await;
        let session_id = h.store.order(1).await.unwrap().unwrap().session_id.unwrap();

        let payload = json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": session_id,
                "client_reference_id": "1",
                "customer_details": { "email": "buyer@example.com" }
            }}
        })
        .to_string();
        let signature = sign_payload(payload.as_bytes(), SECRET, Utc::now().timestamp()).unwrap();

        let response = send(
            &h.state,
            Request::post("/webhooks/stripe/")
                .header("stripe-signature", signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["received"], true);

        let order = h.store.order(1).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.email, "buyer@example.com");
    }

    #[tokio::test]
    async fn test_webhook_with_bad_signature_is_rejected() {
        let h = harness(true, Some(SECRET)).await;
        send(&h.state, checkout_request("qty_1=1")).await;

        let payload = json!({
            "type": "checkout.session.completed",
            "data": { "object": { "client_reference_id": "1" } }
        })
        .to_string();

        let response = send(
            &h.state,
            Request::post("/webhooks/stripe/")
                .header("stripe-signature", "t=1,v1=00")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "INVALID_SIGNATURE");
        assert_eq!(
            h.store.order(1).await.unwrap().unwrap().status,
            OrderStatus::Created
        );
    }

    #[tokio::test]
    async fn test_unsigned_webhook_rejects_garbage() {
        let h = harness(false, None).await;
        let response = send(
            &h.state,
            Request::post("/webhooks/stripe/")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "INVALID_PAYLOAD");
    }
}
