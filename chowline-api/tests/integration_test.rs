use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chowline_api::{app, AppState};
use chowline_core::address::Address;
use chowline_core::checkout::{Cart, CartLine};
use chowline_core::order::{Order, OrderRepository, OrderStatus};
use chowline_providers::mock::{MockProvider, SIGNATURE_HEADER};
use chowline_providers::signature::sign;
use chowline_providers::{DeliveryProvider, ProviderRegistry};
use chowline_shipment::{DeliveryService, MemoryStore, RecordingNotifier};
use chrono::Duration;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
    order: Order,
    vendor_id: Uuid,
    delivery_address_id: Uuid,
}

fn address(name: &str, country: &str) -> Address {
    Address {
        id: Uuid::new_v4(),
        contact_name: name.to_string(),
        phone: Some("+2348030000000".into()),
        email: None,
        line1: format!("3 {name} Close"),
        city: Some("Ikeja".to_string()),
        state: Some("Lagos".to_string()),
        postal_code: None,
        country: country.to_string(),
        latitude: None,
        longitude: None,
        provider_codes: Vec::new(),
    }
}

async fn setup(country: &str, regional: MockProvider, international: MockProvider) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ProviderRegistry::new(
        Arc::new(regional) as Arc<dyn DeliveryProvider>,
        Arc::new(international) as Arc<dyn DeliveryProvider>,
    )
    .unwrap();

    let user_id = Uuid::new_v4();
    let vendor_id = Uuid::new_v4();
    let vendor_address = address("Vendor", country);
    let customer_address = address("Customer", country);
    let delivery_address_id = customer_address.id;
    let order = Order::new(user_id, vendor_id);

    store.set_vendor_address(vendor_id, vendor_address.id).await;
    store.insert_address(vendor_address).await;
    store.insert_address(customer_address).await;
    store
        .insert_cart(Cart {
            user_id,
            vendor_id,
            currency: "NGN".to_string(),
            items: vec![CartLine {
                name: "Jollof rice".to_string(),
                description: Some("Party size".to_string()),
                quantity: 2,
                unit_price: Decimal::new(4500, 0),
                unit_weight_kg: None,
            }],
        })
        .await;
    store.insert_order(order.clone()).await;

    let service = DeliveryService::in_memory(registry, store.clone(), notifier.clone());
    TestApp {
        router: app(AppState::new(service)),
        store,
        notifier,
        order,
        vendor_id,
        delivery_address_id,
    }
}

async fn domestic() -> TestApp {
    setup(
        "NG",
        MockProvider::regional(vec![1500, 1200, 1800]),
        MockProvider::on_demand(899, Duration::minutes(10)),
    )
    .await
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    read(router.clone().oneshot(request).await.unwrap()).await
}

async fn send_webhook(router: &Router, provider: &str, body: Vec<u8>, signature: Option<String>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/v1/webhooks/delivery/{provider}"))
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    read(router.clone().oneshot(builder.body(Body::from(body)).unwrap()).await.unwrap()).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

impl TestApp {
    async fn quote(&self) -> Value {
        let (status, quote) = send(
            &self.router,
            "POST",
            "/v1/delivery/quotes",
            Some(json!({
                "user_id": self.order.user_id,
                "vendor_id": self.vendor_id,
                "delivery_address_id": self.delivery_address_id,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{quote}");
        quote
    }

    async fn accept(&self, quote_id: &str) -> (StatusCode, Value) {
        send(
            &self.router,
            "POST",
            &format!("/v1/delivery/quotes/{quote_id}/accept"),
            Some(json!({ "selected_by": "customer" })),
        )
        .await
    }

    async fn ship(&self, quote_id: &str) -> (StatusCode, Value) {
        send(
            &self.router,
            "POST",
            "/v1/delivery/shipments",
            Some(json!({ "quote_id": quote_id, "order_id": self.order.id })),
        )
        .await
    }
}

#[tokio::test]
async fn test_health() {
    let app = domestic().await;
    let (status, body) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_domestic_delivery_flow() {
    let app = domestic().await;

    let quote = app.quote().await;
    assert_eq!(quote["provider"], "regional");
    assert_eq!(quote["status"], "PENDING");
    assert_eq!(quote["currency"], "NGN");
    let fee: Decimal = serde_json::from_value(quote["fee"].clone()).unwrap();
    assert_eq!(fee, Decimal::new(1200, 0));
    let quote_id = quote["id"].as_str().unwrap().to_string();

    let (status, accepted) = app.accept(&quote_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "SELECTED");

    let (status, shipment) = app.ship(&quote_id).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(shipment["tracking_number"], "T1");
    assert_eq!(shipment["status"], "PENDING");

    let (status, _) = send(&app.router, "GET", &format!("/v1/delivery/quotes/{quote_id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let body = MockProvider::webhook_body("T1", "picked_up");
    let (status, ack) = send_webhook(&app.router, "regional", body.clone(), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["success"], true);

    let order = app.store.find_order(app.order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::OutForDelivery);
    assert_eq!(app.notifier.sent().await.len(), 1);

    // replayed callback
    send_webhook(&app.router, "regional", body, None).await;
    assert_eq!(app.notifier.sent().await.len(), 1);

    let (status, view) = send(&app.router, "GET", "/v1/delivery/shipments/T1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "PICKED_UP");
    assert_eq!(view["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_quote_is_consumed_once() {
    let app = domestic().await;
    let quote = app.quote().await;
    let quote_id = quote["id"].as_str().unwrap();
    app.accept(quote_id).await;

    let (first, _) = app.ship(quote_id).await;
    let (second, error) = app.ship(quote_id).await;
    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert!(error["error"].is_string());
}

#[tokio::test]
async fn test_shipment_requires_accepted_quote() {
    let app = domestic().await;
    let quote = app.quote().await;

    let (status, error) = app.ship(quote["id"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(error["error"].as_str().unwrap().contains("already used"));
    assert_eq!(app.store.shipment_count().await, 0);
}

#[tokio::test]
async fn test_expired_quote_is_gone() {
    let app = setup(
        "GB",
        MockProvider::regional(vec![1200]),
        MockProvider::on_demand(899, Duration::seconds(-1)),
    )
    .await;

    let quote = app.quote().await;
    assert_eq!(quote["provider"], "international");

    let (status, _) = app.accept(quote["id"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_cancelled_quote_cannot_be_accepted() {
    let app = domestic().await;
    let quote = app.quote().await;
    let quote_id = quote["id"].as_str().unwrap();

    let (status, cancelled) = send(&app.router, "POST", &format!("/v1/delivery/quotes/{quote_id}/cancel"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");

    let (status, _) = app.accept(quote_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_quote_and_shipment() {
    let app = domestic().await;
    let (status, body) = send(&app.router, "GET", &format!("/v1/delivery/quotes/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("Quote not found"));

    let (status, _) = send(&app.router, "GET", "/v1/delivery/shipments/NOPE", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_shipment_without_body() {
    let app = domestic().await;
    let quote = app.quote().await;
    let quote_id = quote["id"].as_str().unwrap();
    app.accept(quote_id).await;
    app.ship(quote_id).await;

    let (status, shipment) = send(&app.router, "POST", "/v1/delivery/shipments/T1/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipment["status"], "CANCELLED");

    let order = app.store.find_order(app.order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_webhooks_are_always_acknowledged() {
    let app = setup(
        "NG",
        MockProvider::regional(vec![1200]).with_webhook_secret("whsec"),
        MockProvider::on_demand(899, Duration::minutes(10)),
    )
    .await;
    let quote = app.quote().await;
    let quote_id = quote["id"].as_str().unwrap();
    app.accept(quote_id).await;
    app.ship(quote_id).await;

    let body = MockProvider::webhook_body("T1", "delivered");

    let (status, ack) = send_webhook(&app.router, "courier-x", body.clone(), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["success"], true);

    let (status, _) = send_webhook(&app.router, "regional", body.clone(), Some("deadbeef".into())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.notifier.sent().await.is_empty());

    let signature = sign("whsec", &body).unwrap();
    let (status, _) = send_webhook(&app.router, "regional", body, Some(signature)).await;
    assert_eq!(status, StatusCode::OK);
    let order = app.store.find_order(app.order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn test_provider_lookup() {
    let app = domestic().await;
    let (status, caps) = send(&app.router, "GET", "/v1/delivery/providers?country=NG", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(caps["id"], "regional");
    assert_eq!(caps["workflow"], "scheduled");

    let (_, caps) = send(&app.router, "GET", "/v1/delivery/providers?country=KE", None).await;
    assert_eq!(caps["id"], "international");
    assert_eq!(caps["requires_confirmation"], true);
}
