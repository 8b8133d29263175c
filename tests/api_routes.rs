use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tower::ServiceExt;

use pawnshop_inventory::api::{self, AppState};
use pawnshop_inventory::models::{ImportRecord, ImportSchema, PricingFields, Product, ShopContext};
use pawnshop_inventory::{AppConfig, ImportService, RecognitionService, RecordStore};

/// 内存实现: 商品表 + 导入计数, 可选地阻塞写入
#[derive(Default)]
struct FakeStore {
    products: Mutex<HashMap<(i64, i64), Product>>,
    updates: Mutex<Vec<(i64, PricingFields)>>,
    insert_calls: AtomicUsize,
    hold_inserts: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn insert_batch(
        &self,
        _schema: &'static ImportSchema,
        _shop: ShopContext,
        records: &[ImportRecord],
    ) -> Result<u64, sqlx::Error> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_inserts.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(records.len() as u64)
    }

    async fn find_product(&self, shop: ShopContext, id: i64) -> Result<Option<Product>, sqlx::Error> {
        Ok(self.products.lock().unwrap().get(&(shop.shop_id, id)).cloned())
    }

    async fn update_pricing(
        &self,
        shop: ShopContext,
        id: i64,
        fields: &PricingFields,
    ) -> Result<bool, sqlx::Error> {
        let found = self.products.lock().unwrap().contains_key(&(shop.shop_id, id));
        if found {
            self.updates.lock().unwrap().push((id, fields.clone()));
        }
        Ok(found)
    }
}

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn app(store: Arc<FakeStore>) -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/pawnshop")
        .unwrap();
    let imports = Arc::new(ImportService::new(store.clone(), 1024 * 1024));
    let recognition = Arc::new(RecognitionService::new(AppConfig::default().vision).unwrap());
    api::router(AppState {
        pool,
        store,
        imports,
        recognition,
        max_upload_bytes: 1024 * 1024,
    })
}

fn request(method: &str, uri: &str, shop: Option<i64>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(shop) = shop {
        builder = builder.header("x-shop-id", shop.to_string());
    }
    builder.body(body).unwrap()
}

fn json_request(method: &str, uri: &str, shop: Option<i64>, body: Value) -> Request<Body> {
    let mut req = request(method, uri, shop, Body::from(body.to_string()));
    req.headers_mut()
        .insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
    req
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn open_session(app: &Router, shop: i64, csv: &str) -> u64 {
    let (status, body) = send(app, request("POST", "/api/import/customers", Some(shop), Body::from(csv.to_string()))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["session_id"].as_u64().unwrap()
}

fn decimal_field(body: &Value, key: &str) -> Option<BigDecimal> {
    body[key].as_str().map(dec)
}

// -------------------------------------------------------------------------
// Import wizard
// -------------------------------------------------------------------------

#[tokio::test]
async fn missing_shop_header_is_bad_request() {
    let app = app(Arc::new(FakeStore::default()));
    let (status, body) = send(&app, request("POST", "/api/import/customers", None, Body::from("last_name\nSmith\n"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "missing_shop");

    let (status, _) = send(&app, request("GET", "/api/import/sessions/1", None, Body::empty())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn commit_errors_map_to_unprocessable_entity() {
    let store = Arc::new(FakeStore::default());
    let app = app(store.clone());

    let id = open_session(&app, 4, "Surname,email\nSmith,a@b.com\n").await;
    let (status, body) = send(&app, request("POST", &format!("/api/import/sessions/{id}/commit"), Some(4), Body::empty())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "missing_required_mapping");
    assert_eq!(body["missing_fields"], json!(["last_name"]));

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/api/import/sessions/{id}/mapping"),
            Some(4),
            json!({ "mapping": { "Surname": "last_name", "email": null } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "mapped");
    assert_eq!(body["missing_required"], json!([]));

    let id = open_session(&app, 4, "last_name,email\n\"\",a@b.com\n").await;
    let (status, body) = send(&app, request("POST", &format!("/api/import/sessions/{id}/commit"), Some(4), Body::empty())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "no_valid_rows");
    assert_eq!(store.insert_calls.load(Ordering::SeqCst), 0);

    let (status, body) = send(&app, request("POST", "/api/import/customers", Some(4), Body::from("city,city\nA,B\n"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "parse_error");
}

#[tokio::test]
async fn successful_commit_reports_summary() {
    let app = app(Arc::new(FakeStore::default()));
    let id = open_session(&app, 4, "last_name,city\nSmith,London\n,Leeds\n").await;

    let (status, body) = send(&app, request("POST", &format!("/api/import/sessions/{id}/commit"), Some(4), Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["inserted"], 1);
    assert_eq!(body["skipped"], 1);
    assert!(body["warning"].is_string());

    let (status, _) = send(&app, request("GET", &format!("/api/import/sessions/{id}"), Some(4), Body::empty())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_or_foreign_session_is_not_found() {
    let app = app(Arc::new(FakeStore::default()));
    let (status, body) = send(&app, request("GET", "/api/import/sessions/999", Some(4), Body::empty())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "session_not_found");

    let id = open_session(&app, 4, "last_name\nSmith\n").await;
    let uri = format!("/api/import/sessions/{id}");
    let (status, _) = send(&app, request("GET", &uri, Some(5), Body::empty())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, request("DELETE", &uri, Some(5), Body::empty())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = app.clone().oneshot(request("DELETE", &uri, Some(4), Body::empty())).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn concurrent_commit_is_conflict() {
    let store = Arc::new(FakeStore::default());
    store.hold_inserts.store(true, Ordering::SeqCst);
    let app = app(store.clone());

    let id = open_session(&app, 4, "last_name\nSmith\n").await;
    let uri = format!("/api/import/sessions/{id}/commit");

    let first = tokio::spawn(app.clone().oneshot(request("POST", &uri, Some(4), Body::empty())));
    store.entered.notified().await;

    let (status, body) = send(&app, request("POST", &uri, Some(4), Body::empty())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "import_in_progress");

    store.release.notify_one();
    let response = first.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// -------------------------------------------------------------------------
// Pricing
// -------------------------------------------------------------------------

fn stored_product(store: &FakeStore, shop_id: i64, id: i64) {
    store.products.lock().unwrap().insert(
        (shop_id, id),
        Product {
            id,
            shop_id,
            name: "Watch".to_string(),
            imei: None,
            sku: None,
            purchase_price: dec("100"),
            scheme: "28-day-buy-back".to_string(),
            scheme_rate: Some(dec("10")),
            scheme_price: Some(dec("110")),
        },
    );
}

#[tokio::test]
async fn reconcile_endpoint_derives_price() {
    let app = app(Arc::new(FakeStore::default()));
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/pricing/reconcile",
            None,
            json!({ "edited": "rate", "purchase_price": "100", "scheme_rate": "10" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["buy_back"], true);
    assert_eq!(decimal_field(&body, "scheme_price"), Some(dec("110")));
}

#[tokio::test]
async fn omitted_fields_keep_stored_values() {
    let store = Arc::new(FakeStore::default());
    stored_product(&store, 4, 7);
    let app = app(store.clone());

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            "/api/products/7/pricing",
            Some(4),
            json!({ "edited": "purchase_price", "purchase_price": "200" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(decimal_field(&body, "scheme_rate"), Some(dec("10")));
    assert_eq!(decimal_field(&body, "scheme_price"), Some(dec("220")));

    let updates = store.updates.lock().unwrap();
    let (id, fields) = &updates[0];
    assert_eq!(*id, 7);
    assert_eq!(fields.purchase_price, Some(dec("200")));
    assert_eq!(fields.scheme_rate, Some(dec("10")));
    assert_eq!(fields.scheme_price, Some(dec("220")));
}

#[tokio::test]
async fn pricing_update_errors() {
    let store = Arc::new(FakeStore::default());
    stored_product(&store, 4, 7);
    let app = app(store.clone());
    let body = json!({ "edited": "rate", "scheme_rate": "12" });

    let (status, reply) = send(&app, json_request("PUT", "/api/products/7/pricing", Some(5), body.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(reply["kind"], "not_found");

    let (status, _) = send(&app, json_request("PUT", "/api/products/7/pricing", None, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, reply) = send(
        &app,
        json_request("PUT", "/api/products/7/pricing", Some(4), json!({ "edited": "purchase_price", "purchase_price": "-5" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["kind"], "validation_error");
    assert!(store.updates.lock().unwrap().is_empty());
}

// -------------------------------------------------------------------------
// Downloads and recognition
// -------------------------------------------------------------------------

#[tokio::test]
async fn template_download_is_csv() {
    let app = app(Arc::new(FakeStore::default()));
    let response = app
        .clone()
        .oneshot(request("GET", "/api/export/products/template", None, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("name,category,imei,sku"));
}

#[tokio::test]
async fn recognition_without_api_key_is_unavailable() {
    let app = app(Arc::new(FakeStore::default()));

    let mut req = request("POST", "/api/recognition", None, Body::from(vec![1u8, 2, 3]));
    req.headers_mut().insert(header::CONTENT_TYPE, "image/png".parse().unwrap());
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "recognition_error");

    let mut req = request("POST", "/api/recognition", None, Body::from("hello"));
    req.headers_mut().insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_check_responds() {
    let app = app(Arc::new(FakeStore::default()));
    let response = app
        .oneshot(request("GET", "/health", None, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
