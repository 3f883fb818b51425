//! Pipeline against HTTP collaborators: storefront cart API and upload endpoint

use chrono::{TimeZone, Utc};
use customizer_app::Pipeline;
use customizer_cart::CartConfig;
use customizer_cdn::CdnConfig;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{test_config, DATA_URL};

const DURABLE: &str = "https://res.cloudinary.com/shop/image/upload/v1/custom-designs/design_1.png";

fn pipeline_for(server: &MockServer, dir: &tempfile::TempDir) -> Pipeline {
    let cdn = CdnConfig {
        provider: "http".to_string(),
        upload_url: Some(format!("{}/api/upload", server.uri())),
        ..CdnConfig::default()
    };
    let cart = CartConfig {
        provider: "storefront".to_string(),
        base_url: Some(server.uri()),
        session_cookie: Some("cart=abc123".to_string()),
    };
    Pipeline::from_config(test_config(dir.path().to_path_buf()), &cdn, cart).unwrap()
}

fn cart_json(properties: serde_json::Value, attributes: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "items": [{
            "key": "44:abc",
            "id": 44,
            "product_id": 9001,
            "variant_id": 44,
            "quantity": 1,
            "properties": properties
        }],
        "attributes": attributes
    })
}

#[tokio::test]
async fn test_prepares_storefront_cart_through_upload_endpoint() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/cart.js"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(
            serde_json::json!({
                "_custom_design": "true",
                "_design_image_url": DATA_URL,
                "_design_urls": format!("[\"{}\"]", DATA_URL),
                "Engraving": "For Mom",
                "_stale": null
            }),
            serde_json::json!({}),
        )))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .and(body_partial_json(serde_json::json!({
            "image": DATA_URL,
            "folder": "custom-designs"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "url": DURABLE
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/cart/change.js"))
        .and(body_partial_json(serde_json::json!({
            "id": "44:abc",
            "properties": {
                "_custom_design": "true",
                "_design_image_url": DURABLE,
                "Design 1": DURABLE,
                "Engraving": "For Mom"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/cart/update.js"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let report = pipeline_for(&server, &dir).prepare_checkout().await.unwrap();

    assert!(report.is_fully_prepared());
    assert_eq!(report.uploads, 1);
    assert_eq!(report.resolved_urls, vec![DURABLE.to_string()]);
}

#[tokio::test]
async fn test_prepared_storefront_cart_needs_no_writes() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let urls = format!("[\"{}\"]", DURABLE);
    let record = serde_json::json!({
        "urls": [DURABLE],
        "preparedAt": "2026-03-01T12:00:00Z"
    })
    .to_string();

    Mock::given(method("GET"))
        .and(path("/cart.js"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(
            serde_json::json!({
                "_custom_design": "true",
                "_design_image_url": DURABLE,
                "_design_urls": urls,
                "Design 1": DURABLE
            }),
            serde_json::json!({ "_prepared_design_urls": record }),
        )))
        .mount(&server)
        .await;

    for endpoint in ["/api/upload", "/cart/change.js", "/cart/update.js"] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
    }

    let report = pipeline_for(&server, &dir).prepare_checkout().await.unwrap();

    assert!(report.is_fully_prepared());
    assert_eq!(report.uploads, 0);
    assert!(!report.lines[0].rewritten);
    assert_eq!(
        report.prepared_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_storefront_outage_is_a_hard_failure() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/cart.js"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = pipeline_for(&server, &dir)
        .prepare_checkout()
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "CART_UNAVAILABLE");
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_upload_endpoint_rejection_degrades_line() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/cart.js"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(
            serde_json::json!({
                "_custom_design": "true",
                "_design_image_url": DATA_URL
            }),
            serde_json::json!({}),
        )))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "error": "File size too large"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/cart/change.js"))
        .and(body_partial_json(serde_json::json!({
            "properties": { "_design_image_url": DATA_URL }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let report = pipeline_for(&server, &dir).prepare_checkout().await.unwrap();

    let line = &report.lines[0];
    assert_eq!(line.line_id, "44:abc");
    assert_eq!(line.degraded_images.len(), 1);
    assert!(line.degraded_images[0].reason.contains("File size too large"));
    assert_eq!(
        report.partial_error().map(|e| e.error_code()),
        Some("PARTIAL_MATERIALIZATION")
    );
}

#[tokio::test]
async fn test_upload_receipt_off_durable_host_keeps_original() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/cart.js"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(
            serde_json::json!({
                "_custom_design": "true",
                "_design_image_url": DATA_URL
            }),
            serde_json::json!({}),
        )))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "url": "https://scratch.example.net/tmp/upload.png"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/cart/change.js"))
        .and(body_partial_json(serde_json::json!({
            "properties": { "_design_image_url": DATA_URL }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let report = pipeline_for(&server, &dir).prepare_checkout().await.unwrap();

    let line = &report.lines[0];
    assert_eq!(line.degraded_images.len(), 1);
    assert_eq!(line.degraded_images[0].code, "UPLOAD_ERROR");
    assert!(line.degraded_images[0].reason.contains("scratch.example.net"));
    assert!(report.resolved_urls.is_empty());
}
