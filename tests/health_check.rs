//! Integration tests for the public, unauthenticated surface

mod common;

use common::spawn_app;
use serde_json::Value;

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app();

    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let app = spawn_app();

    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request");

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("strict-transport-security"));
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = spawn_app();

    let response = app
        .client
        .get(app.url("/does-not-exist"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn openapi_description_is_served() {
    let app = spawn_app();
    let root = app.address.trim_end_matches("/api/v1");

    let response = app
        .client
        .get(format!("{}/openapi.yaml", root))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert!(response.text().await.unwrap().starts_with("openapi:"));
}

#[tokio::test]
async fn docs_pages_and_json_alias_are_served() {
    let app = spawn_app();
    let root = app.address.trim_end_matches("/api/v1");

    for path in ["/docs", "/api-docs"] {
        let response = app
            .client
            .get(format!("{}{}", root, path))
            .send()
            .await
            .expect("Failed to execute request");

        assert!(response.status().is_success());
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert!(response.text().await.unwrap().contains("swagger-ui"));
    }

    let response = app
        .client
        .get(format!("{}/openapi.json", root))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let app = spawn_app();

    let response = app
        .client
        .request(reqwest::Method::OPTIONS, app.url("/auth/login"))
        .header("Origin", "https://blog.example")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}
