//! E2E tests for health check and basic server functionality

mod common;

use common::TestServer;

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;

    let response = server.get("/health", None).await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let server = TestServer::new().await;
    ledgerlink::metrics::init_metrics();

    // Generate at least one observation
    server.get("/getAccounts", None).await;

    let response = server.get("/metrics", None).await;
    assert_eq!(response.status(), 200);

    let body = response.text().await.unwrap();
    assert!(body.contains("ledgerlink_errors_total"));
}

#[tokio::test]
async fn test_cors_headers() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/health"))
        .header("Origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();

    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_404_for_unknown_routes() {
    let server = TestServer::new().await;

    let response = server.get("/unknown/route", None).await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_static_dir_serves_unmatched_paths() {
    let build = tempfile::TempDir::new().unwrap();
    std::fs::write(build.path().join("app.js"), "console.log('ledger');").unwrap();
    let dir = build.path().to_path_buf();
    let server = TestServer::with_config(|config| config.server.static_dir = Some(dir)).await;

    let response = server.get("/app.js", None).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "console.log('ledger');");

    // Routes still win over files
    let response = server.get("/health", None).await;
    assert_eq!(response.text().await.unwrap(), "OK");

    let response = server.get("/missing.css", None).await;
    assert_eq!(response.status(), 404);
}
