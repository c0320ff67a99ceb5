use indoc::indoc;
use integration_tests::TestServer;
use reqwest::Method;

async fn preflight(server: &TestServer, origin: &str) -> reqwest::Response {
    server
        .client
        .request(Method::OPTIONS, "/api/chat")
        .header("Origin", origin)
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn permissive_by_default() {
    let server = TestServer::builder().build("").await;
    let response = preflight(&server, "http://localhost:3000").await;

    assert_eq!(response.status(), 200);

    let headers = response.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert!(headers.contains_key("access-control-allow-methods"));
}

#[tokio::test]
async fn any_origin_with_credentials_is_mirrored() {
    let config = indoc! {r#"
        [server.cors]
        allow_origins = "*"
        allow_credentials = true
    "#};

    let server = TestServer::builder().build(config).await;
    let response = preflight(&server, "http://localhost:3000").await;

    assert_eq!(response.status(), 200);

    let headers = response.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "http://localhost:3000");
    assert_eq!(headers.get("access-control-allow-credentials").unwrap(), "true");
    assert_eq!(headers.get("access-control-allow-headers").unwrap(), "content-type");
}

#[tokio::test]
async fn explicit_origins() {
    let config = indoc! {r#"
        [server.cors]
        allow_origins = ["https://chat.example.com/"]
        max_age = "1h"
    "#};

    let server = TestServer::builder().build(config).await;

    let response = preflight(&server, "https://chat.example.com").await;
    let headers = response.headers();

    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "https://chat.example.com");
    assert_eq!(headers.get("access-control-max-age").unwrap(), "3600");

    let response = preflight(&server, "https://evil.example.com").await;
    assert!(!response.headers().contains_key("access-control-allow-origin"));
}
