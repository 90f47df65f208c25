//! Round-trips against a one-shot local HTTP server.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use harvest::{
    FetchErrorKind, HttpMethod, InitialStateLoader, JobKey, JobSpec, NavigationState,
    PageFetcher, SearchApiConfig,
};
use harvest_fetch::HttpSearchClient;

/// Serve `response` to the first connection; resolves to the raw request.
async fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if let Some(end) = find_header_end(&raw) {
                let body_len = content_length(&raw[..end]);
                if raw.len() >= end + body_len {
                    break;
                }
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&raw).into_owned()
    });

    (format!("http://{}/search", addr), handle)
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())
                .flatten()
        })
        .unwrap_or(0)
}

fn http_response(status: &str, extra_headers: &[&str], body: &str) -> String {
    let mut response = format!("HTTP/1.1 {}\r\n", status);
    for header in extra_headers {
        response.push_str(header);
        response.push_str("\r\n");
    }
    response.push_str("Content-Type: application/json\r\n");
    response.push_str(&format!("Content-Length: {}\r\n", body.len()));
    response.push_str("Connection: close\r\n\r\n");
    response.push_str(body);
    response
}

fn client(endpoint: String, method: HttpMethod) -> HttpSearchClient {
    let config = SearchApiConfig {
        endpoint,
        method,
        page_size: Some(96),
        ..Default::default()
    };
    HttpSearchClient::builder(config, Duration::from_secs(5))
        .user_agent("harvest-test/1.0")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_first_page_seeds_navigation_and_cookies() {
    let body = r#"{"results":[{"lotNumber":"L1"},{"lotNumber":"L2"}],"totalCount":192,"hitsPerPage":96,"refId":"ref-1","searchContext":{"sort":"date"}}"#;
    let (endpoint, server) = serve_once(http_response(
        "200 OK",
        &["Set-Cookie: sid=abc; Path=/; HttpOnly"],
        body,
    ))
    .await;

    let job = JobSpec::new("vehicles", "ford mustang");
    let session = client(endpoint, HttpMethod::Get).session(job.key.clone());
    let seed = session.load_first_page(&job).await.unwrap();
    let request = server.await.unwrap();

    assert!(request.starts_with("GET /search?"));
    assert!(request.contains("query=ford+mustang"));
    assert!(request.contains("page=1"));
    assert!(request.contains("size=96"));
    assert!(request.to_lowercase().contains("user-agent: harvest-test/1.0"));

    assert_eq!(seed.page.result.records.len(), 2);
    assert_eq!(seed.page.result.records[0].id, "L1");
    assert_eq!(seed.page.result.reported_pages(), Some(2));
    assert_eq!(seed.navigation.ref_id.as_deref(), Some("ref-1"));
    assert_eq!(seed.navigation.cookies.get("sid").map(String::as_str), Some("abc"));
}

#[tokio::test]
async fn test_follow_up_request_carries_navigation() {
    let body = r#"{"results":[{"lotNumber":"L3"}],"totalCount":192}"#;
    let (endpoint, server) = serve_once(http_response("200 OK", &[], body)).await;

    let mut cookies = BTreeMap::new();
    cookies.insert("sid".to_string(), "abc".to_string());
    let navigation = NavigationState {
        ref_id: Some("ref-1".into()),
        user_token: Some("tok".into()),
        cookies,
        ..Default::default()
    };

    let session = client(endpoint, HttpMethod::Post).session(JobKey::new("vehicles", "ford"));
    let page = session.fetch_page(2, &navigation).await.unwrap();
    let request = server.await.unwrap();

    assert!(request.starts_with("POST /search"));
    assert!(request.to_lowercase().contains("cookie: sid=abc"));
    assert!(request.contains(r#""refId":"ref-1""#));
    assert!(request.contains(r#""userToken":"tok""#));
    assert!(request.contains(r#""page":2"#));
    assert_eq!(page.result.page_number, 2);
    assert_eq!(page.result.records[0].id, "L3");
}

#[tokio::test]
async fn test_throttled_response_carries_retry_after() {
    let (endpoint, server) = serve_once(http_response(
        "429 Too Many Requests",
        &["Retry-After: 12"],
        r#"{"error":"slow down"}"#,
    ))
    .await;

    let session = client(endpoint, HttpMethod::Get).session(JobKey::new("", "ford"));
    let err = session
        .fetch_page(3, &NavigationState::default())
        .await
        .unwrap_err();
    server.await.unwrap();

    assert_eq!(err.kind, FetchErrorKind::RateLimited);
    assert_eq!(err.status, Some(429));
    assert_eq!(err.retry_after, Some(Duration::from_secs(12)));
}

#[tokio::test]
async fn test_json_throttle_message_on_success_status_is_rate_limited() {
    let (endpoint, server) = serve_once(http_response(
        "200 OK",
        &["Retry-After: 8"],
        r#"{"error":"Too many requests, please slow down"}"#,
    ))
    .await;

    let session = client(endpoint, HttpMethod::Get).session(JobKey::new("", "ford"));
    let err = session
        .fetch_page(4, &NavigationState::default())
        .await
        .unwrap_err();
    server.await.unwrap();

    assert_eq!(err.kind, FetchErrorKind::RateLimited);
    assert_eq!(err.status, Some(200));
    assert_eq!(err.retry_after, Some(Duration::from_secs(8)));
}

#[tokio::test]
async fn test_missing_record_list_is_invalid() {
    let (endpoint, server) =
        serve_once(http_response("200 OK", &[], r#"{"message":"maintenance"}"#)).await;

    let session = client(endpoint, HttpMethod::Get).session(JobKey::new("", "ford"));
    let err = session
        .fetch_page(2, &NavigationState::default())
        .await
        .unwrap_err();
    server.await.unwrap();

    assert_eq!(err.kind, FetchErrorKind::InvalidResponse);
    assert_eq!(err.status, Some(200));
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/search", listener.local_addr().unwrap());
    drop(listener);

    let session = client(endpoint, HttpMethod::Get).session(JobKey::new("", "ford"));
    let err = session
        .fetch_page(2, &NavigationState::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FetchErrorKind::Transport);
}

#[test]
fn test_invalid_endpoint_rejected() {
    let config = SearchApiConfig {
        endpoint: "not a url".to_string(),
        ..Default::default()
    };
    let err = HttpSearchClient::builder(config, Duration::from_secs(5))
        .build()
        .err()
        .unwrap();
    assert!(err.contains("Invalid search endpoint"));
}
