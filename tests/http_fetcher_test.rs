use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use tokio::net::TcpListener;

use gallery_harvest_engine::driver::{Fetcher, HttpFetcher};

const TEST_SIZE: usize = 256 * 1024;

async fn serve_photo(req: Request) -> impl IntoResponse {
    // Origins reject hotlinked requests without a referer.
    if req.headers().get(header::REFERER).is_none() {
        return StatusCode::FORBIDDEN.into_response();
    }
    let body: Vec<u8> = (0..TEST_SIZE).map(|i| (i % 251) as u8).collect();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/jpeg".to_string())],
        body,
    )
        .into_response()
}

async fn echo_agent(req: Request) -> impl IntoResponse {
    let agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    (StatusCode::OK, agent)
}

async fn start_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/photo.jpg", get(serve_photo))
        .route("/agent", get(echo_agent));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

fn referer_headers() -> HashMap<String, String> {
    HashMap::from([(
        "Referer".to_string(),
        "https://www.facebook.com/".to_string(),
    )])
}

async fn read_body(fetcher: &HttpFetcher, url: &str) -> (u16, Vec<u8>) {
    let resp = fetcher.get(url).await.unwrap();
    let status = resp.status;
    let mut body = resp.body;
    let mut data = Vec::new();
    while let Some(chunk) = body.next().await {
        data.extend_from_slice(&chunk.unwrap());
    }
    (status, data)
}

#[tokio::test]
async fn test_http_fetcher_streams_full_body() {
    let (addr, _handle) = start_server().await;
    let fetcher = HttpFetcher::new("harvest-test", referer_headers()).unwrap();

    let (status, data) = read_body(&fetcher, &format!("http://{}/photo.jpg", addr)).await;
    assert_eq!(status, 200);
    assert_eq!(data.len(), TEST_SIZE);
    assert!(data.iter().enumerate().all(|(i, b)| *b == (i % 251) as u8));
}

#[tokio::test]
async fn test_http_fetcher_returns_error_status() {
    let (addr, _handle) = start_server().await;
    let fetcher = HttpFetcher::new("harvest-test", HashMap::new()).unwrap();

    let resp = fetcher
        .get(&format!("http://{}/photo.jpg", addr))
        .await
        .unwrap();
    assert_eq!(resp.status, 403);
    assert!(!resp.is_success());

    let resp = fetcher
        .get(&format!("http://{}/missing.jpg", addr))
        .await
        .unwrap();
    assert_eq!(resp.status, 404);
}

#[tokio::test]
async fn test_http_fetcher_update_headers() {
    let (addr, _handle) = start_server().await;
    let url = format!("http://{}/photo.jpg", addr);
    let fetcher = HttpFetcher::new("harvest-test", HashMap::new()).unwrap();
    assert_eq!(fetcher.get(&url).await.unwrap().status, 403);

    fetcher.update_headers(referer_headers());
    assert_eq!(fetcher.get(&url).await.unwrap().status, 200);
}

#[tokio::test]
async fn test_http_fetcher_sends_user_agent() {
    let (addr, _handle) = start_server().await;
    let fetcher = HttpFetcher::new("harvest-test/1.0", HashMap::new()).unwrap();

    let (status, data) = read_body(&fetcher, &format!("http://{}/agent", addr)).await;
    assert_eq!(status, 200);
    assert_eq!(String::from_utf8(data).unwrap(), "harvest-test/1.0");
}

#[tokio::test]
async fn test_http_fetcher_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let fetcher = HttpFetcher::new("harvest-test", HashMap::new()).unwrap();
    assert!(fetcher
        .get(&format!("http://{}/photo.jpg", addr))
        .await
        .is_err());
}
