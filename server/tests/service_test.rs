use std::net::SocketAddr;
use std::time::Duration;

use http::StatusCode;
use routem_server::{
    DispatcherConfig, HandlerResult, HttpError, RequestContext, Router, ServerError, Service,
    ServiceOptions,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn hello(ctx: RequestContext) -> HandlerResult {
    let name = ctx.param("name").unwrap_or_default();
    ctx.response().text(StatusCode::OK, format!("Hello, {name}!"));
    Ok(())
}

async fn echo(ctx: RequestContext) -> HandlerResult {
    let body = ctx
        .body_str()
        .map_err(|_| HttpError::new(400, "not utf-8"))?;
    ctx.response().text(StatusCode::OK, body);
    Ok(())
}

async fn start(options: ServiceOptions) -> Service {
    let mut router = Router::new();
    router.get("/hello/:name", hello);
    router.post("/echo", echo);
    let dispatcher = router.build(DispatcherConfig::default()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    Service::serve(listener, dispatcher, options).unwrap()
}

/// Send a raw HTTP/1.1 request and return the full response text
async fn send(address: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(address).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn test_serves_matched_route() {
    let service = start(ServiceOptions::default()).await;
    assert!(service.is_running());

    let response = send(
        service.address(),
        "GET /hello/bill HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.contains("content-type: text/plain; charset=utf-8"));
    assert!(response.ends_with("Hello, bill!"));

    service.stop();
    tokio_test::assert_ok!(service.wait().await);
}

#[tokio::test]
async fn test_unmatched_route_is_404() {
    let service = start(ServiceOptions::default()).await;

    let response = send(
        service.address(),
        "DELETE /hello/bill HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 404 Not Found"), "{response}");
    assert!(response.ends_with("Route Not Found: \n"));
}

#[tokio::test]
async fn test_request_body_reaches_handler() {
    let service = start(ServiceOptions::default()).await;

    let response = send(
        service.address(),
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.ends_with("hello"));
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let service = start(ServiceOptions {
        max_request_body_size: 4,
    })
    .await;

    let response = send(
        service.address(),
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 413 Payload Too Large"), "{response}");
}

#[tokio::test]
async fn test_stop_ends_accept_loop() {
    let service = start(ServiceOptions::default()).await;
    let address = service.address();

    service.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!service.is_running());
    tokio_test::assert_ok!(service.wait().await);

    // The listener is dropped with the loop
    assert!(TcpStream::connect(address).await.is_err());
}

#[tokio::test]
async fn test_run_reports_bind_errors() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = taken.local_addr().unwrap();

    let mut router = Router::new();
    router.get("/hello/:name", hello);
    let dispatcher = router.build(DispatcherConfig::default()).unwrap();

    let result = Service::run(address, dispatcher).await;
    assert!(matches!(result, Err(ServerError::Io(_))));
}
