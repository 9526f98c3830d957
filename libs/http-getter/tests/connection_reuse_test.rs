#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Connection reuse: bodies that are drained and closed give their
//! connection back to the pool, so repeated GETs stay on a bounded number of
//! sockets.
//!
//! The server counts accepted TCP connections instead of inspecting the
//! process's open sockets.

use http_getter::{FetchError, Getter, HttpGetter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const REQUESTS: usize = 10;

/// Sockets a reused pool may still open when a request races the return of an idle connection
const MAX_CONNECTIONS: usize = 3;

const BODY: &str = "<xml><some /></xml>";

struct CountingServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl CountingServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_keep_alive(stream));
            }
        });

        Self { addr, accepted }
    }

    fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Minimal HTTP/1.1 keep-alive responder: one fixed response per request head.
async fn serve_keep_alive(stream: TcpStream) {
    let mut reader = BufReader::new(stream);
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/xml\r\ncontent-length: {}\r\n\r\n{BODY}",
        BODY.len()
    );

    loop {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) if line == "\r\n" => break,
                Ok(_) => {}
            }
        }

        if reader.get_mut().write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("http_getter=trace")
        .try_init()
        .ok();
}

#[tokio::test]
async fn test_drained_gets_reuse_connections() {
    init_tracing();
    let server = CountingServer::start().await;
    let getter = Getter::new(Duration::from_secs(10));

    for _ in 0..REQUESTS {
        let mut resp = getter.get(&server.url()).await.unwrap();
        assert_eq!(resp.body_mut().text().await.unwrap(), BODY);
        resp.into_body().close().await;
        // let the pool take the connection back
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let accepted = server.accepted();
    assert!(
        accepted <= MAX_CONNECTIONS,
        "leaked: {accepted} connections for {REQUESTS} requests"
    );
}

#[tokio::test]
async fn test_wrap_get_reuses_connections_without_reading() {
    init_tracing();
    let server = CountingServer::start().await;
    let getter = Getter::new(Duration::from_secs(10));

    for _ in 0..REQUESTS {
        // the callback ignores the body; closing drains it
        getter
            .wrap_get(&server.url(), |resp| async move {
                assert!(resp.status().is_success());
                Ok::<_, FetchError>(())
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let accepted = server.accepted();
    assert!(
        accepted <= MAX_CONNECTIONS,
        "leaked: {accepted} connections for {REQUESTS} requests"
    );
}

#[tokio::test]
async fn test_clones_share_the_pool() {
    init_tracing();
    let server = CountingServer::start().await;
    let getter = Getter::default();

    for _ in 0..REQUESTS {
        let clone = getter.clone();
        let mut resp = clone.get(&server.url()).await.unwrap();
        resp.body_mut().bytes().await.unwrap();
        resp.into_body().close().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(server.accepted() <= MAX_CONNECTIONS);
}
