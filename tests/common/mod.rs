//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use compute_runtime::config::{AssetsConfig, ListenerConfig, RuntimeConfig};
use compute_runtime::http::{build_sequence, AppServer, RuntimeServer};
use compute_runtime::lifecycle::Shutdown;
use compute_runtime::net::BoundListener;
use compute_runtime::routing::PrerenderedSet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// What the mock upstream received.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl MockRequest {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }
}

/// Canned reply of the mock upstream.
pub struct MockReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

/// Start a raw-TCP upstream that answers each request with `f(request)`.
pub async fn start_mock_upstream<F>(f: F) -> SocketAddr
where
    F: Fn(&MockRequest) -> MockReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let reply = f(&request);
                let status_text = match reply.status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    reply.content_type,
                    reply.body.len(),
                    reply.body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<MockRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut request = MockRequest {
        head,
        body: buf[head_end..].to_vec(),
    };
    let length: usize = request
        .header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while request.body.len() < length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        request.body.extend_from_slice(&chunk[..n]);
    }
    Some(request)
}

/// A package root with client, static and pre-rendered output.
pub fn package_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(root, "client/_app/immutable/entry.js", "export const start = 1;");
    write(root, "client/_app/version.json", r#"{"version":"1"}"#);
    write(root, "client/favicon.png", "not really a png");
    write(root, "static/robots.txt", "User-agent: *");
    write(root, "prerendered/about/index.html", "<h1>About</h1>");
    write(root, "prerendered/blog.html", "<h1>Blog</h1>");
    write(root, "prerendered.json", r#"["/about/", "/blog"]"#);

    dir
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Build a server over a package root.
pub fn server(root: &Path, config: &RuntimeConfig, app: Arc<dyn AppServer>) -> RuntimeServer {
    let assets = AssetsConfig::from_root(root, "_app");
    let pages = PrerenderedSet::load(&assets.prerendered_manifest).unwrap();
    RuntimeServer::new(build_sequence(&assets, pages, config, app))
}

/// Serve on an ephemeral local port until the returned coordinator fires.
pub async fn spawn_server(server: RuntimeServer) -> (SocketAddr, Shutdown) {
    let listener = BoundListener::bind(&ListenerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        socket_path: None,
    })
    .await
    .unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, shutdown)
}

/// Serve on a Unix socket at `path` until the returned coordinator fires.
#[cfg(unix)]
pub async fn spawn_unix_server(server: RuntimeServer, path: &Path) -> Shutdown {
    let listener = BoundListener::bind(&ListenerConfig {
        socket_path: Some(path.to_path_buf()),
        ..ListenerConfig::default()
    })
    .await
    .unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    shutdown
}

/// Send a raw HTTP/1.1 request over a Unix socket and read the whole reply.
#[cfg(unix)]
pub async fn unix_exchange(path: &Path, request: &str) -> String {
    let mut stream = tokio::net::UnixStream::connect(path).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    String::from_utf8_lossy(&reply).into_owned()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
