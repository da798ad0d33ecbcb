//! Serving over a Unix domain socket.

#![cfg(unix)]

use std::sync::{Arc, Mutex};

use compute_runtime::config::{AddressConfig, RuntimeConfig};
use compute_runtime::http::UpstreamApp;

mod common;

use common::{MockReply, MockRequest};

#[tokio::test]
async fn test_static_file_over_unix_socket() {
    let upstream = common::start_mock_upstream(|_| MockReply {
        status: 500,
        content_type: "text/plain",
        body: "unexpected".to_string(),
    })
    .await;
    let tree = common::package_tree();
    let socket = tree.path().join("runtime.sock");
    let app = Arc::new(UpstreamApp::new(&format!("http://{upstream}")).unwrap());
    let server = common::server(tree.path(), &RuntimeConfig::default(), app);
    let shutdown = common::spawn_unix_server(server, &socket).await;

    let reply = common::unix_exchange(
        &socket,
        "GET /robots.txt HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
    assert!(reply.contains("x-request-id"));
    assert!(reply.contains("User-agent: *"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_dynamic_request_over_unix_socket() {
    let seen: Arc<Mutex<Vec<MockRequest>>> = Arc::default();
    let record = seen.clone();
    let upstream = common::start_mock_upstream(move |req| {
        record.lock().unwrap().push(req.clone());
        MockReply {
            status: 200,
            content_type: "text/plain",
            body: "rendered".to_string(),
        }
    })
    .await;

    let config = RuntimeConfig {
        address: AddressConfig {
            header: Some("x-real-ip".to_string()),
            ..AddressConfig::default()
        },
        ..RuntimeConfig::default()
    };
    let tree = common::package_tree();
    let socket = tree.path().join("runtime.sock");
    let app = Arc::new(UpstreamApp::new(&format!("http://{upstream}")).unwrap());
    let server = common::server(tree.path(), &config, app);
    let shutdown = common::spawn_unix_server(server, &socket).await;

    let reply = common::unix_exchange(
        &socket,
        "GET /account HTTP/1.1\r\nHost: edge.example\r\nX-Real-IP: 203.0.113.9\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
    assert!(reply.contains("rendered"));

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].request_line(), "GET /account HTTP/1.1");
    assert_eq!(seen[0].header("x-forwarded-for").as_deref(), Some("203.0.113.9"));
    assert_eq!(seen[0].header("x-forwarded-host").as_deref(), Some("edge.example"));

    shutdown.trigger();
}
