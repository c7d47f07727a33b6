//! The two-step meta exchange around a WebSocket tunnel.

use serde_json::json;

mod common;

const REMOTE_HANDSHAKE: &str = "HTTP/1.1 101 Switching Protocols\r\n\
     Upgrade: websocket\r\n\
     Connection: Upgrade\r\n\
     Sec-WebSocket-Accept: XYZ\r\n\
     X-Remote: yes\r\n\
     Set-Cookie: a=1\r\n\
     Set-Cookie: b=2\r\n\
     \r\n";

#[tokio::test]
async fn remote_handshake_headers_are_fetched_once() {
    let (remote, _heads) = common::start_upgrade_stub(REMOTE_HANDSHAKE).await;
    let server = common::start_server().await;
    let client = common::client();

    let res = client.get(server.url("/bare/ws-new-meta")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    let id = res.text().await.unwrap();
    assert_eq!(id.len(), 64);
    assert!(id.bytes().all(|b| b.is_ascii_hexdigit()));

    let protocol = common::bare_protocol(&json!({
        "remote": {
            "host": "127.0.0.1",
            "port": remote.port().to_string(),
            "path": "/",
            "protocol": "ws:",
        },
        "headers": { "connection": "Upgrade", "upgrade": "websocket" },
        "forward_headers": [],
        "id": id,
    }));
    let (_stream, head) = common::raw_upgrade(server.addr, "/bare/", &protocol).await;
    assert!(head.to_ascii_lowercase().starts_with("http/1.1 101"), "{head}");

    let res = client
        .get(server.url("/bare/ws-meta"))
        .header("x-bare-id", &id)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/json");
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["headers"]["x-remote"], "yes");
    assert_eq!(body["headers"]["sec-websocket-accept"], "XYZ");
    assert_eq!(body["headers"]["set-cookie"], json!(["a=1", "b=2"]));

    let res = client
        .get(server.url("/bare/ws-meta"))
        .header("x-bare-id", &id)
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "{\n\t\"headers\": null\n}");
}

#[tokio::test]
async fn unknown_ids_yield_null_headers() {
    let server = common::start_server().await;

    let res = common::client()
        .get(server.url("/bare/ws-meta"))
        .header("x-bare-id", "0".repeat(64))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["headers"].is_null());
}

#[tokio::test]
async fn missing_id_is_a_bad_request() {
    let server = common::start_server().await;

    let res = common::client()
        .get(server.url("/bare/ws-meta"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn preflight_is_a_bare_ok() {
    let server = common::start_server().await;

    let res = common::client()
        .request(reqwest::Method::OPTIONS, server.url("/bare/ws-meta"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["access-control-allow-methods"], "*");
    assert!(res.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_remote_handshake_leaves_no_headers() {
    let (remote, _heads) = common::start_upgrade_stub(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nX-Remote: yes\r\n\r\n",
    )
    .await;
    let server = common::start_server().await;
    let client = common::client();

    let id = client
        .get(server.url("/bare/ws-new-meta"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let protocol = common::bare_protocol(&json!({
        "remote": {
            "host": "127.0.0.1",
            "port": remote.port(),
            "path": "/",
            "protocol": "ws:",
        },
        "headers": { "connection": "Upgrade", "upgrade": "websocket" },
        "forward_headers": [],
        "id": id,
    }));
    let (_stream, head) = common::raw_upgrade(server.addr, "/bare/", &protocol).await;
    assert!(head.is_empty(), "{head}");

    let res = client
        .get(server.url("/bare/ws-meta"))
        .header("x-bare-id", &id)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "{\n\t\"headers\": null\n}");
}
