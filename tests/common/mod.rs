//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use collab_relay::{HttpServer, RelayConfig, Shutdown};
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A relay running on an ephemeral local port.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub config_tx: mpsc::UnboundedSender<RelayConfig>,
}

impl TestRelay {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Create a room and return its id.
    pub async fn create_room(&self) -> String {
        let body: serde_json::Value = reqwest::Client::new()
            .post(self.http("/room"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    /// Open a websocket to `room`, optionally declaring an origin.
    pub async fn join(&self, room: &str, origin: Option<&str>) -> WsStream {
        let mut request = self.ws(&format!("/room/{room}")).into_client_request().unwrap();
        if let Some(origin) = origin {
            request
                .headers_mut()
                .insert("origin", HeaderValue::from_str(origin).unwrap());
        }
        let (ws, response) = connect_async(request).await.unwrap();
        assert_eq!(response.status(), 101);
        ws
    }
}

/// Start the relay with `config`, listening on 127.0.0.1 with a random port.
pub async fn start_relay(config: RelayConfig) -> TestRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_tx, config_rx) = mpsc::unbounded_channel();
    let server = HttpServer::new(config);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_rx, rx).await;
    });

    TestRelay {
        addr,
        shutdown,
        config_tx,
    }
}

/// Next text frame on `ws`, or `None` if nothing arrives within `wait`.
pub async fn next_text(ws: &mut WsStream, wait: Duration) -> Option<String> {
    loop {
        match tokio::time::timeout(wait, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(text.as_str().to_string()),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

/// Give the relay a moment to register a just-opened socket.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
