//! WebSocket test client.

use crate::fixtures::JoinRequestBuilder;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long `recv_json` waits before failing the test.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A player connection for tests.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect and complete the WebSocket handshake.
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", url, e))?;
        Ok(Self { ws })
    }

    /// Send a raw text frame.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), anyhow::Error> {
        self.ws.send(Message::text(text.into())).await?;
        Ok(())
    }

    /// Send a JSON value as a text frame.
    pub async fn send_json(&mut self, value: &Value) -> Result<(), anyhow::Error> {
        self.send_text(value.to_string()).await
    }

    /// Send a `join` and return the reply.
    pub async fn join(&mut self, request: JoinRequestBuilder) -> Result<Value, anyhow::Error> {
        self.send_json(&request.build()).await?;
        self.recv_json().await
    }

    /// Next text frame, parsed as JSON.
    pub async fn recv_json(&mut self) -> Result<Value, anyhow::Error> {
        let text = self.recv_text().await?;
        serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("Not JSON ({}): {}", e, text))
    }

    /// Next text frame, skipping control frames.
    pub async fn recv_text(&mut self) -> Result<String, anyhow::Error> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .map_err(|_| anyhow::anyhow!("No frame within {:?}", RECV_TIMEOUT))?;
            match frame {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Close(_))) | None => anyhow::bail!("Connection closed"),
                Some(Ok(_)) => {}
                Some(Err(e)) => anyhow::bail!("Read failed: {}", e),
            }
        }
    }

    /// Fail if a text frame arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<(), anyhow::Error> {
        match tokio::time::timeout(window, self.ws.next()).await {
            Err(_) => Ok(()),
            Ok(Some(Ok(Message::Text(text)))) => anyhow::bail!("Unexpected frame: {}", text),
            Ok(other) => anyhow::bail!("Unexpected stream event: {:?}", other),
        }
    }

    /// Wait for the server to close the connection.
    pub async fn wait_closed(&mut self) -> Result<(), anyhow::Error> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .map_err(|_| anyhow::anyhow!("Connection still open after {:?}", RECV_TIMEOUT))?;
            match frame {
                Some(Ok(Message::Close(_)) | Err(_)) | None => return Ok(()),
                Some(Ok(_)) => {}
            }
        }
    }

    /// Close from the client side.
    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.ws.close(None).await?;
        Ok(())
    }
}
