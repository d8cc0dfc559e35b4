use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};
use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::{Channel, Transport};
use crate::error::TransportError;
use crate::models::DialogId;

/// Opens `/ws/chat?dialogID={id}` on the chat backend.
#[derive(Clone)]
pub struct WsTransport {
    config: ClientConfig,
}

impl WsTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl Transport for WsTransport {
    type Channel = WsChannel;

    async fn open(&self, dialog: &DialogId) -> Result<WsChannel, TransportError> {
        let url = self.config.chat_url(dialog);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidTarget(e.to_string()))?;
        if let Some(cookie) = self.config.cookie_header() {
            let value = HeaderValue::from_str(&cookie).map_err(|_| {
                TransportError::InvalidTarget("session token is not a valid header value".into())
            })?;
            request.headers_mut().insert(COOKIE, value);
        }

        debug!(%url, "connecting dialog channel");
        let (stream, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(WsChannel { stream })
    }
}

pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Channel for WsChannel {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream
            .send(tungstenite::Message::Text(frame.into()))
            .await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(tungstenite::Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(tungstenite::Message::Close(frame)) => {
                    debug!(?frame, "peer closed dialog channel");
                    return None;
                }
                // Pings are answered by tungstenite; binary frames are not part of the protocol
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "dialog channel close handshake failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, ServerFileConfig, SessionFileConfig};
    use axum::{
        Router,
        extract::{
            Query,
            ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        },
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::get,
    };
    use std::collections::HashMap;

    const TOKEN: &str = "s3cret";

    /// Echoes each frame back tagged with the dialog id. `bye` makes the
    /// server close the channel; `binary` gets a binary frame ahead of the echo.
    async fn chat(
        ws: WebSocketUpgrade,
        Query(params): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Response {
        let authorized = headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("jwt_token={TOKEN}"));
        if !authorized {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let Some(dialog) = params.get("dialogID").cloned() else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        ws.on_upgrade(move |socket| echo(socket, dialog))
    }

    async fn echo(mut socket: WebSocket, dialog: String) {
        while let Some(Ok(msg)) = socket.recv().await {
            match msg {
                WsMessage::Text(text) if text.as_str() == "bye" => {
                    let _ = socket.send(WsMessage::Close(None)).await;
                    return;
                }
                WsMessage::Text(text) if text.as_str() == "binary" => {
                    let junk = WsMessage::Binary(vec![0xde, 0xad, 0xbe, 0xef].into());
                    let reply = WsMessage::Text(format!("{dialog}:binary").into());
                    if socket.send(junk).await.is_err() || socket.send(reply).await.is_err() {
                        return;
                    }
                }
                WsMessage::Text(text) => {
                    let reply = format!("{dialog}:{}", text.as_str());
                    if socket.send(WsMessage::Text(reply.into())).await.is_err() {
                        return;
                    }
                }
                WsMessage::Close(_) => return,
                _ => {}
            }
        }
    }

    async fn spawn_chat_server() -> (u16, tokio::sync::oneshot::Sender<()>) {
        let app = Router::new().route("/ws/chat", get(chat));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });
        (port, tx)
    }

    fn transport_for(port: u16, token: Option<&str>) -> WsTransport {
        let fc = FileConfig {
            server: ServerFileConfig {
                base_url: format!("http://127.0.0.1:{port}"),
                request_timeout_secs: 5,
            },
            session: SessionFileConfig {
                token: token.map(str::to_string),
                ..Default::default()
            },
            ..Default::default()
        };
        WsTransport::new(&ClientConfig::from_file(&fc).unwrap())
    }

    #[tokio::test]
    async fn open_send_and_receive() {
        let (port, _shutdown) = spawn_chat_server().await;
        let transport = transport_for(port, Some(TOKEN));

        let mut channel = transport.open(&DialogId::from(7)).await.unwrap();
        channel.send("hello".into()).await.unwrap();
        channel.send("again".into()).await.unwrap();

        assert_eq!(channel.recv().await.unwrap().unwrap(), "7:hello");
        assert_eq!(channel.recv().await.unwrap().unwrap(), "7:again");
        channel.close().await;
    }

    #[tokio::test]
    async fn server_close_ends_the_stream() {
        let (port, _shutdown) = spawn_chat_server().await;
        let transport = transport_for(port, Some(TOKEN));

        let mut channel = transport.open(&DialogId::from(7)).await.unwrap();
        channel.send("bye".into()).await.unwrap();
        assert!(channel.recv().await.is_none());
    }

    #[tokio::test]
    async fn binary_frames_are_skipped() {
        let (port, _shutdown) = spawn_chat_server().await;
        let transport = transport_for(port, Some(TOKEN));

        let mut channel = transport.open(&DialogId::from(7)).await.unwrap();
        channel.send("binary".into()).await.unwrap();
        channel.send("after".into()).await.unwrap();

        assert_eq!(channel.recv().await.unwrap().unwrap(), "7:binary");
        assert_eq!(channel.recv().await.unwrap().unwrap(), "7:after");
        channel.close().await;
    }

    #[tokio::test]
    async fn handshake_without_session_is_rejected() {
        let (port, _shutdown) = spawn_chat_server().await;
        let transport = transport_for(port, None);

        let err = transport.open(&DialogId::from(7)).await.err().unwrap();
        assert!(matches!(err, TransportError::WebSocket(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn server_down_fails_open() {
        let transport = transport_for(1, Some(TOKEN));
        assert!(transport.open(&DialogId::from(7)).await.is_err());
    }
}
