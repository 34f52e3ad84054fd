//! WebSocket session adapted to a stream of raw frames and a sink of lines.

use crate::error::{IrcError, Result, TransportError};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::Message;

/// Inbound text frames; one frame may hold several CRLF-joined lines.
pub type FrameStream = Pin<Box<dyn Stream<Item = std::result::Result<String, TransportError>> + Send>>;

/// Outbound protocol lines, one per frame.
pub type LineSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

#[tracing::instrument(level = "info", skip_all, fields(endpoint = %endpoint))]
pub async fn connect(endpoint: &str) -> Result<(FrameStream, LineSink)> {
    let (ws, _) = tokio_tungstenite::connect_async(endpoint)
        .await
        .map_err(|e| IrcError::Connect {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
    tracing::info!("websocket connected");
    let (write, read) = ws.split();

    let frames = read.filter_map(|msg| async move {
        match msg {
            Ok(Message::Text(text)) => Some(Ok(text.to_string())),
            Ok(Message::Close(frame)) => Some(Err(TransportError::Closed(
                frame.map(|f| format!("{} {}", f.code, f.reason)),
            ))),
            Ok(_) => None,
            Err(e) => Some(Err(TransportError::Io(e.to_string()))),
        }
    });

    let lines = write
        .sink_map_err(|e| TransportError::Io(e.to_string()))
        .with(|line: String| async move {
            Ok::<_, TransportError>(Message::Text(line.into()))
        });

    Ok((Box::pin(frames), Box::pin(lines)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    /// Serve exactly one websocket client with `script`.
    async fn serve_once<F, Fut>(script: F) -> String
    where
        F: FnOnce(WebSocketStream<tokio::net::TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr = listener.local_addr().expect("listener addr");
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("websocket handshake");
            script(ws).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn text_frames_pass_through_and_close_ends_the_stream() {
        let endpoint = serve_once(|mut ws| async move {
            let line = ws.next().await.expect("client line").expect("read line");
            ws.send(Message::Text(format!("echo {}", line.to_text().unwrap_or("")).into()))
                .await
                .expect("send echo");
            ws.send(Message::Ping(vec![1, 2, 3].into())).await.expect("send ping");
            ws.send(Message::Binary(vec![0_u8; 4].into())).await.expect("send binary");
            ws.send(Message::Text("PING :tmi.twitch.tv".into())).await.expect("send text");
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            }))
            .await
            .expect("send close");
        })
        .await;

        let (mut frames, mut lines) = connect(&endpoint).await.expect("connect");
        lines.send("NICK botname".to_string()).await.expect("write line");

        assert_eq!(
            frames.next().await.expect("first frame"),
            Ok("echo NICK botname".to_string())
        );
        assert_eq!(
            frames.next().await.expect("second frame"),
            Ok("PING :tmi.twitch.tv".to_string()),
            "ping and binary frames are skipped"
        );
        match frames.next().await.expect("close frame") {
            Err(TransportError::Closed(Some(reason))) => assert!(reason.contains("bye"), "{reason}"),
            other => panic!("expected a close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_socket_is_an_io_error() {
        let endpoint = serve_once(|ws| async move {
            drop(ws);
        })
        .await;

        let (mut frames, _lines) = connect(&endpoint).await.expect("connect");
        match frames.next().await {
            Some(Err(TransportError::Io(_))) | None => {}
            other => panic!("expected an io error or end of stream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr = listener.local_addr().expect("listener addr");
        drop(listener);

        let err = match connect(&format!("ws://{addr}")).await {
            Ok(_) => panic!("nothing is listening"),
            Err(e) => e,
        };
        assert!(matches!(err, IrcError::Connect { .. }), "{err}");
    }
}
