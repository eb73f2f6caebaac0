//! # WebSocket Push Ingestor
//!
//! Opens the push connection and converts every frame into a [`PushEvent`].
//! Each text (or binary) frame carries exactly one wire message as JSON. A close
//! frame, a read error, or the end of the stream produces one final
//! `PushEvent::Closed`.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;

use crate::core::message::WireMessage;
use crate::error::{FeedError, FeedResult};
use crate::ingestors::{PushChannel, PushEvent};

/// Frames buffered between the socket reader and the controller.
pub const PUSH_CHANNEL_CAPACITY: usize = 256;

/// # Connect Push
///
/// Performs the WebSocket handshake and spawns the reader task. The handshake
/// is the only part that can fail here; once this returns `Ok`, failures surface
/// as `PushEvent::Closed`.
///
/// No timeout is applied; the controller bounds the whole call.
pub async fn connect_push(url: &str) -> FeedResult<PushChannel> {
    log::info!("Connecting push channel: {}", url);
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| FeedError::TransportSetup(format!("{}: {}", url, e)))?;
    log::info!("Push channel connected.");

    let (mut write, mut read) = ws_stream.split();
    let (tx, rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let reason = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    let _ = write.close().await;
                    return;
                }
                msg = read.next() => {
                    let decoded = match msg {
                        Some(Ok(Message::Text(text))) => decode_frame(text.as_bytes()),
                        Some(Ok(Message::Binary(bin))) => decode_frame(&bin),
                        Some(Ok(Message::Close(frame))) => {
                            break frame.map(|f| f.reason.as_str().to_string()).filter(|r| !r.is_empty());
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            log::error!("Push read error: {}", e);
                            break Some(e.to_string());
                        }
                        None => break None,
                    };

                    match decoded {
                        Ok(wire) => {
                            if tx.send(PushEvent::Message(wire)).await.is_err() {
                                // Consumer went away.
                                let _ = write.close().await;
                                return;
                            }
                        }
                        Err(e) => log::warn!("Skipping undecodable push frame: {}", e),
                    }
                }
            }
        };

        log::warn!("Push channel closed{}", reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default());
        let _ = tx.send(PushEvent::Closed { reason }).await;
    });

    Ok(PushChannel::new(rx, cancel))
}

/// Decodes one push frame.
pub fn decode_frame(bytes: &[u8]) -> Result<WireMessage, serde_json::Error> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_single_message_frame() {
        let wire = decode_frame(br#"{"text":"hi","senderName":"ana","sentAt":"09:00"}"#).unwrap();
        assert_eq!(wire.id, None);
        assert_eq!(wire.sender_name, "ana");
    }

    #[test]
    fn rejects_a_batch_frame() {
        assert!(decode_frame(br#"[{"text":"hi","senderName":"ana","sentAt":"09:00"}]"#).is_err());
    }

    #[tokio::test]
    async fn refused_connection_is_a_setup_failure() {
        // Port 9 (discard) is essentially never listening on loopback.
        let err = connect_push("ws://127.0.0.1:9/feed/stream").await.unwrap_err();
        assert!(matches!(err, FeedError::TransportSetup(_)));
    }
}
