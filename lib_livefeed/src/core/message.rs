//! # Feed Messages
//!
//! The wire shape delivered by both transports and its normalized in-memory form.
//!
//! Identity is the only thing the pipeline cares about. A server-provided id is
//! authoritative; when the server omits it, an id is derived from
//! `sentAt`, `senderName` and a prefix of `text`. The derived id can collide for
//! two distinct messages sharing all three, so it is a fallback only.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Number of leading characters of `text` folded into a synthesized id.
pub const ID_PREFIX_CHARS: usize = 32;

/// Anything stored in a [`BoundedLog`](super::bounded_log::BoundedLog) must expose a stable key.
pub trait Keyed {
    /// The identity used for de-duplication.
    fn key(&self) -> &str;
}

/// # Wire Message
///
/// One message as served by `GET /feed/recent` and by each push frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Optional server id. Numeric ids are accepted and kept in their decimal form.
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
    pub sender_name: String,
    /// Opaque, server-formatted timestamp. Never parsed.
    pub sent_at: String,
}

/// # Feed Message
///
/// A normalized message with a guaranteed id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedMessage {
    pub id: String,
    pub sender_name: String,
    pub text: String,
    pub sent_at: String,
    /// `true` when `id` was derived from content rather than supplied by the server.
    pub synthetic_id: bool,
}

impl FeedMessage {
    /// Builds a message with an explicit id.
    pub fn new(
        id: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
        sent_at: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender_name: sender_name.into(),
            text: text.into(),
            sent_at: sent_at.into(),
            synthetic_id: false,
        }
    }
}

impl From<WireMessage> for FeedMessage {
    fn from(wire: WireMessage) -> Self {
        match wire.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => Self {
                id,
                sender_name: wire.sender_name,
                text: wire.text,
                sent_at: wire.sent_at,
                synthetic_id: false,
            },
            None => Self {
                id: synthesize_id(&wire.sent_at, &wire.sender_name, &wire.text),
                sender_name: wire.sender_name,
                text: wire.text,
                sent_at: wire.sent_at,
                synthetic_id: true,
            },
        }
    }
}

impl Keyed for FeedMessage {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Derives a content id of the form `"{sent_at}|{sender}|{first 32 chars of text}"`.
pub fn synthesize_id(sent_at: &str, sender_name: &str, text: &str) -> String {
    let prefix: String = text.chars().take(ID_PREFIX_CHARS).collect();
    format!("{}|{}|{}", sent_at, sender_name, prefix)
}

/// Decodes a batch of wire messages (the `GET /feed/recent` body).
pub fn decode_batch(body: &str) -> Result<Vec<WireMessage>, serde_json::Error> {
    serde_json::from_str(body)
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_id_is_kept() {
        let wire: WireMessage = serde_json::from_str(
            r#"{"id":"m-1","text":"hello","senderName":"ana","sentAt":"10:01"}"#,
        )
        .unwrap();
        let msg = FeedMessage::from(wire);
        assert_eq!(msg.id, "m-1");
        assert!(!msg.synthetic_id);
    }

    #[test]
    fn numeric_id_is_stringified() {
        let wire: WireMessage = serde_json::from_str(
            r#"{"id":42,"text":"hi","senderName":"bo","sentAt":"10:02"}"#,
        )
        .unwrap();
        assert_eq!(wire.id.as_deref(), Some("42"));
    }

    #[test]
    fn missing_null_or_blank_id_is_synthesized() {
        for raw in [
            r#"{"text":"hello","senderName":"ana","sentAt":"10:01"}"#,
            r#"{"id":null,"text":"hello","senderName":"ana","sentAt":"10:01"}"#,
            r#"{"id":"  ","text":"hello","senderName":"ana","sentAt":"10:01"}"#,
        ] {
            let msg = FeedMessage::from(serde_json::from_str::<WireMessage>(raw).unwrap());
            assert_eq!(msg.id, "10:01|ana|hello");
            assert!(msg.synthetic_id);
        }
    }

    #[test]
    fn synthesized_id_uses_a_character_prefix() {
        let long = "é".repeat(40);
        let id = synthesize_id("t", "s", &long);
        assert_eq!(id, format!("t|s|{}", "é".repeat(ID_PREFIX_CHARS)));

        // Messages differing only after the prefix collide.
        let a = format!("{}A", "x".repeat(ID_PREFIX_CHARS));
        let b = format!("{}B", "x".repeat(ID_PREFIX_CHARS));
        assert_eq!(synthesize_id("t", "s", &a), synthesize_id("t", "s", &b));
    }

    #[test]
    fn batch_decodes_in_order() {
        let batch = decode_batch(
            r#"[{"id":"b","text":"2","senderName":"x","sentAt":"2"},
                {"id":"a","text":"1","senderName":"x","sentAt":"1"}]"#,
        )
        .unwrap();
        let ids: Vec<_> = batch.iter().map(|m| m.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
