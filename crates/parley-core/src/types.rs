use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// UTC timestamp used throughout Parley.
pub type Timestamp = DateTime<Utc>;

// =============================================================================
// Enums
// =============================================================================

/// Who authored a message in the transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// Typed or dictated input from the person using the front-end.
    User,
    /// A reply, correction, or apology produced on behalf of the model.
    Bot,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Bot => write!(f, "bot"),
        }
    }
}

// =============================================================================
// Message
// =============================================================================

/// Identifier of a transcript message.
///
/// Allocated from a strictly increasing counter, so two messages created in
/// the same clock tick still get distinct, ordered ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One turn in the conversation. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(id: MessageId, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            sender,
            created_at: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }
}

// =============================================================================
// Audio
// =============================================================================

/// MIME type of payloads produced by the recorder.
pub const WAV_CONTENT_TYPE: &str = "audio/wav";

/// An encoded audio clip exchanged with the inference service.
///
/// Recordings are finalized into one payload before upload; synthesized
/// speech comes back as one payload as well.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioPayload {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl AudioPayload {
    pub fn new(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            data,
            content_type: content_type.into(),
        }
    }

    /// Wrap already-encoded WAV bytes.
    pub fn wav(data: Vec<u8>) -> Self {
        Self::new(data, WAV_CONTENT_TYPE)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for AudioPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioPayload")
            .field("content_type", &self.content_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_display() {
        assert_eq!(Sender::User.to_string(), "user");
        assert_eq!(Sender::Bot.to_string(), "bot");
    }

    #[test]
    fn test_sender_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Sender::User).unwrap(), "\"user\"");
        let bot: Sender = serde_json::from_str("\"bot\"").unwrap();
        assert_eq!(bot, Sender::Bot);
    }

    #[test]
    fn test_message_id_ordering() {
        assert!(MessageId(1) < MessageId(2));
        assert_eq!(MessageId(7).to_string(), "7");
    }

    #[test]
    fn test_message_new() {
        let msg = Message::new(MessageId(3), Sender::User, "Merhaba");
        assert_eq!(msg.id, MessageId(3));
        assert_eq!(msg.text, "Merhaba");
        assert!(msg.is_user());
    }

    #[test]
    fn test_message_json_shape() {
        let msg = Message::new(MessageId(9), Sender::Bot, "Hi there!");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["id"], 9);
        assert_eq!(json["sender"], "bot");
        assert_eq!(json["text"], "Hi there!");
        assert!(json["created_at"].is_string());
    }

    #[test]
    fn test_audio_payload_wav() {
        let payload = AudioPayload::wav(vec![1, 2, 3]);
        assert_eq!(payload.content_type, "audio/wav");
        assert_eq!(payload.len(), 3);
        assert!(!payload.is_empty());
        assert!(AudioPayload::new(Vec::new(), "audio/flac").is_empty());
    }

    #[test]
    fn test_audio_payload_debug_hides_bytes() {
        let payload = AudioPayload::wav(vec![0u8; 4096]);
        let dbg = format!("{:?}", payload);
        assert!(dbg.contains("4096"));
        assert!(!dbg.contains("0, 0, 0"));
    }
}
