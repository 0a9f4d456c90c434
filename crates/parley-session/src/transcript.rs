//! Append-only conversation transcript.

use parley_core::{Message, MessageId, Sender};

/// Ordered list of messages with strictly increasing ids.
///
/// Messages are never edited or removed once appended.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    next_id: u64,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
        }
    }

    /// Append a message and return a copy of it.
    pub fn append(&mut self, sender: Sender, text: impl Into<String>) -> Message {
        let message = Message::new(MessageId(self.next_id), sender, text);
        self.next_id += 1;
        self.messages.push(message.clone());
        message
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_increasing_ids() {
        let mut transcript = Transcript::new();
        let a = transcript.append(Sender::User, "Hello");
        let b = transcript.append(Sender::Bot, "Hi there!");
        let c = transcript.append(Sender::User, "How are you?");

        assert_eq!(a.id, MessageId(1));
        assert!(a.id < b.id && b.id < c.id);
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.messages()[2].text, "How are you?");
    }

    #[test]
    fn test_keeps_text_verbatim() {
        let mut transcript = Transcript::new();
        transcript.append(Sender::User, "  spaced  ");
        transcript.append(Sender::Bot, "");
        assert_eq!(transcript.messages()[0].text, "  spaced  ");
        assert_eq!(transcript.messages()[1].text, "");
    }

    #[test]
    fn test_empty() {
        let transcript = Transcript::default();
        assert!(transcript.is_empty());
        assert_eq!(transcript.len(), 0);
    }
}
