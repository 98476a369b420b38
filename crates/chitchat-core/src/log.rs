//! Ordered chat history with JSON persistence.
//!
//! The log is mirrored to the key-value store after every mutation. The
//! stored form is a JSON array of flat camelCase messages, the same shape the
//! wire uses, so file payloads survive as data URLs.

use chitchat_proto::{Message, MessageId, Reaction};

use crate::error::LogError;

/// Insertion-ordered message history.
///
/// Message ids are unique within a log; a second message with a known id is
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if the log holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages in insertion order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Iterate messages in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Look up a message by id.
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Append a message. Returns false if its id is already present.
    pub fn push(&mut self, message: Message) -> bool {
        if self.get(&message.id).is_some() {
            tracing::warn!(message_id = %message.id, "duplicate message id ignored");
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Append a reaction to an existing message. Returns false if unknown.
    pub fn add_reaction(&mut self, id: &MessageId, reaction: Reaction) -> bool {
        match self.messages.iter_mut().find(|m| &m.id == id) {
            Some(message) => {
                message.reactions.push(reaction);
                true
            },
            None => false,
        }
    }

    /// Set the read flag of an existing message.
    ///
    /// Returns true only if the flag changed.
    pub fn mark_read(&mut self, id: &MessageId) -> bool {
        match self.messages.iter_mut().find(|m| &m.id == id) {
            Some(message) if !message.is_read() => {
                message.read = Some(true);
                true
            },
            _ => false,
        }
    }

    /// Drop all messages.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Messages whose text or file name contains `query`, ignoring case.
    ///
    /// A blank query matches everything.
    pub fn search(&self, query: &str) -> Vec<&Message> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.messages.iter().collect();
        }
        self.messages.iter().filter(|m| m.matches(&needle)).collect()
    }

    /// Serialize to the persisted JSON array.
    ///
    /// # Errors
    ///
    /// - `LogError::Encode` if serialization fails
    pub fn to_json(&self) -> Result<String, LogError> {
        serde_json::to_string(&self.messages).map_err(|e| LogError::Encode(e.to_string()))
    }

    /// Parse a persisted JSON array.
    ///
    /// Entries that fail validation are skipped with a warning so one bad
    /// record does not discard the rest of the history.
    ///
    /// # Errors
    ///
    /// - `LogError::Corrupt` if the input is not a JSON array
    pub fn from_json(json: &str) -> Result<Self, LogError> {
        let entries: Vec<serde_json::Value> =
            serde_json::from_str(json).map_err(|e| LogError::Corrupt(e.to_string()))?;

        let mut log = Self::new();
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<Message>(entry) {
                Ok(message) => {
                    log.push(message);
                },
                Err(error) => {
                    tracing::warn!(index, %error, "skipping invalid stored message");
                },
            }
        }
        Ok(log)
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use chitchat_proto::{FilePayload, MessageBody, PeerId};

    use super::*;

    fn text(id: &str, content: &str) -> Message {
        Message::new(
            MessageId::from(id),
            PeerId::from("alice"),
            1_700_000_000_000,
            MessageBody::Text { content: content.to_string() },
        )
    }

    #[test]
    fn push_keeps_insertion_order() {
        let mut log = MessageLog::new();
        assert!(log.push(text("b", "second id, first in")));
        assert!(log.push(text("a", "first id, second in")));

        let ids: Vec<_> = log.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut log = MessageLog::new();
        assert!(log.push(text("a", "one")));
        assert!(!log.push(text("a", "two")));
        assert_eq!(log.len(), 1);
        assert_eq!(log.messages()[0].body.content(), "one");
    }

    #[test]
    fn reactions_append_without_dedup() {
        let mut log = MessageLog::new();
        log.push(text("a", "hi"));

        let id = MessageId::from("a");
        assert!(log.add_reaction(&id, Reaction::new("👍", PeerId::from("bob"))));
        assert!(log.add_reaction(&id, Reaction::new("👍", PeerId::from("bob"))));

        let message = log.get(&id).unwrap();
        assert_eq!(message.reactions.len(), 2);
        assert_eq!(message.reaction_counts().get("👍"), Some(&2));
    }

    #[test]
    fn reaction_for_unknown_id_is_noop() {
        let mut log = MessageLog::new();
        log.push(text("a", "hi"));
        let before = log.clone();

        assert!(!log.add_reaction(&MessageId::from("zzz"), Reaction::new("🎉", PeerId::from("bob"))));
        assert_eq!(log, before);
    }

    #[test]
    fn mark_read_reports_change_once() {
        let mut log = MessageLog::new();
        log.push(text("a", "hi"));

        let id = MessageId::from("a");
        assert!(log.mark_read(&id));
        assert!(!log.mark_read(&id));
        assert!(log.get(&id).unwrap().is_read());
        assert!(!log.mark_read(&MessageId::from("missing")));
    }

    #[test]
    fn search_is_case_insensitive_and_covers_file_names() {
        let mut log = MessageLog::new();
        log.push(text("a", "Hello World"));
        log.push(text("b", "unrelated"));
        log.push(Message::new(
            MessageId::from("c"),
            PeerId::from("bob"),
            1,
            MessageBody::File(FilePayload::encode("WORLD-map.png", "image/png", &[1, 2, 3])),
        ));

        let hits: Vec<_> = log.search("world").into_iter().map(|m| m.id.as_str()).collect();
        assert_eq!(hits, ["a", "c"]);
        assert_eq!(log.search("   ").len(), 3);
    }

    #[test]
    fn clear_empties_log() {
        let mut log = MessageLog::new();
        log.push(text("a", "hi"));
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn corrupt_json_reported() {
        assert!(matches!(MessageLog::from_json("{not json"), Err(LogError::Corrupt(_))));
        assert!(matches!(MessageLog::from_json("{}"), Err(LogError::Corrupt(_))));
    }

    #[test]
    fn invalid_entries_skipped() {
        let json = r#"[
            {"id":"a","type":"text","content":"ok","sender":"alice","timestamp":1},
            {"id":"b","type":"file","content":"data:;base64,","sender":"alice","timestamp":2},
            {"id":"c","type":"code","content":"x = 1","sender":"bob","timestamp":3}
        ]"#;

        let log = MessageLog::from_json(json).unwrap();
        let ids: Vec<_> = log.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(
            log.messages()[1].body,
            MessageBody::Code { content: "x = 1".to_string(), language: "javascript".to_string() }
        );
    }

    #[test]
    fn empty_array_loads_empty_log() {
        assert!(MessageLog::from_json("[]").unwrap().is_empty());
    }

    #[test]
    fn persisted_shape() {
        let mut log = MessageLog::new();
        log.push(text("m1", "hello"));
        log.push(Message::new(
            MessageId::from("m2"),
            PeerId::from("bob"),
            1_700_000_000_500,
            MessageBody::Code { content: "fn main() {}".to_string(), language: "rust".to_string() },
        ));
        log.mark_read(&MessageId::from("m1"));
        log.add_reaction(&MessageId::from("m2"), Reaction::new("🔥", PeerId::from("alice")));

        insta::assert_json_snapshot!(log.messages(), @r#"
        [
          {
            "id": "m1",
            "type": "text",
            "content": "hello",
            "sender": "alice",
            "timestamp": 1700000000000,
            "read": true
          },
          {
            "id": "m2",
            "type": "code",
            "content": "fn main() {}",
            "sender": "bob",
            "timestamp": 1700000000500,
            "language": "rust",
            "reactions": [
              {
                "emoji": "🔥",
                "user": "alice"
              }
            ]
          }
        ]
        "#);
    }
}
