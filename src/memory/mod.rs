//! Conversation memory
//!
//! One ordered, append-only message list per session, shared by the
//! supervisor and every sub-agent it delegates to.

use crate::models::{Message, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod store;

pub use store::{ConversationStore, InMemoryConversationStore, PostgresConversationStore};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub session_id: Uuid,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            messages: Vec::new(),
        }
    }

    pub fn from_messages(session_id: Uuid, messages: Vec<Message>) -> Self {
        Self {
            session_id,
            messages,
        }
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

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// Messages from index `from` onwards
    pub fn since(&self, from: usize) -> &[Message] {
        &self.messages[from.min(self.messages.len())..]
    }
}
