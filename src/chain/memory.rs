use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StormFlowError};
use crate::llm::types::{ChatMessage, Role};

pub const MEMORY_KEY: &str = "chat_history";

/// 外部传入的历史记录条目，形如 `{"role": "user", "content": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn to_message(&self) -> Result<ChatMessage> {
        let role = match self.role.to_ascii_lowercase().as_str() {
            "user" | "human" => Role::User,
            "assistant" | "ai" => Role::Assistant,
            "system" => Role::System,
            other => {
                return Err(StormFlowError::Parse(format!(
                    "unknown history role: {other}"
                )))
            }
        };
        Ok(ChatMessage::new(role, self.content.clone()))
    }
}

pub fn history_messages(history: &[HistoryEntry]) -> Result<Vec<ChatMessage>> {
    history.iter().map(HistoryEntry::to_message).collect()
}

/// 缓冲式对话记忆：完整保存每轮问答
#[derive(Debug, Default)]
pub struct ConversationMemory {
    messages: RwLock<Vec<ChatMessage>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory_key(&self) -> &'static str {
        MEMORY_KEY
    }

    pub fn save_context(&self, input: &str, output: &str) {
        let mut messages = self.messages.write();
        messages.push(ChatMessage::user(input));
        messages.push(ChatMessage::assistant(output));
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    pub fn clear(&self) {
        self.messages.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_keeps_turns_in_order() {
        let memory = ConversationMemory::new();
        memory.save_context("hi", "hello");
        memory.save_context("how are you", "fine");

        let messages = memory.messages();
        assert_eq!(memory.memory_key(), "chat_history");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[3].text(), "fine");

        memory.clear();
        assert!(memory.is_empty());
    }

    #[test]
    fn history_entries_convert_roles() {
        let history = vec![
            HistoryEntry::new("user", "q"),
            HistoryEntry::new("Assistant", "a"),
        ];
        let messages = history_messages(&history).unwrap();
        assert_eq!(messages[1].role, Role::Assistant);
        assert!(HistoryEntry::new("tool", "x").to_message().is_err());
    }
}
