use crate::groq::role::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    role: Role,
    content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }

    pub fn system(content: &str) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: &str) -> Self {
        Self::new(Role::User, content)
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Conversation in chronological order, system message first if present.
pub fn conversation(system_prompt: Option<&str>, user_prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(user_prompt));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_role_in_lowercase() {
        let json = serde_json::to_value(ChatMessage::new(Role::Assistant, "hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn conversation_puts_system_first_and_skips_blank_system() {
        let with_system = conversation(Some("Be brief."), "Why?");
        assert_eq!(with_system[0].role(), &Role::System);
        assert_eq!(with_system[1].content(), "Why?");

        let without = conversation(Some("  "), "Why?");
        assert_eq!(without.len(), 1);
        assert_eq!(without[0].role(), &Role::User);
    }
}
