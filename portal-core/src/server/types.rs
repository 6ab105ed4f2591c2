//! Wire types for the web API.

use crate::provider::Message;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/query`. The client owns the conversation and sends all
/// of it with every request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub history: Option<Vec<HistoryTurn>>,
}

/// One conversation turn in the Gemini chat shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<HistoryPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPart {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
}

impl HistoryTurn {
    /// Maps `user` to a user message and `model`/`assistant` to an assistant
    /// message. Returns `None` for any other role.
    pub fn to_message(&self) -> Option<Message> {
        let text = self
            .parts
            .iter()
            .map(|part| part.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        match self.role.as_str() {
            "user" => Some(Message::user(text)),
            "model" | "assistant" => Some(Message::assistant(text)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_are_joined_with_newlines() {
        let turn: HistoryTurn =
            serde_json::from_str(r#"{"role": "user", "parts": [{"text": "Hello"}, {"text": "HPG?"}]}"#).unwrap();
        assert_eq!(turn.to_message(), Some(Message::user("Hello\nHPG?")));
    }

    #[test]
    fn model_and_assistant_roles_map_to_assistant() {
        for role in ["model", "assistant"] {
            let turn = HistoryTurn {
                role: role.to_string(),
                parts: vec![HistoryPart { text: "Hi".to_string() }],
            };
            assert_eq!(turn.to_message(), Some(Message::assistant("Hi")));
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        let turn = HistoryTurn {
            role: "system".to_string(),
            parts: vec![],
        };
        assert_eq!(turn.to_message(), None);
    }

    #[test]
    fn missing_history_defaults_to_empty() {
        let request: QueryRequest = serde_json::from_str("{}").unwrap();
        assert!(request.history.is_none());

        let request: QueryRequest = serde_json::from_str(r#"{"history": null}"#).unwrap();
        assert!(request.history.is_none());
    }
}
