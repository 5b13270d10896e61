//! Wire types for the assistant service's HTTP/JSON contract.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state::ChatMessage;

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, history: Vec<ChatMessage>) -> Self {
        Self {
            message: message.into(),
            history,
            options: None,
        }
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = Some(options);
        self
    }
}

/// Successful reply from either remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_omits_absent_options() {
        let request = ChatRequest::new(
            "What about paper?",
            vec![ChatMessage::assistant("Hello!")],
        );
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "message": "What about paper?",
                "history": [{"role": "assistant", "content": "Hello!"}]
            })
        );
    }

    #[test]
    fn test_request_includes_options_when_set() {
        let mut options = Map::new();
        options.insert("locale".to_string(), json!("de"));
        let request = ChatRequest::new("Hi", Vec::new()).with_options(options);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["options"], json!({"locale": "de"}));
    }

    #[test]
    fn test_response_ignores_extra_fields() {
        let resp: ChatResponse =
            serde_json::from_str(r#"{"response":"Rinse it.","model":"mock"}"#).unwrap();
        assert_eq!(resp.response, "Rinse it.");
    }

    #[test]
    fn test_response_without_field_is_malformed() {
        let resp: Result<ChatResponse, _> = serde_json::from_str(r#"{"detail":"oops"}"#);
        assert!(resp.is_err());
    }
}
