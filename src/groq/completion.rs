use crate::groq::message::ChatMessage;
use crate::groq::request_config::RequestConfig;
use crate::groq::role::Role;
use crate::nice_display::NiceDisplay;

/// A validated chat-completion request: the system prompt from the config
/// (if any) followed by the caller's messages.
#[derive(Debug, Clone)]
pub struct Completion {
    messages: Vec<ChatMessage>,
    config: RequestConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvalidRequest {
    EmptyModel,
    ZeroMaxTokens,
    TemperatureOutOfRange(f32),
    TopPOutOfRange(f32),
    NoMessages,
    SystemNotFirst { index: usize },
}

impl NiceDisplay for InvalidRequest {
    fn message(&self) -> String {
        match self {
            InvalidRequest::EmptyModel => "no model was given".to_string(),
            InvalidRequest::ZeroMaxTokens => "max_tokens must be greater than 0".to_string(),
            InvalidRequest::TemperatureOutOfRange(value) => {
                format!("temperature must be between 0.0 and 2.0, got {}", value)
            }
            InvalidRequest::TopPOutOfRange(value) => {
                format!("top_p must be above 0.0 and at most 1.0, got {}", value)
            }
            InvalidRequest::NoMessages => "the conversation has no messages".to_string(),
            InvalidRequest::SystemNotFirst { index } => format!(
                "malformed message sequence, system message at position {} must be first",
                index
            ),
        }
    }
}

impl Completion {
    pub fn new(messages: Vec<ChatMessage>, config: RequestConfig) -> Result<Self, InvalidRequest> {
        if config.model.trim().is_empty() {
            return Err(InvalidRequest::EmptyModel);
        }
        if config.max_tokens == 0 {
            return Err(InvalidRequest::ZeroMaxTokens);
        }
        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(InvalidRequest::TemperatureOutOfRange(config.temperature));
        }
        if !(config.top_p > 0.0 && config.top_p <= 1.0) {
            return Err(InvalidRequest::TopPOutOfRange(config.top_p));
        }

        let mut all = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = &config.system_prompt {
            all.push(ChatMessage::system(system));
        }
        all.extend(messages);

        if all.iter().all(|msg| msg.role() == &Role::System) {
            return Err(InvalidRequest::NoMessages);
        }
        if let Some(index) = all
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, msg)| msg.role() == &Role::System)
            .map(|(index, _)| index)
        {
            return Err(InvalidRequest::SystemNotFirst { index });
        }

        Ok(Self {
            messages: all,
            config,
        })
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    pub fn to_json(&self, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": self.messages.iter().map(|msg| {
                serde_json::json!({
                    "role": msg.role().to_str(),
                    "content": msg.content(),
                })
            }).collect::<Vec<_>>(),
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "top_p": self.config.top_p,
            "stream": stream,
        })
    }

    /// Identifies a request for the response cache. Floating point settings
    /// are rounded to two places.
    pub fn cache_key(&self) -> String {
        serde_json::json!({
            "model": self.config.model,
            "messages": self.messages,
            "temperature": round2(self.config.temperature),
            "top_p": round2(self.config.top_p),
            "max_tokens": self.config.max_tokens,
        })
        .to_string()
    }
}

fn round2(value: f32) -> i64 {
    (value as f64 * 100.0).round() as i64
}

pub struct Response {
    json: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageError {
    MissingField(String),
    NoChoices,
    NotString { what: String },
}

impl NiceDisplay for MessageError {
    fn message(&self) -> String {
        match self {
            MessageError::MissingField(field) => format!("Missing field: {}", field),
            MessageError::NoChoices => "No choices in response".to_string(),
            MessageError::NotString { what } => format!("Field is not a string: {}", what),
        }
    }
}

impl Response {
    pub fn new(json: serde_json::Value) -> Self {
        Self { json }
    }

    pub fn as_message(&self) -> Result<String, MessageError> {
        self.json
            .get("choices")
            .ok_or_else(|| MessageError::MissingField("choices".to_string()))?
            .get(0)
            .ok_or(MessageError::NoChoices)?
            .get("message")
            .ok_or_else(|| MessageError::MissingField("message".to_string()))?
            .get("content")
            .ok_or_else(|| MessageError::MissingField("content".to_string()))?
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| MessageError::NotString {
                what: "content".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groq::message::conversation;

    #[test]
    fn body_contains_every_request_field() {
        let config = RequestConfig::default()
            .with_max_tokens(16)
            .with_system_prompt(Some("Be brief.".to_string()));
        let completion = Completion::new(conversation(None, "Hi"), config).unwrap();
        let body = completion.to_json(true);

        assert_eq!(body["model"], "llama-3.1-8b-instant");
        assert_eq!(body["max_tokens"], 16);
        assert_eq!(body["stream"], true);
        assert_eq!(body["top_p"], 1.0);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hi");
    }

    #[test]
    fn zero_max_tokens_is_rejected() {
        let config = RequestConfig::default().with_max_tokens(0);
        let err = Completion::new(conversation(None, "Hi"), config).unwrap_err();
        assert_eq!(err, InvalidRequest::ZeroMaxTokens);
    }

    #[test]
    fn out_of_range_sampling_is_rejected() {
        let hot = RequestConfig::default().with_temperature(2.5);
        assert!(matches!(
            Completion::new(conversation(None, "Hi"), hot),
            Err(InvalidRequest::TemperatureOutOfRange(_))
        ));

        let mut no_top_p = RequestConfig::default();
        no_top_p.top_p = 0.0;
        assert!(matches!(
            Completion::new(conversation(None, "Hi"), no_top_p),
            Err(InvalidRequest::TopPOutOfRange(_))
        ));
    }

    #[test]
    fn message_sequence_must_be_well_formed() {
        let config = RequestConfig::default();
        assert_eq!(
            Completion::new(vec![], config.clone()).unwrap_err(),
            InvalidRequest::NoMessages
        );
        assert_eq!(
            Completion::new(vec![ChatMessage::system("only rules")], config.clone()).unwrap_err(),
            InvalidRequest::NoMessages
        );

        let late_system = vec![ChatMessage::user("Hi"), ChatMessage::system("rules")];
        assert_eq!(
            Completion::new(late_system, config.clone()).unwrap_err(),
            InvalidRequest::SystemNotFirst { index: 1 }
        );

        let doubled = RequestConfig::default().with_system_prompt(Some("rules".to_string()));
        assert_eq!(
            Completion::new(conversation(Some("more rules"), "Hi"), doubled).unwrap_err(),
            InvalidRequest::SystemNotFirst { index: 1 }
        );
    }

    #[test]
    fn cache_key_ignores_tiny_float_noise() {
        let a = Completion::new(
            conversation(None, "Hi"),
            RequestConfig::default().with_temperature(0.7),
        )
        .unwrap();
        let b = Completion::new(
            conversation(None, "Hi"),
            RequestConfig::default().with_temperature(0.7001),
        )
        .unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn response_content_is_extracted_and_trimmed() {
        let response = Response::new(serde_json::json!({
            "choices": [{"message": {"content": "  Hello world\n"}}]
        }));
        assert_eq!(response.as_message().unwrap(), "Hello world");

        let empty = Response::new(serde_json::json!({"choices": []}));
        assert_eq!(empty.as_message().unwrap_err(), MessageError::NoChoices);
    }
}
