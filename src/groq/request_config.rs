use crate::groq::model::Model;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 700;

#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub stream: bool,
    pub system_prompt: Option<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            model: Model::default().to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: 1.0,
            stream: true,
            system_prompt: None,
        }
    }
}

impl RequestConfig {
    pub fn new(model: Model) -> Self {
        Self {
            model: model.to_string(),
            ..Self::default()
        }
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt.filter(|prompt| !prompt.trim().is_empty());
        self
    }
}
