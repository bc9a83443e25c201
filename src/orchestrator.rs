use crate::fetch::{self, fetch_clean_text};
use crate::groq::message::conversation;
use crate::groq::transport::Transport;
use crate::groq::{ClientError, Model, RequestConfig, ResilientClient};
use crate::history::{HistoryError, HistoryRecord, HistoryStore};
use crate::nice_display::NiceDisplay;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

const MEMORY_TURNS: usize = 3;
const SUMMARY_SYSTEM_PROMPT: &str = "Summarize clearly in Markdown.";
const SUMMARY_QUESTION_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Preset {
    #[default]
    Standard,
    Concise,
    Teacher,
    Developer,
    Researcher,
}

impl Preset {
    pub fn system_prompt(&self) -> Option<&'static str> {
        match self {
            Preset::Standard => None,
            Preset::Concise => Some("Answer concisely with bullet points when helpful."),
            Preset::Teacher => Some(
                "Explain like I'm new to the topic, with analogies and step-by-step reasoning.",
            ),
            Preset::Developer => {
                Some("Use code examples where relevant and be explicit about trade-offs.")
            }
            Preset::Researcher => Some(
                "Provide structured analysis with assumptions, evidence, and limitations.",
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AskOptions {
    pub model: Model,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub system_prompt: Option<String>,
    pub preset: Preset,
    pub use_memory: bool,
}

impl Default for AskOptions {
    fn default() -> Self {
        let config = RequestConfig::default();
        Self {
            model: Model::default(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream: config.stream,
            system_prompt: None,
            preset: Preset::default(),
            use_memory: false,
        }
    }
}

impl AskOptions {
    /// An explicit system prompt wins over the preset.
    fn resolved_system_prompt(&self) -> Option<String> {
        self.system_prompt
            .clone()
            .filter(|prompt| !prompt.trim().is_empty())
            .or_else(|| self.preset.system_prompt().map(|prompt| prompt.to_string()))
    }

    fn request_config(&self, system_prompt: Option<String>) -> RequestConfig {
        RequestConfig::new(self.model.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .streaming(self.stream)
            .with_system_prompt(system_prompt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub estimated_tokens: usize,
    pub elapsed: Duration,
}

impl Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "~ tokens (prompt+completion): {} | time: {:.1}s",
            self.estimated_tokens,
            self.elapsed.as_secs_f64()
        )
    }
}

#[derive(Debug)]
pub enum Outcome {
    Completed { answer: String, stats: Stats },
    /// Nothing is written to history for a cancelled exchange.
    Cancelled { partial: String },
}

#[derive(Debug)]
pub enum Error {
    EmptyInput { what: &'static str },
    Client(ClientError),
    History(HistoryError),
}

impl NiceDisplay for Error {
    fn message(&self) -> String {
        match self {
            Error::EmptyInput { what } => format!("Please enter a valid {}", what),
            Error::Client(err) => err.message(),
            Error::History(err) => format!(
                "The answer was shown but not saved to history\n{}",
                err.message()
            ),
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            Error::EmptyInput { .. } => Some("The input was blank".to_string()),
            Error::Client(err) => err.hint(),
            Error::History(err) => err.hint(),
        }
    }
}

/// Rough heuristic: one token is about four characters.
pub fn estimate_tokens(text: &str) -> usize {
    ((text.chars().count() as f64) / 4.0).round().max(1.0) as usize
}

fn with_memory(query: &str, recent: &[HistoryRecord]) -> String {
    let turns: Vec<&HistoryRecord> = recent
        .iter()
        .filter(|record| !record.question.trim().is_empty() && !record.answer.trim().is_empty())
        .collect();

    if turns.is_empty() {
        return query.to_string();
    }

    let mut lines = vec!["Context from earlier in this conversation:".to_string()];
    for record in turns {
        lines.push(format!("Q: {}", record.question.trim()));
        lines.push(format!("A: {}", record.answer.trim()));
    }
    lines.push(String::new());
    lines.push(format!("Current user request: {}", query));
    lines.join("\n")
}

fn summary_prompt(source_text: &str) -> String {
    format!(
        "You are a world-class summarizer. Produce a concise, faithful summary with:\n\
         - title\n\
         - key points\n\
         - important quotes\n\
         - a short TL;DR.\n\n\
         Content to summarize (may be HTML-extracted):\n\n{}",
        source_text
    )
}

fn unreachable_url_notice(url: &str) -> String {
    format!(
        "[Could not fetch URL content, summarizing the URL contextually instead]\nURL: {}",
        url.trim()
    )
}

fn summary_question(content: &str) -> String {
    let head: String = content.chars().take(SUMMARY_QUESTION_CHARS).collect();
    format!("{}...", head)
}

pub struct Orchestrator<T: Transport> {
    client: ResilientClient<T>,
    history: HistoryStore,
    http: reqwest::Client,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(client: ResilientClient<T>, history: HistoryStore) -> Self {
        Self {
            client,
            history,
            http: reqwest::Client::new(),
        }
    }

    #[cfg(test)]
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub async fn ask<F, C>(
        &mut self,
        query: &str,
        options: &AskOptions,
        on_chunk: F,
        cancel: C,
    ) -> Result<Outcome, Error>
    where
        F: FnMut(&str),
        C: Future<Output = ()>,
    {
        if query.trim().is_empty() {
            return Err(Error::EmptyInput {
                what: "question or topic",
            });
        }

        let prompt = if options.use_memory {
            with_memory(query, &self.history.recent(MEMORY_TURNS))
        } else {
            query.to_string()
        };

        self.exchange(
            query.to_string(),
            prompt,
            options.resolved_system_prompt(),
            options,
            on_chunk,
            cancel,
        )
        .await
    }

    pub async fn summarize<F, C>(
        &mut self,
        content: &str,
        options: &AskOptions,
        on_chunk: F,
        cancel: C,
    ) -> Result<Outcome, Error>
    where
        F: FnMut(&str),
        C: Future<Output = ()>,
    {
        if content.trim().is_empty() {
            return Err(Error::EmptyInput {
                what: "URL or text to summarize",
            });
        }

        let source_text = if fetch::is_url(content) {
            match fetch_clean_text(&self.http, content).await {
                Ok(text) => text,
                Err(err) => {
                    warn!(url = %err.url, reason = %err.reason, "falling back to summarizing the bare URL");
                    unreachable_url_notice(content)
                }
            }
        } else {
            content.to_string()
        };

        let system_prompt = options
            .resolved_system_prompt()
            .or_else(|| Some(SUMMARY_SYSTEM_PROMPT.to_string()));

        self.exchange(
            summary_question(content),
            summary_prompt(&source_text),
            system_prompt,
            options,
            on_chunk,
            cancel,
        )
        .await
    }

    async fn exchange<F, C>(
        &mut self,
        question: String,
        prompt: String,
        system_prompt: Option<String>,
        options: &AskOptions,
        mut on_chunk: F,
        cancel: C,
    ) -> Result<Outcome, Error>
    where
        F: FnMut(&str),
        C: Future<Output = ()>,
    {
        let start = Instant::now();
        let prompt_tokens =
            estimate_tokens(&format!("{}{}", prompt, system_prompt.as_deref().unwrap_or("")));
        let config = options.request_config(system_prompt);
        let model = config.model.clone();

        let mut partial = String::new();
        let client = &self.client;
        // cancel covers the whole request, backoff sleeps included
        let request = async {
            let reply = client.send(conversation(None, &prompt), config).await?;
            let answer = reply
                .for_each_chunk(|chunk| {
                    partial.push_str(chunk);
                    on_chunk(chunk);
                })
                .await?;
            Ok::<_, ClientError>(answer)
        };

        let finished = tokio::select! {
            result = request => Some(result),
            _ = cancel => None,
        };

        let answer = match finished {
            None => {
                info!(chars = partial.len(), "exchange cancelled, not saved to history");
                return Ok(Outcome::Cancelled { partial });
            }
            Some(result) => result.map_err(Error::Client)?,
        };

        let stats = Stats {
            estimated_tokens: prompt_tokens + estimate_tokens(&answer),
            elapsed: start.elapsed(),
        };

        self.history
            .append(HistoryRecord::new(&question, &answer, &model))
            .map_err(Error::History)?;
        info!(model = %model, %stats, "exchange saved");

        Ok(Outcome::Completed { answer, stats })
    }
}
