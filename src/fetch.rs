use crate::nice_display::NiceDisplay;
use scraper::Html;
use std::time::Duration;
use tracing::debug;

pub const MAX_CHARS: usize = 6000;
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
const HIDDEN_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

#[derive(Debug)]
pub struct FetchError {
    pub url: String,
    pub reason: String,
}

impl NiceDisplay for FetchError {
    fn message(&self) -> String {
        format!("I could not fetch {}: {}", self.url, self.reason)
    }

    fn hint(&self) -> Option<String> {
        Some("Check the URL in a browser, or paste the page text instead".to_string())
    }
}

pub fn is_url(text: &str) -> bool {
    let text = text.trim().to_ascii_lowercase();
    text.starts_with("http://") || text.starts_with("https://")
}

pub async fn fetch_clean_text(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let fail = |reason: String| FetchError {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url.trim())
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|err| fail(err.to_string()))?
        .error_for_status()
        .map_err(|err| fail(err.to_string()))?;

    let html = response.text().await.map_err(|err| fail(err.to_string()))?;
    debug!(url, bytes = html.len(), "fetched page");

    Ok(clean_html(&html, MAX_CHARS))
}

/// Visible text of a page, one trimmed line per text run, blank lines dropped.
pub fn clean_html(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|element| HIDDEN_ELEMENTS.contains(&element.name()))
                .unwrap_or(false)
        });
        if !hidden {
            raw.push_str(text);
            raw.push('\n');
        }
    }

    let cleaned = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    cleaned.chars().take(max_chars).collect()
}
