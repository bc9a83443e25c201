use crate::groq_key::{self, GroqKey};
use crate::nice_display::NiceDisplay;
use std::env::VarError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_HISTORY_PATH: &str = "logs/history.json";
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_MIN_INTERVAL_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct Config {
    pub groq_key: GroqKey,
    pub base_url: String,
    pub history_path: PathBuf,
    pub max_retries: u32,
    pub min_interval: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingKey,
    ReadingVar { name: String, err: dotenv::Error },
    NotANumber { name: String, value: String },
}

impl NiceDisplay for ConfigError {
    fn message(&self) -> String {
        match self {
            ConfigError::MissingKey => format!("{} is not set", groq_key::ENV_VAR),
            ConfigError::ReadingVar { name, err } => {
                format!("Error reading {}: {}", name, err)
            }
            ConfigError::NotANumber { name, value } => {
                format!("{} should be a whole number, but it is '{}'", name, value)
            }
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            ConfigError::MissingKey => Some(format!(
                "Add {}=gsk_... to your .env file or export it in your shell",
                groq_key::ENV_VAR
            )),
            ConfigError::ReadingVar { .. } => {
                Some("Make sure the variable holds valid unicode text".to_string())
            }
            ConfigError::NotANumber { name, .. } => {
                Some(format!("Unset {} to use the default", name))
            }
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, ConfigError> {
        let groq_key = optional_var(groq_key::ENV_VAR)?
            .and_then(GroqKey::new)
            .ok_or(ConfigError::MissingKey)?;

        let base_url = optional_var("GROQ_BASE_URL")?
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let history_path = history_path()?;

        let max_retries = match optional_var("GROQ_MAX_RETRIES")? {
            Some(value) => parse_number("GROQ_MAX_RETRIES", value)?,
            None => DEFAULT_MAX_RETRIES,
        };

        let min_interval_ms = match optional_var("GROQ_MIN_INTERVAL_MS")? {
            Some(value) => parse_number("GROQ_MIN_INTERVAL_MS", value)?,
            None => DEFAULT_MIN_INTERVAL_MS,
        };

        Ok(Config {
            groq_key,
            base_url,
            history_path,
            max_retries,
            min_interval: Duration::from_millis(min_interval_ms),
        })
    }
}

/// History commands need only this, not the key.
pub fn history_path() -> Result<PathBuf, ConfigError> {
    Ok(optional_var("HISTORY_PATH")?
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_PATH)))
}

fn optional_var(name: &str) -> Result<Option<String>, ConfigError> {
    match dotenv::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(dotenv::Error::EnvVar(VarError::NotPresent)) => Ok(None),
        Err(err) => Err(ConfigError::ReadingVar {
            name: name.to_string(),
            err,
        }),
    }
}

fn parse_number<N: std::str::FromStr>(name: &str, value: String) -> Result<N, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::NotANumber {
        name: name.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        groq_key::ENV_VAR,
        "GROQ_BASE_URL",
        "HISTORY_PATH",
        "GROQ_MAX_RETRIES",
        "GROQ_MIN_INTERVAL_MS",
    ];

    fn clear_vars() {
        for name in VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn missing_key_is_reported_with_a_hint() {
        clear_vars();
        let err = Config::load().unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey));
        assert!(err.hint().unwrap().contains(groq_key::ENV_VAR));
    }

    #[test]
    #[serial]
    fn defaults_fill_in_everything_but_the_key() {
        clear_vars();
        std::env::set_var(groq_key::ENV_VAR, "gsk_test");
        let config = Config::load().unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.history_path, PathBuf::from(DEFAULT_HISTORY_PATH));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.min_interval, Duration::from_millis(200));
        clear_vars();
    }

    #[test]
    #[serial]
    fn overrides_are_read_and_validated() {
        clear_vars();
        std::env::set_var(groq_key::ENV_VAR, "gsk_test");
        std::env::set_var("GROQ_BASE_URL", "http://localhost:9000/v1/");
        std::env::set_var("GROQ_MAX_RETRIES", "5");
        let config = Config::load().unwrap();
        assert_eq!(config.base_url, "http://localhost:9000/v1");
        assert_eq!(config.max_retries, 5);

        std::env::set_var("GROQ_MIN_INTERVAL_MS", "soon");
        let err = Config::load().unwrap_err();
        assert!(matches!(err, ConfigError::NotANumber { .. }));
        clear_vars();
    }
}
