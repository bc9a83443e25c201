mod chat;
mod config;
mod export;
mod fetch;
mod groq;
mod groq_key;
mod history;
mod logging;
mod nice_display;
mod orchestrator;

use crate::chat::Request;
use crate::config::{Config, ConfigError};
use crate::groq::transport::HttpTransport;
use crate::groq::{ClientError, Model, ResilientClient};
use crate::history::{ExportFormat, HistoryError, HistoryStore};
use crate::nice_display::NiceDisplay;
use crate::orchestrator::{AskOptions, Orchestrator, Preset};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser, Clone)]
#[clap(
    version = "0.1",
    about = "A terminal research assistant backed by Groq"
)]
enum Cmd {
    /// Ask a question and stream the answer
    Ask {
        query: Vec<String>,
        #[command(flatten)]
        options: AskArgs,
    },
    /// Summarize a URL or a piece of text
    Summarize {
        content: Vec<String>,
        #[command(flatten)]
        options: AskArgs,
    },
    /// Inspect or manage saved exchanges
    History {
        #[command(subcommand)]
        cmd: HistoryCmd,
    },
    /// Interactive session, one question per line
    Chat {
        #[command(flatten)]
        options: AskArgs,
    },
}

#[derive(Debug, Subcommand, Clone)]
enum HistoryCmd {
    List,
    Clear,
    Export {
        #[arg(long, value_enum, default_value = "markdown")]
        format: ExportFormat,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Start a fresh history file, for example when the old one is corrupt
    Reset {
        /// Move the old file aside instead of deleting it
        #[arg(long)]
        backup: bool,
    },
}

#[derive(Debug, Args, Clone)]
struct AskArgs {
    #[arg(long, default_value = "llama-3.1-8b-instant")]
    model: String,
    #[arg(long, default_value_t = groq::request_config::DEFAULT_TEMPERATURE)]
    temperature: f32,
    #[arg(long, default_value_t = groq::request_config::DEFAULT_MAX_TOKENS)]
    max_tokens: u32,
    /// Wait for the whole answer instead of streaming it
    #[arg(long)]
    no_stream: bool,
    /// Custom system prompt, takes precedence over --preset
    #[arg(long)]
    system: Option<String>,
    #[arg(long, value_enum, default_value = "standard")]
    preset: Preset,
    /// Do not include the last few exchanges as context
    #[arg(long)]
    no_memory: bool,
    /// Also save each finished answer as a Markdown file under logs/
    #[arg(long)]
    save_markdown: bool,
}

impl AskArgs {
    fn to_options(&self) -> AskOptions {
        AskOptions {
            model: Model::from_name(&self.model),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: !self.no_stream,
            system_prompt: self.system.clone(),
            preset: self.preset,
            use_memory: !self.no_memory,
        }
    }
}

enum Error {
    Logging(logging::Error),
    Config(ConfigError),
    Client(ClientError),
    History(HistoryError),
    Exchange(orchestrator::Error),
    Chat(chat::Error),
    SavingAnswer(export::SaveError),
    WritingExport { path: PathBuf, err: std::io::Error },
}

impl NiceDisplay for Error {
    fn message(&self) -> String {
        match self {
            Error::Logging(err) => err.message(),
            Error::Config(err) => err.message(),
            Error::Client(err) => err.message(),
            Error::History(err) => err.message(),
            Error::Exchange(err) => err.message(),
            Error::Chat(err) => err.message(),
            Error::SavingAnswer(err) => err.message(),
            Error::WritingExport { path, err } => {
                format!("Error writing export to {}: {}", path.display(), err)
            }
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            Error::Logging(err) => err.hint(),
            Error::Config(err) => err.hint(),
            Error::Client(err) => err.hint(),
            Error::History(err) => err.hint(),
            Error::Exchange(err) => err.hint(),
            Error::Chat(err) => err.hint(),
            Error::SavingAnswer(err) => err.hint(),
            Error::WritingExport { .. } => None,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), String> {
    nice_main()
        .await
        .map_err(|err| err.to_nice_error().to_string())
}

async fn nice_main() -> Result<(), Error> {
    // a missing .env is fine, the variables may come from the shell
    dotenv::dotenv().ok();

    let cmd = Cmd::parse();
    let _log_guard = logging::init().map_err(Error::Logging)?;

    match cmd {
        Cmd::Ask { query, options } => {
            let query = query.join(" ");
            answer_once(Request::Ask(&query), &options).await?;
        }
        Cmd::Summarize { content, options } => {
            let content = content.join(" ");
            answer_once(Request::Summarize(&content), &options).await?;
        }
        Cmd::Chat { options } => {
            let mut orchestrator = orchestrator()?;
            chat::run(&mut orchestrator, &options.to_options(), options.save_markdown)
                .await
                .map_err(Error::Chat)?;
        }
        Cmd::History { cmd } => run_history(cmd)?,
    }

    Ok(())
}

async fn answer_once(request: Request<'_>, options: &AskArgs) -> Result<(), Error> {
    let mut orchestrator = orchestrator()?;
    let kind = request.answer_kind();
    let answer = chat::exchange(&mut orchestrator, request, &options.to_options())
        .await
        .map_err(Error::Exchange)?;

    if let Some(answer) = answer.filter(|_| options.save_markdown) {
        chat::save_answer(kind, &answer).map_err(Error::SavingAnswer)?;
    }
    Ok(())
}

fn orchestrator() -> Result<Orchestrator<HttpTransport>, Error> {
    let config = Config::load().map_err(Error::Config)?;
    let history = HistoryStore::open(&config.history_path).map_err(Error::History)?;
    let client = ResilientClient::from_config(&config).map_err(Error::Client)?;
    info!(base_url = %config.base_url, history = %config.history_path.display(), "ready");
    Ok(Orchestrator::new(client, history))
}

fn run_history(cmd: HistoryCmd) -> Result<(), Error> {
    let path = config::history_path().map_err(Error::Config)?;

    if let HistoryCmd::Reset { backup } = cmd {
        let moved_to = history::reset(&path, backup).map_err(Error::History)?;
        match moved_to {
            Some(backup) => println!("Old history moved to {}", backup.display()),
            None => println!("History reset."),
        }
        return Ok(());
    }

    let mut store = HistoryStore::open(&path).map_err(Error::History)?;

    match cmd {
        HistoryCmd::List => {
            let records = store.list();
            if records.is_empty() {
                println!("No history available.");
            }
            for record in records {
                println!("[{}] {}", record.timestamp, record.question);
                println!("{}\n", record.answer);
            }
        }
        HistoryCmd::Clear => {
            store.clear().map_err(Error::History)?;
            println!("History cleared ({}).", store.path().display());
        }
        HistoryCmd::Export { format, out } => {
            let exported = store.export(format).map_err(Error::History)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, exported)
                        .map_err(|err| Error::WritingExport { path: path.clone(), err })?;
                    println!("Exported history to {}", path.display());
                }
                None => println!("{}", exported),
            }
        }
        HistoryCmd::Reset { .. } => {}
    }

    Ok(())
}
