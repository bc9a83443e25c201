use crate::export::{self, AnswerKind};
use crate::groq::transport::Transport;
use crate::logging::LOG_DIR;
use crate::nice_display::NiceDisplay;
use crate::orchestrator::{self, AskOptions, Orchestrator, Outcome};
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

const PROMPT: &str = "> ";
const SUMMARIZE_COMMAND: &str = "/summarize ";

pub enum Request<'a> {
    Ask(&'a str),
    Summarize(&'a str),
}

impl Request<'_> {
    pub fn answer_kind(&self) -> AnswerKind {
        match self {
            Request::Ask(_) => AnswerKind::Research,
            Request::Summarize(_) => AnswerKind::Summary,
        }
    }
}

#[derive(Debug)]
pub enum Error {
    ReadingStdin(std::io::Error),
}

impl NiceDisplay for Error {
    fn message(&self) -> String {
        match self {
            Error::ReadingStdin(err) => format!("Error reading from the terminal: {}", err),
        }
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves,
/// so the exchange runs to completion instead of being cancelled at once.
pub async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Prints the answer as it arrives, then the stats line. Returns the answer
/// unless the exchange was cancelled.
pub async fn exchange<T: Transport>(
    orchestrator: &mut Orchestrator<T>,
    request: Request<'_>,
    options: &AskOptions,
) -> Result<Option<String>, orchestrator::Error> {
    let print_chunk = |chunk: &str| {
        print!("{}", chunk);
        let _ = std::io::stdout().flush();
    };

    let outcome = match request {
        Request::Ask(query) => orchestrator.ask(query, options, print_chunk, ctrl_c()).await?,
        Request::Summarize(content) => {
            orchestrator
                .summarize(content, options, print_chunk, ctrl_c())
                .await?
        }
    };

    match outcome {
        Outcome::Completed { answer, stats } => {
            println!("\n\n{}", stats);
            Ok(Some(answer))
        }
        Outcome::Cancelled { .. } => {
            println!();
            eprintln!("Cancelled. Nothing was saved to history.");
            Ok(None)
        }
    }
}

/// Saves an answer as Markdown under `logs/` and reports where it went.
pub fn save_answer(kind: AnswerKind, answer: &str) -> Result<(), export::SaveError> {
    let path = export::save_markdown(Path::new(LOG_DIR), kind, answer)?;
    println!("Saved to: {}", path.display());
    Ok(())
}

pub async fn run<T: Transport>(
    orchestrator: &mut Orchestrator<T>,
    options: &AskOptions,
    save_markdown: bool,
) -> Result<(), Error> {
    println!(
        "Ask anything. `/summarize <url or text>` summarizes, `/save` keeps the last answer as Markdown, `/exit` quits."
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_answer: Option<(AnswerKind, String)> = None;

    loop {
        print!("{}", PROMPT);
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            line = lines.next_line() => line.map_err(Error::ReadingStdin)?,
            _ = ctrl_c() => None,
        };

        let Some(line) = line else {
            println!();
            break;
        };

        let request = match parse_line(&line) {
            Line::Blank => continue,
            Line::Exit => break,
            Line::Save => {
                match &last_answer {
                    None => eprintln!("There is no finished answer to save yet."),
                    Some((kind, answer)) => {
                        if let Err(err) = save_answer(*kind, answer) {
                            eprintln!("{}", err.to_nice_error());
                        }
                    }
                }
                continue;
            }
            Line::Request(request) => request,
        };

        let kind = request.answer_kind();
        match exchange(orchestrator, request, options).await {
            Ok(Some(answer)) => {
                if save_markdown {
                    if let Err(err) = save_answer(kind, &answer) {
                        eprintln!("{}", err.to_nice_error());
                    }
                }
                last_answer = Some((kind, answer));
            }
            Ok(None) => {}
            Err(err) => eprintln!("{}", err.to_nice_error()),
        }
    }

    Ok(())
}

enum Line<'a> {
    Blank,
    Exit,
    Save,
    Request(Request<'a>),
}

fn parse_line(line: &str) -> Line<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    if line == "/exit" || line == "/quit" {
        return Line::Exit;
    }
    if line == "/save" {
        return Line::Save;
    }
    match line.strip_prefix(SUMMARIZE_COMMAND) {
        Some(content) => Line::Request(Request::Summarize(content.trim())),
        None => Line::Request(Request::Ask(line)),
    }
}
