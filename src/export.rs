use crate::nice_display::NiceDisplay;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKind {
    Research,
    Summary,
}

impl AnswerKind {
    fn prefix(&self) -> &'static str {
        match self {
            AnswerKind::Research => "research_",
            AnswerKind::Summary => "summary_",
        }
    }
}

#[derive(Debug)]
pub struct SaveError {
    pub dir: PathBuf,
    pub err: io::Error,
}

impl NiceDisplay for SaveError {
    fn message(&self) -> String {
        format!(
            "I could not save the answer under {}: {}",
            self.dir.display(),
            self.err
        )
    }

    fn hint(&self) -> Option<String> {
        Some("Check that the logs directory is writable".to_string())
    }
}

/// Writes `text` to a new uniquely named `{kind}_*.md` file in `dir` and
/// returns its path. Existing files are never overwritten.
pub fn save_markdown(dir: &Path, kind: AnswerKind, text: &str) -> Result<PathBuf, SaveError> {
    write_new(dir, kind, text).map_err(|err| SaveError {
        dir: dir.to_path_buf(),
        err,
    })
}

fn write_new(dir: &Path, kind: AnswerKind, text: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let mut file = tempfile::Builder::new()
        .prefix(kind.prefix())
        .suffix(".md")
        .tempfile_in(dir)?;
    file.write_all(text.as_bytes())?;
    file.as_file().sync_all()?;

    let (_, path) = file.keep().map_err(|err| err.error)?;
    Ok(path)
}
