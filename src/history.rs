use crate::nice_display::NiceDisplay;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: String,
    pub question: String,
    pub answer: String,
    /// Older history files were written without a model.
    #[serde(default)]
    pub model: String,
}

impl HistoryRecord {
    pub fn new(question: &str, answer: &str, model: &str) -> Self {
        Self {
            timestamp: chrono::Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            question: question.to_string(),
            answer: answer.to_string(),
            model: model.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

#[derive(Debug)]
pub enum HistoryError {
    CorruptHistory { path: PathBuf, err: String },
    Persistence { path: PathBuf, err: io::Error },
    Reading { path: PathBuf, err: io::Error },
    Serializing(String),
}

impl NiceDisplay for HistoryError {
    fn message(&self) -> String {
        match self {
            HistoryError::CorruptHistory { path, err } => format!(
                "The history file {} is not a valid list of records: {}",
                path.display(),
                err
            ),
            HistoryError::Persistence { path, err } => {
                format!("I could not save history to {}: {}", path.display(), err)
            }
            HistoryError::Reading { path, err } => {
                format!("I could not read history from {}: {}", path.display(), err)
            }
            HistoryError::Serializing(err) => format!("I could not serialize history: {}", err),
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            HistoryError::CorruptHistory { path, .. } => Some(format!(
                "Back up or fix {} by hand; run `history reset --backup` to move it aside and start fresh",
                path.display()
            )),
            HistoryError::Persistence { .. } => Some(
                "Check that the logs directory is writable and the disk is not full".to_string(),
            ),
            HistoryError::Reading { .. } => {
                Some("Check the file permissions of the history file".to_string())
            }
            HistoryError::Serializing(_) => None,
        }
    }
}

/// Sole owner of the history file. Every mutation rewrites the whole log
/// through a temp file and a rename, so the file on disk is always either
/// the previous or the new complete array.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    records: Vec<HistoryRecord>,
}

impl HistoryStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(HistoryError::Reading { path, err }),
        };

        let records = if raw.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&raw).map_err(|err| HistoryError::CorruptHistory {
                path: path.clone(),
                err: err.to_string(),
            })?
        };

        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// On a write failure the record stays in memory; call `persist` to retry.
    pub fn append(&mut self, record: HistoryRecord) -> Result<(), HistoryError> {
        self.records.push(record);
        self.persist()
    }

    pub fn list(&self) -> Vec<HistoryRecord> {
        self.records.clone()
    }

    pub fn recent(&self, count: usize) -> Vec<HistoryRecord> {
        let start = self.records.len().saturating_sub(count);
        self.records[start..].to_vec()
    }

    pub fn clear(&mut self) -> Result<(), HistoryError> {
        self.records.clear();
        self.persist()
    }

    pub fn persist(&self) -> Result<(), HistoryError> {
        write_atomically(&self.path, &self.records).map_err(|err| HistoryError::Persistence {
            path: self.path.clone(),
            err,
        })?;
        debug!(path = %self.path.display(), records = self.records.len(), "history saved");
        Ok(())
    }

    pub fn export(&self, format: ExportFormat) -> Result<String, HistoryError> {
        match format {
            ExportFormat::Json => serde_json::to_string_pretty(&self.records)
                .map_err(|err| HistoryError::Serializing(err.to_string())),
            ExportFormat::Markdown => Ok(to_markdown(&self.records)),
        }
    }
}

/// Moves an unreadable history file aside so a fresh store can be opened.
/// Returns where the old file went.
pub fn back_up_corrupt(path: &Path) -> Result<PathBuf, HistoryError> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let backup = with_suffix(path, &format!(".corrupt-{}", stamp));
    fs::rename(path, &backup).map_err(|err| HistoryError::Persistence {
        path: path.to_path_buf(),
        err,
    })?;
    Ok(backup)
}

/// Starts an empty log at `path`, whatever state the old file was in.
/// With `keep_backup` the old file is moved aside instead of deleted.
pub fn reset(path: &Path, keep_backup: bool) -> Result<Option<PathBuf>, HistoryError> {
    let backup = if !path.exists() {
        None
    } else if keep_backup {
        Some(back_up_corrupt(path)?)
    } else {
        fs::remove_file(path).map_err(|err| HistoryError::Persistence {
            path: path.to_path_buf(),
            err,
        })?;
        None
    };

    HistoryStore {
        path: path.to_path_buf(),
        records: Vec::new(),
    }
    .persist()?;

    Ok(backup)
}

fn write_atomically(path: &Path, records: &[HistoryRecord]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = with_suffix(path, ".tmp");
    let result = write_temp(&temp_path, records).and_then(|()| fs::rename(&temp_path, path));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_temp(temp_path: &Path, records: &[HistoryRecord]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(temp_path)?);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn to_markdown(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return "No history available.".to_string();
    }

    let mut lines = vec!["# Research History".to_string(), String::new()];
    for record in records {
        let heading = if record.model.is_empty() {
            format!("## {}", record.timestamp)
        } else {
            format!("## {} ({})", record.timestamp, record.model)
        };
        lines.push(heading);
        lines.push(String::new());
        lines.push(format!("**Q:** {}", record.question));
        lines.push(String::new());
        lines.push("**A:**".to_string());
        lines.push(String::new());
        lines.push(record.answer.clone());
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(question: &str, answer: &str) -> HistoryRecord {
        HistoryRecord::new(question, answer, "llama-3.1-8b-instant")
    }

    fn store_in(dir: &TempDir) -> HistoryStore {
        HistoryStore::open(dir.path().join("logs").join("history.json")).unwrap()
    }

    #[test]
    fn missing_file_is_an_empty_log() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.list().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn empty_file_is_an_empty_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "  \n").unwrap();
        assert!(HistoryStore::open(&path).unwrap().list().is_empty());
    }

    #[test]
    fn append_keeps_insertion_order_and_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.append(record("Q1", "A1")).unwrap();
        store.append(record("Q2", "A2")).unwrap();

        let listed = store.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].question, "Q1");
        assert_eq!(listed.last().unwrap().answer, "A2");

        let reopened = HistoryStore::open(store.path()).unwrap();
        assert_eq!(reopened.list(), listed);
    }

    #[test]
    fn clear_persists_an_empty_array() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.append(record("Q1", "A1")).unwrap();
        store.clear().unwrap();

        assert!(store.list().is_empty());
        let on_disk: Vec<HistoryRecord> =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(on_disk.is_empty());
    }

    #[test]
    fn json_export_parses_back_to_the_log() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.append(record("Why?", "Because.")).unwrap();
        store.append(record("How?", "Carefully.")).unwrap();

        let exported = store.export(ExportFormat::Json).unwrap();
        let parsed: Vec<HistoryRecord> = serde_json::from_str(&exported).unwrap();
        assert_eq!(parsed, store.list());
    }

    #[test]
    fn markdown_export_is_chronological() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        assert_eq!(store.export(ExportFormat::Markdown).unwrap(), "No history available.");

        store.append(record("First?", "One.")).unwrap();
        store.append(record("Second?", "Two.")).unwrap();
        let markdown = store.export(ExportFormat::Markdown).unwrap();

        assert!(markdown.starts_with("# Research History"));
        assert!(markdown.contains("(llama-3.1-8b-instant)"));
        assert!(markdown.contains("**Q:** First?"));
        assert!(markdown.find("First?").unwrap() < markdown.find("Second?").unwrap());
    }

    #[test]
    fn malformed_file_is_reported_and_left_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "[{\"timestamp\": ").unwrap();

        let err = HistoryStore::open(&path).unwrap_err();
        assert!(matches!(err, HistoryError::CorruptHistory { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "[{\"timestamp\": ");
    }

    #[test]
    fn records_without_model_still_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(
            &path,
            r#"[{"timestamp": "2024-05-01 10:00:00", "question": "Q", "answer": "A"}]"#,
        )
        .unwrap();

        let store = HistoryStore::open(&path).unwrap();
        assert_eq!(store.list()[0].model, "");
    }

    #[test]
    fn failed_write_keeps_the_record_in_memory() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.append(record("Q1", "A1")).unwrap();

        // a directory where the temp file should go makes the write fail
        let blocker = with_suffix(store.path(), ".tmp");
        fs::create_dir(&blocker).unwrap();

        let err = store.append(record("Q2", "A2")).unwrap_err();
        assert!(matches!(err, HistoryError::Persistence { .. }));
        assert_eq!(store.list().len(), 2);

        let on_disk = HistoryStore::open(store.path()).unwrap();
        assert_eq!(on_disk.list().len(), 1);

        fs::remove_dir(&blocker).unwrap();
        store.persist().unwrap();
        assert_eq!(HistoryStore::open(store.path()).unwrap().list(), store.list());
    }

    #[test]
    fn recent_returns_the_tail() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        for n in 0..5 {
            store.append(record(&format!("Q{}", n), "A")).unwrap();
        }
        let recent = store.recent(3);
        assert_eq!(
            recent.iter().map(|r| r.question.as_str()).collect::<Vec<_>>(),
            vec!["Q2", "Q3", "Q4"]
        );
        assert_eq!(store.recent(10).len(), 5);
    }

    #[test]
    fn no_temp_file_is_left_behind() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.append(record("Q", "A")).unwrap();
        assert!(!with_suffix(store.path(), ".tmp").exists());
    }

    #[test]
    fn corrupt_file_can_be_backed_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{oops").unwrap();

        let backup = back_up_corrupt(&path).unwrap();
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(backup).unwrap(), "{oops");
        assert!(HistoryStore::open(&path).unwrap().list().is_empty());
    }

    #[test]
    fn reset_starts_a_fresh_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "not json").unwrap();

        let backup = reset(&path, true).unwrap().unwrap();
        assert_eq!(fs::read_to_string(backup).unwrap(), "not json");
        assert!(HistoryStore::open(&path).unwrap().list().is_empty());

        fs::write(&path, "still not json").unwrap();
        assert_eq!(reset(&path, false).unwrap(), None);
        assert!(HistoryStore::open(&path).unwrap().list().is_empty());
    }
}
