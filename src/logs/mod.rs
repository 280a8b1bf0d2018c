//! Per-run log files: creation, eager appends, and retention.
//!
//! Every pipeline run produces one main log plus one auxiliary log per
//! parallel worker. Log handles are append-only and flushed eagerly so that
//! partial output survives a crash. Old run logs are rotated away at the
//! start of each run, keeping only the newest few.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, warn};

/// Timestamp format embedded in log file names (second granularity).
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Errors that can occur while setting up or writing log files.
///
/// These are the only fatal errors in the orchestrator: without a log file
/// the run has no observable outcome, so callers abort on them instead of
/// recording them as stage failures.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to create logs directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write log file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Factory for per-run log files under a single logs directory.
pub struct LogSink {
    dir: PathBuf,
}

impl LogSink {
    /// Creates a sink bound to the given logs directory.
    ///
    /// The directory itself is created lazily by the first log file.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the logs directory this sink writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the timestamp-named main log for a new run.
    pub fn new_run_log(&self, prefix: &str) -> Result<LogHandle, LogError> {
        let stamp = Local::now().format(STAMP_FORMAT);
        self.open(format!("{prefix}_{stamp}.log"))
    }

    /// Creates an auxiliary log for one worker of a parallel stage.
    pub fn new_worker_log(&self, prefix: &str, worker_id: &str) -> Result<LogHandle, LogError> {
        let stamp = Local::now().format(STAMP_FORMAT);
        self.open(format!("{prefix}_{worker_id}_{stamp}.log"))
    }

    fn open(&self, file_name: String) -> Result<LogHandle, LogError> {
        fs::create_dir_all(&self.dir).map_err(|source| LogError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.dir.join(file_name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LogError::Open {
                path: path.clone(),
                source,
            })?;
        debug!("opened log file {}", path.display());
        Ok(LogHandle { path, file })
    }

    /// Deletes all but the newest `keep` logs named `<prefix>_<stamp>.log`.
    ///
    /// Only exact timestamp-named logs for this prefix are touched, so main
    /// logs and per-worker logs rotate independently. Rotation is
    /// best-effort cleanup: files that cannot be listed or deleted are
    /// skipped with a warning. Returns the number of files actually removed.
    pub fn rotate(&self, prefix: &str, keep: usize) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            // Nothing to rotate before the first run ever creates the dir.
            Err(_) => return 0,
        };

        let wanted_prefix = format!("{prefix}_");
        let mut logs: Vec<(PathBuf, SystemTime)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                let name = path.file_name()?.to_str()?;
                let stamp = name
                    .strip_prefix(&wanted_prefix)?
                    .strip_suffix(".log")?;
                if !is_run_stamp(stamp) {
                    return None;
                }
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((path, modified))
            })
            .collect();

        // Newest first; file names carry a timestamp, so they break mtime ties.
        logs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

        let mut deleted = 0;
        for (path, _) in logs.into_iter().skip(keep) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("rotated away old log {}", path.display());
                    deleted += 1;
                }
                Err(e) => warn!("could not delete old log {}: {}", path.display(), e),
            }
        }
        deleted
    }
}

/// Checks that `stamp` looks like the `YYYYMMDD_HHMMSS` log-name suffix.
fn is_run_stamp(stamp: &str) -> bool {
    let bytes = stamp.as_bytes();
    bytes.len() == 15
        && bytes[8] == b'_'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || b.is_ascii_digit())
}

/// Append-only handle to one log file, owned exclusively by its creator.
///
/// Writes are flushed immediately; the file is released on drop when the
/// owning stage completes.
#[derive(Debug)]
pub struct LogHandle {
    path: PathBuf,
    file: File,
}

impl LogHandle {
    /// Returns the path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line, adding the trailing newline and flushing eagerly.
    pub fn append(&mut self, line: &str) -> Result<(), LogError> {
        let write = |file: &mut File| -> std::io::Result<()> {
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
            file.flush()
        };
        write(&mut self.file).map_err(|source| LogError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Appends the full content of another log file, ensuring it ends with
    /// a newline so following sections stay on their own lines.
    pub fn append_file(&mut self, source_path: &Path) -> Result<(), LogError> {
        let mut content = String::new();
        File::open(source_path)
            .and_then(|mut f| f.read_to_string(&mut content))
            .map_err(|source| LogError::Open {
                path: source_path.to_path_buf(),
                source,
            })?;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        self.file
            .write_all(content.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|source| LogError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_run_log_creates_file_with_prefix() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path());

        let log = sink.new_run_log("collect_run").unwrap();
        assert!(log.path().exists());

        let name = log.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("collect_run_"));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn test_creates_missing_logs_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("logs").join("runs");
        let sink = LogSink::new(&nested);

        sink.new_run_log("collect_run").unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_append_writes_lines_with_newline() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path());

        let mut log = sink.new_run_log("collect_run").unwrap();
        log.append("first").unwrap();
        log.append("second").unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_append_file_copies_content_and_terminates_line() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path());

        let aux = dir.path().join("aux.log");
        fs::write(&aux, "worker output without trailing newline").unwrap();

        let mut log = sink.new_run_log("collect_run").unwrap();
        log.append("=== header ===").unwrap();
        log.append_file(&aux).unwrap();
        log.append("after").unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            content,
            "=== header ===\nworker output without trailing newline\nafter\n"
        );
    }

    #[test]
    fn test_rotate_keeps_newest_three() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path());

        for i in 0..7 {
            let name = format!("collect_run_2025010{i}_120000.log");
            fs::write(dir.path().join(name), "x").unwrap();
        }
        // Unrelated files and per-worker logs are never touched.
        fs::write(dir.path().join("other.log"), "x").unwrap();
        fs::write(dir.path().join("collect_run_notes.txt"), "x").unwrap();
        fs::write(
            dir.path().join("collect_run_qamqor_parser_20250101_120000.log"),
            "x",
        )
        .unwrap();

        let deleted = sink.rotate("collect_run", 3);
        assert_eq!(deleted, 4);

        let mut remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with("collect_run_2025010") && n.ends_with(".log"))
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            vec![
                "collect_run_20250104_120000.log",
                "collect_run_20250105_120000.log",
                "collect_run_20250106_120000.log"
            ]
        );
        assert!(dir.path().join("other.log").exists());
        assert!(dir.path().join("collect_run_notes.txt").exists());
        assert!(dir
            .path()
            .join("collect_run_qamqor_parser_20250101_120000.log")
            .exists());
    }

    #[test]
    fn test_rotate_per_worker_logs_independently() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path());

        for i in 0..4 {
            let name = format!("collect_run_company_info_2025010{i}_120000.log");
            fs::write(dir.path().join(name), "x").unwrap();
        }

        assert_eq!(sink.rotate("collect_run_company_info", 2), 2);
    }

    #[test]
    fn test_rotate_missing_directory_is_noop() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path().join("never-created"));
        assert_eq!(sink.rotate("collect_run", 3), 0);
    }
}
