// ABOUTME: Append-only JSONL journal file holding one serialized entry per line.
// ABOUTME: Provides fsynced append, sequential replay, and repair for truncated files.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use timetravel_core::{Entry, LogError};

/// Errors that can occur during JSONL journal operations.
#[derive(Debug, Error)]
pub enum JsonlError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("journal {} refuses writes: a failed append could not be rolled back", .0.display())]
    Poisoned(PathBuf),
}

impl From<JsonlError> for LogError {
    fn from(err: JsonlError) -> Self {
        LogError::storage(err)
    }
}

/// An append-only JSONL journal backed by a file.
///
/// A failed append is cut back out of the file before the error is returned,
/// so the file only ever holds whole, acknowledged lines followed by at most
/// one torn line from a crash. If the cut itself fails the writer is poisoned.
pub struct JsonlLog {
    path: PathBuf,
    file: File,
    poisoned: bool,
}

impl JsonlLog {
    /// Open (or create) a journal file in append mode, creating parent
    /// directories if needed.
    pub fn open(path: &Path) -> Result<Self, JsonlError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            poisoned: false,
        })
    }

    /// Append one entry as a single line and fsync. The line is serialized
    /// in full before anything is written. On error the file is truncated
    /// back to its previous length, so the entry is neither kept nor replayed.
    pub fn append(&mut self, entry: &Entry) -> Result<(), JsonlError> {
        if self.poisoned {
            return Err(JsonlError::Poisoned(self.path.clone()));
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let committed = self.file.metadata()?.len();
        if let Err(err) = self.write_line(line.as_bytes()) {
            self.rewind(committed);
            return Err(err.into());
        }
        Ok(())
    }

    fn write_line(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.sync_all()
    }

    /// Drop everything past `committed`. The file is in append mode, so the
    /// next write lands at the new end without a seek.
    fn rewind(&mut self, committed: u64) {
        let truncated = self
            .file
            .set_len(committed)
            .and_then(|()| self.file.sync_all());
        if let Err(err) = truncated {
            tracing::error!(
                path = %self.path.display(),
                error = %err,
                "could not roll back failed append; journal closed for writes"
            );
            self.poisoned = true;
        }
    }

    /// Write `partial` as if an append had died mid-line, then roll it back
    /// the way a failed `append` does.
    #[cfg(test)]
    pub(crate) fn abandon_partial_line(&mut self, partial: &[u8]) {
        let committed = self.file.metadata().unwrap().len();
        self.file.write_all(partial).unwrap();
        self.rewind(committed);
    }

    /// Read every entry from a journal file in file order. Blank lines are
    /// skipped.
    pub fn replay(path: &Path) -> Result<Vec<Entry>, JsonlError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str::<Entry>(&line)?);
        }

        Ok(entries)
    }

    /// Rewrite the journal keeping only lines that parse as entries, using
    /// temp file + fsync + rename. Returns `(kept, dropped)` line counts.
    pub fn repair(path: &Path) -> Result<(usize, usize), JsonlError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut valid_lines: Vec<String> = Vec::new();
        let mut dropped = 0;

        // A torn final write can leave bytes that are not UTF-8 at all.
        for line in reader.split(b'\n') {
            let line = line?;
            let Ok(text) = String::from_utf8(line) else {
                dropped += 1;
                continue;
            };
            if text.trim().is_empty() {
                continue;
            }
            if serde_json::from_str::<Entry>(&text).is_ok() {
                valid_lines.push(text);
            } else {
                dropped += 1;
            }
        }

        if dropped == 0 {
            return Ok((valid_lines.len(), 0));
        }

        let tmp_path = path.with_extension("jsonl.tmp");
        let mut tmp_file = File::create(&tmp_path)?;
        for line in &valid_lines {
            writeln!(tmp_file, "{}", line)?;
        }
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, path)?;

        // Make the rename durable. Failure here leaves consistent data.
        if let Some(parent) = path.parent()
            && let Ok(dir) = File::open(parent)
        {
            let _ = dir.sync_all();
        }

        Ok((valid_lines.len(), dropped))
    }
}
