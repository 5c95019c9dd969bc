//! Offset-tracking reader for an append-only log file

use crate::errors::Result;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tracing::debug;

/// Leading bytes remembered to recognize a file that was rewritten in place.
const HEAD_LEN: u64 = 64;

/// Lines read by one call to [`LogTailer::read_new_lines`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TailBatch {
    pub lines: Vec<String>,
    /// The file was replaced, rewritten, shrank or disappeared since the
    /// previous read, so reading restarted from the beginning.
    pub rotated: bool,
}

/// Remembers how far into the file it has read.
#[derive(Debug, Clone)]
pub struct LogTailer {
    path: PathBuf,
    last_position: u64,
    last_modified: Option<SystemTime>,
    file_id: Option<u64>,
    head: Vec<u8>,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_position: 0,
            last_modified: None,
            file_id: None,
            head: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn position(&self) -> u64 {
        self.last_position
    }

    /// Start over from the beginning of the file on the next read.
    pub fn reset(&mut self) {
        self.last_position = 0;
        self.last_modified = None;
        self.file_id = None;
        self.head.clear();
    }

    /// Read every complete line appended since the last call.
    ///
    /// A trailing fragment without a newline stays unread until the writer
    /// finishes it, so a line flushed in two writes comes back once, whole.
    /// A missing file reads as zero lines. Only failures to open or read an
    /// existing file are errors.
    pub async fn read_new_lines(&mut self) -> Result<TailBatch> {
        self.read(false).await
    }

    /// Read the whole file from the start, final unterminated line included.
    pub async fn read_all_lines(&mut self) -> Result<TailBatch> {
        self.reset();
        self.read(true).await
    }

    async fn read(&mut self, include_partial: bool) -> Result<TailBatch> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let rotated = self.last_position > 0;
                if rotated {
                    debug!("Log file {} disappeared, resetting offset", self.path.display());
                }
                self.reset();
                return Ok(TailBatch {
                    lines: Vec::new(),
                    rotated,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let current_size = metadata.len();
        let current_modified = metadata.modified().ok();
        let current_id = file_id(&metadata);

        let mut rotated = false;
        if self.last_position > 0 && self.file_id.is_some() && current_id != self.file_id {
            debug!("Log file {} was replaced by a new file", self.path.display());
            self.reset();
            rotated = true;
        } else if current_size < self.last_position {
            debug!("Log file {} appears to have been truncated or rotated", self.path.display());
            self.reset();
            rotated = true;
        } else if current_size == self.last_position && self.last_modified == current_modified {
            return Ok(TailBatch::default());
        }

        let mut file = File::open(&self.path).await?;

        let mut head = Vec::new();
        (&mut file).take(HEAD_LEN).read_to_end(&mut head).await?;
        if self.last_position > 0 && !head.starts_with(&self.head) {
            debug!("Log file {} was rewritten in place", self.path.display());
            self.reset();
            rotated = true;
        }

        let (lines, position) = self
            .read_from_position(file, self.last_position, include_partial)
            .await?;
        self.last_position = position;
        self.last_modified = current_modified;
        self.file_id = current_id;
        self.head = head;

        Ok(TailBatch { lines, rotated })
    }

    async fn read_from_position(
        &self,
        mut file: File,
        start_position: u64,
        include_partial: bool,
    ) -> Result<(Vec<String>, u64)> {
        file.seek(SeekFrom::Start(start_position)).await?;

        let mut reader = BufReader::new(file);
        let mut lines = Vec::new();
        let mut current_position = start_position;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let bytes_read = reader.read_until(b'\n', &mut buf).await?;

            if bytes_read == 0 {
                break;
            }

            if buf.ends_with(b"\n") {
                buf.pop();
                if buf.ends_with(b"\r") {
                    buf.pop();
                }
            } else if !include_partial {
                // Still being written; the offset stays at its first byte.
                break;
            }

            current_position += bytes_read as u64;

            let line = String::from_utf8_lossy(&buf);
            if line.trim().is_empty() {
                continue;
            }

            lines.push(line.into_owned());
        }

        debug!(
            "Read {} lines from {} ({} -> {})",
            lines.len(),
            self.path.display(),
            start_position,
            current_position
        );

        Ok((lines, current_position))
    }
}

#[cfg(unix)]
fn file_id(metadata: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn file_id(_metadata: &Metadata) -> Option<u64> {
    None
}
