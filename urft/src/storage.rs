//! File access for both ends of a transfer.
//!
//! The engines need very little from storage:
//! - the sender reads the file forward once, then re-reads arbitrary
//!   offsets for retransmission ([`SourceFile`]);
//! - the receiver replaces any existing file of the announced name and
//!   appends bytes in order ([`SinkFile`]).
//!
//! Both handles close when dropped, so every exit path of an engine
//! releases the file.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

// ---------------------------------------------------------------------------
// SourceFile
// ---------------------------------------------------------------------------

/// Read-only view of the file being sent.
#[derive(Debug)]
pub struct SourceFile {
    file: File,
    len: u64,
    /// Offset the next sequential read starts at.
    next_offset: u64,
    /// Where the OS cursor currently is.
    cursor: u64,
}

impl SourceFile {
    /// Open `path` for reading.  Fails if it is not a regular file.
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path).await?;
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(Self {
            file,
            len: meta.len(),
            next_offset: 0,
            cursor: 0,
        })
    }

    /// File size in bytes at open time.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the next chunk of at most `max` bytes in file order.
    ///
    /// Returns `(offset, bytes)`, or `None` once the length seen at open
    /// time is exhausted.  Bytes appended later are never read.
    pub async fn read_next(&mut self, max: usize) -> io::Result<Option<(u64, Vec<u8>)>> {
        let offset = self.next_offset;
        let chunk = self.read_at(offset, max).await?;
        if chunk.is_empty() {
            return Ok(None);
        }
        self.next_offset += chunk.len() as u64;
        Ok(Some((offset, chunk)))
    }

    /// Read up to `max` bytes starting at `offset`, stopping at the length
    /// seen at open time.
    ///
    /// Short only at end of file.
    pub async fn read_at(&mut self, offset: u64, max: usize) -> io::Result<Vec<u8>> {
        let remaining = self.len.saturating_sub(offset);
        let max = usize::try_from(remaining).map_or(max, |r| r.min(max));
        if max == 0 {
            return Ok(Vec::new());
        }
        if self.cursor != offset {
            self.file.seek(SeekFrom::Start(offset)).await?;
            self.cursor = offset;
        }

        let mut buf = vec![0u8; max];
        let mut filled = 0;
        while filled < max {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        self.cursor += filled as u64;
        Ok(buf)
    }
}

// ---------------------------------------------------------------------------
// SinkFile
// ---------------------------------------------------------------------------

/// Append-only output file on the receiver.
#[derive(Debug)]
pub struct SinkFile {
    file: File,
    path: PathBuf,
    written: u64,
}

impl SinkFile {
    /// Create `dir/name` empty, deleting any file already there.
    pub async fn create_fresh(dir: &Path, name: &str) -> io::Result<Self> {
        let path = dir.join(name);
        if fs::try_exists(&path).await? {
            log::info!("[storage] removing existing {}", path.display());
            fs::remove_file(&path).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            file,
            path,
            written: 0,
        })
    }

    pub async fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes).await?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Wait for buffered writes to reach the OS.
    pub async fn finish(&mut self) -> io::Result<()> {
        self.file.flush().await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes appended so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}
