//! Incremental file reader for one watch.
//!
//! # Design Decisions
//! - A replaced file is detected by inode, a shorter file by length
//! - An in-place rewrite to the same or a greater length is detected by
//!   re-reading the bytes just before the offset; for an append-only file
//!   they never change
//! - The check only runs when the size or modification time moved

use std::fs::Metadata;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// How many already-read bytes are kept to recognise the file on the next read.
const FINGERPRINT_LEN: usize = 64;

/// Tracks how far a file has been read and what is left of the last line.
#[derive(Debug)]
pub struct Follower {
    path: PathBuf,
    offset: u64,
    identity: Option<u64>,
    modified: Option<SystemTime>,
    /// The bytes at `offset - fingerprint.len() .. offset`.
    fingerprint: Vec<u8>,
    partial: Vec<u8>,
}

impl Follower {
    /// Start following `path` from the end described by `metadata`.
    pub async fn at_end(path: PathBuf, metadata: &Metadata) -> io::Result<Self> {
        let offset = metadata.len();
        let mut fingerprint = Vec::new();
        if offset > 0 {
            let mut file = File::open(&path).await?;
            let start = offset.saturating_sub(FINGERPRINT_LEN as u64);
            file.seek(SeekFrom::Start(start)).await?;
            fingerprint.resize((offset - start) as usize, 0);
            file.read_exact(&mut fingerprint).await?;
        }

        Ok(Self {
            path,
            offset,
            identity: file_identity(metadata),
            modified: metadata.modified().ok(),
            fingerprint,
            partial: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn restart(&mut self, identity: Option<u64>, len: u64) {
        tracing::debug!(
            path = %self.path.display(),
            offset = self.offset,
            len,
            "File replaced or rewritten, restarting from the beginning"
        );
        self.identity = identity;
        self.offset = 0;
        self.fingerprint.clear();
        self.partial.clear();
    }

    /// Read whatever was appended since the last call and return complete lines.
    ///
    /// A missing file yields no lines; it is picked up again once recreated.
    pub async fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let identity = file_identity(&metadata);
        let len = metadata.len();
        if identity != self.identity || len < self.offset {
            self.restart(identity, len);
        }

        let modified = metadata.modified().ok();
        if len == self.offset && modified == self.modified {
            return Ok(Vec::new());
        }
        self.modified = modified;

        let mut file = File::open(&self.path).await?;

        if !self.fingerprint.is_empty() {
            let start = self.offset - self.fingerprint.len() as u64;
            let mut current = vec![0; self.fingerprint.len()];
            file.seek(SeekFrom::Start(start)).await?;
            let unchanged = match file.read_exact(&mut current).await {
                Ok(_) => current == self.fingerprint,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => false,
                Err(e) => return Err(e),
            };
            if !unchanged {
                self.restart(identity, len);
            }
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        let read = file.read_to_end(&mut buf).await?;
        self.offset += read as u64;

        self.fingerprint.extend_from_slice(&buf);
        let excess = self.fingerprint.len().saturating_sub(FINGERPRINT_LEN);
        self.fingerprint.drain(..excess);

        self.partial.extend_from_slice(&buf);
        Ok(split_complete_lines(&mut self.partial))
    }
}

/// Drain every newline-terminated line from `buf`, leaving the unterminated tail.
pub fn split_complete_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
        return Vec::new();
    };

    let complete: Vec<u8> = buf.drain(..=last_newline).collect();
    complete[..complete.len() - 1]
        .split(|&b| b == b'\n')
        .map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            String::from_utf8_lossy(line).into_owned()
        })
        .collect()
}

#[cfg(unix)]
fn file_identity(metadata: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn file_identity(_metadata: &Metadata) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_split_holds_partial_line() {
        let mut buf = b"first\nsecond\r\nthi".to_vec();
        assert_eq!(split_complete_lines(&mut buf), vec!["first", "second"]);
        assert_eq!(buf, b"thi");

        buf.extend_from_slice(b"rd\n");
        assert_eq!(split_complete_lines(&mut buf), vec!["third"]);
        assert!(buf.is_empty());

        let mut none = b"no newline yet".to_vec();
        assert!(split_complete_lines(&mut none).is_empty());
        assert_eq!(none.len(), 14);
    }

    #[test]
    fn test_split_keeps_empty_lines() {
        let mut buf = b"a\n\nb\n".to_vec();
        assert_eq!(split_complete_lines(&mut buf), vec!["a", "", "b"]);
    }

    #[tokio::test]
    async fn test_reads_only_new_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        std::fs::write(&path, b"old line\n").unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        let mut follower = Follower::at_end(path.clone(), &metadata).await.unwrap();
        assert!(follower.read_new_lines().await.unwrap().is_empty());

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"new one\nnew tw").unwrap();
        assert_eq!(follower.read_new_lines().await.unwrap(), vec!["new one"]);

        file.write_all(b"o\n").unwrap();
        assert_eq!(follower.read_new_lines().await.unwrap(), vec!["new two"]);
    }

    #[tokio::test]
    async fn test_truncation_restarts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        std::fs::write(&path, b"a long line that will be truncated away\n").unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        let mut follower = Follower::at_end(path.clone(), &metadata).await.unwrap();

        std::fs::write(&path, b"fresh\n").unwrap();
        assert_eq!(follower.read_new_lines().await.unwrap(), vec!["fresh"]);
        assert_eq!(follower.offset(), 6);
    }

    #[tokio::test]
    async fn test_longer_rewrite_in_place_restarts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        std::fs::write(&path, b"old\nline\n").unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        let mut follower = Follower::at_end(path.clone(), &metadata).await.unwrap();

        // Same inode, truncated and refilled past the old offset before any read.
        std::fs::write(&path, b"first new line\nsecond new line\n").unwrap();
        assert_eq!(
            follower.read_new_lines().await.unwrap(),
            vec!["first new line", "second new line"]
        );

        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"third\n")
            .unwrap();
        assert_eq!(follower.read_new_lines().await.unwrap(), vec!["third"]);
    }

    #[tokio::test]
    async fn test_same_length_rewrite_restarts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        std::fs::write(&path, b"aaaa\n").unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        let mut follower = Follower::at_end(path.clone(), &metadata).await.unwrap();

        // Let the modification time move on filesystems with coarse timestamps.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        std::fs::write(&path, b"bbbb\n").unwrap();
        assert_eq!(follower.read_new_lines().await.unwrap(), vec!["bbbb"]);
    }

    #[tokio::test]
    async fn test_missing_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        std::fs::write(&path, b"").unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        let mut follower = Follower::at_end(path.clone(), &metadata).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(follower.read_new_lines().await.unwrap().is_empty());

        std::fs::write(&path, b"back\n").unwrap();
        assert_eq!(follower.read_new_lines().await.unwrap(), vec!["back"]);
    }
}
