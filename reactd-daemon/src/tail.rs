//! File tailing.
//!
//! [`FileTail`] polls one file and returns the complete lines appended since
//! the last poll, similar to `tail -F`.
//!
//! # Rotation handling
//! - inode change (logrotate `create`): reopen and read from the start
//! - size below the read offset (truncation): read from the start
//! - file removed: reported as [`TailPoll::Missing`]; the event loop retries
//!   it every rescan interval and reads it from the start once it exists

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reactd_core::metrics as m;
use reactd_core::types::SourceLine;

use crate::source::SourceEvent;

/// Longest line delivered (bytes). Longer lines are discarded whole.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Upper bound on bytes read by a single poll.
const MAX_READ_PER_POLL: u64 = 1024 * 1024;

/// While a read error persists, only every Nth failed poll is logged at warn.
const READ_ERROR_WARN_EVERY: u64 = 100;

/// Result of one [`FileTail::poll`].
#[derive(Debug, PartialEq, Eq)]
pub enum TailPoll {
    /// Complete lines appended since the last poll (possibly none).
    Lines(Vec<String>),
    /// The file no longer exists.
    Missing,
}

/// Polling reader for one log file.
#[derive(Debug)]
pub struct FileTail {
    source: String,
    path: PathBuf,
    offset: u64,
    inode: Option<u64>,
    partial: Vec<u8>,
    discarding: bool,
}

impl FileTail {
    /// Open `source` (a file path).
    ///
    /// With `from_start == false` reading begins at the current end of the
    /// file, so existing content is ignored.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file does not exist, `InvalidInput` if it is not a
    /// regular file.
    pub async fn open(source: &str, from_start: bool) -> io::Result<Self> {
        let path = PathBuf::from(source);
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let offset = if from_start { 0 } else { metadata.len() };
        debug!(path = source, offset, "tail opened");

        Ok(Self {
            source: source.to_owned(),
            path,
            offset,
            inode: inode_of(&metadata),
            partial: Vec::new(),
            discarding: false,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current read offset in bytes.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read whatever was appended since the last poll.
    pub async fn poll(&mut self) -> io::Result<TailPoll> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(md) => md,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TailPoll::Missing),
            Err(e) => return Err(e),
        };

        let inode = inode_of(&metadata);
        if inode != self.inode {
            info!(path = %self.source, "file rotated, reading from start");
            self.rewind();
            self.inode = inode;
        } else if metadata.len() < self.offset {
            info!(
                path = %self.source,
                offset = self.offset,
                size = metadata.len(),
                "file truncated, reading from start"
            );
            self.rewind();
        }

        if metadata.len() == self.offset {
            return Ok(TailPoll::Lines(Vec::new()));
        }

        let mut file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TailPoll::Missing),
            Err(e) => return Err(e),
        };
        file.seek(SeekFrom::Start(self.offset)).await?;

        let mut chunk = Vec::new();
        let read = file.take(MAX_READ_PER_POLL).read_to_end(&mut chunk).await?;
        self.offset += read as u64;

        Ok(TailPoll::Lines(self.split_lines(&chunk)))
    }

    fn rewind(&mut self) {
        self.offset = 0;
        self.partial.clear();
        self.discarding = false;
    }

    /// Split `chunk` on `\n`, keeping the unterminated tail for the next poll.
    fn split_lines(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let segment = &rest[..pos];
            rest = &rest[pos + 1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let len = self.partial.len() + segment.len();
            if len > MAX_LINE_LENGTH {
                warn!(
                    path = %self.source,
                    len,
                    max = MAX_LINE_LENGTH,
                    "line exceeds maximum length, discarding"
                );
                self.partial.clear();
                continue;
            }

            self.partial.extend_from_slice(segment);
            if self.partial.last() == Some(&b'\r') {
                self.partial.pop();
            }
            lines.push(String::from_utf8_lossy(&self.partial).into_owned());
            self.partial.clear();
        }

        if !self.discarding {
            self.partial.extend_from_slice(rest);
            if self.partial.len() > MAX_LINE_LENGTH {
                warn!(
                    path = %self.source,
                    len = self.partial.len(),
                    max = MAX_LINE_LENGTH,
                    "line exceeds maximum length, discarding"
                );
                self.partial.clear();
                self.discarding = true;
            }
        }

        lines
    }
}

/// Consecutive failed polls of one file.
#[derive(Debug, Default)]
struct ReadFailures {
    consecutive: u64,
}

impl ReadFailures {
    /// Count a failed poll. Returns whether it should be logged at warn level.
    fn record(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive == 1 || self.consecutive % READ_ERROR_WARN_EVERY == 0
    }

    /// Reset after a successful poll. Returns the length of the streak it ended.
    fn recover(&mut self) -> Option<u64> {
        (self.consecutive > 0).then(|| std::mem::take(&mut self.consecutive))
    }
}

#[cfg(unix)]
fn inode_of(metadata: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn inode_of(_metadata: &std::fs::Metadata) -> Option<u64> {
    None
}

/// Spawn a task polling `tail` every `poll_interval`.
///
/// Lines are sent as [`SourceEvent::Line`]. When the file disappears a
/// [`SourceEvent::Missing`] is sent and the task ends. The task also ends when
/// `cancel` fires or the receiver is dropped.
pub fn spawn_file_tail(
    mut tail: FileTail,
    tx: mpsc::Sender<SourceEvent>,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = ReadFailures::default();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(path = %tail.source(), "file tail shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let polled = tail.poll().await;
                    if polled.is_ok()
                        && let Some(failed) = failures.recover()
                    {
                        info!(path = %tail.source(), failed_polls = failed, "file readable again");
                    }
                    match polled {
                        Ok(TailPoll::Lines(lines)) => {
                            if lines.is_empty() {
                                continue;
                            }
                            metrics::counter!(
                                m::SOURCE_LINES_READ_TOTAL,
                                m::LABEL_SOURCE => tail.source().to_owned()
                            )
                            .increment(lines.len() as u64);

                            for line in lines {
                                let event = SourceEvent::Line(SourceLine::new(tail.source(), line));
                                if tx.send(event).await.is_err() {
                                    debug!(path = %tail.source(), "line channel closed");
                                    return;
                                }
                            }
                        }
                        Ok(TailPoll::Missing) => {
                            warn!(path = %tail.source(), "file disappeared, waiting for it to return");
                            let _ = tx.send(SourceEvent::Missing(tail.source().to_owned())).await;
                            break;
                        }
                        Err(e) => {
                            if failures.record() {
                                warn!(
                                    path = %tail.source(),
                                    error = %e,
                                    failed_polls = failures.consecutive,
                                    "failed to read file"
                                );
                            } else {
                                debug!(path = %tail.source(), error = %e, "failed to read file");
                            }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, data: &[u8]) {
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        f.write_all(data).unwrap();
    }

    fn lines(poll: TailPoll) -> Vec<String> {
        match poll {
            TailPoll::Lines(lines) => lines,
            TailPoll::Missing => panic!("file unexpectedly missing"),
        }
    }

    async fn setup(initial: &[u8], from_start: bool) -> (TempDir, PathBuf, FileTail) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("auth.log");
        std::fs::write(&path, initial).unwrap();
        let tail = FileTail::open(path.to_str().unwrap(), from_start).await.unwrap();
        (dir, path, tail)
    }

    #[tokio::test]
    async fn open_at_end_skips_existing_content() {
        let (_dir, path, mut tail) = setup(b"old line\n", false).await;
        assert_eq!(tail.offset(), 9);
        assert!(lines(tail.poll().await.unwrap()).is_empty());

        append(&path, b"new line\n");
        assert_eq!(lines(tail.poll().await.unwrap()), vec!["new line"]);
    }

    #[tokio::test]
    async fn open_from_start_reads_existing_content() {
        let (_dir, _path, mut tail) = setup(b"one\ntwo\n", true).await;
        assert_eq!(lines(tail.poll().await.unwrap()), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn open_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.log");
        let err = FileTail::open(path.to_str().unwrap(), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn open_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = FileTail::open(dir.path().to_str().unwrap(), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn partial_line_waits_for_newline() {
        let (_dir, path, mut tail) = setup(b"", false).await;
        append(&path, b"Failed password");
        assert!(lines(tail.poll().await.unwrap()).is_empty());

        append(&path, b" for root\r\nnext");
        assert_eq!(
            lines(tail.poll().await.unwrap()),
            vec!["Failed password for root"]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let (_dir, path, mut tail) = setup(b"", false).await;
        append(&path, b"\xffx\n");
        assert_eq!(lines(tail.poll().await.unwrap()), vec!["\u{FFFD}x"]);
    }

    #[tokio::test]
    async fn truncation_restarts_from_beginning() {
        let (_dir, path, mut tail) = setup(b"aaaa\nbbbb\n", false).await;
        std::fs::write(&path, b"c\n").unwrap();
        assert_eq!(lines(tail.poll().await.unwrap()), vec!["c"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rotation_reads_new_file_from_start() {
        let (dir, path, mut tail) = setup(b"before rotation\n", false).await;

        let rotated = dir.path().join("auth.log.new");
        std::fs::write(&rotated, b"after rotation that is longer\n").unwrap();
        std::fs::rename(&rotated, &path).unwrap();

        assert_eq!(
            lines(tail.poll().await.unwrap()),
            vec!["after rotation that is longer"]
        );
    }

    #[tokio::test]
    async fn removed_file_reports_missing() {
        let (_dir, path, mut tail) = setup(b"x\n", false).await;
        std::fs::remove_file(&path).unwrap();
        assert_eq!(tail.poll().await.unwrap(), TailPoll::Missing);
    }

    #[tokio::test]
    async fn oversized_line_is_discarded_until_newline() {
        let (_dir, path, mut tail) = setup(b"", false).await;
        append(&path, &vec![b'x'; MAX_LINE_LENGTH + 1]);
        assert!(lines(tail.poll().await.unwrap()).is_empty());

        append(&path, b"tail of long line\nshort\n");
        assert_eq!(lines(tail.poll().await.unwrap()), vec!["short"]);
    }

    #[tokio::test]
    async fn complete_oversized_line_in_one_chunk_is_discarded() {
        let (_dir, path, mut tail) = setup(b"", false).await;
        let mut data = b"before\n".to_vec();
        data.extend(vec![b'x'; MAX_LINE_LENGTH * 4]);
        data.extend_from_slice(b"\nafter\n");
        append(&path, &data);

        assert_eq!(lines(tail.poll().await.unwrap()), vec!["before", "after"]);
    }

    #[tokio::test]
    async fn line_of_exactly_max_length_is_delivered() {
        let (_dir, path, mut tail) = setup(b"", false).await;
        let mut data = vec![b'y'; MAX_LINE_LENGTH];
        data.push(b'\n');
        append(&path, &data);

        let got = lines(tail.poll().await.unwrap());
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].len(), MAX_LINE_LENGTH);
    }

    #[tokio::test]
    async fn oversized_line_split_across_polls_is_discarded() {
        let (_dir, path, mut tail) = setup(b"", false).await;
        append(&path, &vec![b'x'; MAX_LINE_LENGTH - 10]);
        assert!(lines(tail.poll().await.unwrap()).is_empty());

        append(&path, b"0123456789abcdef\nnext\n");
        assert_eq!(lines(tail.poll().await.unwrap()), vec!["next"]);
    }

    #[test]
    fn persistent_read_errors_warn_sparingly() {
        let mut failures = ReadFailures::default();
        let warned = (0..250).filter(|_| failures.record()).count();
        // 1st, 100th and 200th
        assert_eq!(warned, 3);
        assert_eq!(failures.recover(), Some(250));
        assert_eq!(failures.recover(), None);
        assert!(failures.record());
    }

    #[tokio::test]
    async fn spawned_tail_forwards_lines_and_missing() {
        let (_dir, path, tail) = setup(b"", false).await;
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let source = path.to_str().unwrap().to_owned();
        let task = spawn_file_tail(tail, tx, Duration::from_millis(10), cancel.clone());

        append(&path, b"hello\n");
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("line should arrive")
            .expect("channel open");
        assert_eq!(event, SourceEvent::Line(SourceLine::new(source.clone(), "hello")));

        std::fs::remove_file(&path).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("missing event should arrive")
            .expect("channel open");
        assert_eq!(event, SourceEvent::Missing(source));

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("task should end after file disappears")
            .unwrap();
    }

    #[tokio::test]
    async fn spawned_tail_stops_on_cancel() {
        let (_dir, _path, tail) = setup(b"", false).await;
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = spawn_file_tail(tail, tx, Duration::from_millis(10), cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("task should stop on cancel")
            .unwrap();
    }
}
