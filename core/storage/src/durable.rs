//! File-backed durable secret storage.
//!
//! The backing file is newline-delimited text:
//!
//! ```text
//! onetime-store v1
//! <token>:<ciphertext>
//! <token>:<ciphertext>
//! ```
//!
//! Files written before the header existed are read as plain records and
//! gain the header on their next rewrite.

use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::backend::SecretBackend;
use onetime_common::{Error, Result, Token};

/// Prefix of the format header line.
pub const HEADER_PREFIX: &str = "onetime-store v";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Separator between token and ciphertext.
const FIELD_SEPARATOR: char = ':';

fn header_line() -> String {
    format!("{}{}", HEADER_PREFIX, FORMAT_VERSION)
}

/// Check a first line for a format header.
///
/// Returns `Ok(true)` for a supported header, `Ok(false)` for a legacy file
/// whose first line is already a record (or is not text at all).
fn check_header(first_line: &[u8]) -> Result<bool> {
    let first_line = match std::str::from_utf8(first_line) {
        Ok(line) => line,
        Err(_) => return Ok(false),
    };
    match first_line.trim_end().strip_prefix(HEADER_PREFIX) {
        None => Ok(false),
        Some(version) if version == FORMAT_VERSION.to_string() => Ok(true),
        Some(version) => Err(Error::Storage(format!(
            "Unsupported durable store format version '{}'",
            version
        ))),
    }
}

/// Return the ciphertext of `line` if it is a record for `token`.
///
/// Lines that are not UTF-8 or have no separator never match.
fn match_record(line: &[u8], token: &Token) -> Option<String> {
    let line = std::str::from_utf8(line).ok()?;
    let line = line.strip_suffix('\r').unwrap_or(line);
    let (candidate, ciphertext) = line.split_once(FIELD_SEPARATOR)?;
    bool::from(candidate.as_bytes().ct_eq(token.as_str().as_bytes()))
        .then(|| ciphertext.to_string())
}

fn append_record(path: &Path, record: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let len = file.metadata()?.len();

    let mut line = Vec::with_capacity(record.len() + 32);
    if len == 0 {
        line.extend_from_slice(header_line().as_bytes());
        line.push(b'\n');
    } else {
        let mut first_line = Vec::new();
        BufReader::new(&mut file).read_until(b'\n', &mut first_line)?;
        check_header(&first_line)?;

        // A torn previous write must not swallow this record.
        file.seek(SeekFrom::Start(len - 1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            line.push(b'\n');
        }
    }

    line.extend_from_slice(record.as_bytes());
    line.push(b'\n');

    file.write_all(&line)?;
    file.sync_data()?;
    Ok(())
}

fn take_record(path: &Path, token: &Token) -> Result<Option<String>> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut lines = contents.split(|&b| b == b'\n').peekable();
    if let Some(first) = lines.peek() {
        if check_header(first)? {
            lines.next();
        }
    }

    let mut found = None;
    let mut kept: Vec<&[u8]> = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if found.is_none() {
            if let Some(ciphertext) = match_record(line, token) {
                found = Some(ciphertext);
                continue;
            }
        }
        kept.push(line);
    }

    if found.is_some() {
        let mut rewritten = Vec::with_capacity(contents.len());
        rewritten.extend_from_slice(header_line().as_bytes());
        rewritten.push(b'\n');
        for line in kept {
            rewritten.extend_from_slice(line);
            rewritten.push(b'\n');
        }
        replace_file(path, &rewritten)?;
    }

    Ok(found)
}

/// Atomically replace the file at `path` with `contents`.
///
/// Each rewrite gets its own uniquely named temp file in the same directory.
fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Durable storage provider.
///
/// Appends records to a single file and consumes them by rewriting the
/// file without the matched record. The rewrite goes to a sibling temp
/// file that is renamed over the original, so a crash leaves either the
/// old or the new record set, never a truncated one.
///
/// File I/O runs on the blocking pool and owns the lock guard, so a call
/// abandoned by its timeout keeps the file locked until its I/O is done.
///
/// Lookup cost is linear in the number of live records.
pub struct DurableBackend {
    path: PathBuf,
    io_timeout: Duration,
    /// Serializes appends and read-modify-write cycles on the file.
    lock: Arc<Mutex<()>>,
}

impl DurableBackend {
    /// Create a durable backend over the file at `path`.
    ///
    /// The file is created lazily on the first `store`.
    pub fn new(path: impl AsRef<Path>, io_timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            io_timeout,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` on the blocking pool while holding the file lock.
    async fn locked<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        let path = self.path.clone();

        task::spawn_blocking(move || {
            let _guard = guard;
            op(&path)
        })
        .await
        .map_err(|e| Error::Storage(format!("Durable store task failed: {}", e)))?
    }

    async fn append(&self, token: &Token, ciphertext: &str) -> Result<()> {
        if ciphertext.is_empty() || ciphertext.contains(&[FIELD_SEPARATOR, '\n', '\r'][..]) {
            return Err(Error::Validation(
                "Ciphertext is not delimiter-safe".to_string(),
            ));
        }

        let record = format!("{}{}{}", token.as_str(), FIELD_SEPARATOR, ciphertext);
        self.locked(move |path| append_record(path, &record)).await
    }

    async fn take(&self, token: &Token) -> Result<Option<String>> {
        let token = token.clone();
        self.locked(move |path| take_record(path, &token)).await
    }
}

#[async_trait]
impl SecretBackend for DurableBackend {
    fn name(&self) -> &str {
        "durable"
    }

    async fn store(&self, token: &Token, ciphertext: &str) -> bool {
        match timeout(self.io_timeout, self.append(token, ciphertext)).await {
            Ok(Ok(())) => {
                debug!(backend = "durable", size = ciphertext.len(), "Secret stored");
                true
            }
            Ok(Err(e)) => {
                error!(
                    backend = "durable",
                    path = %self.path.display(),
                    error = %e,
                    "Failed to write secret to file"
                );
                false
            }
            Err(_) => {
                error!(
                    backend = "durable",
                    path = %self.path.display(),
                    timeout_ms = self.io_timeout.as_millis() as u64,
                    "Timed out writing secret to file"
                );
                false
            }
        }
    }

    async fn restore(&self, token: &Token) -> Option<String> {
        match timeout(self.io_timeout, self.take(token)).await {
            Ok(Ok(found)) => {
                if found.is_some() {
                    debug!(backend = "durable", "Secret consumed");
                }
                found
            }
            Ok(Err(e)) => {
                warn!(
                    backend = "durable",
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read secret file, reporting miss"
                );
                None
            }
            Err(_) => {
                warn!(
                    backend = "durable",
                    path = %self.path.display(),
                    timeout_ms = self.io_timeout.as_millis() as u64,
                    "Timed out reading secret file, reporting miss"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onetime_crypto::seal;
    use std::sync::Arc;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn backend(temp: &TempDir) -> DurableBackend {
        DurableBackend::new(temp.path().join("storage.txt"), TIMEOUT)
    }

    #[tokio::test]
    async fn test_store_restore() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let sealed = seal("secret-data").unwrap();

        assert!(backend.store(&sealed.token, &sealed.ciphertext).await);
        assert_eq!(
            backend.restore(&sealed.token).await.as_deref(),
            Some(sealed.ciphertext.as_str())
        );
    }

    #[tokio::test]
    async fn test_restore_consumes_record() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let sealed = seal("once").unwrap();

        assert!(backend.store(&sealed.token, &sealed.ciphertext).await);
        assert!(backend.restore(&sealed.token).await.is_some());
        assert!(backend.restore(&sealed.token).await.is_none());
    }

    #[tokio::test]
    async fn test_restore_keeps_other_records() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let first = seal("first").unwrap();
        let second = seal("second").unwrap();
        let third = seal("third").unwrap();

        for sealed in [&first, &second, &third] {
            assert!(backend.store(&sealed.token, &sealed.ciphertext).await);
        }

        assert!(backend.restore(&second.token).await.is_some());

        let contents = std::fs::read_to_string(backend.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], header_line());
        assert_eq!(lines.len(), 3);
        assert!(!contents.contains(second.token.as_str()));

        assert_eq!(
            backend.restore(&first.token).await.as_deref(),
            Some(first.ciphertext.as_str())
        );
        assert_eq!(
            backend.restore(&third.token).await.as_deref(),
            Some(third.ciphertext.as_str())
        );
    }

    #[tokio::test]
    async fn test_miss_has_no_side_effect() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let stored = seal("stored").unwrap();
        let absent = seal("absent").unwrap();

        assert!(backend.store(&stored.token, &stored.ciphertext).await);
        let before = std::fs::read(backend.path()).unwrap();

        assert!(backend.restore(&absent.token).await.is_none());
        assert_eq!(std::fs::read(backend.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_missing_file_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let sealed = seal("x").unwrap();

        assert!(backend.restore(&sealed.token).await.is_none());
        assert!(!backend.path().exists());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let sealed = seal("secret-data").unwrap();

        {
            let backend = backend(&temp);
            assert!(backend.store(&sealed.token, &sealed.ciphertext).await);
        }

        let reopened = backend(&temp);
        assert_eq!(
            reopened.restore(&sealed.token).await.as_deref(),
            Some(sealed.ciphertext.as_str())
        );
    }

    #[tokio::test]
    async fn test_legacy_file_without_header() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let legacy = seal("legacy").unwrap();
        let other = seal("other").unwrap();
        std::fs::write(
            backend.path(),
            format!(
                "{}:{}\n{}:{}\n",
                legacy.token.as_str(),
                legacy.ciphertext,
                other.token.as_str(),
                other.ciphertext
            ),
        )
        .unwrap();

        assert_eq!(
            backend.restore(&legacy.token).await.as_deref(),
            Some(legacy.ciphertext.as_str())
        );

        let contents = std::fs::read_to_string(backend.path()).unwrap();
        assert!(contents.starts_with(&header_line()));
        assert!(contents.contains(other.token.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_version_is_refused() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let sealed = seal("x").unwrap();
        std::fs::write(
            backend.path(),
            format!(
                "{}99\n{}:{}\n",
                HEADER_PREFIX,
                sealed.token.as_str(),
                sealed.ciphertext
            ),
        )
        .unwrap();

        assert!(!backend.store(&sealed.token, &sealed.ciphertext).await);
        assert!(backend.restore(&sealed.token).await.is_none());
    }

    #[tokio::test]
    async fn test_torn_tail_does_not_swallow_next_record() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        std::fs::write(backend.path(), format!("{}\nhalf-written", header_line())).unwrap();
        let sealed = seal("after tear").unwrap();

        assert!(backend.store(&sealed.token, &sealed.ciphertext).await);
        assert_eq!(
            backend.restore(&sealed.token).await.as_deref(),
            Some(sealed.ciphertext.as_str())
        );

        let contents = std::fs::read_to_string(backend.path()).unwrap();
        assert!(contents.contains("half-written"));
    }

    #[tokio::test]
    async fn test_store_rejects_unsafe_ciphertext() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let sealed = seal("x").unwrap();

        assert!(!backend.store(&sealed.token, "with:colon").await);
        assert!(!backend.store(&sealed.token, "with\nnewline").await);
    }

    #[tokio::test]
    async fn test_unwritable_path_fails_closed() {
        let temp = TempDir::new().unwrap();
        let backend = DurableBackend::new(temp.path().join("missing").join("storage.txt"), TIMEOUT);
        let sealed = seal("x").unwrap();

        assert!(!backend.store(&sealed.token, &sealed.ciphertext).await);
        assert!(backend.restore(&sealed.token).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_restore_single_winner() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(backend(&temp));
        let sealed = seal("race").unwrap();
        assert!(backend.store(&sealed.token, &sealed.ciphertext).await);

        let tasks = (0..16).map(|_| {
            let backend = Arc::clone(&backend);
            let token = sealed.token.clone();
            tokio::spawn(async move { backend.restore(&token).await })
        });
        let results = futures::future::join_all(tasks).await;

        let winners = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Some(_))))
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_lose_nothing() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(backend(&temp));
        let secrets: Vec<_> = (0..32).map(|i| seal(&format!("secret-{}", i)).unwrap()).collect();
        let doomed = seal("doomed").unwrap();
        assert!(backend.store(&doomed.token, &doomed.ciphertext).await);

        let mut tasks = Vec::new();
        for sealed in secrets.iter().cloned() {
            let backend = Arc::clone(&backend);
            tasks.push(tokio::spawn(async move {
                backend.store(&sealed.token, &sealed.ciphertext).await
            }));
        }
        let consumer = {
            let backend = Arc::clone(&backend);
            let token = doomed.token.clone();
            tokio::spawn(async move { backend.restore(&token).await })
        };

        for stored in futures::future::join_all(tasks).await {
            assert!(stored.unwrap());
        }
        assert!(consumer.await.unwrap().is_some());

        for sealed in &secrets {
            assert_eq!(
                backend.restore(&sealed.token).await.as_deref(),
                Some(sealed.ciphertext.as_str())
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_preserved() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let first = seal("first").unwrap();
        let second = seal("second").unwrap();
        let junk: &[u8] = b"junk\xff\xfe";

        assert!(backend.store(&first.token, &first.ciphertext).await);
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(backend.path())
            .unwrap();
        file.write_all(junk).unwrap();
        file.write_all(b"\n").unwrap();
        drop(file);
        assert!(backend.store(&second.token, &second.ciphertext).await);

        assert_eq!(
            backend.restore(&first.token).await.as_deref(),
            Some(first.ciphertext.as_str())
        );
        assert_eq!(
            backend.restore(&second.token).await.as_deref(),
            Some(second.ciphertext.as_str())
        );

        let contents = std::fs::read(backend.path()).unwrap();
        let mut expected = header_line().into_bytes();
        expected.push(b'\n');
        expected.extend_from_slice(junk);
        expected.push(b'\n');
        assert_eq!(contents, expected);
    }

    #[tokio::test]
    async fn test_rewrite_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let first = seal("first").unwrap();
        let second = seal("second").unwrap();

        assert!(backend.store(&first.token, &first.ciphertext).await);
        assert!(backend.store(&second.token, &second.ciphertext).await);
        assert!(backend.restore(&first.token).await.is_some());

        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("storage.txt")]);
    }

    #[tokio::test]
    async fn test_abandoned_io_keeps_file_locked() {
        let temp = TempDir::new().unwrap();
        let backend = DurableBackend::new(temp.path().join("storage.txt"), Duration::from_millis(50));
        let sealed = seal("waits its turn").unwrap();

        let slow = backend.locked(|_: &Path| {
            std::thread::sleep(Duration::from_millis(400));
            Ok(())
        });
        assert!(timeout(Duration::from_millis(20), slow).await.is_err());

        // The blocking I/O outlives its caller and still holds the lock.
        assert!(backend.lock.try_lock().is_err());
        assert!(!backend.store(&sealed.token, &sealed.ciphertext).await);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(backend.lock.try_lock().is_ok());
        assert!(backend.store(&sealed.token, &sealed.ciphertext).await);
        assert_eq!(
            backend.restore(&sealed.token).await.as_deref(),
            Some(sealed.ciphertext.as_str())
        );
    }
}
