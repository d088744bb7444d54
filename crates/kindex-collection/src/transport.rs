//! Page transports.
//!
//! A [`PageTransport`] turns a [`PageRequest`] into the raw bytes of one
//! envelope. [`FileTransport`] serves pages from a directory, which is how
//! snapshots captured from a controller are replayed offline.
//! [`RetryingTransport`] wraps any transport with exponential backoff on
//! transient failures; fatal failures are returned immediately.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kindex_core::KindName;

use crate::error::TransportError;
use crate::fetch::PageRequest;

/// Source of raw collection pages.
pub trait PageTransport {
    fn fetch(&mut self, kind: &KindName, request: &PageRequest) -> Result<Vec<u8>, TransportError>;
}

impl<T: PageTransport + ?Sized> PageTransport for &mut T {
    fn fetch(&mut self, kind: &KindName, request: &PageRequest) -> Result<Vec<u8>, TransportError> {
        (**self).fetch(kind, request)
    }
}

/// Serves pages from files in one directory.
///
/// The first page of kind `K` is `<dir>/K.json`. A continuation cursor
/// names the next file; only its final path component is used, so a
/// cursor can never reach outside the directory.
#[derive(Debug, Clone)]
pub struct FileTransport {
    dir: PathBuf,
}

impl FileTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file a request maps to.
    pub fn path_for(&self, kind: &KindName, request: &PageRequest) -> Result<PathBuf, TransportError> {
        match request {
            PageRequest::First => Ok(self.dir.join(format!("{kind}.json"))),
            PageRequest::Next(cursor) => Path::new(cursor.as_str())
                .file_name()
                .map(|name| self.dir.join(name))
                .ok_or_else(|| {
                    TransportError::Fatal(format!("cursor '{cursor}' does not name a page file"))
                }),
        }
    }
}

impl PageTransport for FileTransport {
    fn fetch(&mut self, kind: &KindName, request: &PageRequest) -> Result<Vec<u8>, TransportError> {
        let path = self.path_for(kind, request)?;
        tracing::debug!(kind = %kind, path = %path.display(), "reading collection page");
        std::fs::read(&path).map_err(|e| {
            let reason = format!("{}: {e}", path.display());
            match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput => {
                    TransportError::Fatal(reason)
                }
                _ => TransportError::Transient(reason),
            }
        })
    }
}

/// Backoff settings for [`RetryingTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry (doubles each retry: 200ms, 400ms, 800ms).
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Retry `max_retries` times without sleeping.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (zero based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Retries transient failures of the wrapped transport.
#[derive(Debug, Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: PageTransport> RetryingTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: PageTransport> PageTransport for RetryingTransport<T> {
    fn fetch(&mut self, kind: &KindName, request: &PageRequest) -> Result<Vec<u8>, TransportError> {
        for attempt in 0..self.policy.max_retries {
            match self.inner.fetch(kind, request) {
                Err(e) if e.is_transient() => {
                    let delay = self.policy.delay(attempt);
                    tracing::warn!(
                        kind = %kind,
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        "page request failed, retrying in {delay:?}: {e}"
                    );
                    std::thread::sleep(delay);
                }
                outcome => return outcome,
            }
        }
        // Final attempt, no more retries.
        self.inner.fetch(kind, request)
    }
}
