//! Collection error types.

use kindex_core::{Cursor, KindName};

/// A byte sequence is not a well-formed collection envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Not JSON at all.
    #[error("collection page is not valid JSON: {reason}")]
    Malformed { reason: String },

    /// Valid JSON, but not an object.
    #[error("collection page must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    /// A required envelope key is absent.
    #[error("collection page is missing '{field}'")]
    MissingField { field: &'static str },

    /// An envelope key has the wrong shape.
    #[error("collection page field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A page cannot be encoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// An element belongs to a different kind than the page.
    #[error("element {index} is a {found}, page holds {expected}")]
    KindMismatch {
        index: usize,
        expected: KindName,
        found: KindName,
    },

    /// Serialization failed.
    #[error("failed to serialize collection page: {0}")]
    Serialization(String),
}

/// The page source failed to deliver a page.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Worth retrying: connection reset, timeout, 5xx.
    #[error("transient transport failure: {0}")]
    Transient(String),

    /// Not worth retrying: 4xx, missing file.
    #[error("transport failure: {0}")]
    Fatal(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A multi-page fetch cannot continue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The total count reported by a later page differs from the first.
    #[error("collection count changed mid-fetch: first page reported {first}, page {page} reported {now}")]
    CountChanged { first: u64, now: u64, page: usize },

    /// A continuation cursor was handed out twice.
    #[error("pagination cursor '{cursor}' repeated on page {page}")]
    CursorLoop { cursor: Cursor, page: usize },

    /// More pages than the configured limit.
    #[error("collection exceeds the limit of {limit} pages")]
    PageLimit { limit: usize },

    /// A page for a different kind was accepted.
    #[error("page holds {found}, fetch is for {expected}")]
    KindMismatch { expected: KindName, found: KindName },

    /// A page could not be decoded.
    #[error("page {page}: {source}")]
    Decode {
        page: usize,
        #[source]
        source: DecodeError,
    },

    /// The transport failed (after any retries).
    #[error("page {page}: {source}")]
    Transport {
        page: usize,
        #[source]
        source: TransportError,
    },

    /// An operation was called in a state that does not permit it.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// The fetch failed for a reason that retrying cannot fix.
    #[error("fetch failed permanently: {reason}")]
    NotResumable { reason: String },
}

impl FetchError {
    /// Whether `resume` may be attempted after this failure.
    pub fn is_resumable(&self) -> bool {
        match self {
            Self::Decode { .. } => true,
            Self::Transport { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}
