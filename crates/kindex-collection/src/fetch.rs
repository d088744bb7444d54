//! # Multi-Page Fetch
//!
//! Fetching a whole collection is a small state machine:
//!
//! ```text
//!   Initial ──accept(page, next)──▶ Fetching(next) ──accept(page, next')──▶ Fetching(next')
//!      │                               │
//!      │ accept(page, none)            │ accept(page, none)
//!      ▼                               ▼
//!    Done ◀────────────────────────────┘
//!
//!   Initial | Fetching ──fail / invariant broken──▶ Failed ──resume──▶ last good state
//! ```
//!
//! ## Invariants
//!
//! - Every page of one fetch reports the same `count`.
//! - A continuation cursor is never handed out twice.
//! - No more than `max_pages` pages are consumed.
//!
//! A broken invariant moves the fetch to `Failed` permanently. Transport
//! and decode failures are recoverable: `resume` returns to the state that
//! issued the failed request, so the same page is requested again and no
//! element is duplicated or lost.

use std::collections::HashSet;

use kindex_core::{Cursor, Instance, KindName};
use kindex_graph::ConfigGraphBuilder;

use crate::codec::{CollectionCodec, CollectionPage, PageElement};
use crate::error::FetchError;
use crate::transport::PageTransport;

/// The request the fetch wants issued next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// The first page of the collection.
    First,
    /// The page behind a continuation cursor.
    Next(Cursor),
}

/// Where a fetch stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Initial,
    Fetching(Cursor),
    Done,
    Failed,
}

impl FetchState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Fetching(_) => "fetching",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Accumulates the pages of one collection.
#[derive(Debug)]
pub struct CollectionFetch {
    kind: KindName,
    max_pages: usize,
    state: FetchState,
    /// State to return to on `resume`.
    resume_to: Option<FetchState>,
    count: Option<u64>,
    pages: usize,
    seen: HashSet<Cursor>,
    elements: Vec<PageElement>,
}

impl CollectionFetch {
    pub fn new(kind: KindName, max_pages: usize) -> Self {
        Self {
            kind,
            max_pages,
            state: FetchState::Initial,
            resume_to: None,
            count: None,
            pages: 0,
            seen: HashSet::new(),
            elements: Vec::new(),
        }
    }

    pub fn kind(&self) -> &KindName {
        &self.kind
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    /// Pages accepted so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Elements accepted so far.
    pub fn elements(&self) -> &[PageElement] {
        &self.elements
    }

    /// The request to issue next, or `None` when done or failed.
    pub fn next_request(&self) -> Option<PageRequest> {
        match &self.state {
            FetchState::Initial => Some(PageRequest::First),
            FetchState::Fetching(cursor) => Some(PageRequest::Next(cursor.clone())),
            FetchState::Done | FetchState::Failed => None,
        }
    }

    /// Accept the page answering the current request.
    pub fn accept(&mut self, page: CollectionPage) -> Result<(), FetchError> {
        if !matches!(self.state, FetchState::Initial | FetchState::Fetching(_)) {
            return Err(FetchError::InvalidState {
                operation: "accept a page",
                state: self.state.name(),
            });
        }
        if page.kind() != &self.kind {
            return Err(self.broken(FetchError::KindMismatch {
                expected: self.kind.clone(),
                found: page.kind().clone(),
            }));
        }

        let page_number = self.pages + 1;
        match self.count {
            Some(first) if first != page.count() => {
                return Err(self.broken(FetchError::CountChanged {
                    first,
                    now: page.count(),
                    page: page_number,
                }));
            }
            _ => self.count = Some(page.count()),
        }

        let next = page.next().cloned();
        if let Some(cursor) = &next {
            if self.seen.contains(cursor) {
                return Err(self.broken(FetchError::CursorLoop {
                    cursor: cursor.clone(),
                    page: page_number,
                }));
            }
            if page_number >= self.max_pages {
                return Err(self.broken(FetchError::PageLimit {
                    limit: self.max_pages,
                }));
            }
        }

        self.pages = page_number;
        self.elements.extend(page.into_elements());
        self.state = match next {
            Some(cursor) => {
                self.seen.insert(cursor.clone());
                FetchState::Fetching(cursor)
            }
            None => FetchState::Done,
        };
        tracing::debug!(
            kind = %self.kind,
            page = page_number,
            elements = self.elements.len(),
            state = self.state.name(),
            "accepted collection page"
        );
        Ok(())
    }

    /// Record a recoverable failure of the current request. The fetch can
    /// be resumed afterwards if the error allows it.
    pub fn fail(&mut self, error: FetchError) -> FetchError {
        if matches!(self.state, FetchState::Initial | FetchState::Fetching(_)) {
            let previous = std::mem::replace(&mut self.state, FetchState::Failed);
            self.resume_to = error.is_resumable().then_some(previous);
        }
        tracing::warn!(kind = %self.kind, error = %error, "collection fetch failed");
        error
    }

    /// Return to the state that issued the failed request.
    pub fn resume(&mut self) -> Result<(), FetchError> {
        if self.state != FetchState::Failed {
            return Err(FetchError::InvalidState {
                operation: "resume",
                state: self.state.name(),
            });
        }
        match self.resume_to.take() {
            Some(state) => {
                self.state = state;
                Ok(())
            }
            None => Err(FetchError::NotResumable {
                reason: format!("{} fetch hit a broken pagination invariant", self.kind),
            }),
        }
    }

    /// Consume a completed fetch.
    pub fn finish(self) -> Result<Collection, FetchError> {
        if self.state != FetchState::Done {
            return Err(FetchError::InvalidState {
                operation: "finish",
                state: self.state.name(),
            });
        }
        let count = self.count.unwrap_or(0);
        if count != self.elements.len() as u64 {
            tracing::warn!(
                kind = %self.kind,
                count,
                received = self.elements.len(),
                "collection count does not match the number of elements received"
            );
        }
        Ok(Collection {
            kind: self.kind,
            count,
            elements: self.elements,
        })
    }

    fn broken(&mut self, error: FetchError) -> FetchError {
        self.state = FetchState::Failed;
        self.resume_to = None;
        tracing::warn!(kind = %self.kind, error = %error, "collection fetch aborted");
        error
    }
}

/// Every element of a fully fetched collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    kind: KindName,
    count: u64,
    elements: Vec<PageElement>,
}

impl Collection {
    pub fn kind(&self) -> &KindName {
        &self.kind
    }

    /// Count reported by the controller.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn elements(&self) -> &[PageElement] {
        &self.elements
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.elements.iter().filter_map(PageElement::instance)
    }

    /// Elements with at least one violation.
    pub fn invalid(&self) -> impl Iterator<Item = &PageElement> {
        self.elements.iter().filter(|e| !e.is_valid())
    }

    /// Add every instance to a graph builder. Returns how many were added.
    pub fn into_graph(self, builder: &mut ConfigGraphBuilder) -> usize {
        let mut added = 0;
        for element in self.elements {
            if let Some(instance) = element.into_report().into_instance() {
                builder.insert(instance);
                added += 1;
            }
        }
        added
    }
}

/// Drive `fetch` through `transport` until it is done or fails.
///
/// A failure is recorded on the fetch and returned; the caller decides
/// whether to `resume` and drive again or to give up.
pub fn drive<T: PageTransport + ?Sized>(
    fetch: &mut CollectionFetch,
    transport: &mut T,
    codec: &CollectionCodec,
) -> Result<(), FetchError> {
    while let Some(request) = fetch.next_request() {
        let page = fetch.pages() + 1;
        let bytes = transport
            .fetch(&fetch.kind, &request)
            .map_err(|source| fetch.fail(FetchError::Transport { page, source }))?;
        let decoded = codec
            .decode(fetch.kind.as_str(), &bytes)
            .map_err(|source| fetch.fail(FetchError::Decode { page, source }))?;
        fetch.accept(decoded)?;
    }
    Ok(())
}

/// Fetch every page of `kind` through `transport`.
pub fn fetch_all<T: PageTransport + ?Sized>(
    transport: &mut T,
    codec: &CollectionCodec,
    kind: &KindName,
    max_pages: usize,
) -> Result<Collection, FetchError> {
    let mut fetch = CollectionFetch::new(kind.clone(), max_pages);
    drive(&mut fetch, transport, codec)?;
    fetch.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindex_core::ApiVersion;
    use kindex_schema::{EditionContext, InstanceValidator, SchemaCatalog, SourceFormat};
    use serde_json::json;
    use std::sync::Arc;

    fn codec() -> CollectionCodec {
        let catalog = SchemaCatalog::load_str(
            "kinds:\n  - name: Pool\n    fields:\n      - { name: uuid, type: string }\n      - { name: name, type: string }\n",
            SourceFormat::Yaml,
        )
        .unwrap();
        CollectionCodec::new(
            InstanceValidator::new(Arc::new(catalog)),
            EditionContext::new(["enterprise"], ApiVersion::new(22, 1, 1)),
        )
    }

    fn page(count: u64, ids: &[&str], next: Option<&str>) -> CollectionPage {
        let results: Vec<_> = ids.iter().map(|id| json!({"uuid": id})).collect();
        codec()
            .decode_value("Pool", &json!({"count": count, "results": results, "next": next}))
            .unwrap()
    }

    #[test]
    fn single_page_goes_straight_to_done() {
        let mut f = CollectionFetch::new("Pool".into(), 10);
        assert_eq!(f.next_request(), Some(PageRequest::First));
        f.accept(page(1, &["p1"], None)).unwrap();
        assert_eq!(f.state(), &FetchState::Done);
        assert_eq!(f.next_request(), None);
        let c = f.finish().unwrap();
        assert_eq!(c.count(), 1);
        assert_eq!(c.instances().count(), 1);
    }

    #[test]
    fn follows_cursors() {
        let mut f = CollectionFetch::new("Pool".into(), 10);
        f.accept(page(2, &["p1"], Some("c2"))).unwrap();
        assert_eq!(f.next_request(), Some(PageRequest::Next(Cursor::new("c2"))));
        f.accept(page(2, &["p2"], None)).unwrap();
        assert_eq!(f.finish().unwrap().elements().len(), 2);
    }

    #[test]
    fn count_change_fails_permanently() {
        let mut f = CollectionFetch::new("Pool".into(), 10);
        f.accept(page(2, &["p1"], Some("c2"))).unwrap();
        let err = f.accept(page(3, &["p2"], None)).unwrap_err();
        assert_eq!(err, FetchError::CountChanged { first: 2, now: 3, page: 2 });
        assert_eq!(f.state(), &FetchState::Failed);
        assert!(matches!(f.resume(), Err(FetchError::NotResumable { .. })));
    }

    #[test]
    fn repeated_cursor_is_a_loop() {
        let mut f = CollectionFetch::new("Pool".into(), 10);
        f.accept(page(9, &["p1"], Some("c2"))).unwrap();
        f.accept(page(9, &["p2"], Some("c3"))).unwrap();
        let err = f.accept(page(9, &["p3"], Some("c2"))).unwrap_err();
        assert!(matches!(err, FetchError::CursorLoop { page: 3, .. }));
    }

    #[test]
    fn page_limit_is_enforced() {
        let mut f = CollectionFetch::new("Pool".into(), 2);
        f.accept(page(9, &["p1"], Some("c2"))).unwrap();
        let err = f.accept(page(9, &["p2"], Some("c3"))).unwrap_err();
        assert_eq!(err, FetchError::PageLimit { limit: 2 });

        let mut f = CollectionFetch::new("Pool".into(), 2);
        f.accept(page(2, &["p1"], Some("c2"))).unwrap();
        f.accept(page(2, &["p2"], None)).unwrap();
        assert!(f.finish().is_ok());
    }

    #[test]
    fn resume_after_transport_failure_repeats_request() {
        let mut f = CollectionFetch::new("Pool".into(), 10);
        f.accept(page(2, &["p1"], Some("c2"))).unwrap();
        f.fail(FetchError::Transport {
            page: 2,
            source: crate::error::TransportError::Transient("reset".into()),
        });
        assert_eq!(f.next_request(), None);
        f.resume().unwrap();
        assert_eq!(f.next_request(), Some(PageRequest::Next(Cursor::new("c2"))));
        f.accept(page(2, &["p2"], None)).unwrap();
        assert_eq!(f.finish().unwrap().elements().len(), 2);
    }

    #[test]
    fn fatal_transport_failure_is_not_resumable() {
        let mut f = CollectionFetch::new("Pool".into(), 10);
        f.fail(FetchError::Transport {
            page: 1,
            source: crate::error::TransportError::Fatal("404".into()),
        });
        assert!(matches!(f.resume(), Err(FetchError::NotResumable { .. })));
    }

    #[test]
    fn operations_in_wrong_state() {
        let mut f = CollectionFetch::new("Pool".into(), 10);
        assert!(matches!(f.resume(), Err(FetchError::InvalidState { .. })));
        f.accept(page(0, &[], None)).unwrap();
        assert!(matches!(
            f.accept(page(0, &[], None)),
            Err(FetchError::InvalidState { state: "done", .. })
        ));

        let f = CollectionFetch::new("Pool".into(), 10);
        assert!(matches!(f.finish(), Err(FetchError::InvalidState { state: "initial", .. })));
    }
}
