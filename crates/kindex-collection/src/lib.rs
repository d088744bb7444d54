//! # kindex-collection — Collection Envelopes & Paginated Fetch
//!
//! Controllers return lists of objects in a paginated envelope:
//!
//! ```json
//! {"count": 250, "results": [ ... ], "next": "https://ctl/api/pool?page=2"}
//! ```
//!
//! - [`codec`]: decode an envelope into validated elements and encode
//!   instances back into the same wire form.
//! - [`fetch`]: the multi-page fetch state machine and the [`fetch_all`]
//!   driver over a [`PageTransport`].
//! - [`transport`]: a file-backed transport for offline snapshots and a
//!   retrying wrapper with exponential backoff.
//!
//! ## Crate Policy
//!
//! The crate performs no network I/O. Callers plug their HTTP client in
//! through [`PageTransport`]; the state machine stays synchronous and
//! deterministic so it can be driven from any runtime.

pub mod codec;
pub mod error;
pub mod fetch;
pub mod transport;

pub use codec::{CollectionCodec, CollectionPage, PageElement};
pub use error::{DecodeError, EncodeError, FetchError, TransportError};
pub use fetch::{drive, fetch_all, Collection, CollectionFetch, FetchState, PageRequest};
pub use transport::{FileTransport, PageTransport, RetryPolicy, RetryingTransport};
