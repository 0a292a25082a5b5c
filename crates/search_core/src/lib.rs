use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use shared::{
    domain::{Payload, QueryState},
    error::FetchError,
};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

pub mod config;
mod http;

pub use config::{load_settings, ConfigError, ResponseOrdering, Settings};
pub use http::{Endpoint, HttpLookup};

/// One remote lookup per call; no retries, no caching.
#[async_trait]
pub trait LookupTransport: Send + Sync {
    async fn lookup(&self, term: &str) -> Result<Payload, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// Empty and whitespace-only terms are ignored and leave the state untouched.
    #[error("search term must not be empty")]
    EmptyTerm,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchResolution {
    Applied {
        sequence: u64,
        state: QueryState,
    },
    /// A newer search was issued before this response arrived.
    Discarded { sequence: u64, latest: u64 },
}

impl SearchResolution {
    pub fn sequence(&self) -> u64 {
        match self {
            Self::Applied { sequence, .. } | Self::Discarded { sequence, .. } => *sequence,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// The network half of a search. `Loading` has already been published by the
/// time this value exists; awaiting it performs the lookup and applies the
/// result.
pub struct PendingSearch {
    sequence: u64,
    term: String,
    future: BoxFuture<'static, SearchResolution>,
}

impl PendingSearch {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn term(&self) -> &str {
        &self.term
    }
}

impl fmt::Debug for PendingSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSearch")
            .field("sequence", &self.sequence)
            .field("term", &self.term)
            .finish_non_exhaustive()
    }
}

impl Future for PendingSearch {
    type Output = SearchResolution;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

struct SharedQueryState {
    state: watch::Sender<QueryState>,
    latest_sequence: AtomicU64,
    ordering: ResponseOrdering,
}

impl SharedQueryState {
    fn begin(&self) -> u64 {
        let mut sequence = 0;
        self.state.send_modify(|state| {
            sequence = self.latest_sequence.fetch_add(1, Ordering::SeqCst) + 1;
            *state = QueryState::Loading;
        });
        sequence
    }

    // Runs the stale check under the channel's write lock so a search issued
    // concurrently cannot be overwritten by an older response.
    fn resolve(&self, sequence: u64, next: QueryState) -> SearchResolution {
        let mut outcome = None;
        self.state.send_if_modified(|state| {
            let latest = self.latest_sequence.load(Ordering::SeqCst);
            if self.ordering == ResponseOrdering::LatestRequest && sequence < latest {
                outcome = Some(SearchResolution::Discarded { sequence, latest });
                return false;
            }
            outcome = Some(SearchResolution::Applied {
                sequence,
                state: next.clone(),
            });
            *state = next;
            true
        });

        match outcome {
            Some(resolution) => resolution,
            None => SearchResolution::Discarded {
                sequence,
                latest: self.latest_sequence.load(Ordering::SeqCst),
            },
        }
    }
}

pub struct FetchController {
    transport: Arc<dyn LookupTransport>,
    shared: Arc<SharedQueryState>,
}

impl FetchController {
    pub fn new(transport: Arc<dyn LookupTransport>) -> Self {
        Self::with_ordering(transport, ResponseOrdering::default())
    }

    pub fn with_ordering(transport: Arc<dyn LookupTransport>, ordering: ResponseOrdering) -> Self {
        let (state, _) = watch::channel(QueryState::Idle);
        Self {
            transport,
            shared: Arc::new(SharedQueryState {
                state,
                latest_sequence: AtomicU64::new(0),
                ordering,
            }),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let transport = HttpLookup::from_settings(settings)?;
        Ok(Self::with_ordering(
            Arc::new(transport),
            settings.response_ordering,
        ))
    }

    pub fn ordering(&self) -> ResponseOrdering {
        self.shared.ordering
    }

    pub fn state(&self) -> QueryState {
        self.shared.state.borrow().clone()
    }

    /// Receives every state transition, starting from the current state.
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.shared.state.subscribe()
    }

    /// Sequence number of the most recently issued search, `0` before the first.
    pub fn latest_sequence(&self) -> u64 {
        self.shared.latest_sequence.load(Ordering::SeqCst)
    }

    /// Publishes `Loading` immediately and returns the pending lookup.
    pub fn search(&self, term: &str) -> Result<PendingSearch, SearchError> {
        let term = term.trim();
        if term.is_empty() {
            debug!("ignoring search with empty term");
            return Err(SearchError::EmptyTerm);
        }

        let sequence = self.shared.begin();
        info!(term, sequence, "issuing lookup");

        let transport = Arc::clone(&self.transport);
        let shared = Arc::clone(&self.shared);
        let owned_term = term.to_string();
        let future = async move {
            let next = match transport.lookup(&owned_term).await {
                Ok(payload) => QueryState::Success(payload),
                Err(err) => {
                    warn!(term = %owned_term, sequence, error = %err, "lookup failed");
                    QueryState::Failure(err)
                }
            };

            let resolution = shared.resolve(sequence, next);
            if let SearchResolution::Discarded { latest, .. } = &resolution {
                debug!(term = %owned_term, sequence, latest, "discarding stale response");
            }
            resolution
        }
        .boxed();

        Ok(PendingSearch {
            sequence,
            term: term.to_string(),
            future,
        })
    }

    /// Like [`search`](Self::search), but drives the lookup on the tokio runtime.
    pub fn spawn_search(&self, term: &str) -> Result<JoinHandle<SearchResolution>, SearchError> {
        let pending = self.search(term)?;
        Ok(tokio::spawn(pending))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
