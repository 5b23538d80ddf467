//! Background search worker for search-as-you-type front ends.
//!
//! At most one search runs and at most one waits. Submitting replaces the
//! waiting request, and results of superseded requests are dropped, so a
//! burst of keystrokes costs at most two searches.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

use super::query::SearchResult;
use super::searcher::Searcher;
use crate::error::Result;

#[derive(Clone, Debug)]
struct SearchRequest {
    generation: u64,
    query: String,
    num_results: usize,
}

/// Results of the latest request
#[derive(Debug)]
pub struct SearchResponse {
    pub generation: u64,
    pub query: String,
    pub num_matches: usize,
    pub results: Result<Vec<SearchResult>>,
}

/// Depth-one request slot shared with the worker task
#[derive(Default)]
struct RequestSlot {
    pending: Mutex<Option<SearchRequest>>,
    notify: Notify,
    closed: AtomicBool,
}

pub struct SearchWorker {
    slot: Arc<RequestSlot>,
    generation: Arc<AtomicU64>,
    responses: mpsc::UnboundedReceiver<SearchResponse>,
    handle: JoinHandle<()>,
}

impl SearchWorker {
    /// Start the worker task on the current tokio runtime
    pub fn spawn(searcher: Arc<Searcher>) -> Self {
        let slot = Arc::new(RequestSlot::default());
        let generation = Arc::new(AtomicU64::new(0));
        let (tx, responses) = mpsc::unbounded_channel();

        let handle = tokio::spawn(run_worker(searcher, slot.clone(), generation.clone(), tx));

        Self {
            slot,
            generation,
            responses,
            handle,
        }
    }

    /// Queue a search, replacing any request that has not started yet.
    /// Returns the request's generation.
    pub fn submit(&self, query: impl Into<String>, num_results: usize) -> u64 {
        let mut pending = self.slot.pending.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let replaced = pending.replace(SearchRequest {
            generation,
            query: query.into(),
            num_results,
        });
        drop(pending);
        if let Some(old) = replaced {
            debug!(generation = old.generation, "replaced pending search");
        }
        self.slot.notify.notify_one();
        generation
    }

    /// Generation of the most recent submission
    pub fn latest_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Next response for the latest submission; stale responses are
    /// skipped. `None` once the worker has stopped.
    pub async fn next_response(&mut self) -> Option<SearchResponse> {
        while let Some(response) = self.responses.recv().await {
            if response.generation == self.latest_generation() {
                return Some(response);
            }
            debug!(generation = response.generation, "skipping stale response");
        }
        None
    }

    /// Stop after the running search, if any
    pub async fn shutdown(self) {
        self.slot.closed.store(true, Ordering::SeqCst);
        self.slot.notify.notify_one();
        if let Err(e) = self.handle.await {
            debug!(error = %e, "search worker ended abnormally");
        }
    }
}

async fn run_worker(
    searcher: Arc<Searcher>,
    slot: Arc<RequestSlot>,
    generation: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<SearchResponse>,
) {
    loop {
        let request = loop {
            if slot.closed.load(Ordering::SeqCst) {
                return;
            }
            let pending = slot.pending.lock().take();
            if let Some(request) = pending {
                break request;
            }
            slot.notify.notified().await;
        };

        let (num_matches, results) = match searcher.search(&request.query).await {
            Ok(mut query) => {
                let results = query.retrieve(request.num_results).await;
                (query.num_matches(), Ok(results))
            }
            Err(e) => (0, Err(e)),
        };

        if request.generation != generation.load(Ordering::SeqCst) {
            debug!(generation = request.generation, "discarding superseded search");
            continue;
        }

        let response = SearchResponse {
            generation: request.generation,
            query: request.query,
            num_matches,
            results,
        };
        if tx.send(response).is_err() {
            return;
        }
    }
}
