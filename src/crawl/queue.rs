//! In-process request queue.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use tracing::debug;

/// Which handler a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    /// Bookmaker entry page.
    Start,
    /// A competition or league page listing events.
    Listing,
    /// A single event page.
    Event,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Label::Start => "start",
            Label::Listing => "listing",
            Label::Event => "event",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub label: Label,
}

/// Accepts follow-up work discovered by a handler.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Queue `url`. Priority requests run before everything already queued.
    async fn enqueue(&self, url: &str, label: Label, priority: bool);
}

/// What a worker should do next.
#[derive(Debug, PartialEq, Eq)]
pub enum Next {
    Run(Request),
    /// Nothing queued, but running requests may still enqueue more.
    Wait,
    /// Nothing queued and nothing running.
    Drained,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Request>,
    seen: HashSet<String>,
    in_flight: usize,
}

/// FIFO queue with a priority front and per-run URL dedup.
#[derive(Default)]
pub struct RequestQueue {
    state: Mutex<QueueState>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request; returns false if the URL was already seen this run.
    pub fn add(&self, url: &str, label: Label, priority: bool) -> bool {
        let mut state = self.state.lock();
        if !state.seen.insert(url.to_string()) {
            debug!("Already queued: {}", url);
            return false;
        }
        let request = Request {
            url: url.to_string(),
            label,
        };
        if priority {
            state.pending.push_front(request);
        } else {
            state.pending.push_back(request);
        }
        true
    }

    pub fn pop(&self) -> Option<Request> {
        self.state.lock().pending.pop_front()
    }

    /// Claim the next request. A claimed request counts as in flight until
    /// [`RequestQueue::finish`] is called for it.
    pub fn next(&self) -> Next {
        let mut state = self.state.lock();
        match state.pending.pop_front() {
            Some(request) => {
                state.in_flight += 1;
                Next::Run(request)
            }
            None if state.in_flight > 0 => Next::Wait,
            None => Next::Drained,
        }
    }

    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Dispatcher for RequestQueue {
    async fn enqueue(&self, url: &str, label: Label, priority: bool) {
        self.add(url, label, priority);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_with_priority_front() {
        let queue = RequestQueue::new();
        queue.add("https://a", Label::Listing, false);
        queue.add("https://b", Label::Listing, false);
        queue.add("https://c", Label::Event, true);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|r| r.url).collect();
        assert_eq!(order, vec!["https://c", "https://a", "https://b"]);
    }

    #[tokio::test]
    async fn test_duplicate_urls_dropped() {
        let queue = RequestQueue::new();
        queue.enqueue("https://a", Label::Event, false).await;
        queue.enqueue("https://a", Label::Event, true).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().map(|r| r.label), Some(Label::Event));
        assert!(queue.is_empty());
        assert!(!queue.add("https://a", Label::Event, false));
    }

    #[test]
    fn test_drained_only_when_nothing_in_flight() {
        let queue = RequestQueue::new();
        queue.add("https://a", Label::Start, false);
        assert!(matches!(queue.next(), Next::Run(_)));
        assert_eq!(queue.next(), Next::Wait);
        queue.add("https://b", Label::Listing, false);
        queue.finish();
        assert!(matches!(queue.next(), Next::Run(r) if r.url == "https://b"));
        queue.finish();
        assert_eq!(queue.next(), Next::Drained);
    }
}
