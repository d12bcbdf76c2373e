// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_bundle::{Hash, MilestoneIndex};

use std::{collections::VecDeque, sync::Mutex};

/// A request for a transaction, attributed to the milestone it is needed for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Hash of the requested transaction.
    pub hash: Hash,
    /// Milestone the transaction is requested for.
    pub milestone_index: MilestoneIndex,
}

type Filter = Box<dyn Fn(&Request) -> bool + Send + Sync>;

/// The queue of outstanding transaction requests towards peers.
///
/// An optional filter bounds what may be enqueued; installing one also drops
/// already-queued requests that do not pass it. Warp-sync uses this to
/// prevent unbounded pre-fetching above its current checkpoint.
#[derive(Default)]
pub struct RequestQueue {
    queue: Mutex<VecDeque<Request>>,
    filter: Mutex<Option<Filter>>,
}

impl RequestQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a request if it passes the installed filter; returns whether
    /// it was accepted.
    pub fn enqueue(&self, request: Request) -> bool {
        if let Some(filter) = &*self.filter.lock().unwrap() {
            if !filter(&request) {
                return false;
            }
        }

        self.queue.lock().unwrap().push_back(request);

        true
    }

    /// Takes the next request.
    pub fn dequeue(&self) -> Option<Request> {
        self.queue.lock().unwrap().pop_front()
    }

    /// Installs or clears the filter. Installing drops queued requests that
    /// do not pass.
    pub fn filter(&self, filter: Option<impl Fn(&Request) -> bool + Send + Sync + 'static>) {
        let filter: Option<Filter> = filter.map(|f| Box::new(f) as Filter);

        if let Some(filter) = &filter {
            self.queue.lock().unwrap().retain(|request| filter(request));
        }

        *self.filter.lock().unwrap() = filter;
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use vespa_bundle::HASH_LENGTH;

    fn request(byte: u8, index: u32) -> Request {
        Request {
            hash: Hash::new([byte; HASH_LENGTH]),
            milestone_index: MilestoneIndex(index),
        }
    }

    #[test]
    fn fifo_order() {
        let queue = RequestQueue::new();

        queue.enqueue(request(1, 1));
        queue.enqueue(request(2, 2));

        assert_eq!(queue.dequeue(), Some(request(1, 1)));
        assert_eq!(queue.dequeue(), Some(request(2, 2)));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn filter_drops_queued_and_bounds_new() {
        let queue = RequestQueue::new();

        queue.enqueue(request(1, 1));
        queue.enqueue(request(2, 5));

        queue.filter(Some(|request: &Request| request.milestone_index <= MilestoneIndex(3)));

        assert_eq!(queue.len(), 1);
        assert!(!queue.enqueue(request(3, 9)));
        assert!(queue.enqueue(request(4, 2)));

        queue.filter(None::<fn(&Request) -> bool>);
        assert!(queue.enqueue(request(5, 9)));
    }
}
