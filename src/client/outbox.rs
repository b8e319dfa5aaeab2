use std::collections::VecDeque;

use tokio::time::Instant;

use crate::schemas::LogViolationRequest;

/// Violations waiting for the server, oldest first. Delivery is strictly in
/// order; a failed send holds back everything behind it until its retry.
#[derive(Debug, Default)]
pub struct ViolationOutbox {
    queue: VecDeque<LogViolationRequest>,
    due: Option<Instant>,
    failures: u32,
}

impl ViolationOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a violation. It is due at `now` unless a retry is already scheduled.
    pub fn push(&mut self, request: LogViolationRequest, now: Instant) {
        self.queue.push_back(request);
        self.due.get_or_insert(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.due
    }

    /// Head of the queue when it may be sent at `now`.
    pub fn next_ready(&self, now: Instant) -> Option<&LogViolationRequest> {
        match self.due {
            Some(due) if due <= now => self.queue.front(),
            _ => None,
        }
    }

    /// The head reached the server.
    pub fn delivered(&mut self, now: Instant) {
        self.failures = 0;
        self.pop(now);
    }

    /// The server refused the head for good.
    pub fn reject(&mut self, now: Instant) {
        self.pop(now);
    }

    pub fn retry_at(&mut self, at: Instant) {
        self.failures = self.failures.saturating_add(1);
        self.due = Some(at);
    }

    /// Drops everything once the attempt is closed; returns how many were lost.
    pub fn abandon(&mut self) -> usize {
        self.due = None;
        self.failures = 0;
        let lost = self.queue.len();
        self.queue.clear();
        lost
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Something is queued and the last send failed.
    pub fn is_stalled(&self) -> bool {
        self.failures > 0 && !self.queue.is_empty()
    }

    fn pop(&mut self, now: Instant) {
        self.queue.pop_front();
        self.due = if self.queue.is_empty() { None } else { Some(now) };
    }
}
