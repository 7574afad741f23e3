//! Lazy ascending ID sequence for one run, plus the open-ended bound policy.

use tokio_util::sync::CancellationToken;

/// Decides when an open-ended run has walked past the last remote ID.
///
/// Fed every resolved ID in ascending order (watermark order), with whether
/// it produced a record.
pub trait BoundPolicy: Send {
    fn observe(&mut self, id: u32, found: bool);

    fn exhausted(&self) -> bool;
}

/// Fires after `threshold` consecutive IDs resolved without a record.
///
/// A threshold of 0 disables the policy.
#[derive(Debug, Clone)]
pub struct TrailingMissPolicy {
    threshold: u32,
    misses: u32,
}

impl TrailingMissPolicy {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            misses: 0,
        }
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.misses
    }
}

impl BoundPolicy for TrailingMissPolicy {
    fn observe(&mut self, _id: u32, found: bool) {
        if found {
            self.misses = 0;
        } else {
            self.misses = self.misses.saturating_add(1);
        }
    }

    fn exhausted(&self) -> bool {
        self.threshold > 0 && self.misses >= self.threshold
    }
}

/// Yields `start, start + 1, ...` up to the run's end.
///
/// The end is the smaller of `start + batch_size - 1` and `max_id` when
/// either is given; otherwise the sequence is open and ends only when
/// `halt` is cancelled (by a stop request or the bound policy).
#[derive(Debug)]
pub struct Dispatcher {
    next: u32,
    end: Option<u32>,
    halt: CancellationToken,
    done: bool,
}

impl Dispatcher {
    pub fn new(
        start_id: u32,
        batch_size: Option<u32>,
        max_id: Option<u32>,
        halt: CancellationToken,
    ) -> Self {
        let batch_end =
            batch_size.map(|n| start_id.saturating_add(n.saturating_sub(1)));
        let end = match (batch_end, max_id) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            next: start_id,
            end,
            halt,
            done: false,
        }
    }

    /// Last ID this run will dispatch, if bounded.
    pub fn end(&self) -> Option<u32> {
        self.end
    }
}

impl Iterator for Dispatcher {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.done || self.halt.is_cancelled() {
            self.done = true;
            return None;
        }
        if self.end.is_some_and(|end| self.next > end) {
            self.done = true;
            return None;
        }
        let id = self.next;
        match self.next.checked_add(1) {
            Some(n) => self.next = n,
            None => self.done = true,
        }
        Some(id)
    }
}
