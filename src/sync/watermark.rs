//! Gap-free watermark over out-of-order completions.

use std::collections::BTreeMap;

/// A newly contiguous prefix produced by [`WatermarkTracker::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    pub previous: u32,
    pub last_contiguous_id: u32,
    /// IDs that joined the prefix, ascending, with whether each was Found.
    pub drained: Vec<(u32, bool)>,
}

/// Tracks the highest ID `N` such that every ID from the run's start up to
/// `N` has reached a terminal outcome.
///
/// Completed IDs above the watermark wait in an ordered map until the gap
/// below them closes. The watermark never passes an ID that has not been
/// reported.
#[derive(Debug)]
pub struct WatermarkTracker {
    last: u32,
    pending: BTreeMap<u32, bool>,
    highest_found: u32,
    completed: u64,
}

impl WatermarkTracker {
    /// Tracker for a run whose first ID is `start_id` (at least 1).
    pub fn new(start_id: u32) -> Self {
        Self {
            last: start_id.saturating_sub(1),
            pending: BTreeMap::new(),
            highest_found: 0,
            completed: 0,
        }
    }

    pub fn last_contiguous_id(&self) -> u32 {
        self.last
    }

    /// Highest ID reported as Found so far.
    pub fn highest_found(&self) -> u32 {
        self.highest_found
    }

    /// Terminal outcomes accepted so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// IDs reported but still waiting on a gap.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Record a terminal outcome for `id`.
    ///
    /// Returns the advance when the contiguous prefix grew. Duplicate or
    /// already-covered IDs are ignored.
    pub fn complete(&mut self, id: u32, found: bool) -> Option<Advance> {
        if id <= self.last || self.pending.contains_key(&id) {
            tracing::debug!(id, last = self.last, "Ignoring duplicate completion");
            return None;
        }
        self.pending.insert(id, found);
        self.completed += 1;
        if found {
            self.highest_found = self.highest_found.max(id);
        }

        let previous = self.last;
        let mut drained = Vec::new();
        while let Some(next) = self.last.checked_add(1) {
            let Some(found) = self.pending.remove(&next) else {
                break;
            };
            drained.push((next, found));
            self.last = next;
        }

        (!drained.is_empty()).then(|| Advance {
            previous,
            last_contiguous_id: self.last,
            drained,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_in_order_advances_each_time() {
        let mut t = WatermarkTracker::new(1);
        for id in 1..=3 {
            let adv = t.complete(id, true).unwrap();
            assert_eq!(adv.last_contiguous_id, id);
        }
        assert_eq!(t.last_contiguous_id(), 3);
    }

    #[test]
    fn test_gap_holds_watermark() {
        let mut t = WatermarkTracker::new(1);
        assert!(t.complete(2, true).is_none());
        assert!(t.complete(3, false).is_none());
        assert_eq!(t.last_contiguous_id(), 0);
        assert_eq!(t.pending_len(), 2);

        let adv = t.complete(1, false).unwrap();
        assert_eq!(adv.previous, 0);
        assert_eq!(adv.last_contiguous_id, 3);
        assert_eq!(adv.drained, vec![(1, false), (2, true), (3, false)]);
        assert_eq!(t.pending_len(), 0);
    }

    #[test]
    fn test_starts_below_start_id() {
        let mut t = WatermarkTracker::new(500);
        assert_eq!(t.last_contiguous_id(), 499);
        assert!(t.complete(501, true).is_none());
        assert_eq!(t.complete(500, true).unwrap().last_contiguous_id, 501);
    }

    #[test]
    fn test_duplicates_ignored() {
        let mut t = WatermarkTracker::new(1);
        t.complete(1, true);
        assert!(t.complete(1, true).is_none());
        t.complete(3, true);
        assert!(t.complete(3, false).is_none());
        assert_eq!(t.completed(), 2);
    }

    #[test]
    fn test_highest_found_ignores_misses() {
        let mut t = WatermarkTracker::new(1);
        t.complete(1, true);
        t.complete(7, false);
        t.complete(4, true);
        assert_eq!(t.highest_found(), 4);
    }

    #[test]
    fn test_saturates_at_u32_max() {
        let mut t = WatermarkTracker::new(u32::MAX);
        let adv = t.complete(u32::MAX, true).unwrap();
        assert_eq!(adv.last_contiguous_id, u32::MAX);
    }

    proptest! {
        /// Any completion order of 1..=N ends at N, never moves backwards and
        /// only ever covers reported IDs.
        #[test]
        fn watermark_is_gap_free(order in (1u32..200).prop_flat_map(|n| {
            Just((1..=n).collect::<Vec<u32>>()).prop_shuffle()
        })) {
            let n = order.len() as u32;
            let mut t = WatermarkTracker::new(1);
            let mut seen = std::collections::HashSet::new();
            let mut last = 0;

            for id in order {
                seen.insert(id);
                if let Some(adv) = t.complete(id, id % 3 == 0) {
                    prop_assert!(adv.last_contiguous_id > last);
                    prop_assert_eq!(adv.previous, last);
                    last = adv.last_contiguous_id;
                }
                for covered in 1..=t.last_contiguous_id() {
                    prop_assert!(seen.contains(&covered));
                }
            }

            prop_assert_eq!(t.last_contiguous_id(), n);
            prop_assert_eq!(t.pending_len(), 0);
        }
    }
}
