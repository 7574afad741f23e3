//! Engine tuning knobs.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::retry::RetryConfig;
use crate::types::EntityKind;

/// Per-kind pipeline settings.
#[derive(Debug, Clone, PartialEq)]
pub struct KindConfig {
    /// Concurrent fetches in a run.
    pub workers: usize,
    /// Minimum spacing between two requests of the same run.
    pub min_request_interval: Duration,
    /// Hard upper bound on dispatched IDs.
    pub max_id: Option<u32>,
    /// Consecutive misses that end an open-ended run; 0 disables.
    pub miss_threshold: u32,
}

impl KindConfig {
    pub fn defaults_for(kind: EntityKind) -> Self {
        let (workers, miss_threshold) = match kind {
            // Item IDs have long dead stretches between the vanilla range
            // and the custom ranges.
            EntityKind::Item => (10, 10_000),
            EntityKind::Spell => (4, 2_000),
            EntityKind::Quest => (4, 2_000),
            EntityKind::Npc => (2, 2_000),
        };
        Self {
            workers,
            min_request_interval: Duration::from_millis(50),
            max_id: None,
            miss_threshold,
        }
    }
}

/// Settings shared by every run of a coordinator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub kinds: BTreeMap<EntityKind, KindConfig>,
    pub retry: RetryConfig,
    /// Deadline for a single fetch attempt.
    pub fetch_timeout: Duration,
    /// Persist the cursor after this many watermark advances.
    pub cursor_flush_every: u32,
    /// Progress events buffered per subscriber before the oldest is dropped.
    pub progress_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kinds: EntityKind::ALL
                .into_iter()
                .map(|k| (k, KindConfig::defaults_for(k)))
                .collect(),
            retry: RetryConfig::default(),
            fetch_timeout: Duration::from_secs(10),
            cursor_flush_every: 50,
            progress_buffer: 256,
        }
    }
}

impl EngineConfig {
    pub fn kind(&self, kind: EntityKind) -> KindConfig {
        self.kinds
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| KindConfig::defaults_for(kind))
    }

    pub fn kind_mut(&mut self, kind: EntityKind) -> &mut KindConfig {
        self.kinds
            .entry(kind)
            .or_insert_with(|| KindConfig::defaults_for(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_worker_counts() {
        let config = EngineConfig::default();
        assert_eq!(config.kind(EntityKind::Item).workers, 10);
        assert_eq!(config.kind(EntityKind::Spell).workers, 4);
        assert_eq!(config.kind(EntityKind::Quest).workers, 4);
        assert_eq!(config.kind(EntityKind::Npc).workers, 2);
    }

    #[test]
    fn test_kind_mut_overrides_single_kind() {
        let mut config = EngineConfig::default();
        config.kind_mut(EntityKind::Item).max_id = Some(5);
        assert_eq!(config.kind(EntityKind::Item).max_id, Some(5));
        assert_eq!(config.kind(EntityKind::Npc).max_id, None);
    }

    #[test]
    fn test_missing_kind_falls_back_to_defaults() {
        let config = EngineConfig {
            kinds: BTreeMap::new(),
            ..Default::default()
        };
        assert_eq!(
            config.kind(EntityKind::Quest),
            KindConfig::defaults_for(EntityKind::Quest)
        );
    }
}
