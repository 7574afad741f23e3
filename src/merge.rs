//! Protected-field merge.
//!
//! Combines a freshly fetched record with the existing local one. Plain
//! fields always follow upstream; protected fields keep their local value
//! once it is non-default. The merge is pure: the only time-dependent part
//! is the `synced_at` stamp, which the caller passes in.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::record::{EntityRecord, ItemRecord, LocalRecord, NpcRecord, QuestRecord, SpellRecord};
use crate::types::EntityKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("cannot merge {incoming} record into existing {existing} record")]
    KindMismatch {
        existing: EntityKind,
        incoming: EntityKind,
    },

    #[error("cannot merge {kind} {incoming} into existing record {existing}")]
    IdMismatch {
        kind: EntityKind,
        existing: u32,
        incoming: u32,
    },

    #[error("{0} records have no icon field")]
    NoIcon(EntityKind),

    #[error("{kind} {id} does not exist locally")]
    MissingRecord { kind: EntityKind, id: u32 },
}

/// Generic icons the source serves when an entity has no real one.
pub const PLACEHOLDER_ICONS: [&str; 3] = ["inv_misc_questionmark", "temp", "template"];

/// True when `icon` is empty or one of the [`PLACEHOLDER_ICONS`], in any case.
pub fn is_missing_icon(icon: &str) -> bool {
    icon.is_empty()
        || PLACEHOLDER_ICONS
            .iter()
            .any(|placeholder| icon.eq_ignore_ascii_case(placeholder))
}

/// Which fields a merge may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeScope {
    /// Every field, subject to the protected-field rules.
    #[default]
    Full,
    /// Only the icon; everything else stays as stored.
    Icon,
}

/// Merge `incoming` into `existing` over all fields.
pub fn merge(
    existing: Option<&EntityRecord>,
    incoming: EntityRecord,
    synced_at: DateTime<Utc>,
) -> Result<LocalRecord, MergeError> {
    merge_scoped(existing, incoming, MergeScope::Full, synced_at)
}

/// Merge restricted to `scope`.
pub fn merge_scoped(
    existing: Option<&EntityRecord>,
    incoming: EntityRecord,
    scope: MergeScope,
    synced_at: DateTime<Utc>,
) -> Result<LocalRecord, MergeError> {
    if let Some(existing) = existing {
        if existing.kind() != incoming.kind() {
            return Err(MergeError::KindMismatch {
                existing: existing.kind(),
                incoming: incoming.kind(),
            });
        }
        if existing.id() != incoming.id() {
            return Err(MergeError::IdMismatch {
                kind: existing.kind(),
                existing: existing.id(),
                incoming: incoming.id(),
            });
        }
    }

    let record = match scope {
        MergeScope::Full => match existing {
            None => reset_protected(incoming),
            Some(existing) => merge_full(existing, incoming),
        },
        MergeScope::Icon => {
            let existing = existing.ok_or(MergeError::MissingRecord {
                kind: incoming.kind(),
                id: incoming.id(),
            })?;
            merge_icon(existing, incoming)?
        }
    };

    Ok(LocalRecord { record, synced_at })
}

/// First sighting: the protected fields start at their defaults.
fn reset_protected(incoming: EntityRecord) -> EntityRecord {
    match incoming {
        EntityRecord::Item(r) => EntityRecord::Item(ItemRecord {
            sell_price: 0,
            buy_price: 0,
            icon: String::new(),
            ..r
        }),
        EntityRecord::Spell(r) => EntityRecord::Spell(SpellRecord {
            description: String::new(),
            icon: String::new(),
            ..r
        }),
        EntityRecord::Quest(r) => EntityRecord::Quest(QuestRecord {
            reward_money: 0,
            ..r
        }),
        EntityRecord::Npc(r) => EntityRecord::Npc(NpcRecord {
            zone_name: String::new(),
            map_x: 0.0,
            map_y: 0.0,
            ..r
        }),
    }
}

fn merge_full(existing: &EntityRecord, incoming: EntityRecord) -> EntityRecord {
    match (existing, incoming) {
        (EntityRecord::Item(old), EntityRecord::Item(new)) => EntityRecord::Item(ItemRecord {
            sell_price: keep_u64(old.sell_price, new.sell_price),
            buy_price: keep_u64(old.buy_price, new.buy_price),
            icon: keep_icon(&old.icon, new.icon),
            ..new
        }),
        (EntityRecord::Spell(old), EntityRecord::Spell(new)) => EntityRecord::Spell(SpellRecord {
            description: keep_str(&old.description, new.description),
            icon: keep_icon(&old.icon, new.icon),
            ..new
        }),
        (EntityRecord::Quest(old), EntityRecord::Quest(new)) => EntityRecord::Quest(QuestRecord {
            reward_money: keep_u64(old.reward_money, new.reward_money),
            ..new
        }),
        (EntityRecord::Npc(old), EntityRecord::Npc(new)) => {
            // Coordinates are a pair; a pinned location keeps both halves.
            let pinned = old.map_x != 0.0 || old.map_y != 0.0;
            EntityRecord::Npc(NpcRecord {
                zone_name: keep_str(&old.zone_name, new.zone_name),
                map_x: if pinned { old.map_x } else { new.map_x },
                map_y: if pinned { old.map_y } else { new.map_y },
                ..new
            })
        }
        // Kinds were checked by the caller.
        (_, new) => new,
    }
}

fn merge_icon(existing: &EntityRecord, incoming: EntityRecord) -> Result<EntityRecord, MergeError> {
    let mut merged = existing.clone();
    match (&mut merged, incoming) {
        (EntityRecord::Item(old), EntityRecord::Item(new)) => {
            old.icon = keep_icon(&old.icon, new.icon);
        }
        (EntityRecord::Spell(old), EntityRecord::Spell(new)) => {
            old.icon = keep_icon(&old.icon, new.icon);
        }
        (other, _) => return Err(MergeError::NoIcon(other.kind())),
    }
    Ok(merged)
}

fn keep_u64(existing: u64, incoming: u64) -> u64 {
    if existing != 0 {
        existing
    } else {
        incoming
    }
}

fn keep_str(existing: &str, incoming: String) -> String {
    if existing.is_empty() {
        incoming
    } else {
        existing.to_string()
    }
}

/// A placeholder counts as unset, but is never swapped for an empty icon.
fn keep_icon(existing: &str, incoming: String) -> String {
    if is_missing_icon(existing) && !incoming.is_empty() {
        incoming
    } else {
        existing.to_string()
    }
}
