//! Per-kind record shapes shared by the fetchers, the merge engine and the
//! state database.
//!
//! The same struct is used for the freshly parsed remote record and for the
//! persisted local row. Protected fields are documented on each struct and
//! listed in [`EntityKind::protected_fields`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::EntityKind;

/// Item template row.
///
/// Protected: `sell_price`, `buy_price`, `icon`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: u32,
    pub name: String,
    pub quality: u8,
    pub item_level: u32,
    pub required_level: u32,
    pub class: u32,
    pub subclass: u32,
    pub inventory_type: u32,
    pub display_id: u32,
    pub armor: u32,
    pub max_durability: u32,
    pub description: String,
    pub set_id: u32,
    pub spell_ids: Vec<u32>,
    /// Copper value; manual price overrides live here.
    pub sell_price: u64,
    pub buy_price: u64,
    pub icon: String,
}

/// Spell row.
///
/// Protected: `description`, `icon`. Custom spells often ship without a
/// description upstream, so a hand-entered one must survive re-syncs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellRecord {
    pub id: u32,
    pub name: String,
    pub rank: String,
    pub description: String,
    pub icon: String,
}

/// Quest template row.
///
/// Protected: `reward_money`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestRecord {
    pub id: u32,
    pub title: String,
    pub level: i32,
    pub min_level: u32,
    pub details: String,
    pub objectives: String,
    pub reward_xp: u32,
    pub reward_money: u64,
    /// `(item_id, count)` pairs, at most four.
    pub reward_items: Vec<(u32, u32)>,
}

/// Creature row.
///
/// Protected: `zone_name`, `map_x`, `map_y` (hand-placed map pins).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NpcRecord {
    pub id: u32,
    pub name: String,
    pub subname: String,
    pub level_min: u32,
    pub level_max: u32,
    pub model_image_url: String,
    pub zone_name: String,
    pub map_x: f64,
    pub map_y: f64,
}

/// A record of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityRecord {
    Npc(NpcRecord),
    Item(ItemRecord),
    Spell(SpellRecord),
    Quest(QuestRecord),
}

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Npc(_) => EntityKind::Npc,
            Self::Item(_) => EntityKind::Item,
            Self::Spell(_) => EntityKind::Spell,
            Self::Quest(_) => EntityKind::Quest,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Self::Npc(r) => r.id,
            Self::Item(r) => r.id,
            Self::Spell(r) => r.id,
            Self::Quest(r) => r.id,
        }
    }

    /// Display name (quest title for quests).
    pub fn name(&self) -> &str {
        match self {
            Self::Npc(r) => &r.name,
            Self::Item(r) => &r.name,
            Self::Spell(r) => &r.name,
            Self::Quest(r) => &r.title,
        }
    }

    /// Icon name for kinds that carry one.
    pub fn icon(&self) -> Option<&str> {
        match self {
            Self::Item(r) => Some(&r.icon),
            Self::Spell(r) => Some(&r.icon),
            Self::Npc(_) | Self::Quest(_) => None,
        }
    }
}

/// A persisted record together with its bookkeeping metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord {
    pub record: EntityRecord,
    pub synced_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_id() {
        let r = EntityRecord::Quest(QuestRecord {
            id: 40_001,
            title: "The Tower of Lapidis".into(),
            ..Default::default()
        });
        assert_eq!(r.kind(), EntityKind::Quest);
        assert_eq!(r.id(), 40_001);
        assert_eq!(r.name(), "The Tower of Lapidis");
        assert_eq!(r.icon(), None);
    }

    #[test]
    fn test_serde_tagged_by_kind() {
        let r = EntityRecord::Item(ItemRecord {
            id: 7,
            name: "Worn Shortsword".into(),
            ..Default::default()
        });
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["kind"], "item");
        let back: EntityRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }
}
