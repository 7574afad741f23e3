use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of remote entity. Each kind owns an independent ID space,
/// cursor and sync pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Npc,
    Item,
    Spell,
    Quest,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Npc,
        EntityKind::Item,
        EntityKind::Spell,
        EntityKind::Quest,
    ];

    /// Key used in the `cursors` table and in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Npc => "npc",
            Self::Item => "item",
            Self::Spell => "spell",
            Self::Quest => "quest",
        }
    }

    /// Parse from the string stored in the database.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "npc" | "creature" => Some(Self::Npc),
            "item" => Some(Self::Item),
            "spell" => Some(Self::Spell),
            "quest" => Some(Self::Quest),
            _ => None,
        }
    }

    /// Name of the per-kind record table.
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Self::Npc => "npcs",
            Self::Item => "items",
            Self::Spell => "spells",
            Self::Quest => "quests",
        }
    }

    /// Query parameter the remote database uses for this kind (`?item=123`).
    pub(crate) fn query_key(&self) -> &'static str {
        self.as_str()
    }

    /// Fields that automated sync never overwrites once they hold a
    /// non-default value.
    pub fn protected_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Item => &["sell_price", "buy_price", "icon"],
            Self::Spell => &["description", "icon"],
            Self::Quest => &["reward_money"],
            Self::Npc => &["zone_name", "map_x", "map_y"],
        }
    }

    /// Human-readable label used in completion messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Npc => "NPC",
            Self::Item => "Item",
            Self::Spell => "Spell",
            Self::Quest => "Quest",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_entity_kind_legacy_alias() {
        assert_eq!(EntityKind::from_str("creature"), Some(EntityKind::Npc));
        assert_eq!(EntityKind::from_str("gameobject"), None);
    }

    #[test]
    fn test_tables_are_distinct() {
        let mut tables: Vec<_> = EntityKind::ALL.iter().map(|k| k.table()).collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), 4);
    }

    #[test]
    fn test_item_protects_price() {
        assert!(EntityKind::Item.protected_fields().contains(&"sell_price"));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&EntityKind::Quest).unwrap();
        assert_eq!(json, "\"quest\"");
    }
}
