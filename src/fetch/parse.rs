//! Regex-based extraction of record fields from database pages.
//!
//! The remote database renders one HTML page per entity. These parsers are
//! deliberately forgiving: a missing optional field stays at its default,
//! only a page without any recognizable title is rejected.

use std::sync::LazyLock;

use regex::Regex;

use super::error::FetchError;
use super::FetchOutcome;
use crate::record::{EntityRecord, ItemRecord, NpcRecord, QuestRecord, SpellRecord};
use crate::types::EntityKind;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern")
}

static NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)(?:item|spell|quest|npc) not found|this (?:item|spell|quest|npc) doesn't exist")
});
static ANY_TITLE: LazyLock<Regex> = LazyLock::new(|| re(r"<title>[^<]*Turtle WoW Database"));
static ITEM_TITLE: LazyLock<Regex> =
    LazyLock::new(|| re(r"<title>([^<]*) - Items - Turtle WoW Database</title>"));
static SPELL_TITLE: LazyLock<Regex> = LazyLock::new(|| re(r"<title>([^<]*?) - Spells"));
static QUEST_TITLE: LazyLock<Regex> = LazyLock::new(|| re(r"<title>([^<]*?) - Quests"));
static NPC_TITLE: LazyLock<Regex> = LazyLock::new(|| re(r"<title>([^<]*?) - NPCs"));

static ICON: LazyLock<Regex> = LazyLock::new(|| re(r"Icon\.create\('([^']+)',"));
static QUALITY: LazyLock<Regex> = LazyLock::new(|| re(r#"<b class="q(\d)">([^<]*)</b>"#));
static ITEM_LEVEL: LazyLock<Regex> = LazyLock::new(|| re(r"Level:\s*(\d+)"));
static REQUIRED_LEVEL: LazyLock<Regex> = LazyLock::new(|| re(r"Requires Level\s*(\d+)"));
static DISPLAY_ID: LazyLock<Regex> =
    LazyLock::new(|| re(r"Display ID:\s*(?:</td>\s*<td[^>]*>)?\s*(\d+)"));
static SLOT_TYPE: LazyLock<Regex> = LazyLock::new(|| re(r"<td>([^<]+)</td><th>([^<]+)</th>"));
static ARMOR: LazyLock<Regex> = LazyLock::new(|| re(r"(\d+)\s*Armor"));
static DURABILITY: LazyLock<Regex> = LazyLock::new(|| re(r"Durability\s*(\d+)\s*/\s*(\d+)"));
static FLAVOR_TEXT: LazyLock<Regex> = LazyLock::new(|| re(r#"<span class="q">"([^"]+)"</span>"#));
static ITEM_SET: LazyLock<Regex> = LazyLock::new(|| re(r"[?&]itemset=(\d+)"));
static SPELL_LINK: LazyLock<Regex> = LazyLock::new(|| re(r#"<a href="[?&]spell=(\d+)""#));
static GOLD: LazyLock<Regex> = LazyLock::new(|| re(r#"(\d+)<span class="moneygold">"#));
static SILVER: LazyLock<Regex> = LazyLock::new(|| re(r#"(\d+)<span class="moneysilver">"#));
static COPPER: LazyLock<Regex> = LazyLock::new(|| re(r#"(\d+)<span class="moneycopper">"#));

static SPELL_RANK: LazyLock<Regex> = LazyLock::new(|| re(r"(Rank \d+)"));
static SPELL_DESC_CELL: LazyLock<Regex> =
    LazyLock::new(|| re(r"<th[^>]*>Description</th></tr><tr><td[^>]*>(.*?)</td></tr>"));
static SPELL_USE: LazyLock<Regex> =
    LazyLock::new(|| re(r"((?:Use|Equip): .*?)(?:<br>|</div>|</td>|<table|</tr>)"));
static SPELL_SPAN: LazyLock<Regex> = LazyLock::new(|| re(r#"<span class="q">([^<]+)</span>"#));
static TAG: LazyLock<Regex> = LazyLock::new(|| re(r"<[^>]*>"));

static QUEST_LEVEL: LazyLock<Regex> = LazyLock::new(|| re(r"Level:\s*(-?\d+)"));
static QUEST_MIN_LEVEL: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)Requires level:?\s*(\d+)"));
static QUEST_OBJECTIVES: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?s)<h1[^>]*>.*?</h1>\s*(.*?)\s*<(?:table|h2|h3)"));
static QUEST_DETAILS: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?s)<h3[^>]*>Description</h3>\s*(.*?)\s*<(?:h2|h3|/div)"));
static QUEST_REWARDS: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?s)You will (?:also )?receive:(.*?)(?:<h2|<h3|$)"));
static QUEST_XP: LazyLock<Regex> = LazyLock::new(|| re(r"(\d[\d,]*)\s*experience"));
static REWARD_ITEM: LazyLock<Regex> =
    LazyLock::new(|| re(r#"<a href="[?&]item=(\d+)"[^>]*>[^<]*</a>(?:\s*\((\d+)\))?"#));

static NPC_SUBNAME: LazyLock<Regex> = LazyLock::new(|| re(r"&lt;([^&]+)&gt;"));
static NPC_LEVEL: LazyLock<Regex> = LazyLock::new(|| re(r"Level:\s*(\d+)(?:\s*-\s*(\d+))?"));
static NPC_MODEL: LazyLock<Regex> =
    LazyLock::new(|| re(r#"<meta property="og:image" content="([^"]+)""#));
static NPC_ZONE: LazyLock<Regex> =
    LazyLock::new(|| re(r#"<a href="[?&]zone=\d+"[^>]*>([^<]+)</a>"#));
static NPC_COORDS: LazyLock<Regex> =
    LazyLock::new(|| re(r#""coords":\s*\[\[\s*([\d.]+)\s*,\s*([\d.]+)"#));

/// Classify and parse one fetched page.
pub(crate) fn parse_page(kind: EntityKind, id: u32, html: &str) -> Result<FetchOutcome, FetchError> {
    if NOT_FOUND.is_match(html) {
        return Ok(FetchOutcome::NotFound);
    }

    let title = match kind {
        EntityKind::Item => &ITEM_TITLE,
        EntityKind::Spell => &SPELL_TITLE,
        EntityKind::Quest => &QUEST_TITLE,
        EntityKind::Npc => &NPC_TITLE,
    };
    let name = match capture(title, html) {
        Some(name) => decode_entities(name.trim()),
        // The site answers unknown IDs with its generic landing page.
        None if ANY_TITLE.is_match(html) => return Ok(FetchOutcome::NotFound),
        None => {
            return Err(FetchError::Parse {
                kind,
                id,
                reason: "no page title".to_string(),
            })
        }
    };
    if name.is_empty() {
        // Shell page: the ID is reserved upstream but carries no data.
        return Ok(FetchOutcome::NotFound);
    }

    let record = match kind {
        EntityKind::Item => EntityRecord::Item(parse_item(id, name, html)),
        EntityKind::Spell => EntityRecord::Spell(parse_spell(id, name, html)),
        EntityKind::Quest => EntityRecord::Quest(parse_quest(id, name, html)),
        EntityKind::Npc => EntityRecord::Npc(parse_npc(id, name, html)),
    };
    Ok(FetchOutcome::Found(record))
}

fn parse_item(id: u32, name: String, html: &str) -> ItemRecord {
    let mut item = ItemRecord {
        id,
        item_level: capture_num(&ITEM_LEVEL, html).unwrap_or(0),
        required_level: capture_num(&REQUIRED_LEVEL, html).unwrap_or(0),
        display_id: capture_num(&DISPLAY_ID, html).unwrap_or(0),
        armor: capture_num(&ARMOR, html).unwrap_or(0),
        description: capture(&FLAVOR_TEXT, html)
            .map(decode_entities)
            .unwrap_or_default(),
        set_id: capture_num(&ITEM_SET, html).unwrap_or(0),
        icon: icon(html),
        ..Default::default()
    };

    item.quality = QUALITY
        .captures_iter(html)
        .find(|c| decode_entities(&c[2]) == name)
        .or_else(|| QUALITY.captures(html))
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);

    if let Some(c) = SLOT_TYPE.captures(html) {
        item.inventory_type = inventory_type(c[1].trim());
        (item.class, item.subclass) = item_class(c[2].trim());
    }
    if item.class == 0 && item.armor > 0 {
        item.class = 4;
    }

    if let Some(c) = DURABILITY.captures(html) {
        item.max_durability = c[2].parse().unwrap_or(0);
    }

    // Spells linked after the set link are set bonuses, not item effects.
    let set_pos = ITEM_SET.find(html).map(|m| m.start()).unwrap_or(html.len());
    for c in SPELL_LINK.captures_iter(&html[..set_pos]) {
        let Ok(spell_id) = c[1].parse::<u32>() else {
            continue;
        };
        if !item.spell_ids.contains(&spell_id) {
            item.spell_ids.push(spell_id);
        }
        if item.spell_ids.len() == 5 {
            break;
        }
    }

    if html.contains("Sells for") {
        item.sell_price = parse_money(html);
    }
    item.name = name;
    item
}

fn parse_spell(id: u32, name: String, html: &str) -> SpellRecord {
    let raw = if let Some(d) = capture(&SPELL_DESC_CELL, html) {
        d.to_string()
    } else if let Some(d) = capture(&SPELL_USE, html) {
        d.to_string()
    } else {
        // Custom spells often carry their text in a bare quality span; take
        // the longest one that is not a rank label.
        SPELL_SPAN
            .captures_iter(html)
            .map(|c| c[1].to_string())
            .filter(|s| s.len() > 5 && !s.contains("Rank"))
            .max_by_key(|s| s.len())
            .unwrap_or_default()
    };

    SpellRecord {
        id,
        rank: capture(&SPELL_RANK, html).unwrap_or_default().to_string(),
        description: clean_text(&raw),
        icon: icon(html),
        name,
    }
}

fn parse_quest(id: u32, title: String, html: &str) -> QuestRecord {
    let mut quest = QuestRecord {
        id,
        level: capture_num(&QUEST_LEVEL, html).unwrap_or(0),
        min_level: capture_num(&QUEST_MIN_LEVEL, html).unwrap_or(0),
        objectives: capture(&QUEST_OBJECTIVES, html)
            .map(clean_text)
            .unwrap_or_default(),
        details: capture(&QUEST_DETAILS, html)
            .map(clean_text)
            .unwrap_or_default(),
        title,
        ..Default::default()
    };

    if let Some(xp) = capture(&QUEST_XP, html) {
        quest.reward_xp = xp.replace(',', "").parse().unwrap_or(0);
    }

    if let Some(rewards) = capture(&QUEST_REWARDS, html) {
        quest.reward_money = parse_money(rewards);
        for c in REWARD_ITEM.captures_iter(rewards).take(4) {
            let Ok(item_id) = c[1].parse::<u32>() else {
                continue;
            };
            let count = c
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(1);
            quest.reward_items.push((item_id, count));
        }
    }
    quest
}

fn parse_npc(id: u32, name: String, html: &str) -> NpcRecord {
    let mut npc = NpcRecord {
        id,
        subname: capture(&NPC_SUBNAME, html)
            .map(decode_entities)
            .unwrap_or_default(),
        model_image_url: capture(&NPC_MODEL, html).unwrap_or_default().to_string(),
        zone_name: capture(&NPC_ZONE, html)
            .map(|z| decode_entities(z.trim()))
            .unwrap_or_default(),
        name,
        ..Default::default()
    };

    if let Some(c) = NPC_LEVEL.captures(html) {
        npc.level_min = c[1].parse().unwrap_or(0);
        npc.level_max = c
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(npc.level_min);
    }
    if let Some(c) = NPC_COORDS.captures(html) {
        npc.map_x = c[1].parse().unwrap_or(0.0);
        npc.map_y = c[2].parse().unwrap_or(0.0);
    }
    npc
}

fn capture<'h>(re: &Regex, html: &'h str) -> Option<&'h str> {
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn capture_num<T: std::str::FromStr>(re: &Regex, html: &str) -> Option<T> {
    capture(re, html).and_then(|s| s.parse().ok())
}

fn icon(html: &str) -> String {
    capture(&ICON, html)
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Sum of the gold/silver/copper spans, in copper.
fn parse_money(html: &str) -> u64 {
    let part = |re: &Regex| capture_num::<u64>(re, html).unwrap_or(0);
    part(&GOLD) * 10_000 + part(&SILVER) * 100 + part(&COPPER)
}

fn inventory_type(slot: &str) -> u32 {
    match slot {
        "Head" => 1,
        "Neck" => 2,
        "Shoulder" => 3,
        "Shirt" => 4,
        "Chest" => 5,
        "Waist" => 6,
        "Legs" => 7,
        "Feet" => 8,
        "Wrists" => 9,
        "Hands" => 10,
        "Finger" => 11,
        "Trinket" => 12,
        "One-Hand" | "One-hand" => 13,
        "Shield" => 14,
        "Ranged" => 15,
        "Back" => 16,
        "Two-Hand" | "Two-hand" => 17,
        "Bag" => 18,
        "Tabard" => 19,
        "Robe" => 20,
        "Main Hand" => 21,
        "Off Hand" => 22,
        "Held In Off-hand" => 23,
        "Ammo" => 24,
        "Thrown" => 25,
        _ => 0,
    }
}

/// `(class, subclass)` for an armor or weapon type label.
fn item_class(type_name: &str) -> (u32, u32) {
    let armor = match type_name {
        "Cloth" => Some(1),
        "Leather" => Some(2),
        "Mail" => Some(3),
        "Plate" => Some(4),
        "Shield" => Some(6),
        "Libram" => Some(7),
        "Idol" => Some(8),
        "Totem" => Some(9),
        _ => None,
    };
    if let Some(sub) = armor {
        return (4, sub);
    }
    let weapon = match type_name {
        "Axe" => Some(0),
        "Two-Handed Axe" => Some(1),
        "Bow" => Some(2),
        "Gun" => Some(3),
        "Mace" => Some(4),
        "Two-Handed Mace" => Some(5),
        "Polearm" => Some(6),
        "Sword" => Some(7),
        "Two-Handed Sword" => Some(8),
        "Staff" => Some(10),
        "Fist Weapon" => Some(13),
        "Dagger" => Some(15),
        "Thrown" => Some(16),
        "Crossbow" => Some(18),
        "Wand" => Some(19),
        "Fishing Pole" => Some(20),
        _ => None,
    };
    weapon.map(|sub| (2, sub)).unwrap_or((0, 0))
}

/// Strip markup, keeping line breaks.
fn clean_text(raw: &str) -> String {
    let text = raw.replace("<br>", "\n").replace("<br />", "\n");
    decode_entities(TAG.replace_all(&text, "").trim())
}

fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
