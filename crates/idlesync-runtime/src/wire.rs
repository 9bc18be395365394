//! Snapshot message decoding
//!
//! Message shape from the real-time channel:
//!
//! ```text
//! { serverTime, current_activity?: { type, itemId, timePerActionMs,
//!   initialQuantity, actionsRemaining, nextActionAt },
//!   state: { inventory, skills, silver, combat?, dungeon? } }
//! ```
//!
//! Only text that is not a JSON object rejects a message. Every field is read
//! loosely: numbers may arrive as JSON numbers or numeric strings, timestamps
//! also as RFC 3339 strings, and anything missing, negative or non-finite
//! falls back to a default. A missing `serverTime` is not an error; the
//! message is still authoritative, it just carries no clock reading.

use std::collections::HashMap;
use std::time::SystemTime;

use serde::Deserialize;
use serde_json::Value;

use idlesync_core::{
    ActivityKind, ActivityRecord, AuthoritativeSnapshot, CharacterSheet, CombatRecord,
    DungeonRecord, ItemId, ServerTime, SkillId, SkillProgress, SyncError, SyncResult,
};

#[derive(Debug, Deserialize)]
struct WireSnapshot {
    #[serde(rename = "serverTime", alias = "server_time", default)]
    server_time: Option<Value>,
    #[serde(alias = "currentActivity", default)]
    current_activity: Option<Value>,
    #[serde(default)]
    state: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireActivity {
    #[serde(rename = "type", alias = "kind")]
    kind: Option<Value>,
    #[serde(alias = "item_id")]
    item_id: Option<Value>,
    #[serde(alias = "time_per_action_ms")]
    time_per_action_ms: Option<Value>,
    #[serde(alias = "initial_quantity")]
    initial_quantity: Option<Value>,
    #[serde(alias = "actions_remaining")]
    actions_remaining: Option<Value>,
    #[serde(alias = "next_action_at")]
    next_action_at: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireState {
    inventory: Option<Value>,
    skills: Option<Value>,
    silver: Option<Value>,
    combat: Option<Value>,
    dungeon: Option<Value>,
}

/// Finite number from a JSON number or numeric string
fn loose_number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Non-negative count, saturating at `u32::MAX`
fn loose_count(value: Option<&Value>) -> Option<u32> {
    let n = loose_number(value)?;
    (n >= 0.0).then(|| n.floor().min(u32::MAX as f64) as u32)
}

fn loose_u64(value: Option<&Value>) -> Option<u64> {
    let n = loose_number(value)?;
    (n >= 0.0).then(|| n.floor().min(u64::MAX as f64) as u64)
}

fn loose_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Epoch milliseconds, or an RFC 3339 timestamp
fn loose_timestamp(value: Option<&Value>) -> Option<ServerTime> {
    if let Some(n) = loose_number(value) {
        if n < 0.0 || n > i64::MAX as f64 {
            return None;
        }
        return Some(ServerTime::from_millis(n.round() as i64));
    }
    let Value::String(s) = value? else {
        return None;
    };
    let at = humantime::parse_rfc3339_weak(s.trim()).ok()?;
    let millis = at.duration_since(SystemTime::UNIX_EPOCH).ok()?.as_millis();
    i64::try_from(millis).ok().map(ServerTime::from_millis)
}

fn decode_activity(value: Value) -> Option<ActivityRecord> {
    if value.is_null() {
        return None;
    }
    let wire: WireActivity = match serde_json::from_value(value) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed activity record");
            return None;
        }
    };

    let kind = loose_string(wire.kind.as_ref()).and_then(|k| ActivityKind::parse(&k));
    let Some(kind) = kind else {
        tracing::warn!(kind = ?wire.kind, "dropping activity with unknown type");
        return None;
    };
    let Some(item_id) = loose_string(wire.item_id.as_ref()).map(ItemId::new) else {
        tracing::warn!("dropping activity without an item");
        return None;
    };

    // Zero means "unknown"; the predictor substitutes its fallback
    let time_per_action_ms = loose_u64(wire.time_per_action_ms.as_ref()).unwrap_or(0);
    let initial = loose_count(wire.initial_quantity.as_ref());
    let remaining = loose_count(wire.actions_remaining.as_ref());
    let (initial_quantity, actions_remaining) = match (initial, remaining) {
        (Some(i), Some(r)) => (i, r),
        (Some(i), None) => (i, i),
        (None, Some(r)) => (r, r),
        (None, None) => (0, 0),
    };

    Some(ActivityRecord {
        kind,
        item_id,
        time_per_action_ms,
        initial_quantity,
        actions_remaining,
        next_action_at: loose_timestamp(wire.next_action_at.as_ref()),
    })
}

fn decode_skill(value: &Value) -> Option<SkillProgress> {
    match value {
        Value::Object(fields) => Some(SkillProgress::new(
            loose_count(fields.get("level")).unwrap_or(1),
            loose_u64(fields.get("experience").or_else(|| fields.get("xp"))).unwrap_or(0),
        )),
        other => loose_u64(Some(other)).map(|xp| SkillProgress::new(1, xp)),
    }
}

fn decode_combat(value: &Value) -> Option<CombatRecord> {
    let fields = value.as_object()?;
    Some(CombatRecord {
        started_at: loose_timestamp(fields.get("startedAt").or_else(|| fields.get("started_at")))?,
        opponent: loose_string(fields.get("opponent").or_else(|| fields.get("monsterId"))),
        round: loose_count(fields.get("round")),
    })
}

fn decode_dungeon(value: &Value) -> Option<DungeonRecord> {
    let fields = value.as_object()?;
    Some(DungeonRecord {
        started_at: loose_timestamp(fields.get("startedAt").or_else(|| fields.get("started_at")))?,
        dungeon_id: loose_string(fields.get("dungeonId").or_else(|| fields.get("dungeon_id"))),
        wave: loose_count(fields.get("wave")),
    })
}

fn decode_state(value: Option<Value>) -> CharacterSheet {
    let mut sheet = CharacterSheet::default();
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return sheet;
    };
    let wire: WireState = match serde_json::from_value(value) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::warn!(error = %e, "malformed character state, using empty sheet");
            return sheet;
        }
    };

    if let Some(Value::Object(items)) = wire.inventory {
        sheet.inventory = items
            .iter()
            .filter_map(|(id, count)| Some((ItemId::new(id.as_str()), loose_u64(Some(count))?)))
            .filter(|(id, _)| !id.is_empty())
            .collect::<HashMap<_, _>>();
    }
    if let Some(Value::Object(skills)) = wire.skills {
        sheet.skills = skills
            .iter()
            .filter_map(|(id, skill)| Some((SkillId::new(id.as_str()), decode_skill(skill)?)))
            .filter(|(id, _)| !id.is_empty())
            .collect();
    }
    sheet.silver = loose_u64(wire.silver.as_ref()).unwrap_or(0);
    sheet.combat = wire.combat.as_ref().and_then(decode_combat);
    sheet.dungeon = wire.dungeon.as_ref().and_then(decode_dungeon);
    sheet
}

/// A decoded snapshot message, possibly without a server clock reading
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotMessage {
    /// `None` when the message carried no usable `serverTime`
    pub server_time: Option<ServerTime>,
    pub activity: Option<ActivityRecord>,
    pub state: CharacterSheet,
}

impl SnapshotMessage {
    /// Snapshot stamped with the message's own time, or `fallback` without one
    pub fn into_snapshot(self, fallback: ServerTime) -> AuthoritativeSnapshot {
        AuthoritativeSnapshot {
            server_time: self.server_time.unwrap_or(fallback),
            activity: self.activity,
            state: self.state,
        }
    }
}

/// Decode one snapshot message
pub fn decode_snapshot(text: &str) -> SyncResult<SnapshotMessage> {
    let wire: WireSnapshot =
        serde_json::from_str(text).map_err(|e| SyncError::InvalidSnapshot(e.to_string()))?;

    let server_time = loose_timestamp(wire.server_time.as_ref());
    if server_time.is_none() {
        tracing::debug!(server_time = ?wire.server_time, "snapshot without a usable serverTime");
    }

    Ok(SnapshotMessage {
        server_time,
        activity: wire.current_activity.and_then(decode_activity),
        state: decode_state(wire.state),
    })
}
