//! Record-level normalisation of listening-history exports.
//!
//! Two export generations exist. The current one (`endsong_*.json`) keys each
//! record by `ts` and spells metadata out in full; the legacy one
//! (`StreamingHistory*.json`) uses `endTime` and short field names. The
//! variant is decided per record, from its shape alone.

use serde_json::{Map, Value};
use timeline_core::models::Play;
use timeline_core::time_utils::TimezoneHandler;
use tracing::debug;

/// Placeholder for a missing track or artist name.
pub const UNKNOWN: &str = "Unknown";

/// Which export schema a record follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportVariant {
    /// Current export, discriminated by a `ts` key.
    New,
    /// Legacy export.
    Old,
}

/// Source keys for the four canonical fields.
struct FieldKeys {
    ts: &'static str,
    ms: &'static str,
    track: &'static str,
    artist: &'static str,
}

const NEW_EXPORT_KEYS: FieldKeys = FieldKeys {
    ts: "ts",
    ms: "ms_played",
    track: "master_metadata_track_name",
    artist: "master_metadata_album_artist_name",
};

const OLD_EXPORT_KEYS: FieldKeys = FieldKeys {
    ts: "endTime",
    ms: "msPlayed",
    track: "trackName",
    artist: "artistName",
};

/// A record mapped to canonical fields, before timestamp validation.
///
/// `ts` is `None` when the source timestamp was present but could not be
/// resolved to an instant; such records never become a [`Play`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRecord {
    pub ts: Option<i64>,
    pub ms: u64,
    pub track: String,
    pub artist: String,
}

impl MappedRecord {
    pub fn into_play(self) -> Option<Play> {
        Some(Play {
            ts: self.ts?,
            ms: self.ms,
            track: self.track,
            artist: self.artist,
        })
    }
}

/// Pick the schema of a record: the presence of `ts` (even as `null`) marks
/// the current export.
pub fn detect_variant(record: &Map<String, Value>) -> ExportVariant {
    if record.contains_key("ts") {
        ExportVariant::New
    } else {
        ExportVariant::Old
    }
}

/// Map a record of either schema.
pub fn map_record(record: &Map<String, Value>, tz: &TimezoneHandler) -> MappedRecord {
    match detect_variant(record) {
        ExportVariant::New => map_new_export(record, tz),
        ExportVariant::Old => map_old_export(record, tz),
    }
}

pub fn map_new_export(record: &Map<String, Value>, tz: &TimezoneHandler) -> MappedRecord {
    map_with_keys(record, &NEW_EXPORT_KEYS, tz)
}

pub fn map_old_export(record: &Map<String, Value>, tz: &TimezoneHandler) -> MappedRecord {
    map_with_keys(record, &OLD_EXPORT_KEYS, tz)
}

fn map_with_keys(
    record: &Map<String, Value>,
    keys: &FieldKeys,
    tz: &TimezoneHandler,
) -> MappedRecord {
    MappedRecord {
        ts: resolve_timestamp(record.get(keys.ts), tz),
        ms: resolve_ms(record.get(keys.ms)),
        track: resolve_name(record.get(keys.track)),
        artist: resolve_name(record.get(keys.artist)),
    }
}

// ── Field resolution ──────────────────────────────────────────────────────────

/// Absent, `null` and empty-string timestamps resolve to `0`. Strings are
/// parsed; numbers are already epoch milliseconds.
fn resolve_timestamp(value: Option<&Value>, tz: &TimezoneHandler) -> Option<i64> {
    match value {
        None | Some(Value::Null) => Some(0),
        Some(Value::String(s)) if s.is_empty() => Some(0),
        Some(Value::String(s)) => tz.parse_timestamp(s),
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Some(other) => {
            debug!("unsupported timestamp value {}", other);
            None
        }
    }
}

fn resolve_ms(value: Option<&Value>) -> u64 {
    match value {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_u64()
            .or_else(|| {
                v.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f.trunc() as u64)
            })
            .unwrap_or_else(|| {
                debug!("unsupported ms value {}, defaulting to 0", v);
                0
            }),
    }
}

fn resolve_name(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => UNKNOWN.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
