//! Export file discovery and ingestion.
//!
//! Reads every export file concurrently, then normalises all records into a
//! single [`Play`] sequence sorted by timestamp.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use timeline_core::error::{Result, TimelineError};
use timeline_core::models::Play;
use timeline_core::time_utils::TimezoneHandler;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::schema::{detect_variant, map_record, ExportVariant, MappedRecord};

// ── File sources ──────────────────────────────────────────────────────────────

/// Anything that can hand over the full text of an export file.
pub trait FileLike {
    /// Name used to identify the file in errors and logs.
    fn name(&self) -> &str;

    /// Read the whole file as UTF-8 text.
    fn read_text(&self) -> impl Future<Output = std::io::Result<String>> + Send;
}

/// An export file on disk.
#[derive(Debug, Clone)]
pub struct PathFile {
    path: PathBuf,
    name: String,
}

impl PathFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileLike for PathFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_text(&self) -> impl Future<Output = std::io::Result<String>> + Send {
        let path = self.path.clone();
        async move { tokio::fs::read_to_string(path).await }
    }
}

/// Export content that is already in memory, e.g. an uploaded buffer.
#[derive(Debug, Clone)]
pub struct InMemoryFile {
    name: String,
    text: String,
}

impl InMemoryFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

impl FileLike for InMemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_text(&self) -> impl Future<Output = std::io::Result<String>> + Send {
        let text = self.text.clone();
        async move { Ok(text) }
    }
}

/// Find all `.json` files recursively under `dir`, sorted by path.
pub fn find_json_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Export path does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("json"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

// ── Options ───────────────────────────────────────────────────────────────────

/// What to do when a single file cannot be read or parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileErrorPolicy {
    /// Fail the whole ingestion; no partial result.
    #[default]
    Abort,
    /// Log a warning and leave the file's records out.
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Zone for timestamps that carry no offset.
    pub timezone: TimezoneHandler,
    /// Per-file read limit; exceeding it counts as a read failure.
    pub read_timeout: Option<Duration>,
    pub on_file_error: FileErrorPolicy,
}

// ── Ingestion ─────────────────────────────────────────────────────────────────

/// Ingest export files using the host timezone and all-or-nothing failure.
pub async fn ingest<F>(files: Vec<F>) -> Result<Vec<Play>>
where
    F: FileLike + Send + Sync + 'static,
{
    ingest_with(files, &IngestOptions::default()).await
}

/// Ingest export files into a timestamp-sorted [`Play`] sequence.
///
/// Reads run concurrently; records are parsed and mapped afterwards in input
/// file order, so the result and any reported error do not depend on which
/// read finished first.
pub async fn ingest_with<F>(files: Vec<F>, options: &IngestOptions) -> Result<Vec<Play>>
where
    F: FileLike + Send + Sync + 'static,
{
    let file_count = files.len();
    let texts = read_all(files, options.read_timeout).await?;

    let mut stats = IngestStats::default();
    let mut mapped: Vec<MappedRecord> = Vec::new();

    for (name, text) in texts {
        let outcome = text.and_then(|text| parse_records(&name, &text));
        let records = match (outcome, options.on_file_error) {
            (Ok(records), _) => records,
            (Err(e), FileErrorPolicy::Skip) => {
                warn!("Skipping {}: {}", name, e);
                stats.files_skipped += 1;
                continue;
            }
            (Err(e), FileErrorPolicy::Abort) => return Err(e),
        };

        let file_stats = map_records(&records, &options.timezone, &mut mapped);
        debug!(
            "File {}: {} records ({} new export, {} old export)",
            name, file_stats.records, file_stats.new_export, file_stats.old_export,
        );
        stats.merge(&file_stats);
    }

    let mut plays = retain_resolved(mapped);
    stats.dropped = stats.records - plays.len();
    sort_plays(&mut plays);

    debug!(
        "Ingested {} plays from {} files ({} records, {} dropped, {} files skipped)",
        plays.len(),
        file_count,
        stats.records,
        stats.dropped,
        stats.files_skipped,
    );

    Ok(plays)
}

/// Read every file concurrently and return `(name, text)` in input order.
async fn read_all<F>(
    files: Vec<F>,
    timeout: Option<Duration>,
) -> Result<Vec<(String, Result<String>)>>
where
    F: FileLike + Send + Sync + 'static,
{
    let mut set = JoinSet::new();
    for (index, file) in files.into_iter().enumerate() {
        set.spawn(async move {
            let name = file.name().to_string();
            let text = read_one(&file, timeout).await;
            (index, name, text)
        });
    }

    let mut slots: Vec<Option<(String, Result<String>)>> = Vec::new();
    slots.resize_with(set.len(), || None);

    while let Some(joined) = set.join_next().await {
        let (index, name, text) = joined.map_err(|e| TimelineError::Task(e.to_string()))?;
        slots[index] = Some((name, text));
    }

    Ok(slots.into_iter().flatten().collect())
}

async fn read_one<F: FileLike>(file: &F, timeout: Option<Duration>) -> Result<String> {
    let read = match timeout {
        Some(limit) => tokio::time::timeout(limit, file.read_text())
            .await
            .map_err(|_| TimelineError::ReadTimeout {
                file: file.name().to_string(),
                timeout: limit,
            })?,
        None => file.read_text().await,
    };

    read.map_err(|source| TimelineError::FileRead {
        file: file.name().to_string(),
        source,
    })
}

// ── Pipeline stages ───────────────────────────────────────────────────────────

/// Parse one file's text into its record objects.
pub fn parse_records(file: &str, text: &str) -> Result<Vec<Map<String, Value>>> {
    let value: Value = serde_json::from_str(text).map_err(|source| TimelineError::JsonParse {
        file: file.to_string(),
        source,
    })?;

    let Value::Array(rows) = value else {
        return Err(TimelineError::NotASequence {
            file: file.to_string(),
            found: json_type_name(&value),
        });
    };

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| match row {
            Value::Object(map) => Ok(map),
            _ => Err(TimelineError::InvalidRecord {
                file: file.to_string(),
                index,
            }),
        })
        .collect()
}

/// Map records onto `out`, returning per-variant counts.
fn map_records(
    records: &[Map<String, Value>],
    tz: &TimezoneHandler,
    out: &mut Vec<MappedRecord>,
) -> IngestStats {
    let mut stats = IngestStats::default();
    for record in records {
        stats.records += 1;
        match detect_variant(record) {
            ExportVariant::New => stats.new_export += 1,
            ExportVariant::Old => stats.old_export += 1,
        }
        out.push(map_record(record, tz));
    }
    stats
}

/// Keep only records whose timestamp resolved to an instant.
pub fn retain_resolved(mapped: Vec<MappedRecord>) -> Vec<Play> {
    mapped.into_iter().filter_map(MappedRecord::into_play).collect()
}

/// Sort ascending by timestamp; equal timestamps keep their input order.
pub fn sort_plays(plays: &mut [Play]) {
    plays.sort_by_key(|p| p.ts);
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Default)]
struct IngestStats {
    records: usize,
    new_export: usize,
    old_export: usize,
    dropped: usize,
    files_skipped: usize,
}

impl IngestStats {
    fn merge(&mut self, other: &IngestStats) {
        self.records += other.records;
        self.new_export += other.new_export;
        self.old_export += other.old_export;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;
    use std::io::Write;
    use tempfile::TempDir;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn utc_options() -> IngestOptions {
        IngestOptions {
            timezone: TimezoneHandler::with_tz(Tz::UTC),
            ..IngestOptions::default()
        }
    }

    fn millis(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .timestamp_millis()
    }

    fn new_export(ts: &str, track: &str) -> Value {
        serde_json::json!({
            "ts": ts,
            "ms_played": 1000,
            "master_metadata_track_name": track,
            "master_metadata_album_artist_name": "Artist",
        })
    }

    fn old_export(end_time: &str, track: &str) -> Value {
        serde_json::json!({
            "endTime": end_time,
            "msPlayed": 2000,
            "trackName": track,
            "artistName": "Artist",
        })
    }

    fn file(name: &str, rows: Vec<Value>) -> InMemoryFile {
        InMemoryFile::new(name, Value::Array(rows).to_string())
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, "{}", content).unwrap();
        path
    }

    struct SlowFile;

    impl FileLike for SlowFile {
        fn name(&self) -> &str {
            "slow.json"
        }

        fn read_text(&self) -> impl Future<Output = std::io::Result<String>> + Send {
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("[]".to_string())
            }
        }
    }

    // ── ingest ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_ingest_merges_both_schemas_sorted() {
        let files = vec![
            file(
                "endsong_0.json",
                vec![
                    new_export("2024-01-03T09:00:00Z", "third"),
                    new_export("2024-01-01T09:00:00Z", "first"),
                ],
            ),
            file(
                "StreamingHistory0.json",
                vec![old_export("2024-01-02 09:00", "second")],
            ),
        ];

        let plays = ingest_with(files, &utc_options()).await.unwrap();
        let tracks: Vec<&str> = plays.iter().map(|p| p.track.as_str()).collect();
        assert_eq!(tracks, vec!["first", "second", "third"]);
        assert_eq!(plays[1].ts, millis(2024, 1, 2, 9, 0));
        assert_eq!(plays[1].ms, 2000);
    }

    #[tokio::test]
    async fn test_ingest_mixed_variants_in_one_file() {
        let files = vec![file(
            "mixed.json",
            vec![
                old_export("2024-01-01 12:00", "old"),
                new_export("2024-01-01T11:00:00Z", "new"),
            ],
        )];
        let plays = ingest_with(files, &utc_options()).await.unwrap();
        assert_eq!(plays.len(), 2);
        assert_eq!(plays[0].track, "new");
        assert_eq!(plays[1].track, "old");
    }

    #[tokio::test]
    async fn test_ingest_order_independent_of_file_order() {
        let a = file("a.json", vec![new_export("2024-02-01T00:00:00Z", "a")]);
        let b = file("b.json", vec![new_export("2024-01-01T00:00:00Z", "b")]);

        let forward = ingest_with(vec![a.clone(), b.clone()], &utc_options())
            .await
            .unwrap();
        let reverse = ingest_with(vec![b, a], &utc_options()).await.unwrap();
        assert_eq!(forward, reverse);
        assert!(forward.windows(2).all(|w| w[0].ts <= w[1].ts));
    }

    #[tokio::test]
    async fn test_ingest_equal_timestamps_keep_file_order() {
        let files = vec![
            file("a.json", vec![new_export("2024-01-01T00:00:00Z", "from-a")]),
            file("b.json", vec![new_export("2024-01-01T00:00:00Z", "from-b")]),
        ];
        let plays = ingest_with(files, &utc_options()).await.unwrap();
        assert_eq!(plays[0].track, "from-a");
        assert_eq!(plays[1].track, "from-b");
    }

    #[tokio::test]
    async fn test_ingest_drops_unresolvable_keeps_zero() {
        let files = vec![file(
            "endsong.json",
            vec![
                new_export("2024-01-01T09:00:00Z", "ok"),
                new_export("not a time", "bad"),
                serde_json::json!({"ts": "", "ms_played": 10}),
            ],
        )];
        let plays = ingest_with(files, &utc_options()).await.unwrap();
        assert_eq!(plays.len(), 2);
        assert_eq!(plays[0].ts, 0);
        assert_eq!(plays[0].track, "Unknown");
        assert_eq!(plays[0].ms, 10);
        assert_eq!(plays[1].track, "ok");
    }

    #[tokio::test]
    async fn test_ingest_empty_inputs() {
        let plays = ingest_with(Vec::<InMemoryFile>::new(), &utc_options())
            .await
            .unwrap();
        assert!(plays.is_empty());

        let plays = ingest_with(vec![InMemoryFile::new("empty.json", "[]")], &utc_options())
            .await
            .unwrap();
        assert!(plays.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_default_options() {
        let files = vec![file("a.json", vec![new_export("2024-01-01T09:00:00Z", "a")])];
        let plays = ingest(files).await.unwrap();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].ts, millis(2024, 1, 1, 9, 0));
    }

    #[tokio::test]
    async fn test_ingested_epoch_extremes_project_without_panicking() {
        let max_ms = chrono::DateTime::<Utc>::MAX_UTC.timestamp_millis();
        let files = vec![file(
            "endsong.json",
            vec![
                serde_json::json!({"ts": i64::MIN}),
                serde_json::json!({"ts": max_ms}),
            ],
        )];
        let plays = ingest_with(files, &utc_options()).await.unwrap();
        assert_eq!(plays.len(), 2);
        assert_eq!(plays[0].ts, i64::MIN);

        let projection = crate::projector::project_in(&plays, Tz::Asia__Tokyo);
        assert_eq!(projection.points.len(), 2);
        assert!(projection.points.iter().all(|p| p.x >= 0 && p.y < 24.0));
    }

    // ── ingest errors ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_ingest_invalid_json_names_file() {
        let files = vec![
            file("good.json", vec![new_export("2024-01-01T09:00:00Z", "a")]),
            InMemoryFile::new("broken.json", "[{not json"),
        ];
        let err = ingest_with(files, &utc_options()).await.unwrap_err();
        assert!(err.is_parse_error());
        assert_eq!(err.file(), Some("broken.json"));
        assert!(matches!(err, TimelineError::JsonParse { .. }));
    }

    #[tokio::test]
    async fn test_ingest_top_level_object_is_rejected() {
        let files = vec![InMemoryFile::new("object.json", r#"{"ts": "2024-01-01"}"#)];
        let err = ingest_with(files, &utc_options()).await.unwrap_err();
        match err {
            TimelineError::NotASequence { file, found } => {
                assert_eq!(file, "object.json");
                assert_eq!(found, "object");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_ingest_non_object_record_is_rejected() {
        let files = vec![InMemoryFile::new("rows.json", r#"[{"ts": ""}, 42]"#)];
        let err = ingest_with(files, &utc_options()).await.unwrap_err();
        assert!(matches!(
            err,
            TimelineError::InvalidRecord { ref file, index: 1 } if file == "rows.json"
        ));
    }

    #[tokio::test]
    async fn test_ingest_reports_first_bad_file_in_input_order() {
        let files = vec![
            InMemoryFile::new("first-bad.json", "{"),
            InMemoryFile::new("second-bad.json", "null"),
        ];
        let err = ingest_with(files, &utc_options()).await.unwrap_err();
        assert_eq!(err.file(), Some("first-bad.json"));
    }

    #[tokio::test]
    async fn test_ingest_skip_policy_drops_bad_file() {
        let options = IngestOptions {
            on_file_error: FileErrorPolicy::Skip,
            ..utc_options()
        };
        let files = vec![
            file("good.json", vec![new_export("2024-01-01T09:00:00Z", "kept")]),
            InMemoryFile::new("broken.json", "not json at all"),
        ];
        let plays = ingest_with(files, &options).await.unwrap();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].track, "kept");
    }

    #[tokio::test]
    async fn test_ingest_read_timeout_is_fatal() {
        let options = IngestOptions {
            read_timeout: Some(Duration::from_millis(50)),
            ..utc_options()
        };
        let err = ingest_with(vec![SlowFile], &options).await.unwrap_err();
        assert!(matches!(err, TimelineError::ReadTimeout { .. }));
        assert_eq!(err.file(), Some("slow.json"));
    }

    // ── PathFile ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_ingest_path_files() {
        let dir = TempDir::new().unwrap();
        let rows = Value::Array(vec![old_export("2024-01-01 10:00", "disk")]).to_string();
        let path = write_file(dir.path(), "StreamingHistory0.json", &rows);

        let plays = ingest_with(vec![PathFile::new(&path)], &utc_options())
            .await
            .unwrap();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].track, "disk");
    }

    #[tokio::test]
    async fn test_ingest_missing_path_is_read_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        let err = ingest_with(vec![PathFile::new(&missing)], &utc_options())
            .await
            .unwrap_err();
        assert!(matches!(err, TimelineError::FileRead { .. }));
        assert!(!err.is_parse_error());
    }

    #[tokio::test]
    async fn test_path_file_rejects_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.json");
        std::fs::write(&path, [0x5b, 0xff, 0xfe, 0x5d]).unwrap();
        let err = ingest_with(vec![PathFile::new(&path)], &utc_options())
            .await
            .unwrap_err();
        assert!(matches!(err, TimelineError::FileRead { .. }));
    }

    // ── find_json_files ───────────────────────────────────────────────────────

    #[test]
    fn test_find_json_files_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("Spotify Extended Streaming History");
        std::fs::create_dir_all(&sub).unwrap();
        write_file(dir.path(), "b.json", "[]");
        write_file(dir.path(), "a.json", "[]");
        write_file(&sub, "endsong_0.json", "[]");
        write_file(dir.path(), "ReadMeFirst.pdf", "");

        let files = find_json_files(dir.path());
        assert_eq!(files.len(), 3);
        let mut sorted = files.clone();
        sorted.sort();
        assert_eq!(files, sorted);
        assert!(files.iter().all(|p| p.extension().unwrap() == "json"));
    }

    #[test]
    fn test_find_json_files_nonexistent_path() {
        let files = find_json_files(Path::new("/tmp/does-not-exist-timeline-test-xyz"));
        assert!(files.is_empty());
    }

    // ── stages ────────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_records_returns_objects() {
        let records = parse_records("a.json", r#"[{"ts": ""}, {"endTime": ""}]"#).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].contains_key("ts"));
    }

    #[test]
    fn test_sort_plays_is_stable() {
        let play = |ts: i64, track: &str| Play {
            ts,
            ms: 0,
            track: track.to_string(),
            artist: "x".to_string(),
        };
        let mut plays = vec![play(5, "a"), play(1, "b"), play(5, "c"), play(0, "d")];
        sort_plays(&mut plays);
        let tracks: Vec<&str> = plays.iter().map(|p| p.track.as_str()).collect();
        assert_eq!(tracks, vec!["d", "b", "a", "c"]);
    }
}
