use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Fixed day length used for day-offset arithmetic.
pub const DAY_MS: i64 = 86_400_000;

const HOUR_MS: f64 = 3_600_000.0;

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

// ── TimezoneHandler ───────────────────────────────────────────────────────────

/// Resolves export timestamps to epoch milliseconds.
///
/// Timestamps that carry no offset are read as wall-clock time in the
/// handler's zone, which is the host zone unless configured otherwise.
#[derive(Debug, Clone, Copy)]
pub struct TimezoneHandler {
    default_tz: Tz,
}

impl TimezoneHandler {
    /// Create a handler for the given IANA timezone name.
    ///
    /// If `tz_name` is not a recognised IANA timezone, falls back to UTC
    /// and logs a warning.
    pub fn new(tz_name: &str) -> Self {
        let tz = tz_name.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "TimezoneHandler: unrecognised timezone \"{}\", falling back to UTC",
                tz_name
            );
            Tz::UTC
        });
        Self { default_tz: tz }
    }

    /// Handler for the host's local zone.
    pub fn system() -> Self {
        Self::new(&get_system_timezone())
    }

    pub fn with_tz(tz: Tz) -> Self {
        Self { default_tz: tz }
    }

    /// Parse a timestamp string into epoch milliseconds.
    ///
    /// Accepts RFC 3339 (with `Z` or a numeric offset), minute-precision ISO
    /// forms with an offset, and naive date-times or dates, which are read in
    /// the handler's zone. Returns `None` for empty or unrecognised input and
    /// for wall-clock times that do not exist in the zone.
    pub fn parse_timestamp(&self, s: &str) -> Option<i64> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        let normalised = if let Some(stripped) = s.strip_suffix('Z') {
            format!("{}+00:00", stripped)
        } else {
            s.to_string()
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.timestamp_millis());
        }

        const OFFSET_FMTS: &[&str] = &[
            "%Y-%m-%dT%H:%M%:z",
            "%Y-%m-%d %H:%M%:z",
            "%Y-%m-%d %H:%M:%S%:z",
        ];
        for fmt in OFFSET_FMTS {
            if let Ok(dt) = DateTime::parse_from_str(&normalised, fmt) {
                return Some(dt.timestamp_millis());
            }
        }

        const NAIVE_FMTS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%dT%H:%M",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%d %H:%M",
        ];
        for fmt in NAIVE_FMTS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return self.local_to_millis(&naive);
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return self.local_to_millis(&date.and_hms_opt(0, 0, 0)?);
        }

        warn!("TimezoneHandler: could not parse timestamp \"{}\"", s);
        None
    }

    /// Ambiguous wall-clock times (DST fall-back) resolve to the earlier instant.
    fn local_to_millis(&self, naive: &NaiveDateTime) -> Option<i64> {
        self.default_tz
            .from_local_datetime(naive)
            .earliest()
            .map(|dt| dt.timestamp_millis())
    }

    /// Validate that `tz_name` is a recognised IANA timezone identifier.
    pub fn validate_timezone(tz_name: &str) -> bool {
        tz_name.parse::<Tz>().is_ok()
    }

    /// Expose the configured default timezone.
    pub fn default_tz(&self) -> Tz {
        self.default_tz
    }
}

impl Default for TimezoneHandler {
    fn default() -> Self {
        Self::system()
    }
}

// ── Calendar decomposition ────────────────────────────────────────────────────

/// Local wall-clock view of `ts_ms`.
///
/// `None` within two days of chrono's calendar limits, where a zone offset
/// could push the local time out of range.
fn to_local(ts_ms: i64, tz: Tz) -> Option<DateTime<Tz>> {
    let lower = DateTime::<Utc>::MIN_UTC
        .timestamp_millis()
        .saturating_add(2 * DAY_MS);
    let upper = DateTime::<Utc>::MAX_UTC
        .timestamp_millis()
        .saturating_sub(2 * DAY_MS);
    if !(lower..=upper).contains(&ts_ms) {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(ts_ms).map(|utc| utc.with_timezone(&tz))
}

/// Local hour of day of `ts_ms` as `hour + minute/60 + second/3600`.
///
/// Sub-second precision is dropped, so the result is always in `[0, 24)`.
/// Instants at the edges of chrono's range are decomposed in UTC.
pub fn local_hour_fraction(ts_ms: i64, tz: Tz) -> f64 {
    match to_local(ts_ms, tz) {
        Some(local) => {
            f64::from(local.hour())
                + f64::from(local.minute()) / 60.0
                + f64::from(local.second()) / 3600.0
        }
        None => {
            let whole_seconds_ms = ts_ms.rem_euclid(DAY_MS) / 1000 * 1000;
            whole_seconds_ms as f64 / HOUR_MS
        }
    }
}

/// Epoch milliseconds of the local midnight that starts the day containing
/// `ts_ms`. Never later than `ts_ms`.
///
/// Instants at the edges of chrono's range use UTC midnight instead.
pub fn local_start_of_day(ts_ms: i64, tz: Tz) -> i64 {
    let Some(local) = to_local(ts_ms, tz) else {
        // UTC midnight, clamped where it would fall below i64::MIN.
        return ts_ms.saturating_sub(ts_ms.rem_euclid(DAY_MS));
    };

    let midnight = local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| tz.from_local_datetime(&naive).earliest());

    match midnight {
        Some(dt) => dt.timestamp_millis(),
        // Zones whose DST shift skips midnight: step back by the wall-clock
        // time already elapsed today.
        None => {
            let elapsed = i64::from(local.num_seconds_from_midnight()) * 1000
                + i64::from(local.timestamp_subsec_millis());
            ts_ms - elapsed
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
