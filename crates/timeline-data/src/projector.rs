//! Day/hour projection of a play sequence.
//!
//! Each play becomes a point whose `x` is the number of whole days since the
//! local midnight preceding the earliest play and whose `y` is its local time
//! of day in hours.

use chrono_tz::Tz;
use timeline_core::models::{Play, Point, Projection, HOURS_PER_DAY};
use timeline_core::time_utils::{local_hour_fraction, local_start_of_day, TimezoneHandler, DAY_MS};

/// Project plays using the host's local calendar.
pub fn project(plays: &[Play]) -> Projection {
    project_in(plays, TimezoneHandler::system().default_tz())
}

/// Project plays using the calendar of `tz`.
///
/// The input does not need to be sorted.
pub fn project_in(plays: &[Play], tz: Tz) -> Projection {
    let Some(earliest) = plays.iter().map(|p| p.ts).min() else {
        return Projection::default();
    };
    let t0 = local_start_of_day(earliest, tz);

    let points: Vec<Point> = plays
        .iter()
        .map(|p| Point {
            x: day_offset(t0, p.ts),
            y: local_hour_fraction(p.ts, tz),
            ts: p.ts,
            ms: p.ms,
            artist: p.artist.clone(),
            track: p.track.clone(),
        })
        .collect();

    let x1 = points.iter().map(|p| p.x).max().unwrap_or(0);

    Projection {
        points,
        x0: 0,
        x1,
        y0: 0.0,
        y1: HOURS_PER_DAY,
        t0,
    }
}

/// Whole days between `t0` and `ts`.
fn day_offset(t0: i64, ts: i64) -> i64 {
    // i128 keeps extreme spans from overflowing the subtraction.
    (i128::from(ts) - i128::from(t0)).div_euclid(i128::from(DAY_MS)) as i64
}
