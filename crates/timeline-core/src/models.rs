use serde::{Deserialize, Serialize};

/// Upper bound of the hour axis.
pub const HOURS_PER_DAY: f64 = 24.0;

/// A single listening event, normalised from either export schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Play {
    /// Epoch milliseconds at which the play was recorded.
    pub ts: i64,
    /// Milliseconds of the track that were played.
    pub ms: u64,
    /// Track title, `"Unknown"` when the export omitted it.
    pub track: String,
    /// Artist name, `"Unknown"` when the export omitted it.
    pub artist: String,
}

/// A [`Play`] placed on the day/hour plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Whole days since the projection's `t0`.
    pub x: i64,
    /// Local hour of day as a fraction, in `[0, 24)`.
    pub y: f64,
    pub ts: i64,
    pub ms: u64,
    pub artist: String,
    pub track: String,
}

impl From<&Point> for Play {
    fn from(point: &Point) -> Self {
        Self {
            ts: point.ts,
            ms: point.ms,
            track: point.track.clone(),
            artist: point.artist.clone(),
        }
    }
}

/// Projected points together with the bounding box a chart should use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub points: Vec<Point>,
    pub x0: i64,
    pub x1: i64,
    pub y0: f64,
    pub y1: f64,
    /// Epoch milliseconds of the local midnight starting day `x = 0`.
    pub t0: i64,
}

impl Projection {
    /// Rebuild the play sequence this projection was computed from.
    pub fn plays(&self) -> Vec<Play> {
        self.points.iter().map(Play::from).collect()
    }
}

impl Default for Projection {
    /// Fixed fallback used when there is nothing to plot.
    fn default() -> Self {
        Self {
            points: Vec::new(),
            x0: 0,
            x1: 1,
            y0: 0.0,
            y1: HOURS_PER_DAY,
            t0: 0,
        }
    }
}
