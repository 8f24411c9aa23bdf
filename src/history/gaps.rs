//! Gap detection over event sequences
//!
//! A gap is an unusually long silence between two consecutive events,
//! often the footprint of a device or hub connectivity outage.

use crate::types::DeviceEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A reported silence between two consecutive events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventGap {
    /// Instant of the earlier event
    pub start: DateTime<Utc>,
    /// Instant of the later event
    pub end: DateTime<Utc>,
    pub duration_ms: i64,
    pub duration_text: String,
    /// Heuristic: the silence exceeds the connectivity threshold
    pub likely_connectivity_issue: bool,
}

/// Find gaps between consecutive events
///
/// Events are assumed sorted, newest-first unless `oldest_first`. A delta
/// above `gap_threshold` is a gap; one above `connectivity_threshold` is
/// additionally flagged as a likely connectivity issue. Fewer than two
/// events can never produce a gap.
pub fn detect_gaps(
    events: &[DeviceEvent],
    gap_threshold: Duration,
    connectivity_threshold: Duration,
    oldest_first: bool,
) -> Vec<EventGap> {
    let gap_ms = gap_threshold.as_millis() as i64;
    let connectivity_ms = connectivity_threshold.as_millis() as i64;

    let mut gaps = Vec::new();
    for pair in events.windows(2) {
        let (earlier, later) = if oldest_first {
            (&pair[0], &pair[1])
        } else {
            (&pair[1], &pair[0])
        };
        let delta_ms = later.epoch - earlier.epoch;
        if delta_ms <= gap_ms {
            continue;
        }
        gaps.push(EventGap {
            start: earlier.time,
            end: later.time,
            duration_ms: delta_ms,
            duration_text: format_duration(Duration::from_millis(delta_ms as u64)),
            likely_connectivity_issue: delta_ms > connectivity_ms,
        });
    }
    gaps
}

/// "2d 4h 5m 1s" style rendering, dropping leading zero units
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let days = total_seconds / 86400;
    let hours = (total_seconds % 86400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
