//! Device event history engine
//!
//! Answers time-range queries over per-device platform event logs:
//! resolves the requested window, clamps it to what the platform still
//! retains, streams and filters events, and annotates the result with
//! detected gaps and a human-readable summary.

pub mod gaps;
pub mod query;

pub use gaps::{detect_gaps, format_duration, EventGap};
pub use query::{DeviceEventQuery, TimeInput};

use crate::config::HistoryConfig;
use crate::error::{Result, UnihomeError};
use crate::registry::{DeviceRoute, PlatformRegistry};
use crate::types::{DeviceEvent, Platform, TimeWindow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of one history query
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEventHistory {
    /// Universal device id the query addressed
    pub device_id: String,
    pub platform: Platform,
    /// Location the events were fetched from; absent when the window
    /// expired entirely before the fetch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    /// Window actually queried, after retention clamping
    pub window: TimeWindow,
    pub events: Vec<DeviceEvent>,
    /// More events existed in the window beyond the limit
    pub has_more: bool,
    pub reached_retention_limit: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HistoryMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMetadata {
    /// Events returned after filtering
    pub returned: usize,
    /// Humanized span of the queried window
    pub window_text: String,
    pub gaps: Vec<EventGap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub largest_gap_ms: Option<i64>,
}

/// Outcome of clamping a start time against a retention window
#[derive(Debug, Clone)]
pub struct RetentionCheck {
    pub adjusted_start: DateTime<Utc>,
    pub warning: Option<String>,
    pub reached_limit: bool,
}

/// Clamp `start` to the oldest instant the platform still retains
///
/// Requests beyond the boundary are adjusted, never rejected.
pub fn validate_retention(
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    retention: Duration,
) -> RetentionCheck {
    let Ok(span) = chrono::Duration::from_std(retention) else {
        return RetentionCheck {
            adjusted_start: start,
            warning: None,
            reached_limit: false,
        };
    };
    let boundary = now - span;
    if start >= boundary {
        return RetentionCheck {
            adjusted_start: start,
            warning: None,
            reached_limit: false,
        };
    }
    RetentionCheck {
        adjusted_start: boundary,
        warning: Some(format!(
            "requested start {} is beyond the {} retention window, start clamped to {}",
            start.to_rfc3339(),
            format_duration(retention),
            boundary.to_rfc3339()
        )),
        reached_limit: true,
    }
}

/// Time-range query engine over adapter event logs
pub struct HistoryEngine {
    registry: Arc<PlatformRegistry>,
    config: HistoryConfig,
}

impl HistoryEngine {
    pub fn new(registry: Arc<PlatformRegistry>, config: HistoryConfig) -> Self {
        Self { registry, config }
    }

    /// Run one history query end to end
    pub async fn device_events(&self, query: &DeviceEventQuery) -> Result<DeviceEventHistory> {
        let now = Utc::now();
        let limit = query
            .limit
            .unwrap_or(self.config.default_limit)
            .clamp(1, self.config.max_limit);

        let end = match &query.end_time {
            Some(input) => input.resolve(now)?,
            None => now,
        };
        let start = match &query.start_time {
            Some(input) => input.resolve(now)?,
            None => {
                let window = chrono::Duration::from_std(self.config.default_window)
                    .unwrap_or_else(|_| chrono::Duration::hours(24));
                end - window
            }
        };
        if start >= end {
            return Err(UnihomeError::configuration(format!(
                "start {} is not before end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }

        let route = self.registry.adapter_for_device(&query.device_id).await?;

        let mut warnings = Vec::new();
        let mut reached_retention_limit = false;
        let mut start = start;
        if let Some(retention) = route.adapter.history_retention() {
            let check = validate_retention(start, now, retention);
            if let Some(warning) = check.warning {
                warn!(device = %query.device_id, "{warning}");
                warnings.push(warning);
            }
            start = check.adjusted_start;
            reached_retention_limit = check.reached_limit;
        }

        // Clamping can consume the whole window; that is still a valid,
        // empty answer
        if start >= end {
            debug!(device = %query.device_id, "query window lies entirely beyond retention");
            let window = TimeWindow { start, end };
            return Ok(self.assemble(
                query,
                route.platform,
                None,
                window,
                Vec::new(),
                false,
                reached_retention_limit,
                warnings,
            ));
        }

        let location_id = match &query.location_id {
            Some(id) => id.clone(),
            None => self.resolve_location(&route, &query.device_id).await?,
        };

        let window = TimeWindow { start, end };
        let mut events = route
            .adapter
            .list_device_events(&route.device_id, &location_id, &window, limit + 1)
            .await?;
        let has_more = events.len() > limit;
        events.truncate(limit);
        if query.oldest_first {
            events.reverse();
        }

        // Platform history APIs filter by neither capability nor
        // attribute, so this stays client-side, after the limit cut
        if !query.capabilities.is_empty() {
            events.retain(|e| query.capabilities.iter().any(|c| c == &e.capability));
        }
        if !query.attributes.is_empty() {
            events.retain(|e| query.attributes.iter().any(|a| a == &e.attribute));
        }

        Ok(self.assemble(
            query,
            route.platform,
            Some(location_id),
            window,
            events,
            has_more,
            reached_retention_limit,
            warnings,
        ))
    }

    /// Location via device lookup; history cannot be queried without one
    async fn resolve_location(&self, route: &DeviceRoute, universal_id: &str) -> Result<String> {
        let device = route.adapter.get_device(&route.device_id).await?;
        device.location_id.ok_or_else(|| {
            UnihomeError::configuration(format!(
                "device '{universal_id}' reports no location, pass locationId explicitly"
            ))
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        query: &DeviceEventQuery,
        platform: Platform,
        location_id: Option<String>,
        window: TimeWindow,
        events: Vec<DeviceEvent>,
        has_more: bool,
        reached_retention_limit: bool,
        warnings: Vec<String>,
    ) -> DeviceEventHistory {
        let gaps = if query.include_metadata && events.len() > 1 {
            detect_gaps(
                &events,
                self.config.gap_threshold,
                self.config.connectivity_threshold,
                query.oldest_first,
            )
        } else {
            Vec::new()
        };

        let span = (window.end - window.start).to_std().unwrap_or_default();
        let window_text = format_duration(span);
        let summary = query.human_readable.then(|| {
            build_summary(
                &query.device_id,
                events.len(),
                &window_text,
                &query.capabilities,
                &query.attributes,
                gaps.len(),
                has_more,
                reached_retention_limit,
            )
        });
        let metadata = query.include_metadata.then(|| HistoryMetadata {
            returned: events.len(),
            window_text,
            largest_gap_ms: gaps.iter().map(|g| g.duration_ms).max(),
            gaps,
        });

        DeviceEventHistory {
            device_id: query.device_id.clone(),
            platform,
            location_id,
            window,
            events,
            has_more,
            reached_retention_limit,
            warnings,
            metadata,
            summary,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_summary(
    device_id: &str,
    count: usize,
    window_text: &str,
    capabilities: &[String],
    attributes: &[String],
    gap_count: usize,
    has_more: bool,
    reached_retention_limit: bool,
) -> String {
    let plural = if count == 1 { "" } else { "s" };
    let mut summary = format!("{count} event{plural} for {device_id} over {window_text}");

    if !capabilities.is_empty() {
        summary.push_str(&format!(", capabilities {}", capabilities.join("/")));
    }
    if !attributes.is_empty() {
        summary.push_str(&format!(", attributes {}", attributes.join("/")));
    }
    if gap_count > 0 {
        let plural = if gap_count == 1 { "" } else { "s" };
        summary.push_str(&format!(", {gap_count} gap{plural} detected"));
    }
    if reached_retention_limit {
        summary.push_str(", start clamped to the retention window");
    }
    if has_more {
        summary.push_str(", more events available");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const THIRTY_DAYS: Duration = Duration::from_secs(30 * 24 * 3600);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
    }

    #[test]
    fn clamps_start_older_than_retention() {
        let now = now();
        let start = now - chrono::Duration::days(40);
        let check = validate_retention(start, now, THIRTY_DAYS);

        assert_eq!(check.adjusted_start, now - chrono::Duration::days(30));
        assert!(check.reached_limit);
        let warning = check.warning.unwrap();
        assert!(warning.contains("clamped"), "warning was: {warning}");
    }

    #[test]
    fn leaves_start_within_retention_alone() {
        let now = now();
        let start = now - chrono::Duration::days(7);
        let check = validate_retention(start, now, THIRTY_DAYS);

        assert_eq!(check.adjusted_start, start);
        assert!(!check.reached_limit);
        assert!(check.warning.is_none());
    }

    #[test]
    fn summary_mentions_count_filters_and_flags() {
        let summary = build_summary(
            "smartthings:d1",
            17,
            "1d 0h 0m 0s",
            &["switch".to_string()],
            &[],
            2,
            true,
            true,
        );
        assert!(summary.starts_with("17 events for smartthings:d1 over 1d 0h 0m 0s"));
        assert!(summary.contains("capabilities switch"));
        assert!(summary.contains("2 gaps detected"));
        assert!(summary.contains("clamped to the retention window"));
        assert!(summary.contains("more events available"));
    }

    #[test]
    fn summary_for_empty_result() {
        let summary = build_summary("smartthings:d1", 0, "24h", &[], &[], 0, false, false);
        assert_eq!(summary, "0 events for smartthings:d1 over 24h");
    }
}
