//! Event history query parameters
//!
//! Start and end times accept three shapes: a relative duration token
//! counted back from now ("24h", "7d", "30m", "45s"), an RFC 3339
//! timestamp, or a Unix epoch in seconds or milliseconds.

use crate::error::{Result, UnihomeError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One accepted time value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeInput {
    /// Seconds or milliseconds since the Unix epoch, told apart by magnitude
    Epoch(i64),
    /// Relative token or RFC 3339 timestamp
    Text(String),
}

impl TimeInput {
    /// Resolve to an absolute instant; relative tokens count back from `now`
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        match self {
            TimeInput::Epoch(value) => epoch_instant(*value),
            TimeInput::Text(text) => {
                if let Some(duration) = parse_relative(text) {
                    return now.checked_sub_signed(duration).ok_or_else(|| {
                        UnihomeError::configuration(format!(
                            "relative time '{text}' is out of range"
                        ))
                    });
                }
                if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                    return Ok(parsed.with_timezone(&Utc));
                }
                if let Ok(value) = text.parse::<i64>() {
                    return epoch_instant(value);
                }
                Err(UnihomeError::configuration(format!(
                    "unrecognized time '{text}' (expected a duration like '24h', an RFC 3339 timestamp, or a Unix epoch)"
                )))
            }
        }
    }
}

impl From<&str> for TimeInput {
    fn from(text: &str) -> Self {
        TimeInput::Text(text.to_string())
    }
}

impl From<i64> for TimeInput {
    fn from(value: i64) -> Self {
        TimeInput::Epoch(value)
    }
}

/// Epoch seconds stay below 1e12 until the year 33658; milliseconds
/// crossed it in 2001. Values under the threshold are read as seconds.
const EPOCH_MS_THRESHOLD: i64 = 1_000_000_000_000;

fn epoch_instant(value: i64) -> Result<DateTime<Utc>> {
    let ms = if (-EPOCH_MS_THRESHOLD..EPOCH_MS_THRESHOLD).contains(&value) {
        value * 1000
    } else {
        value
    };
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        UnihomeError::configuration(format!("epoch value {value} is out of range"))
    })
}

/// `"<digits><unit>"` with unit s/m/h/d, e.g. "30m"
///
/// Magnitudes a `Duration` cannot hold come back `None` like any other
/// unparseable token.
fn parse_relative(text: &str) -> Option<Duration> {
    let mid = text.len().checked_sub(1)?;
    if !text.is_char_boundary(mid) {
        return None;
    }
    let (digits, unit) = text.split_at(mid);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: i64 = digits.parse().ok()?;
    match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        _ => None,
    }
}

/// Parameters of one device history query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEventQuery {
    /// Universal device id, `platform:platformDeviceId`
    pub device_id: String,

    /// Platform location; resolved through device lookup when absent
    #[serde(default)]
    pub location_id: Option<String>,

    #[serde(default)]
    pub start_time: Option<TimeInput>,

    #[serde(default)]
    pub end_time: Option<TimeInput>,

    /// Result cap; clamped to the configured maximum
    #[serde(default)]
    pub limit: Option<usize>,

    /// Ascending order instead of the default newest-first
    #[serde(default)]
    pub oldest_first: bool,

    /// Keep only events whose capability is listed; empty keeps all
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Keep only events whose attribute is listed; empty keeps all
    #[serde(default)]
    pub attributes: Vec<String>,

    #[serde(default = "default_true")]
    pub include_metadata: bool,

    #[serde(default = "default_true")]
    pub human_readable: bool,
}

fn default_true() -> bool {
    true
}

impl DeviceEventQuery {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            location_id: None,
            start_time: None,
            end_time: None,
            limit: None,
            oldest_first: false,
            capabilities: Vec::new(),
            attributes: Vec::new(),
            include_metadata: true,
            human_readable: true,
        }
    }

    pub fn since(mut self, start: impl Into<TimeInput>) -> Self {
        self.start_time = Some(start.into());
        self
    }

    pub fn until(mut self, end: impl Into<TimeInput>) -> Self {
        self.end_time = Some(end.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.oldest_first = true;
        self
    }

    pub fn in_location(mut self, location_id: impl Into<String>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }

    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    pub fn without_metadata(mut self) -> Self {
        self.include_metadata = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
    }

    #[test]
    fn resolves_relative_tokens() {
        let base = now();
        let cases = [
            ("24h", Duration::hours(24)),
            ("7d", Duration::days(7)),
            ("30m", Duration::minutes(30)),
            ("45s", Duration::seconds(45)),
        ];
        for (token, expected) in cases {
            let resolved = TimeInput::from(token).resolve(base).unwrap();
            assert_eq!(base - resolved, expected, "token {token}");
        }
    }

    #[test]
    fn resolves_rfc3339_and_epoch() {
        let base = now();

        let absolute = TimeInput::from("2023-11-14T12:00:00Z").resolve(base).unwrap();
        assert_eq!(absolute, Utc.with_ymd_and_hms(2023, 11, 14, 12, 0, 0).unwrap());

        let offset = TimeInput::from("2023-11-14T14:00:00+02:00").resolve(base).unwrap();
        assert_eq!(offset, Utc.with_ymd_and_hms(2023, 11, 14, 12, 0, 0).unwrap());

        let epoch = TimeInput::from(1_700_000_000_000_i64).resolve(base).unwrap();
        assert_eq!(epoch.timestamp_millis(), 1_700_000_000_000);

        let epoch_text = TimeInput::from("1700000000000").resolve(base).unwrap();
        assert_eq!(epoch_text.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn reads_small_epoch_values_as_seconds() {
        let base = now();

        let seconds = TimeInput::from(1_700_000_000_i64).resolve(base).unwrap();
        assert_eq!(seconds.timestamp_millis(), 1_700_000_000_000);

        let seconds_text = TimeInput::from("1700000000").resolve(base).unwrap();
        assert_eq!(seconds_text, seconds);
    }

    #[test]
    fn rejects_garbage_times() {
        for bad in ["yesterday", "24x", "h", "", "12h30m"] {
            let result = TimeInput::from(bad).resolve(now());
            assert!(result.is_err(), "accepted '{bad}'");
        }
    }

    #[test]
    fn rejects_relative_tokens_beyond_the_time_range() {
        // Too large for a Duration at all, and large enough that the
        // subtraction from now leaves the representable DateTime range
        for bad in [
            "9999999999999999h",
            "9000000000000000s",
            "99999999999999999999d",
        ] {
            let result = TimeInput::from(bad).resolve(now());
            assert!(result.is_err(), "accepted '{bad}'");
        }
    }

    #[test]
    fn query_defaults_from_json() {
        let query: DeviceEventQuery =
            serde_json::from_str(r#"{"deviceId": "smartthings:d1"}"#).unwrap();
        assert_eq!(query.device_id, "smartthings:d1");
        assert!(query.limit.is_none());
        assert!(!query.oldest_first);
        assert!(query.include_metadata);
        assert!(query.human_readable);
        assert!(query.capabilities.is_empty());
    }

    #[test]
    fn query_accepts_mixed_time_shapes() {
        let query: DeviceEventQuery = serde_json::from_str(
            r#"{
                "deviceId": "smartthings:d1",
                "startTime": "7d",
                "endTime": 1700000000000,
                "limit": 50,
                "capabilities": ["switch"]
            }"#,
        )
        .unwrap();
        assert_eq!(query.start_time, Some(TimeInput::Text("7d".into())));
        assert_eq!(query.end_time, Some(TimeInput::Epoch(1_700_000_000_000)));
        assert_eq!(query.limit, Some(50));
    }
}
