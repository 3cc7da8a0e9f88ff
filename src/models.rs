// Known record classes and timestamp helpers

use chrono::{DateTime, Local, NaiveDateTime, SubsecRound};

/// Class name of the base record shape
pub const BASE_MODEL: &str = "BaseModel";

/// Canonical textual form of record timestamps (microsecond precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Registry of class names the shell accepts
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    classes: Vec<&'static str>,
}

impl ModelRegistry {
    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.contains(&class_name)
    }

    pub fn names(&self) -> &[&'static str] {
        &self.classes
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self {
            classes: vec![BASE_MODEL],
        }
    }
}

/// Current local time, truncated to the precision timestamps are stored at
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(6)
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp
///
/// Accepts ISO-8601 local date-times with or without fractional seconds, and
/// RFC 3339 strings carrying an offset (reduced to their local wall time).
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    text.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_local()))
}
