use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// A calendar entry as delivered by the event provider.
///
/// `time` stays in its wire form (RFC 3339, e.g. `2025-03-10T09:00:00+09:00`)
/// so one malformed record can be skipped without rejecting the whole list.
///
/// Equality and ordering look at `time` only: events at the same instant are
/// equal whatever their offsets or other fields. Unparseable times sort after
/// every parseable one, by their raw text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub time: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
}

impl Event {
    pub fn new(time: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            title: title.into(),
            description: String::new(),
            location: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Parses `time`, accepting both `+09:00` and the minute-less `+0900`
    /// style offsets as well as a missing seconds field.
    pub fn parsed_time(&self) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
        let raw = self.time.trim();
        DateTime::parse_from_rfc3339(raw)
            .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%:z"))
            .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
            .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%z"))
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum TimeKey<'a> {
    Instant(DateTime<FixedOffset>),
    Raw(&'a str),
}

impl Event {
    fn time_key(&self) -> TimeKey<'_> {
        match self.parsed_time() {
            Ok(t) => TimeKey::Instant(t),
            Err(_) => TimeKey::Raw(self.time.trim()),
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time_key() == other.time_key()
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time_key().cmp(&other.time_key())
    }
}

/// What the user is asking about, relative to the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// An explicit "<m>월 <d>일" date. `None` means the numbers did not form
    /// a real calendar date.
    DateSpecific(Option<NaiveDate>),
    /// Scheduling talk without a date: the next upcoming event.
    Recent,
    Unknown,
}
