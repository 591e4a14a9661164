use chrono::{Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::calendar::types::Intent;

pub const DEFAULT_CALENDAR_KEYWORDS: &[&str] = &[
    "일정",
    "캘린더",
    "회의",
    "약속",
    "schedule",
    "calendar",
    "meeting",
    "appointment",
];

const DATE_PATTERN: &str = r"(\d{1,2})월\s*(\d{1,2})일";

/// Keyword and "<m>월 <d>일" matcher. Holds no state beyond its pattern set.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    keywords: Vec<String>,
    date_pattern: Regex,
    timezone: Tz,
}

impl IntentClassifier {
    pub fn new(keywords: Vec<String>, timezone: Tz) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keywords,
            date_pattern: Regex::new(DATE_PATTERN).expect("date pattern is valid"),
            timezone,
        }
    }

    pub fn with_default_keywords(timezone: Tz) -> Self {
        Self::new(
            DEFAULT_CALENDAR_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            timezone,
        )
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// True when the input contains any scheduling keyword.
    pub fn mentions_calendar(&self, input: &str) -> bool {
        let lowered = input.to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }

    /// Classifies against the current year in the reference timezone.
    pub fn classify(&self, input: &str) -> Intent {
        let year = Utc::now().with_timezone(&self.timezone).year();
        self.classify_in_year(input, year)
    }

    pub fn classify_in_year(&self, input: &str, year: i32) -> Intent {
        if let Some(caps) = self.date_pattern.captures(input) {
            let month = parse_digits(&caps[1]);
            let day = parse_digits(&caps[2]);
            let date = match (month, day) {
                (Some(m), Some(d)) => NaiveDate::from_ymd_opt(year, m, d),
                _ => None,
            };
            return Intent::DateSpecific(date);
        }

        if self.mentions_calendar(input) {
            Intent::Recent
        } else {
            Intent::Unknown
        }
    }
}

/// `\d` also matches full-width digits, which `str::parse` rejects.
fn parse_digits(raw: &str) -> Option<u32> {
    raw.chars().try_fold(0u32, |acc, c| {
        let digit = match c {
            '0'..='9' => c as u32 - '0' as u32,
            '０'..='９' => c as u32 - '０' as u32,
            _ => return None,
        };
        acc.checked_mul(10)?.checked_add(digit)
    })
}
