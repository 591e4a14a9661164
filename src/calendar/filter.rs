use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use tracing::debug;

use crate::calendar::types::{Event, Intent};

/// Selects the events relevant to an `Intent`.
///
/// All comparisons happen in the reference timezone. Events whose `time`
/// cannot be parsed are dropped one by one; the rest still get filtered.
#[derive(Debug, Clone, Copy)]
pub struct TemporalFilter {
    timezone: Tz,
}

impl TemporalFilter {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// `None` means the filter could not run (unreadable date), which is
    /// different from `Some(vec![])` (ran, nothing matched).
    pub fn filter<Z: TimeZone>(
        &self,
        intent: Intent,
        events: &[Event],
        now: &DateTime<Z>,
    ) -> Option<Vec<Event>> {
        match intent {
            Intent::Recent => Some(self.next_upcoming(events, now)),
            Intent::DateSpecific(None) => {
                debug!("Date filter skipped: requested date could not be parsed");
                None
            }
            Intent::DateSpecific(Some(date)) => {
                let matched: Vec<Event> = self
                    .localized(events)
                    .filter(|(_, local)| local.date_naive() == date)
                    .map(|(event, _)| event.clone())
                    .collect();
                debug!("Date filter {} matched {} events", date, matched.len());
                Some(matched)
            }
            Intent::Unknown => Some(Vec::new()),
        }
    }

    fn next_upcoming<Z: TimeZone>(&self, events: &[Event], now: &DateTime<Z>) -> Vec<Event> {
        let now = now.with_timezone(&self.timezone);
        let mut timeline: Vec<(&Event, DateTime<Tz>)> = self.localized(events).collect();
        // Stable: equal timestamps keep their input order.
        timeline.sort_by_key(|(_, local)| *local);

        match timeline.into_iter().find(|(_, local)| *local > now) {
            Some((event, local)) => {
                debug!("Nearest upcoming event '{}' at {}", event.title, local);
                vec![event.clone()]
            }
            None => Vec::new(),
        }
    }

    fn localized<'a>(
        &'a self,
        events: &'a [Event],
    ) -> impl Iterator<Item = (&'a Event, DateTime<Tz>)> + 'a {
        events.iter().filter_map(move |event| match event.parsed_time() {
            Ok(t) => Some((event, t.with_timezone(&self.timezone))),
            Err(e) => {
                debug!("Skipping event '{}' with unreadable time '{}': {}", event.title, event.time, e);
                None
            }
        })
    }
}
