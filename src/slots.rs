use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::{parse_wall_clock, ArtistAvailability, BusyInterval, TimeOff};

/// How `buffer_minutes` on an availability rule affects slot generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferPolicy {
    /// The buffer is carried on the rule but not applied.
    #[default]
    Ignore,
    /// Existing bookings are widened by the buffer on both sides.
    PadBookings,
}

impl FromStr for BufferPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ignore" | "none" => Ok(BufferPolicy::Ignore),
            "pad" => Ok(BufferPolicy::PadBookings),
            other => Err(format!("unknown buffer policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookableSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Start time of day in the artist's timezone, `HH:MM`.
    pub time: String,
    pub available: bool,
    pub service_id: Option<String>,
}

/// Everything needed to lay out one artist's day. Built from storage by
/// `schedule::load_day_plan`, but nothing here touches storage.
#[derive(Debug, Clone)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub timezone: Tz,
    pub service_id: Option<String>,
    pub duration_minutes: i64,
    pub rules: Vec<ArtistAvailability>,
    pub time_off: Vec<TimeOff>,
    pub bookings: Vec<BusyInterval>,
    pub buffer_policy: BufferPolicy,
}

impl DayPlan {
    pub fn active_rule(&self) -> Option<&ArtistAvailability> {
        active_rule(&self.rules, self.date)
    }

    pub fn is_time_off(&self) -> bool {
        is_time_off(&self.time_off, self.date)
    }

    /// Candidate slots for the day in chronological order, blocked ones included.
    pub fn slots(&self, now: DateTime<Utc>) -> Vec<BookableSlot> {
        let Some(rule) = self.active_rule() else {
            return Vec::new();
        };
        if self.is_time_off() || self.duration_minutes <= 0 {
            return Vec::new();
        }

        let window_start = local_instant(self.timezone, self.date, rule.start_time);
        let window_end = local_instant(self.timezone, self.date, rule.end_time);
        let step_minutes = if rule.slot_duration_minutes > 0 {
            rule.slot_duration_minutes
        } else {
            self.duration_minutes
        };
        let pad_minutes = match self.buffer_policy {
            BufferPolicy::Ignore => 0,
            BufferPolicy::PadBookings => rule.buffer_minutes.max(0),
        };
        let (Some(length), Some(step), Some(pad)) = (
            Duration::try_minutes(self.duration_minutes),
            Duration::try_minutes(step_minutes),
            Duration::try_minutes(pad_minutes),
        ) else {
            log::warn!(
                "Slot lengths out of range on {} (duration {}, step {}, buffer {})",
                self.date,
                self.duration_minutes,
                step_minutes,
                pad_minutes
            );
            return Vec::new();
        };

        let mut slots = Vec::new();
        let mut cursor = window_start;
        while let Some(end) = cursor
            .checked_add_signed(length)
            .filter(|end| *end <= window_end)
        {
            let blocked = self.bookings.iter().any(|booking| {
                match (
                    booking.starts_at.checked_sub_signed(pad),
                    booking.ends_at.checked_add_signed(pad),
                ) {
                    (Some(busy_start), Some(busy_end)) => overlaps(cursor, end, busy_start, busy_end),
                    // Unrepresentable padding: treat the slot as taken.
                    _ => true,
                }
            });
            slots.push(BookableSlot {
                start: cursor,
                end,
                time: cursor.with_timezone(&self.timezone).format("%H:%M").to_string(),
                available: !blocked && cursor >= now,
                service_id: self.service_id.clone(),
            });
            match cursor.checked_add_signed(step) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        slots
    }

    /// The artist works this weekday, is not on time off, and the date is not behind us.
    pub fn is_date_available(&self, now: DateTime<Utc>) -> bool {
        let today = now.with_timezone(&self.timezone).date_naive();
        self.date >= today && self.active_rule().is_some() && !self.is_time_off()
    }

    /// Finds the generated slot starting at a local `HH:MM`, converting it the
    /// same way generation converts window bounds.
    pub fn slot_by_time(&self, time: &str, now: DateTime<Utc>) -> Option<BookableSlot> {
        let time = parse_wall_clock(time).ok()?;
        let start = local_instant(self.timezone, self.date, time);
        self.slots(now).into_iter().find(|slot| slot.start == start)
    }
}

/// First rule for the date's weekday that is switched on.
pub fn active_rule(rules: &[ArtistAvailability], date: NaiveDate) -> Option<&ArtistAvailability> {
    let weekday = date.weekday();
    rules
        .iter()
        .find(|rule| rule.is_available && rule.day_of_week == weekday)
}

pub fn is_time_off(time_off: &[TimeOff], date: NaiveDate) -> bool {
    time_off.iter().any(|range| range.covers(date))
}

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)`.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Interprets a wall-clock time on `date` in `tz`.
///
/// Ambiguous times (autumn fall-back) resolve to the earlier instant. Times
/// that do not exist (spring-forward gap) are pushed past the gap.
pub fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(value) => value.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|value| value.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}
