use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_CANCELLED: &str = "cancelled";
pub const STATUS_DECLINED: &str = "declined";

pub const SOURCE_WEB: &str = "web";
pub const SOURCE_HUBSPOT: &str = "hubspot";
pub const SOURCE_MANUAL: &str = "manual";

/// Duration assumed when a slot grid is requested without a service.
pub const DEFAULT_SERVICE_MINUTES: i64 = 60;

/// Upper bound for step, buffer and service lengths: one day.
pub const MAX_RULE_MINUTES: i64 = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Declined,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Cancelled,
        BookingStatus::Declined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => STATUS_PENDING,
            BookingStatus::Confirmed => STATUS_CONFIRMED,
            BookingStatus::Cancelled => STATUS_CANCELLED,
            BookingStatus::Declined => STATUS_DECLINED,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            STATUS_PENDING => Some(BookingStatus::Pending),
            STATUS_CONFIRMED => Some(BookingStatus::Confirmed),
            STATUS_CANCELLED => Some(BookingStatus::Cancelled),
            STATUS_DECLINED => Some(BookingStatus::Declined),
            _ => None,
        }
    }

    /// Whether a booking in this status blocks the artist's calendar.
    pub fn occupies_time(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn occupying() -> impl Iterator<Item = BookingStatus> {
        Self::ALL.into_iter().filter(|status| status.occupies_time())
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Pending, BookingStatus::Declined)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingSource {
    #[default]
    Web,
    Hubspot,
    Manual,
}

impl BookingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingSource::Web => SOURCE_WEB,
            BookingSource::Hubspot => SOURCE_HUBSPOT,
            BookingSource::Manual => SOURCE_MANUAL,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            SOURCE_WEB => Some(BookingSource::Web),
            SOURCE_HUBSPOT => Some(BookingSource::Hubspot),
            SOURCE_MANUAL => Some(BookingSource::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AvailabilityRow {
    pub id: String,
    pub artist_id: String,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub slot_duration_minutes: i64,
    pub buffer_minutes: i64,
    pub is_available: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TimeOffRow {
    pub id: String,
    pub artist_id: String,
    pub start_date: String,
    pub end_date: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub name: String,
    pub duration_minutes: i64,
    pub price_cents: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingRow {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub service_id: Option<String>,
    pub starts_at: String,
    pub ends_at: String,
    pub requested_date: String,
    pub requested_time: String,
    pub status: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
    pub source: String,
    pub metadata: String,
    pub created_at: String,
}

/// Recurring weekly rule, parsed out of its storage row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistAvailability {
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i64,
    pub buffer_minutes: i64,
    pub is_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOff {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl TimeOff {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// The part of a booking the slot arithmetic cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyInterval {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingMetadata {
    pub timezone: String,
    pub submitted_at: DateTime<Utc>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub service_id: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub requested_date: String,
    pub requested_time: String,
    pub status: BookingStatus,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
    pub source: BookingSource,
    pub metadata: BookingMetadata,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = String;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::parse(&row.status)
            .ok_or_else(|| format!("unknown booking status '{}'", row.status))?;
        let source = BookingSource::parse(&row.source)
            .ok_or_else(|| format!("unknown booking source '{}'", row.source))?;
        let metadata = serde_json::from_str(&row.metadata)
            .map_err(|err| format!("invalid booking metadata: {err}"))?;
        Ok(Self {
            starts_at: parse_timestamp(&row.starts_at)?,
            ends_at: parse_timestamp(&row.ends_at)?,
            created_at: parse_timestamp(&row.created_at)?,
            id: row.id,
            recipient_id: row.recipient_id,
            sender_id: row.sender_id,
            service_id: row.service_id,
            requested_date: row.requested_date,
            requested_time: row.requested_time,
            status,
            client_name: row.client_name,
            client_email: row.client_email,
            client_phone: row.client_phone,
            notes: row.notes,
            source,
            metadata,
        })
    }
}

impl TryFrom<AvailabilityRow> for ArtistAvailability {
    type Error = String;

    fn try_from(row: AvailabilityRow) -> Result<Self, Self::Error> {
        let day_of_week = row
            .day_of_week
            .trim()
            .parse::<Weekday>()
            .map_err(|_| format!("unknown weekday '{}'", row.day_of_week))?;
        for (column, value) in [
            ("slot_duration_minutes", row.slot_duration_minutes),
            ("buffer_minutes", row.buffer_minutes),
        ] {
            if !(0..=MAX_RULE_MINUTES).contains(&value) {
                return Err(format!("{column} out of range: {value}"));
            }
        }
        Ok(Self {
            day_of_week,
            start_time: parse_wall_clock(&row.start_time)?,
            end_time: parse_wall_clock(&row.end_time)?,
            slot_duration_minutes: row.slot_duration_minutes,
            buffer_minutes: row.buffer_minutes,
            is_available: row.is_available != 0,
        })
    }
}

impl TryFrom<TimeOffRow> for TimeOff {
    type Error = String;

    fn try_from(row: TimeOffRow) -> Result<Self, Self::Error> {
        Ok(Self {
            start_date: parse_date(&row.start_date)?,
            end_date: parse_date(&row.end_date)?,
        })
    }
}

/// Storage format for instants: second precision, always UTC, so that
/// lexical comparison in SQL matches chronological order.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| format!("invalid timestamp '{value}': {err}"))
}

/// Accepts `HH:MM` as well as `HH:MM:SS`.
pub fn parse_wall_clock(value: &str) -> Result<NaiveTime, String> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| format!("invalid time of day '{value}'"))
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    let value = value.trim();
    // Dates are sometimes stored with a time component; only the calendar part counts.
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| format!("invalid date '{value}'"))
}
