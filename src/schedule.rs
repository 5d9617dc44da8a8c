use chrono::{Duration, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db,
    error::ScheduleError,
    models::{
        parse_date, parse_timestamp, ArtistAvailability, BusyInterval, TimeOff,
        DEFAULT_SERVICE_MINUTES, MAX_RULE_MINUTES,
    },
    slots::{local_instant, BufferPolicy, DayPlan},
};

#[derive(Debug, Clone, PartialEq)]
pub struct SlotQuery {
    pub artist_id: String,
    pub service_id: Option<String>,
    pub date: NaiveDate,
    pub timezone: Tz,
}

impl SlotQuery {
    pub fn parse(
        artist_id: &str,
        date: &str,
        service_id: Option<&str>,
        timezone: Option<&str>,
        default_timezone: Tz,
    ) -> Result<Self, ScheduleError> {
        let artist_id = parse_uuid("artist id", artist_id)?;
        let service_id = match service_id.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => Some(parse_uuid("service_id", value)?),
            None => None,
        };
        let date = parse_date(date).map_err(ScheduleError::InvalidQuery)?;
        let timezone = match timezone.map(str::trim).filter(|value| !value.is_empty()) {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ScheduleError::InvalidQuery(format!("unknown timezone '{name}'")))?,
            None => default_timezone,
        };
        Ok(Self {
            artist_id,
            service_id,
            date,
            timezone,
        })
    }
}

fn parse_uuid(label: &str, value: &str) -> Result<String, ScheduleError> {
    Uuid::parse_str(value.trim())
        .map(|id| id.to_string())
        .map_err(|_| ScheduleError::InvalidQuery(format!("{label} must be a UUID")))
}

/// Loads everything slot generation needs for one artist and day. Any read
/// failure aborts the whole load so callers never compute slots from a
/// partial picture.
pub async fn load_day_plan(
    pool: &SqlitePool,
    query: &SlotQuery,
    buffer_policy: BufferPolicy,
) -> Result<DayPlan, ScheduleError> {
    let duration_minutes = match &query.service_id {
        Some(service_id) => {
            let service = db::fetch_service(pool, service_id)
                .await?
                .ok_or_else(|| ScheduleError::UnknownService(service_id.clone()))?;
            if !(1..=MAX_RULE_MINUTES).contains(&service.duration_minutes) {
                return Err(ScheduleError::Corrupt(format!(
                    "service {service_id} has duration {}",
                    service.duration_minutes
                )));
            }
            service.duration_minutes
        }
        None => DEFAULT_SERVICE_MINUTES,
    };

    let rules = db::fetch_availability(pool, &query.artist_id)
        .await?
        .into_iter()
        .map(ArtistAvailability::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(ScheduleError::Corrupt)?;

    let time_off = db::fetch_time_off(pool, &query.artist_id)
        .await?
        .into_iter()
        .map(TimeOff::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(ScheduleError::Corrupt)?;

    let day_start = local_instant(query.timezone, query.date, NaiveTime::MIN);
    let next_day = query.date + Duration::days(1);
    let day_end = local_instant(query.timezone, next_day, NaiveTime::MIN);
    let bookings = db::fetch_busy_intervals(pool, &query.artist_id, day_start, day_end)
        .await?
        .into_iter()
        .map(|(starts_at, ends_at)| {
            Ok(BusyInterval {
                starts_at: parse_timestamp(&starts_at)?,
                ends_at: parse_timestamp(&ends_at)?,
            })
        })
        .collect::<Result<Vec<_>, String>>()
        .map_err(ScheduleError::Corrupt)?;

    log::debug!(
        "Loaded {} rules, {} time-off ranges and {} bookings for artist {} on {}",
        rules.len(),
        time_off.len(),
        bookings.len(),
        query.artist_id,
        query.date
    );

    Ok(DayPlan {
        date: query.date,
        timezone: query.timezone,
        service_id: query.service_id.clone(),
        duration_minutes,
        rules,
        time_off,
        bookings,
        buffer_policy,
    })
}
