use chrono::{DateTime, Duration, SubsecRound, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    db::{self, InsertOutcome},
    error::BookingError,
    models::{Booking, BookingMetadata, BookingSource, BookingStatus},
};

const MAX_BOOKING_HOURS: i64 = 24;

/// Booking submission as it arrives over the wire.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_interval"))]
pub struct BookingRequest {
    #[validate(custom(function = "validate_uuid"))]
    pub artist_id: String,
    #[validate(custom(function = "validate_uuid"))]
    pub service_id: Option<String>,
    #[validate(length(min = 1, max = 120), custom(function = "validate_not_blank"))]
    pub client_name: String,
    #[validate(email, length(max = 254))]
    pub client_email: String,
    #[validate(length(max = 40))]
    pub client_phone: Option<String>,
    #[validate(custom(function = "validate_instant"))]
    pub starts_at: String,
    #[validate(custom(function = "validate_instant"))]
    pub ends_at: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub source: BookingSource,
    #[validate(custom(function = "validate_timezone"))]
    pub timezone: Option<String>,
}

/// A submission that passed validation, with typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub artist_id: String,
    pub service_id: Option<String>,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub source: BookingSource,
    pub timezone: Tz,
}

/// Request facts that do not come from the JSON body.
#[derive(Debug, Clone, Default)]
pub struct BookingContext {
    pub sender_id: Option<String>,
    pub user_agent: Option<String>,
}

impl BookingRequest {
    pub fn into_new_booking(self, default_timezone: Tz) -> Result<NewBooking, BookingError> {
        self.validate()
            .map_err(|errors| BookingError::Validation(describe(&errors)))?;

        let invalid = |field: &str| BookingError::Validation(vec![format!("{field}: invalid")]);
        let artist_id = Uuid::parse_str(self.artist_id.trim())
            .map_err(|_| invalid("artist_id"))?
            .to_string();
        let service_id = match non_empty(self.service_id) {
            Some(value) => Some(
                Uuid::parse_str(&value)
                    .map_err(|_| invalid("service_id"))?
                    .to_string(),
            ),
            None => None,
        };
        let timezone = match non_empty(self.timezone) {
            Some(name) => name.parse::<Tz>().map_err(|_| invalid("timezone"))?,
            None => default_timezone,
        };

        Ok(NewBooking {
            artist_id,
            service_id,
            client_name: self.client_name.trim().to_string(),
            client_email: self.client_email.trim().to_string(),
            client_phone: non_empty(self.client_phone),
            starts_at: parse_instant(&self.starts_at).ok_or_else(|| invalid("starts_at"))?,
            ends_at: parse_instant(&self.ends_at).ok_or_else(|| invalid("ends_at"))?,
            notes: non_empty(self.notes),
            source: self.source,
            timezone,
        })
    }
}

/// Re-checks the artist's calendar and writes the booking in one atomic step.
/// The client's view of free slots is never trusted.
pub async fn create_booking(
    pool: &SqlitePool,
    request: NewBooking,
    context: &BookingContext,
    now: DateTime<Utc>,
) -> Result<Booking, BookingError> {
    let local_start = request.starts_at.with_timezone(&request.timezone);
    let now = now.trunc_subsecs(0);
    let booking = Booking {
        id: db::new_id(),
        recipient_id: request.artist_id,
        sender_id: context.sender_id.clone(),
        service_id: request.service_id,
        starts_at: request.starts_at,
        ends_at: request.ends_at,
        requested_date: local_start.format("%Y-%m-%d").to_string(),
        requested_time: local_start.format("%H:%M").to_string(),
        status: BookingStatus::Pending,
        client_name: request.client_name,
        client_email: request.client_email,
        client_phone: request.client_phone,
        notes: request.notes,
        source: request.source,
        metadata: BookingMetadata {
            timezone: request.timezone.name().to_string(),
            submitted_at: now,
            user_agent: context.user_agent.clone(),
        },
        created_at: now,
    };

    match db::insert_booking_if_free(pool, &booking).await? {
        InsertOutcome::Inserted => {
            log::info!(
                "Booking {} created for artist {} at {}",
                booking.id,
                booking.recipient_id,
                booking.starts_at
            );
            Ok(booking)
        }
        InsertOutcome::Conflict => {
            log::info!(
                "Rejected booking for artist {} at {}: slot taken",
                booking.recipient_id,
                booking.starts_at
            );
            Err(BookingError::Conflict)
        }
    }
}

pub async fn find_booking(pool: &SqlitePool, booking_id: &str) -> Result<Booking, BookingError> {
    let row = db::fetch_booking(pool, booking_id)
        .await?
        .ok_or(BookingError::NotFound)?;
    Booking::try_from(row).map_err(BookingError::Corrupt)
}

/// Applies a lifecycle transition. Returns the updated booking and the
/// status it left.
pub async fn transition_booking(
    pool: &SqlitePool,
    booking_id: &str,
    next: BookingStatus,
) -> Result<(Booking, BookingStatus), BookingError> {
    let current = find_booking(pool, booking_id).await?;
    let previous = current.status;
    let rejected = || BookingError::InvalidTransition {
        from: previous.as_str(),
        to: next.as_str(),
    };
    if !previous.can_transition_to(next) {
        return Err(rejected());
    }
    if !db::set_booking_status(pool, booking_id, previous, next).await? {
        // Someone else moved it first.
        return Err(rejected());
    }
    Ok((
        Booking {
            status: next,
            ..current
        },
        previous,
    ))
}

fn describe(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let detail = errs
                .first()
                .map(|err| {
                    err.message
                        .as_ref()
                        .map(|message| message.to_string())
                        .unwrap_or_else(|| err.code.to_string())
                })
                .unwrap_or_else(|| "invalid".to_string());
            format!("{field}: {detail}")
        })
        .collect();
    fields.sort();
    fields
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|value| value.with_timezone(&Utc).trunc_subsecs(0))
}

fn validate_uuid(value: &str) -> Result<(), ValidationError> {
    match Uuid::parse_str(value.trim()) {
        Ok(_) => Ok(()),
        Err(_) => Err(ValidationError::new("uuid")),
    }
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn validate_instant(value: &str) -> Result<(), ValidationError> {
    match parse_instant(value) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("iso8601")),
    }
}

fn validate_timezone(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() || value.trim().parse::<Tz>().is_ok() {
        Ok(())
    } else {
        Err(ValidationError::new("timezone"))
    }
}

fn validate_interval(request: &BookingRequest) -> Result<(), ValidationError> {
    let (Some(starts_at), Some(ends_at)) =
        (parse_instant(&request.starts_at), parse_instant(&request.ends_at))
    else {
        return Ok(());
    };
    if starts_at >= ends_at {
        let mut err = ValidationError::new("interval");
        err.message = Some("ends_at must be after starts_at".into());
        return Err(err);
    }
    if ends_at - starts_at > Duration::hours(MAX_BOOKING_HOURS) {
        let mut err = ValidationError::new("interval");
        err.message = Some("booking may not exceed 24 hours".into());
        return Err(err);
    }
    Ok(())
}
