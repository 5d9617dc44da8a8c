use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub const CONFLICT_MESSAGE: &str =
    "This time slot is no longer available. Please choose another time.";

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("requested time overlaps an existing booking")]
    Conflict,

    #[error("booking not found")]
    NotFound,

    #[error("cannot move booking from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("storage failure: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("stored booking is unreadable: {0}")]
    Corrupt(String),
}

impl BookingError {
    pub fn reason(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "validation_failed",
            BookingError::Conflict => "slot_unavailable",
            BookingError::NotFound => "not_found",
            BookingError::InvalidTransition { .. } => "invalid_transition",
            BookingError::Persistence(_) | BookingError::Corrupt(_) => "persistence_failed",
        }
    }
}

impl ResponseError for BookingError {
    fn status_code(&self) -> StatusCode {
        match self {
            BookingError::Validation(_) => StatusCode::BAD_REQUEST,
            BookingError::Conflict | BookingError::InvalidTransition { .. } => StatusCode::CONFLICT,
            BookingError::NotFound => StatusCode::NOT_FOUND,
            BookingError::Persistence(_) | BookingError::Corrupt(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            BookingError::Validation(fields) => json!({
                "success": false,
                "error": self.reason(),
                "message": "Some booking details are missing or invalid.",
                "fields": fields,
            }),
            BookingError::Conflict => json!({
                "success": false,
                "error": self.reason(),
                "message": CONFLICT_MESSAGE,
            }),
            BookingError::Persistence(err) => {
                log::error!("Booking storage failure: {err}");
                json!({
                    "success": false,
                    "error": self.reason(),
                    "message": "We could not save your booking. Please try again.",
                })
            }
            BookingError::Corrupt(detail) => {
                log::error!("Unreadable booking record: {detail}");
                json!({
                    "success": false,
                    "error": self.reason(),
                    "message": "We could not load this booking.",
                })
            }
            _ => json!({
                "success": false,
                "error": self.reason(),
                "message": self.to_string(),
            }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Failures while assembling a day's schedule. Any of these means no slots
/// are offered for that request.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("schedule data could not be loaded: {0}")]
    Fetch(#[from] sqlx::Error),

    #[error("unknown service {0}")]
    UnknownService(String),

    #[error("stored schedule data is unreadable: {0}")]
    Corrupt(String),
}

impl ResponseError for ScheduleError {
    fn status_code(&self) -> StatusCode {
        match self {
            ScheduleError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ScheduleError::InvalidQuery(detail) => json!({
                "error": "invalid_query",
                "message": detail,
                "slots": [],
            }),
            _ => {
                log::warn!("Slot generation skipped: {self}");
                json!({
                    "error": "schedule_unavailable",
                    "message": "Availability could not be loaded right now.",
                    "slots": [],
                })
            }
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Failure inside a post-commit subscriber. Logged, never returned to callers.
#[derive(Debug, Error)]
pub enum SideEffectError {
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("push delivery failed: {0}")]
    Push(#[from] web_push::WebPushError),
}
