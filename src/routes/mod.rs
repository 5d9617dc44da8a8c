use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::error::{BookingError, ScheduleError};

pub mod bookings;
pub mod events;
pub mod slots;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .configure(slots::configure)
        .configure(bookings::configure)
        .configure(events::configure);
}

/// Malformed JSON bodies get the same 400 shape as field validation errors.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| BookingError::Validation(vec![format!("body: {err}")]).into())
}

/// Query-string errors on the slot routes keep the `{error, message, slots}` shape.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ScheduleError::InvalidQuery(err.to_string()).into())
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
