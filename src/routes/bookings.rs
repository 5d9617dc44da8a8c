use actix_web::{http::header, web, HttpRequest, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::staff_validator,
    booking::{create_booking, find_booking, transition_booking, BookingContext, BookingRequest},
    effects::BookingEvent,
    error::BookingError,
    models::BookingStatus,
    state::AppState,
};

#[derive(Deserialize)]
struct StatusForm {
    status: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/bookings").route(web::post().to(submit_booking)))
        .service(web::resource("/api/bookings/{id}").route(web::get().to(show_booking)))
        .service(
            web::resource("/api/bookings/{id}/status")
                .wrap(HttpAuthentication::basic(staff_validator))
                .route(web::post().to(update_status)),
        );
}

async fn submit_booking(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<BookingRequest>,
) -> Result<HttpResponse, BookingError> {
    let request = body.into_inner().into_new_booking(state.settings.default_timezone)?;
    let context = BookingContext {
        // Public submissions are guests; member identity is attached upstream.
        sender_id: None,
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };

    let booking = create_booking(&state.db, request, &context, state.clock.now()).await?;

    state.events.publish(BookingEvent::BookingCreated {
        booking: booking.clone(),
    });

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "booking_id": booking.id,
        "booking": booking,
    })))
}

async fn show_booking(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, BookingError> {
    let booking = find_booking(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "booking": booking })))
}

async fn update_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<StatusForm>,
) -> Result<HttpResponse, BookingError> {
    let booking_id = path.into_inner();
    let next = BookingStatus::parse(body.status.trim()).ok_or_else(|| {
        BookingError::Validation(vec![format!("status: unknown value '{}'", body.status)])
    })?;

    let (booking, previous) = transition_booking(&state.db, &booking_id, next).await?;
    log::info!(
        "Booking {} moved from {} to {}",
        booking.id,
        previous.as_str(),
        booking.status.as_str()
    );

    state.events.publish(BookingEvent::BookingStatusChanged {
        booking: booking.clone(),
        previous,
    });

    Ok(HttpResponse::Ok().json(json!({ "success": true, "booking": booking })))
}
