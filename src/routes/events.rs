use actix_files::NamedFile;
use actix_web::{http::header, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{
    auth::staff_validator,
    effects::BookingEvent,
    error::BookingError,
    push::{self, PushSubscriptionInput, SCOPE_ARTIST, SCOPE_BOOKING},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/events")
            .wrap(HttpAuthentication::basic(staff_validator))
            .route(web::get().to(stream_events)),
    )
    .service(web::resource("/api/bookings/{id}/events").route(web::get().to(stream_booking_events)))
    .service(
        web::resource("/api/bookings/{id}/push-subscriptions")
            .route(web::post().to(subscribe_booking)),
    )
    .service(
        web::resource("/api/artists/{id}/push-subscriptions")
            .wrap(HttpAuthentication::basic(staff_validator))
            .route(web::post().to(subscribe_artist)),
    )
    .service(web::resource("/sw.js").route(web::get().to(service_worker)));
}

async fn service_worker() -> Result<NamedFile> {
    Ok(NamedFile::open("./static/sw.js")?)
}

async fn stream_events(state: web::Data<AppState>) -> HttpResponse {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event))),
        Err(_) => None,
    });

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

/// What a booking event looks like on the wire. Contact details and notes
/// never leave the service this way.
#[derive(serde::Serialize)]
struct PublicBookingEvent<'a> {
    kind: &'static str,
    booking_id: &'a str,
    artist_id: &'a str,
    status: &'static str,
    starts_at: String,
    ends_at: String,
}

impl<'a> From<&'a BookingEvent> for PublicBookingEvent<'a> {
    fn from(event: &'a BookingEvent) -> Self {
        let booking = event.booking();
        Self {
            kind: event.kind(),
            booking_id: &booking.id,
            artist_id: &booking.recipient_id,
            status: booking.status.as_str(),
            starts_at: booking.starts_at.to_rfc3339(),
            ends_at: booking.ends_at.to_rfc3339(),
        }
    }
}

async fn stream_booking_events(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let booking_id = path.into_inner();
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let event = result.ok()?;
        if event.booking().id != booking_id {
            return None;
        }
        Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event)))
    });

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

fn event_to_bytes(event: &BookingEvent) -> web::Bytes {
    let payload = serde_json::to_string(&PublicBookingEvent::from(event))
        .unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: update\ndata: {}\n\n", payload))
}

async fn subscribe_booking(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<PushSubscriptionInput>,
) -> Result<HttpResponse, BookingError> {
    let booking_id = path.into_inner();
    // 404 for unknown bookings.
    crate::booking::find_booking(&state.db, &booking_id).await?;
    push::store_subscription(&state.db, SCOPE_BOOKING, &booking_id, &body, state.clock.now()).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

async fn subscribe_artist(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<PushSubscriptionInput>,
) -> Result<HttpResponse, BookingError> {
    let artist_id = path.into_inner();
    if uuid::Uuid::parse_str(&artist_id).is_err() {
        return Err(BookingError::Validation(vec!["artist_id: uuid".to_string()]));
    }
    push::store_subscription(&state.db, SCOPE_ARTIST, &artist_id, &body, state.clock.now()).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_booking;

    #[test]
    fn frames_follow_sse_format() {
        let event = BookingEvent::BookingCreated { booking: sample_booking() };
        let frame = event_to_bytes(&event);
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("event: update\ndata: {"));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("\"kind\":\"booking_created\""));
    }

    #[test]
    fn frames_carry_no_contact_details() {
        let booking = sample_booking();
        let mut noted = booking.clone();
        noted.notes = Some("allergic to latex".into());
        noted.metadata.user_agent = Some("Mozilla/5.0".into());
        let frame = event_to_bytes(&BookingEvent::BookingCreated { booking: noted });
        let text = std::str::from_utf8(&frame).unwrap();

        for secret in [
            booking.client_name.as_str(),
            booking.client_email.as_str(),
            "+1 555 0100",
            "allergic to latex",
            "Mozilla/5.0",
        ] {
            assert!(!text.contains(secret), "frame leaked {secret}: {text}");
        }
        assert!(text.contains(&booking.id));
        assert!(text.contains("\"status\":\"pending\""));
    }
}
