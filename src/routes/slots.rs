use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::ScheduleError,
    schedule::{load_day_plan, SlotQuery},
    state::AppState,
};

#[derive(Deserialize)]
struct SlotParams {
    date: String,
    service_id: Option<String>,
    timezone: Option<String>,
}

#[derive(Deserialize)]
struct DateParams {
    timezone: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/artists/{artist_id}/slots").route(web::get().to(list_slots)))
        .service(
            web::resource("/api/artists/{artist_id}/slots/{time}").route(web::get().to(slot_at_time)),
        )
        .service(
            web::resource("/api/artists/{artist_id}/dates/{date}")
                .route(web::get().to(date_availability)),
        );
}

async fn list_slots(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<SlotParams>,
) -> Result<HttpResponse, ScheduleError> {
    let artist_id = path.into_inner();
    let query = slot_query(&state, &artist_id, &params)?;
    let plan = load_day_plan(&state.db, &query, state.settings.buffer_policy).await?;
    let slots = plan.slots(state.clock.now());

    Ok(HttpResponse::Ok().json(json!({
        "artist_id": query.artist_id,
        "date": query.date.to_string(),
        "timezone": query.timezone.name(),
        "service_id": query.service_id,
        "duration_minutes": plan.duration_minutes,
        "slots": slots,
    })))
}

async fn slot_at_time(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    params: web::Query<SlotParams>,
) -> Result<HttpResponse, ScheduleError> {
    let (artist_id, time) = path.into_inner();
    let query = slot_query(&state, &artist_id, &params)?;
    let plan = load_day_plan(&state.db, &query, state.settings.buffer_policy).await?;

    match plan.slot_by_time(&time, state.clock.now()) {
        Some(slot) => Ok(HttpResponse::Ok().json(json!({ "slot": slot }))),
        None => Ok(HttpResponse::NotFound().json(json!({
            "error": "slot_not_found",
            "message": format!("No slot starts at {time} on {}.", query.date),
        }))),
    }
}

async fn date_availability(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    params: web::Query<DateParams>,
) -> Result<HttpResponse, ScheduleError> {
    let (artist_id, date) = path.into_inner();
    let query = SlotQuery::parse(
        &artist_id,
        &date,
        None,
        params.timezone.as_deref(),
        state.settings.default_timezone,
    )?;
    let plan = load_day_plan(&state.db, &query, state.settings.buffer_policy).await?;

    Ok(HttpResponse::Ok().json(json!({
        "artist_id": query.artist_id,
        "date": query.date.to_string(),
        "timezone": query.timezone.name(),
        "available": plan.is_date_available(state.clock.now()),
    })))
}

fn slot_query(
    state: &AppState,
    artist_id: &str,
    params: &SlotParams,
) -> Result<SlotQuery, ScheduleError> {
    SlotQuery::parse(
        artist_id,
        &params.date,
        params.service_id.as_deref(),
        params.timezone.as_deref(),
        state.settings.default_timezone,
    )
}
