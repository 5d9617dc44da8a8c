use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use slotbook::{clock::FixedClock, config::Settings, db, routes, state::AppState};

const ARTIST: &str = "0b7f5a2c-3d4e-4f60-8a1b-2c3d4e5f6a7b";
// staff:letmein
const STAFF_AUTH: &str = "Basic c3RhZmY6bGV0bWVpbg==";
// staff:wrong
const BAD_AUTH: &str = "Basic c3RhZmY6d3Jvbmc=";

async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create pool");
    db::run_migrations(&pool).await.expect("Failed to migrate");
    pool
}

fn state(pool: SqlitePool) -> AppState {
    let settings = Settings::from_lookup(|key| match key {
        "STAFF_USERNAME" => Some("staff".to_string()),
        "STAFF_PASSWORD" => Some("letmein".to_string()),
        _ => None,
    })
    .expect("default settings");
    let now: DateTime<Utc> = "2026-01-01T12:00:00Z".parse().unwrap();
    AppState::new(pool, settings, Arc::new(FixedClock(now)))
}

async fn seed_monday(pool: &SqlitePool, start: &str, end: &str) {
    sqlx::query(
        r#"INSERT INTO artist_availability
           (id, artist_id, day_of_week, start_time, end_time, slot_duration_minutes, buffer_minutes, is_available)
           VALUES (?, ?, 'monday', ?, ?, 30, 0, 1)"#,
    )
    .bind(db::new_id())
    .bind(ARTIST)
    .bind(start)
    .bind(end)
    .execute(pool)
    .await
    .unwrap();
}

async fn seed_service(pool: &SqlitePool, minutes: i64) -> String {
    let id = db::new_id();
    sqlx::query("INSERT INTO services (id, name, duration_minutes) VALUES (?, 'Session', ?)")
        .bind(&id)
        .bind(minutes)
        .execute(pool)
        .await
        .unwrap();
    id
}

fn booking_body(starts_at: &str, ends_at: &str) -> Value {
    json!({
        "artist_id": ARTIST,
        "client_name": "Dana Reyes",
        "client_email": "dana@example.com",
        "client_phone": "+1 555 0100",
        "starts_at": starts_at,
        "ends_at": ends_at,
        "timezone": "America/New_York",
    })
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .app_data(routes::json_config())
                .app_data(routes::query_config())
                .configure(routes::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn health_reports_ok() {
    let app = app!(state(setup_pool().await));
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn guest_booking_is_created_pending() {
    let pool = setup_pool().await;
    let app = app!(state(pool.clone()));

    let req = test::TestRequest::post()
        .uri("/api/bookings")
        .insert_header(("User-Agent", "integration-test"))
        .set_json(booking_body("2026-01-05T10:00:00-05:00", "2026-01-05T10:30:00-05:00"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["booking"]["status"], "pending");
    assert_eq!(body["booking"]["sender_id"], Value::Null);
    assert_eq!(body["booking"]["requested_time"], "10:00");

    let id = body["booking_id"].as_str().unwrap().to_string();
    let req = test::TestRequest::get().uri(&format!("/api/bookings/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn overlapping_booking_gets_conflict() {
    let pool = setup_pool().await;
    let app = app!(state(pool.clone()));

    let req = test::TestRequest::post()
        .uri("/api/bookings")
        .set_json(booking_body("2026-01-05T10:00:00-05:00", "2026-01-05T10:30:00-05:00"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let id = body["booking_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/bookings/{id}/status"))
        .insert_header(("Authorization", STAFF_AUTH))
        .set_json(json!({ "status": "confirmed" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/api/bookings")
        .set_json(booking_body("2026-01-05T10:15:00-05:00", "2026-01-05T10:45:00-05:00"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "slot_unavailable");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[actix_web::test]
async fn invalid_submissions_are_rejected() {
    let app = app!(state(setup_pool().await));

    let mut body = booking_body("2026-01-05T10:30:00-05:00", "2026-01-05T10:00:00-05:00");
    body["client_email"] = json!("nope");
    let req = test::TestRequest::post().uri("/api/bookings").set_json(body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "validation_failed");

    let req = test::TestRequest::post()
        .uri("/api/bookings")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{\"artist_id\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "validation_failed");
}

#[actix_web::test]
async fn slots_are_labelled_in_artist_timezone() {
    let pool = setup_pool().await;
    seed_monday(&pool, "09:00", "10:00").await;
    let service_id = seed_service(&pool, 30).await;
    let app = app!(state(pool));

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/artists/{ARTIST}/slots?date=2026-01-05&service_id={service_id}&timezone=America/New_York"
        ))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let slots = body["slots"].as_array().unwrap();
    let times: Vec<&str> = slots.iter().map(|slot| slot["time"].as_str().unwrap()).collect();
    assert_eq!(times, vec!["09:00", "09:30"]);
    assert_eq!(slots[0]["start"], "2026-01-05T14:00:00Z");
    assert_eq!(body["duration_minutes"], 30);

    let req = test::TestRequest::get()
        .uri(&format!("/api/artists/{ARTIST}/slots/09:30?date=2026-01-05&service_id={service_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri(&format!("/api/artists/{ARTIST}/slots/11:00?date=2026-01-05&service_id={service_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn time_off_yields_no_slots() {
    let pool = setup_pool().await;
    seed_monday(&pool, "09:00", "17:00").await;
    sqlx::query("INSERT INTO time_off (id, artist_id, start_date, end_date) VALUES (?, ?, '2026-01-04', '2026-01-06')")
        .bind(db::new_id())
        .bind(ARTIST)
        .execute(&pool)
        .await
        .unwrap();
    let app = app!(state(pool));

    let req = test::TestRequest::get()
        .uri(&format!("/api/artists/{ARTIST}/slots?date=2026-01-05"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["slots"], json!([]));

    let req = test::TestRequest::get()
        .uri(&format!("/api/artists/{ARTIST}/dates/2026-01-05"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["available"], false);
}

#[actix_web::test]
async fn unknown_service_fails_closed() {
    let pool = setup_pool().await;
    seed_monday(&pool, "09:00", "17:00").await;
    let app = app!(state(pool));

    let missing = db::new_id();
    let req = test::TestRequest::get()
        .uri(&format!("/api/artists/{ARTIST}/slots?date=2026-01-05&service_id={missing}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["slots"], json!([]));

    let req = test::TestRequest::get()
        .uri(&format!("/api/artists/{ARTIST}/slots?date=January"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn date_availability_follows_rules_and_clock() {
    let pool = setup_pool().await;
    seed_monday(&pool, "09:00", "17:00").await;
    let app = app!(state(pool));

    let check = |date: &'static str| {
        test::TestRequest::get()
            .uri(&format!("/api/artists/{ARTIST}/dates/{date}"))
            .to_request()
    };

    let body: Value = test::call_and_read_body_json(&app, check("2026-01-05")).await;
    assert_eq!(body["available"], true);
    // Tuesday has no rule.
    let body: Value = test::call_and_read_body_json(&app, check("2026-01-06")).await;
    assert_eq!(body["available"], false);
    // Monday, but before the clock.
    let body: Value = test::call_and_read_body_json(&app, check("2025-12-29")).await;
    assert_eq!(body["available"], false);
}

#[actix_web::test]
async fn status_transitions_are_enforced() {
    let app = app!(state(setup_pool().await));

    let req = test::TestRequest::post()
        .uri("/api/bookings")
        .set_json(booking_body("2026-01-05T15:00:00Z", "2026-01-05T16:00:00Z"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let id = body["booking_id"].as_str().unwrap().to_string();

    let set = |status: &str| {
        test::TestRequest::post()
            .uri(&format!("/api/bookings/{id}/status"))
            .insert_header(("Authorization", STAFF_AUTH))
            .set_json(json!({ "status": status }))
            .to_request()
    };

    // No credentials, then wrong credentials: nothing changes.
    let req = test::TestRequest::post()
        .uri(&format!("/api/bookings/{id}/status"))
        .set_json(json!({ "status": "cancelled" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let req = test::TestRequest::post()
        .uri(&format!("/api/bookings/{id}/status"))
        .insert_header(("Authorization", BAD_AUTH))
        .set_json(json!({ "status": "cancelled" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(&app, set("declined")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = test::call_service(&app, set("confirmed")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let resp = test::call_service(&app, set("archived")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri(&format!("/api/bookings/{}", db::new_id()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn missing_date_is_a_json_query_error() {
    let app = app!(state(setup_pool().await));

    let req = test::TestRequest::get()
        .uri(&format!("/api/artists/{ARTIST}/slots"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_query");
    assert_eq!(body["slots"], json!([]));
}

#[actix_web::test]
async fn staff_routes_require_credentials() {
    let app = app!(state(setup_pool().await));

    let req = test::TestRequest::get().uri("/api/events").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/events")
        .insert_header(("Authorization", BAD_AUTH))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let subscription = json!({
        "endpoint": "https://push.example/abc",
        "keys": { "p256dh": "key", "auth": "secret" },
    });
    let req = test::TestRequest::post()
        .uri(&format!("/api/artists/{ARTIST}/push-subscriptions"))
        .set_json(subscription.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri(&format!("/api/artists/{ARTIST}/push-subscriptions"))
        .insert_header(("Authorization", STAFF_AUTH))
        .set_json(subscription)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn staff_routes_stay_locked_without_configured_login() {
    let pool = setup_pool().await;
    let settings = Settings::from_lookup(|_| None).expect("default settings");
    let now: DateTime<Utc> = "2026-01-01T12:00:00Z".parse().unwrap();
    let app = app!(AppState::new(pool, settings, Arc::new(FixedClock(now))));

    let req = test::TestRequest::get()
        .uri("/api/events")
        .insert_header(("Authorization", STAFF_AUTH))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
