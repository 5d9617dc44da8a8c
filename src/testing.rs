use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::{
    db::{new_id, run_migrations},
    models::{Booking, BookingMetadata, BookingSource, BookingStatus},
};

pub const ARTIST: &str = "6f1c2b1e-7c1d-4c55-9a55-0b6f3b7f6a01";

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create memory pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

pub fn utc(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("bad test timestamp")
        .with_timezone(&Utc)
}

pub fn sample_booking() -> Booking {
    Booking {
        id: new_id(),
        recipient_id: ARTIST.to_string(),
        sender_id: None,
        service_id: None,
        starts_at: utc("2026-01-05T15:00:00Z"),
        ends_at: utc("2026-01-05T15:30:00Z"),
        requested_date: "2026-01-05".into(),
        requested_time: "10:00".into(),
        status: BookingStatus::Pending,
        client_name: "Dana Reyes".into(),
        client_email: "dana@example.com".into(),
        client_phone: Some("+1 555 0100".into()),
        notes: None,
        source: BookingSource::Web,
        metadata: BookingMetadata {
            timezone: "America/New_York".into(),
            submitted_at: utc("2026-01-01T12:00:00Z"),
            user_agent: None,
        },
        created_at: utc("2026-01-01T12:00:00Z"),
    }
}

pub async fn add_availability(
    pool: &SqlitePool,
    artist_id: &str,
    day: &str,
    start: &str,
    end: &str,
    step: i64,
) {
    sqlx::query(
        r#"INSERT INTO artist_availability
           (id, artist_id, day_of_week, start_time, end_time, slot_duration_minutes, buffer_minutes, is_available)
           VALUES (?, ?, ?, ?, ?, ?, 0, 1)"#,
    )
    .bind(new_id())
    .bind(artist_id)
    .bind(day)
    .bind(start)
    .bind(end)
    .bind(step)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn add_time_off(pool: &SqlitePool, artist_id: &str, start: &str, end: &str) {
    sqlx::query("INSERT INTO time_off (id, artist_id, start_date, end_date) VALUES (?, ?, ?, ?)")
        .bind(new_id())
        .bind(artist_id)
        .bind(start)
        .bind(end)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn add_service(pool: &SqlitePool, minutes: i64) -> String {
    let id = new_id();
    sqlx::query("INSERT INTO services (id, name, duration_minutes) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(format!("{minutes} minute service"))
        .bind(minutes)
        .execute(pool)
        .await
        .unwrap();
    id
}
