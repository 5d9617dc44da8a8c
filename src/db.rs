use std::{fs, path::Path};

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::{
    format_timestamp, AvailabilityRow, Booking, BookingRow, BookingStatus, ServiceRow, TimeOffRow,
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub async fn log_activity(
    pool: &SqlitePool,
    kind: &str,
    message: &str,
    booking_id: Option<&str>,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO activities (id, kind, message, created_at, booking_id)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(kind)
    .bind(message)
    .bind(format_timestamp(at))
    .bind(booking_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_availability(
    pool: &SqlitePool,
    artist_id: &str,
) -> Result<Vec<AvailabilityRow>, sqlx::Error> {
    sqlx::query_as::<_, AvailabilityRow>(
        r#"SELECT id, artist_id, day_of_week, start_time, end_time,
                  slot_duration_minutes, buffer_minutes, is_available
           FROM artist_availability
           WHERE artist_id = ?
           ORDER BY rowid"#,
    )
    .bind(artist_id)
    .fetch_all(pool)
    .await
}

pub async fn fetch_time_off(
    pool: &SqlitePool,
    artist_id: &str,
) -> Result<Vec<TimeOffRow>, sqlx::Error> {
    sqlx::query_as::<_, TimeOffRow>(
        r#"SELECT id, artist_id, start_date, end_date, reason
           FROM time_off
           WHERE artist_id = ?
           ORDER BY start_date"#,
    )
    .bind(artist_id)
    .fetch_all(pool)
    .await
}

pub async fn fetch_service(
    pool: &SqlitePool,
    service_id: &str,
) -> Result<Option<ServiceRow>, sqlx::Error> {
    sqlx::query_as::<_, ServiceRow>(
        "SELECT id, name, duration_minutes, price_cents FROM services WHERE id = ? LIMIT 1",
    )
    .bind(service_id)
    .fetch_optional(pool)
    .await
}

/// `status IN (?, ..)` over the statuses that block a calendar, with the
/// values to bind in order.
fn occupying_filter() -> (String, Vec<&'static str>) {
    let statuses: Vec<&'static str> = BookingStatus::occupying().map(|status| status.as_str()).collect();
    let placeholders = vec!["?"; statuses.len()].join(", ");
    (format!("status IN ({placeholders})"), statuses)
}

/// Occupying bookings of an artist that intersect `[from, until)`.
pub async fn fetch_busy_intervals(
    pool: &SqlitePool,
    artist_id: &str,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<(String, String)>, sqlx::Error> {
    let (status_filter, statuses) = occupying_filter();
    let sql = format!(
        r#"SELECT starts_at, ends_at
           FROM bookings
           WHERE recipient_id = ?
             AND {status_filter}
             AND starts_at < ?
             AND ends_at > ?
           ORDER BY starts_at"#
    );

    let mut query = sqlx::query_as::<_, (String, String)>(&sql).bind(artist_id);
    for status in statuses {
        query = query.bind(status);
    }
    query
        .bind(format_timestamp(until))
        .bind(format_timestamp(from))
        .fetch_all(pool)
        .await
}

pub async fn fetch_booking(
    pool: &SqlitePool,
    booking_id: &str,
) -> Result<Option<BookingRow>, sqlx::Error> {
    sqlx::query_as::<_, BookingRow>(
        r#"SELECT id, recipient_id, sender_id, service_id, starts_at, ends_at,
                  requested_date, requested_time, status, client_name, client_email,
                  client_phone, notes, source, metadata, created_at
           FROM bookings
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(booking_id)
    .fetch_optional(pool)
    .await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Conflict,
}

/// Inserts the booking unless an occupying booking of the same artist
/// overlaps it. The check and the write happen under SQLite's write lock
/// (`BEGIN IMMEDIATE`), so two overlapping submissions cannot both land.
///
/// The transaction rolls back when dropped, so a caller that gives up
/// halfway (client disconnect, timeout) leaves the connection clean.
pub async fn insert_booking_if_free(
    pool: &SqlitePool,
    booking: &Booking,
) -> Result<InsertOutcome, sqlx::Error> {
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let outcome = conditional_insert(&mut tx, booking).await?;
    match outcome {
        InsertOutcome::Inserted => tx.commit().await?,
        InsertOutcome::Conflict => tx.rollback().await?,
    }
    Ok(outcome)
}

async fn conditional_insert(
    conn: &mut SqliteConnection,
    booking: &Booking,
) -> Result<InsertOutcome, sqlx::Error> {
    let metadata = serde_json::to_string(&booking.metadata)
        .map_err(|err| sqlx::Error::Encode(Box::new(err)))?;
    let starts_at = format_timestamp(booking.starts_at);
    let ends_at = format_timestamp(booking.ends_at);

    let (status_filter, statuses) = occupying_filter();
    let sql = format!(
        r#"INSERT INTO bookings
           (id, recipient_id, sender_id, service_id, starts_at, ends_at, requested_date,
            requested_time, status, client_name, client_email, client_phone, notes, source,
            metadata, created_at)
           SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
           WHERE NOT EXISTS (
               SELECT 1 FROM bookings
               WHERE recipient_id = ?
                 AND {status_filter}
                 AND starts_at < ?
                 AND ends_at > ?
           )"#
    );

    let mut query = sqlx::query(&sql)
        .bind(&booking.id)
        .bind(&booking.recipient_id)
        .bind(&booking.sender_id)
        .bind(&booking.service_id)
        .bind(&starts_at)
        .bind(&ends_at)
        .bind(&booking.requested_date)
        .bind(&booking.requested_time)
        .bind(booking.status.as_str())
        .bind(&booking.client_name)
        .bind(&booking.client_email)
        .bind(&booking.client_phone)
        .bind(&booking.notes)
        .bind(booking.source.as_str())
        .bind(metadata)
        .bind(format_timestamp(booking.created_at))
        .bind(&booking.recipient_id);
    for status in statuses {
        query = query.bind(status);
    }
    let result = query
        .bind(&ends_at)
        .bind(&starts_at)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 1 {
        Ok(InsertOutcome::Inserted)
    } else {
        Ok(InsertOutcome::Conflict)
    }
}

/// Moves a booking between statuses only if it is still in `from`.
/// Returns whether a row changed.
pub async fn set_booking_status(
    pool: &SqlitePool,
    booking_id: &str,
    from: BookingStatus,
    to: BookingStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE bookings SET status = ? WHERE id = ? AND status = ?")
        .bind(to.as_str())
        .bind(booking_id)
        .bind(from.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}
