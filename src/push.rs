use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::{
    db::new_id,
    effects::BookingEvent,
    error::SideEffectError,
    models::format_timestamp,
    state::PushConfig,
};

pub const SCOPE_ARTIST: &str = "artist";
pub const SCOPE_BOOKING: &str = "booking";

#[derive(Debug, Deserialize)]
pub struct PushSubscriptionInput {
    pub endpoint: String,
    pub keys: PushKeys,
}

#[derive(Debug, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, sqlx::FromRow)]
struct PushSubscriptionRow {
    endpoint: String,
    p256dh: String,
    auth: String,
}

pub async fn store_subscription(
    pool: &SqlitePool,
    scope: &str,
    subject_id: &str,
    subscription: &PushSubscriptionInput,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO push_subscriptions (id, scope, subject_id, endpoint, p256dh, auth, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(scope, subject_id, endpoint) DO UPDATE SET
             p256dh = excluded.p256dh,
             auth = excluded.auth"#,
    )
    .bind(new_id())
    .bind(scope)
    .bind(subject_id)
    .bind(&subscription.endpoint)
    .bind(&subscription.keys.p256dh)
    .bind(&subscription.keys.auth)
    .bind(format_timestamp(at))
    .execute(pool)
    .await?;

    Ok(())
}

/// New bookings go to the artist's devices, status changes to the client's.
pub async fn notify_for_event(
    pool: &SqlitePool,
    config: &PushConfig,
    event: &BookingEvent,
) -> Result<(), SideEffectError> {
    let booking = event.booking();
    let status_url = format!("/api/bookings/{}", booking.id);
    match event {
        BookingEvent::BookingCreated { .. } => {
            let body = format!(
                "{} requested {} at {}.",
                booking.client_name, booking.requested_date, booking.requested_time
            );
            notify(pool, config, SCOPE_ARTIST, &booking.recipient_id, "New booking request", &body, &status_url)
                .await
        }
        BookingEvent::BookingStatusChanged { .. } => {
            let body = format!("Your booking is now {}.", booking.status.as_str());
            notify(pool, config, SCOPE_BOOKING, &booking.id, "Booking updated", &body, &status_url).await
        }
    }
}

async fn notify(
    pool: &SqlitePool,
    config: &PushConfig,
    scope: &str,
    subject_id: &str,
    title: &str,
    body: &str,
    url: &str,
) -> Result<(), SideEffectError> {
    if !config.enabled() {
        return Ok(());
    }

    let rows = sqlx::query_as::<_, PushSubscriptionRow>(
        "SELECT endpoint, p256dh, auth FROM push_subscriptions WHERE scope = ? AND subject_id = ?",
    )
    .bind(scope)
    .bind(subject_id)
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        return Ok(());
    }

    let payload = serde_json::json!({
        "title": title,
        "body": body,
        "url": url,
    })
    .to_string();

    let client = IsahcWebPushClient::new()?;
    for row in rows {
        // One dead endpoint must not starve the others.
        if let Err(err) = send_push(&client, config, row, &payload).await {
            log::warn!("Push send failed: {err}");
        }
    }
    Ok(())
}

async fn send_push(
    client: &IsahcWebPushClient,
    config: &PushConfig,
    row: PushSubscriptionRow,
    payload: &str,
) -> Result<(), WebPushError> {
    let subscription = SubscriptionInfo::new(row.endpoint, row.p256dh, row.auth);
    let mut builder = WebPushMessageBuilder::new(&subscription);
    builder.set_payload(ContentEncoding::Aes128Gcm, payload.as_bytes());

    let mut vapid_builder =
        VapidSignatureBuilder::from_base64(&config.private_key, URL_SAFE_NO_PAD, &subscription)?;
    vapid_builder.add_claim("sub", config.subject.clone());

    builder.set_vapid_signature(vapid_builder.build()?);

    client.send(builder.build()?).await?;
    Ok(())
}
