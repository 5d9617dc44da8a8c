//! Post-commit booking events and the best-effort work hanging off them.
//!
//! A committed booking is published once on the [`EventBus`]. Every
//! subscriber owns its own receiver and task, so a slow or failing
//! notification, analytics or CRM write cannot touch the booking itself or
//! the other subscribers.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    db::log_activity,
    error::SideEffectError,
    models::{format_timestamp, Booking, BookingStatus},
    push,
    state::AppState,
};

pub const LEAD_NEW: &str = "new";
pub const LEAD_BOOKED: &str = "booked";
pub const LEAD_LOST: &str = "lost";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BookingEvent {
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        booking: Booking,
        previous: BookingStatus,
    },
}

impl BookingEvent {
    pub fn booking(&self) -> &Booking {
        match self {
            BookingEvent::BookingCreated { booking }
            | BookingEvent::BookingStatusChanged { booking, .. } => booking,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BookingEvent::BookingCreated { .. } => "booking_created",
            BookingEvent::BookingStatusChanged { .. } => "booking_status_changed",
        }
    }
}

#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<BookingEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.sender.subscribe()
    }

    /// Fire-and-forget. Having nobody listening is not an error.
    pub fn publish(&self, event: BookingEvent) {
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(receivers) => log::debug!("Published {kind} to {receivers} subscribers"),
            Err(_) => log::debug!("Published {kind} with no subscribers"),
        }
    }
}

/// Runs `handler` for every event on `rx` until the bus closes. Handler
/// errors are logged and the loop moves on to the next event.
pub fn spawn_subscriber<F, Fut>(
    name: &'static str,
    mut rx: broadcast::Receiver<BookingEvent>,
    handler: F,
) -> JoinHandle<()>
where
    F: Fn(BookingEvent) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), SideEffectError>> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let booking_id = event.booking().id.clone();
                    if let Err(err) = handler(event).await {
                        log::warn!("{name} failed for booking {booking_id}: {err}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("{name} fell behind and skipped {skipped} booking events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        log::debug!("{name} stopped");
    })
}

/// Wires the notification, analytics and CRM subscribers onto the bus.
pub fn start_subscribers(state: &AppState) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    let pool = state.db.clone();
    let clock = state.clock.clone();
    handles.push(spawn_subscriber("analytics", state.events.subscribe(), move |event| {
        let pool = pool.clone();
        let at = clock.now();
        async move { record_activity(&pool, &event, at).await }
    }));

    let pool = state.db.clone();
    let clock = state.clock.clone();
    handles.push(spawn_subscriber("crm sync", state.events.subscribe(), move |event| {
        let pool = pool.clone();
        let at = clock.now();
        async move { sync_crm_contact(&pool, &event, at).await }
    }));

    if state.settings.push.enabled() {
        let pool = state.db.clone();
        let config = state.settings.push.clone();
        handles.push(spawn_subscriber("push notifications", state.events.subscribe(), move |event| {
            let pool = pool.clone();
            let config = config.clone();
            async move { push::notify_for_event(&pool, &config, &event).await }
        }));
    }

    handles
}

pub async fn record_activity(
    pool: &SqlitePool,
    event: &BookingEvent,
    at: DateTime<Utc>,
) -> Result<(), SideEffectError> {
    let booking = event.booking();
    let message = match event {
        BookingEvent::BookingCreated { .. } => format!(
            "{} requested {} {} ({} booking).",
            booking.client_name,
            booking.requested_date,
            booking.requested_time,
            booking.source.as_str()
        ),
        BookingEvent::BookingStatusChanged { previous, .. } => format!(
            "Booking for {} moved from {} to {}.",
            booking.client_name,
            previous.as_str(),
            booking.status.as_str()
        ),
    };
    log_activity(pool, event.kind(), &message, Some(&booking.id), at).await?;
    Ok(())
}

/// Upserts the booking's client as a CRM contact. Rows with an empty
/// `synced_at` are picked up by the external CRM export.
pub async fn sync_crm_contact(
    pool: &SqlitePool,
    event: &BookingEvent,
    at: DateTime<Utc>,
) -> Result<(), SideEffectError> {
    let booking = event.booking();
    let (lead_status, increment) = match event {
        BookingEvent::BookingCreated { .. } => (LEAD_NEW, 1),
        BookingEvent::BookingStatusChanged { .. } => match booking.status {
            BookingStatus::Confirmed => (LEAD_BOOKED, 0),
            BookingStatus::Cancelled | BookingStatus::Declined => (LEAD_LOST, 0),
            BookingStatus::Pending => (LEAD_NEW, 0),
        },
    };

    sqlx::query(
        r#"INSERT INTO crm_contacts
           (email, name, phone, lead_status, last_booking_id, booking_count, source, updated_at, synced_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
           ON CONFLICT(email) DO UPDATE SET
             name = excluded.name,
             phone = COALESCE(excluded.phone, crm_contacts.phone),
             lead_status = excluded.lead_status,
             last_booking_id = excluded.last_booking_id,
             booking_count = crm_contacts.booking_count + ?,
             updated_at = excluded.updated_at,
             synced_at = NULL"#,
    )
    .bind(booking.client_email.to_lowercase())
    .bind(&booking.client_name)
    .bind(&booking.client_phone)
    .bind(lead_status)
    .bind(&booking.id)
    .bind(increment)
    .bind(booking.source.as_str())
    .bind(format_timestamp(at))
    .bind(increment)
    .execute(pool)
    .await?;
    Ok(())
}
