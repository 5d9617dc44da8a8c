use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{clock::Clock, config::Settings, effects::EventBus};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: EventBus,
    pub settings: Settings,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(db: SqlitePool, settings: Settings, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            events: EventBus::new(settings.event_buffer),
            settings,
            clock,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PushConfig {
    pub public_key: String,
    pub private_key: String,
    pub subject: String,
}

impl PushConfig {
    pub fn enabled(&self) -> bool {
        !(self.public_key.trim().is_empty() || self.private_key.trim().is_empty())
    }
}
