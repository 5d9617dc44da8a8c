use std::env;

use chrono_tz::Tz;
use thiserror::Error;

use crate::{slots::BufferPolicy, state::PushConfig};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/bookings.db";
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

#[derive(Debug, Error)]
#[error("invalid value for {key}: {value}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub port: u16,
    pub default_timezone: Tz,
    pub buffer_policy: BufferPolicy,
    pub event_buffer: usize,
    pub push: PushConfig,
    /// Basic-auth login for the staff routes. `None` locks them.
    pub staff: Option<StaffCredentials>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffCredentials {
    pub username: String,
    pub password: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let port = parse_or("PORT", lookup("PORT"), 8080)?;
        let event_buffer = parse_or("EVENT_BUFFER", lookup("EVENT_BUFFER"), 256usize)?;
        if event_buffer == 0 {
            return Err(ConfigError {
                key: "EVENT_BUFFER",
                value: "0".to_string(),
            });
        }

        let timezone = lookup("DEFAULT_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let default_timezone = timezone.parse::<Tz>().map_err(|_| ConfigError {
            key: "DEFAULT_TIMEZONE",
            value: timezone.clone(),
        })?;

        let buffer_policy = match lookup("SLOT_BUFFER_POLICY") {
            Some(value) => value.parse::<BufferPolicy>().map_err(|_| ConfigError {
                key: "SLOT_BUFFER_POLICY",
                value,
            })?,
            None => BufferPolicy::default(),
        };

        let push = PushConfig {
            public_key: lookup("VAPID_PUBLIC_KEY").unwrap_or_default(),
            private_key: lookup("VAPID_PRIVATE_KEY").unwrap_or_default(),
            subject: lookup("VAPID_SUBJECT").unwrap_or_else(|| "mailto:bookings@example.com".to_string()),
        };
        if !push.enabled() {
            log::warn!("VAPID keys not set. Push notifications are disabled.");
        }

        let staff = match (lookup("STAFF_USERNAME"), lookup("STAFF_PASSWORD")) {
            (Some(username), Some(password))
                if !username.trim().is_empty() && !password.is_empty() =>
            {
                Some(StaffCredentials {
                    username: username.trim().to_string(),
                    password,
                })
            }
            _ => {
                log::warn!("STAFF_USERNAME/STAFF_PASSWORD not set. Staff routes will refuse every request.");
                None
            }
        };

        Ok(Self {
            database_url,
            port,
            default_timezone,
            buffer_policy,
            event_buffer,
            push,
            staff,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError { key, value }),
        None => Ok(default),
    }
}
