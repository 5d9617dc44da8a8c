use actix_web::{dev::ServiceRequest, error::ErrorUnauthorized, web, Error};
use actix_web_httpauth::extractors::basic::BasicAuth;

use crate::{config::StaffCredentials, state::AppState};

impl StaffCredentials {
    pub fn matches(&self, username: &str, password: &str) -> bool {
        // Both comparisons always run.
        let user_ok = constant_time_eq(self.username.as_bytes(), username.as_bytes());
        let pass_ok = constant_time_eq(self.password.as_bytes(), password.as_bytes());
        user_ok & pass_ok
    }
}

fn constant_time_eq(expected: &[u8], given: &[u8]) -> bool {
    expected.len() == given.len()
        && expected
            .iter()
            .zip(given)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Guards routes that expose client contact details or change bookings.
pub async fn staff_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    let allowed = req
        .app_data::<web::Data<AppState>>()
        .and_then(|state| state.settings.staff.clone())
        .map(|staff| staff.matches(credentials.user_id(), credentials.password().unwrap_or_default()))
        .unwrap_or(false);

    if allowed {
        Ok(req)
    } else {
        log::warn!("Rejected staff credentials for {}", req.path());
        Err((ErrorUnauthorized("Unauthorized"), req))
    }
}
