use std::env;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::delivery::DeliveryClient;
use crate::error::AppError;
use crate::registrar::RegistrarClient;
use crate::services::KeyedLocks;

/// Credentials the webhook caller must present via HTTP Basic auth. An
/// empty username means ingestion is not configured and every call is
/// rejected.
#[derive(Clone, Debug, Default)]
pub struct WebhookAuth {
    pub username: String,
    pub password: String,
}

impl WebhookAuth {
    pub fn new_from_env() -> Result<Self, AppError> {
        let username = env::var("WEBHOOK_USERNAME")
            .map_err(|_| AppError::BadRequest("WEBHOOK_USERNAME is not set".to_string()))?;
        let password = env::var("WEBHOOK_PASSWORD")
            .map_err(|_| AppError::BadRequest("WEBHOOK_PASSWORD is not set".to_string()))?;
        Ok(Self { username, password })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub registrar: Arc<dyn RegistrarClient>,
    pub delivery: Arc<dyn DeliveryClient>,
    pub locks: Arc<KeyedLocks>,
    pub webhook_auth: WebhookAuth,
}
