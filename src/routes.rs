use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;

use crate::db::repository;
use crate::error::AppError;
use crate::models::{
    AlertSource, RegStatus, RegisterRequest, Registration, Section, SectionStatus,
    normalize_section_code,
};
use crate::options;
use crate::services::{AlertService, register_for_course, resubscribe};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/resubscribe/{id}", post(resubscribe_handler))
        .route("/sections", get(get_sections))
        .route("/webhook", post(accept_webhook))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    if !options::get_bool(&state.db, "REGISTRATION_OPEN", true).await? {
        return Err(AppError::RegistrationClosed);
    }

    let semester = options::get_value(&state.db, "SEMESTER")
        .await?
        .ok_or_else(|| AppError::BadRequest("No default semester configured".to_string()))?;

    let res = register_for_course(
        &state.db,
        &state.locks,
        &req.section,
        &semester,
        req.email.as_deref(),
        req.phone.as_deref(),
    )
    .await?;

    match res {
        RegStatus::Success => Ok(Json(MessageResponse {
            message: format!("Your registration for {} was successful!", req.section),
        })),
        RegStatus::OpenRegistrationExists => Err(AppError::Conflict(format!(
            "You've already registered to get alerts for {}!",
            req.section
        ))),
        RegStatus::NoContactInfo => Err(AppError::BadRequest(
            "Please enter either a phone number or an email address.".to_string(),
        )),
    }
}

async fn resubscribe_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Registration>, AppError> {
    let reg = resubscribe(&state.db, &state.locks, &id).await?;
    Ok(Json(reg))
}

async fn get_sections(State(state): State<AppState>) -> Result<Json<Vec<Section>>, AppError> {
    let sections = repository::list_sections(&state.db).await?;
    Ok(Json(sections))
}

fn extract_basic_auth(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Webhook ingestion: authenticated status-change events from the course
/// status service. Always records a CourseUpdate once the payload is
/// accepted; delivery additionally requires the section to be open and the
/// `SEND_FROM_WEBHOOK` flag.
async fn accept_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageResponse>, AppError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let (username, password) = extract_basic_auth(auth_header).ok_or(AppError::Unauthorized)?;
    if state.webhook_auth.username.is_empty()
        || username != state.webhook_auth.username
        || password != state.webhook_auth.password
    {
        return Err(AppError::Unauthorized);
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.to_ascii_lowercase().contains("json") {
        return Err(AppError::UnsupportedMediaType);
    }

    let data: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("Error decoding JSON body".to_string()))?;

    let course_section = data
        .get("course_section")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::BadRequest("Course ID could not be extracted".to_string()))?;
    let status_code = data
        .get("status")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::BadRequest("Course status could not be extracted".to_string()))?;
    let term = data
        .get("term")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::BadRequest("Course term could not be extracted".to_string()))?;

    let code = normalize_section_code(course_section).ok_or_else(|| {
        AppError::BadRequest(format!("invalid course code: {}", course_section))
    })?;
    let new_status = SectionStatus::from_code(status_code)
        .ok_or_else(|| AppError::BadRequest(format!("unknown status code: {}", status_code)))?;

    // The webhook carries authoritative status. Mirroring and delivery run
    // inside the service under the section lock, so an overlapping poll
    // dispatch cannot clobber this event with a stale registrar payload.
    let deliver = options::get_bool(&state.db, "SEND_FROM_WEBHOOK", false).await?;
    let service = AlertService::new(
        state.db.clone(),
        state.registrar.clone(),
        state.delivery.clone(),
        state.locks.clone(),
    );
    let outcome = service
        .ingest_status_event(&code, term, new_status, deliver, AlertSource::Webhook)
        .await?;

    repository::insert_course_update(
        &state.db,
        &code,
        outcome.old_status.map(|s| s.as_code()),
        new_status.as_code(),
        term,
        "WEB",
        outcome.alert_sent,
    )
    .await?;

    let message = if outcome.alert_sent {
        "webhook received, alerts sent"
    } else {
        "webhook received"
    };
    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_basic_auth() {
        let encoded = BASE64.encode("webhook:password");
        let header = format!("Basic {}", encoded);
        assert_eq!(
            extract_basic_auth(&header),
            Some(("webhook".to_string(), "password".to_string()))
        );
    }

    #[test]
    fn test_extract_basic_auth_rejects_malformed() {
        assert_eq!(extract_basic_auth(""), None);
        assert_eq!(extract_basic_auth("Bearer abc"), None);
        assert_eq!(extract_basic_auth("Basic !!!"), None);

        let no_colon = format!("Basic {}", BASE64.encode("webhookpassword"));
        assert_eq!(extract_basic_auth(&no_colon), None);
    }
}
