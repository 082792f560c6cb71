use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Which pathway delivered an alert. Stored as a short code in
/// `notification_sent_by`; the empty string means not yet sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSource {
    LegacyPoll,
    Webhook,
    CourseStatusService,
    Admin,
}

impl AlertSource {
    pub fn as_code(&self) -> &'static str {
        match self {
            AlertSource::LegacyPoll => "LEG",
            AlertSource::Webhook => "WEB",
            AlertSource::CourseStatusService => "SERV",
            AlertSource::Admin => "ADM",
        }
    }
}

/// One subscriber's interest in one section. Never deleted; the only
/// mutation after insert is marking the notification sent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Registration {
    pub id: String,
    pub section_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notification_sent: bool,
    pub notification_sent_at: Option<String>,
    pub notification_sent_by: String,
    pub resubscribed_from: Option<String>,
    pub created_at: String,
}

impl Registration {
    /// An unsent registration is "active": it still owes its subscriber an
    /// alert and blocks duplicate subscriptions with the same contact info.
    pub fn is_active(&self) -> bool {
        !self.notification_sent
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub section: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Outcome of a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegStatus {
    Success,
    OpenRegistrationExists,
    NoContactInfo,
}
