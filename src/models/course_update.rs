use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Append-only audit record of an observed status transition and whether it
/// triggered alert delivery.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CourseUpdate {
    pub id: String,
    pub section_code: String,
    pub old_status: Option<String>,
    pub new_status: String,
    pub term: String,
    pub source: String,
    pub alert_sent: bool,
    pub created_at: String,
}
