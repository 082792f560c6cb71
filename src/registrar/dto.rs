use serde::{Deserialize, Serialize};

/// One course record as returned by the registrar API. `course_section` is
/// the compact code (`CIS160001`), `status` the single-letter status code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoursePayload {
    pub course_section: String,
    pub status: String,
    pub term: String,
    #[serde(default)]
    pub course_title: Option<String>,
}

/// Registrar responses wrap their records in a `result_data` array.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultPage {
    #[serde(default)]
    pub result_data: Vec<CoursePayload>,
}
