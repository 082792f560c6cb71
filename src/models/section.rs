use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Registrar status for one section. Stored in sqlite as the registrar's
/// single-letter code (`O`, `C`, `X`, empty string for unlisted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionStatus {
    Open,
    Closed,
    Cancelled,
    Unlisted,
}

impl SectionStatus {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "O" => Some(SectionStatus::Open),
            "C" => Some(SectionStatus::Closed),
            "X" => Some(SectionStatus::Cancelled),
            "" => Some(SectionStatus::Unlisted),
            _ => None,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            SectionStatus::Open => "O",
            SectionStatus::Closed => "C",
            SectionStatus::Cancelled => "X",
            SectionStatus::Unlisted => "",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, SectionStatus::Open)
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionStatus::Open => "Open",
            SectionStatus::Closed => "Closed",
            SectionStatus::Cancelled => "Cancelled",
            SectionStatus::Unlisted => "Unlisted",
        };
        write!(f, "{}", name)
    }
}

static COURSE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{3,4})-?(\d{3})-?(\d{3})$").expect("course code regex"));

/// Normalize a course/section code to the canonical `DEPT-NNN-NNN` form.
/// Accepts both the compact registrar form (`ANTH361401`) and the already
/// hyphenated form. Returns `None` when the code does not match.
pub fn normalize_section_code(raw: &str) -> Option<String> {
    let caps = COURSE_CODE_RE.captures(raw.trim())?;
    Some(format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]))
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Section {
    pub id: String,
    pub section_code: String,
    pub semester: String,
    pub status: String,
    pub updated_at: String,
}

impl Section {
    pub fn status(&self) -> SectionStatus {
        SectionStatus::from_code(&self.status).unwrap_or(SectionStatus::Unlisted)
    }

    pub fn is_open(&self) -> bool {
        self.status().is_open()
    }
}
