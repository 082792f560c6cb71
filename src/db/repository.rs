use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{CourseUpdate, Registration, Section};

const REGISTRATION_COLUMNS: &str = "id, section_id, email, phone, notification_sent, \
     notification_sent_at, notification_sent_by, resubscribed_from, created_at";

pub async fn find_section(
    db: &SqlitePool,
    section_code: &str,
    semester: &str,
) -> Result<Option<Section>, sqlx::Error> {
    sqlx::query_as::<_, Section>(
        "SELECT id, section_code, semester, status, updated_at \
         FROM sections WHERE section_code = ? AND semester = ?",
    )
    .bind(section_code)
    .bind(semester)
    .fetch_optional(db)
    .await
}

pub async fn get_or_create_section(
    db: &SqlitePool,
    section_code: &str,
    semester: &str,
) -> Result<Section, sqlx::Error> {
    if let Some(section) = find_section(db, section_code, semester).await? {
        return Ok(section);
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO sections (id, section_code, semester, status, updated_at) \
         VALUES (?, ?, ?, '', ?)",
    )
    .bind(&id)
    .bind(section_code)
    .bind(semester)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(Section {
        id,
        section_code: section_code.to_string(),
        semester: semester.to_string(),
        status: String::new(),
        updated_at: now,
    })
}

pub async fn update_section_status(
    db: &SqlitePool,
    section_id: &str,
    status_code: &str,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE sections SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status_code)
        .bind(now)
        .bind(section_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn list_sections(db: &SqlitePool) -> Result<Vec<Section>, sqlx::Error> {
    sqlx::query_as::<_, Section>(
        "SELECT id, section_code, semester, status, updated_at \
         FROM sections ORDER BY section_code",
    )
    .fetch_all(db)
    .await
}

pub async fn insert_registration(
    db: &SqlitePool,
    section_id: &str,
    email: Option<&str>,
    phone: Option<&str>,
    resubscribed_from: Option<&str>,
) -> Result<Registration, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO registrations \
             (id, section_id, email, phone, notification_sent, \
             notification_sent_at, notification_sent_by, resubscribed_from, created_at) \
         VALUES (?, ?, ?, ?, 0, NULL, '', ?, ?)",
    )
    .bind(&id)
    .bind(section_id)
    .bind(email)
    .bind(phone)
    .bind(resubscribed_from)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(Registration {
        id,
        section_id: section_id.to_string(),
        email: email.map(str::to_string),
        phone: phone.map(str::to_string),
        notification_sent: false,
        notification_sent_at: None,
        notification_sent_by: String::new(),
        resubscribed_from: resubscribed_from.map(str::to_string),
        created_at: now,
    })
}

pub async fn find_registration(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<Registration>, sqlx::Error> {
    sqlx::query_as::<_, Registration>(&format!(
        "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Active registration with exactly the same contact identity for a section.
/// `IS` comparison makes absent email/phone match absent, not everything.
pub async fn find_active_duplicate(
    db: &SqlitePool,
    section_id: &str,
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<Option<Registration>, sqlx::Error> {
    sqlx::query_as::<_, Registration>(&format!(
        "SELECT {REGISTRATION_COLUMNS} FROM registrations \
         WHERE section_id = ? AND notification_sent = 0 AND email IS ? AND phone IS ? \
         LIMIT 1"
    ))
    .bind(section_id)
    .bind(email)
    .bind(phone)
    .fetch_optional(db)
    .await
}

pub async fn find_active_by_section(
    db: &SqlitePool,
    section_id: &str,
) -> Result<Vec<Registration>, sqlx::Error> {
    sqlx::query_as::<_, Registration>(&format!(
        "SELECT {REGISTRATION_COLUMNS} FROM registrations \
         WHERE section_id = ? AND notification_sent = 0 \
         ORDER BY rowid"
    ))
    .bind(section_id)
    .fetch_all(db)
    .await
}

/// The registration created by resubscribing from `reg_id`, if any.
/// This is the forward link of the resubscription chain.
pub async fn find_resubscription(
    db: &SqlitePool,
    reg_id: &str,
) -> Result<Option<Registration>, sqlx::Error> {
    sqlx::query_as::<_, Registration>(&format!(
        "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE resubscribed_from = ?"
    ))
    .bind(reg_id)
    .fetch_optional(db)
    .await
}

/// Claim the sent flag for a registration. Returns false when the
/// registration was already sent, so an alert is delivered at most once.
pub async fn mark_notification_sent(
    db: &SqlitePool,
    reg_id: &str,
    source_code: &str,
) -> Result<bool, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let rows = sqlx::query(
        "UPDATE registrations \
         SET notification_sent = 1, notification_sent_at = ?, notification_sent_by = ? \
         WHERE id = ? AND notification_sent = 0",
    )
    .bind(now)
    .bind(source_code)
    .bind(reg_id)
    .execute(db)
    .await?
    .rows_affected();

    Ok(rows > 0)
}

/// Unsent registrations for a semester as `(section_code, registration_id)`
/// pairs in insertion order.
pub async fn collect_unsent_by_semester(
    db: &SqlitePool,
    semester: &str,
) -> Result<Vec<(String, String)>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT s.section_code AS section_code, r.id AS registration_id \
         FROM registrations r JOIN sections s ON r.section_id = s.id \
         WHERE s.semester = ? AND r.notification_sent = 0 \
         ORDER BY r.rowid",
    )
    .bind(semester)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("section_code"), row.get("registration_id")))
        .collect())
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_course_update(
    db: &SqlitePool,
    section_code: &str,
    old_status: Option<&str>,
    new_status: &str,
    term: &str,
    source: &str,
    alert_sent: bool,
) -> Result<CourseUpdate, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO course_updates \
             (id, section_code, old_status, new_status, term, source, alert_sent, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(section_code)
    .bind(old_status)
    .bind(new_status)
    .bind(term)
    .bind(source)
    .bind(alert_sent)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(CourseUpdate {
        id,
        section_code: section_code.to_string(),
        old_status: old_status.map(str::to_string),
        new_status: new_status.to_string(),
        term: term.to_string(),
        source: source.to_string(),
        alert_sent,
        created_at: now,
    })
}

pub async fn list_course_updates(db: &SqlitePool) -> Result<Vec<CourseUpdate>, sqlx::Error> {
    sqlx::query_as::<_, CourseUpdate>(
        "SELECT id, section_code, old_status, new_status, term, source, alert_sent, created_at \
         FROM course_updates ORDER BY rowid",
    )
    .fetch_all(db)
    .await
}
