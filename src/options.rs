//! Runtime feature flags, stored as key/value rows so they can be flipped
//! without a restart. Known keys: `REGISTRATION_OPEN` (bool, default true),
//! `SEND_FROM_WEBHOOK` (bool, default false), `SEMESTER` (text).

use sqlx::{Row, SqlitePool};

pub async fn get_value(db: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT value FROM options WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;
    Ok(row.map(|r| r.get("value")))
}

pub async fn get_bool(db: &SqlitePool, key: &str, default: bool) -> Result<bool, sqlx::Error> {
    Ok(get_value(db, key)
        .await?
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(default))
}

pub async fn set_value(db: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO options (key, value, value_type) VALUES (?, ?, 'TXT') \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn set_bool(db: &SqlitePool, key: &str, value: bool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO options (key, value, value_type) VALUES (?, ?, 'BOOL') \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(if value { "TRUE" } else { "FALSE" })
    .execute(db)
    .await?;
    Ok(())
}
