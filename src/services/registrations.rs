use sqlx::SqlitePool;
use tracing::info;

use crate::db::repository;
use crate::error::AppError;
use crate::models::{RegStatus, Registration, normalize_section_code};
use crate::services::locks::KeyedLocks;

// Shared by register and resubscribe so the two cannot interleave their
// read-then-create sequences for the same subscriber and section.
fn contact_key(section_id: &str, email: Option<&str>, phone: Option<&str>) -> String {
    format!(
        "contact:{}:{}:{}",
        section_id,
        email.unwrap_or(""),
        phone.unwrap_or("")
    )
}

fn normalize_contact(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Create a registration for a section. Duplicate detection matches the
/// exact (email, phone) identity against active registrations only: a
/// request with different contact info is a distinct subscription, and a
/// consumed registration never blocks re-registering.
pub async fn register_for_course(
    db: &SqlitePool,
    locks: &KeyedLocks,
    section_code: &str,
    semester: &str,
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<RegStatus, AppError> {
    let email = normalize_contact(email);
    let phone = normalize_contact(phone);
    if email.is_none() && phone.is_none() {
        return Ok(RegStatus::NoContactInfo);
    }

    let code = normalize_section_code(section_code)
        .ok_or_else(|| AppError::BadRequest(format!("invalid course code: {}", section_code)))?;

    let section = repository::get_or_create_section(db, &code, semester).await?;

    let _guard = locks.acquire(&contact_key(&section.id, email, phone)).await;
    if repository::find_active_duplicate(db, &section.id, email, phone)
        .await?
        .is_some()
    {
        return Ok(RegStatus::OpenRegistrationExists);
    }

    let reg = repository::insert_registration(db, &section.id, email, phone, None).await?;
    info!("created registration {} for {}", reg.id, code);
    Ok(RegStatus::Success)
}

/// Return the single active registration of this chain, creating a new
/// tail only when every node has been consumed.
///
/// The walk is forward: starting from the given node, follow the
/// registrations that were created *from* it. Resubscribing from a stale
/// link therefore lands on whatever is already pending further down the
/// chain instead of duplicating it.
pub async fn resubscribe(
    db: &SqlitePool,
    locks: &KeyedLocks,
    reg_id: &str,
) -> Result<Registration, AppError> {
    let reg = repository::find_registration(db, reg_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let key = contact_key(&reg.section_id, reg.email.as_deref(), reg.phone.as_deref());
    let _guard = locks.acquire(&key).await;

    // Re-read under the lock; a concurrent resubscribe may have appended.
    let mut current = repository::find_registration(db, reg_id)
        .await?
        .ok_or(AppError::NotFound)?;

    loop {
        if current.is_active() {
            return Ok(current);
        }
        match repository::find_resubscription(db, &current.id).await? {
            Some(next) => current = next,
            None => break,
        }
    }

    // Chain exhausted: append a new tail carrying the same contact info.
    let new_reg = repository::insert_registration(
        db,
        &current.section_id,
        current.email.as_deref(),
        current.phone.as_deref(),
        Some(&current.id),
    )
    .await?;
    info!("resubscribed {} as {}", current.id, new_reg.id);
    Ok(new_reg)
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    const TEST_SEMESTER: &str = "2019A";

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test db");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    async fn count_registrations(db: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM registrations")
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_registration() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();

        let res = register_for_course(
            &pool,
            &locks,
            "CIS-160-001",
            TEST_SEMESTER,
            Some("e@example.com"),
            Some("+15555555555"),
        )
        .await
        .unwrap();

        assert_eq!(res, RegStatus::Success);
        assert_eq!(count_registrations(&pool).await, 1);

        let section = repository::find_section(&pool, "CIS-160-001", TEST_SEMESTER)
            .await
            .unwrap()
            .unwrap();
        let regs = repository::find_active_by_section(&pool, &section.id)
            .await
            .unwrap();
        assert_eq!(regs[0].email.as_deref(), Some("e@example.com"));
        assert_eq!(regs[0].phone.as_deref(), Some("+15555555555"));
        assert!(!regs[0].notification_sent);
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();

        for expected in [RegStatus::Success, RegStatus::OpenRegistrationExists] {
            let res = register_for_course(
                &pool,
                &locks,
                "CIS-160-001",
                TEST_SEMESTER,
                Some("e@example.com"),
                Some("+15555555555"),
            )
            .await
            .unwrap();
            assert_eq!(res, expected);
        }
        assert_eq!(count_registrations(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_reregister_after_sent() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();

        register_for_course(
            &pool,
            &locks,
            "CIS-160-001",
            TEST_SEMESTER,
            Some("e@example.com"),
            None,
        )
        .await
        .unwrap();

        let section = repository::find_section(&pool, "CIS-160-001", TEST_SEMESTER)
            .await
            .unwrap()
            .unwrap();
        let reg = &repository::find_active_by_section(&pool, &section.id)
            .await
            .unwrap()[0];
        repository::mark_notification_sent(&pool, &reg.id, "LEG")
            .await
            .unwrap();

        let res = register_for_course(
            &pool,
            &locks,
            "CIS-160-001",
            TEST_SEMESTER,
            Some("e@example.com"),
            None,
        )
        .await
        .unwrap();
        assert_eq!(res, RegStatus::Success);
        assert_eq!(count_registrations(&pool).await, 2);
    }

    #[tokio::test]
    async fn test_same_user_different_section_and_course() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();

        for code in ["CIS-160-001", "CIS-160-002", "CIS-120-001"] {
            let res = register_for_course(
                &pool,
                &locks,
                code,
                TEST_SEMESTER,
                Some("e@example.com"),
                Some("+15555555555"),
            )
            .await
            .unwrap();
            assert_eq!(res, RegStatus::Success);
        }
        assert_eq!(count_registrations(&pool).await, 3);
    }

    #[tokio::test]
    async fn test_different_contact_is_distinct_subscription() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();

        register_for_course(
            &pool,
            &locks,
            "CIS-160-001",
            TEST_SEMESTER,
            Some("e@example.com"),
            None,
        )
        .await
        .unwrap();

        let res = register_for_course(
            &pool,
            &locks,
            "CIS-160-001",
            TEST_SEMESTER,
            Some("e@example.com"),
            Some("+15555555555"),
        )
        .await
        .unwrap();
        assert_eq!(res, RegStatus::Success);
        assert_eq!(count_registrations(&pool).await, 2);
    }

    #[tokio::test]
    async fn test_just_email_or_just_phone() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();

        let res = register_for_course(
            &pool,
            &locks,
            "CIS-160-001",
            TEST_SEMESTER,
            Some("e@example.com"),
            None,
        )
        .await
        .unwrap();
        assert_eq!(res, RegStatus::Success);

        let res = register_for_course(
            &pool,
            &locks,
            "CIS-160-002",
            TEST_SEMESTER,
            None,
            Some("5555555555"),
        )
        .await
        .unwrap();
        assert_eq!(res, RegStatus::Success);
        assert_eq!(count_registrations(&pool).await, 2);
    }

    #[tokio::test]
    async fn test_no_contact_info() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();

        let res = register_for_course(&pool, &locks, "CIS-160-001", TEST_SEMESTER, None, None)
            .await
            .unwrap();
        assert_eq!(res, RegStatus::NoContactInfo);

        let res =
            register_for_course(&pool, &locks, "CIS-160-001", TEST_SEMESTER, Some("  "), Some(""))
                .await
                .unwrap();
        assert_eq!(res, RegStatus::NoContactInfo);
        assert_eq!(count_registrations(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_invalid_course_code_rejected() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();

        let res = register_for_course(
            &pool,
            &locks,
            "not a course",
            TEST_SEMESTER,
            Some("e@example.com"),
            None,
        )
        .await;
        assert!(matches!(res, Err(AppError::BadRequest(_))));
        assert_eq!(count_registrations(&pool).await, 0);
    }

    async fn base_registration(pool: &SqlitePool) -> Registration {
        let section = repository::get_or_create_section(pool, "CIS-160-001", TEST_SEMESTER)
            .await
            .unwrap();
        repository::insert_registration(
            pool,
            &section.id,
            Some("e@example.com"),
            Some("+15555555555"),
            None,
        )
        .await
        .unwrap()
    }

    async fn chain_link(pool: &SqlitePool, from: &Registration, sent: bool) -> Registration {
        let reg = repository::insert_registration(
            pool,
            &from.section_id,
            from.email.as_deref(),
            from.phone.as_deref(),
            Some(&from.id),
        )
        .await
        .unwrap();
        if sent {
            repository::mark_notification_sent(pool, &reg.id, "LEG")
                .await
                .unwrap();
        }
        repository::find_registration(pool, &reg.id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_resubscribe_after_sent_creates_link() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();
        let base = base_registration(&pool).await;
        repository::mark_notification_sent(&pool, &base.id, "LEG")
            .await
            .unwrap();

        let reg = resubscribe(&pool, &locks, &base.id).await.unwrap();
        assert_ne!(reg.id, base.id);
        assert_eq!(reg.resubscribed_from.as_deref(), Some(base.id.as_str()));
        assert_eq!(reg.email, base.email);
        assert_eq!(reg.phone, base.phone);
        assert!(reg.is_active());
    }

    #[tokio::test]
    async fn test_resubscribe_active_is_noop() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();
        let base = base_registration(&pool).await;

        let reg = resubscribe(&pool, &locks, &base.id).await.unwrap();
        assert_eq!(reg.id, base.id);
        assert!(reg.resubscribed_from.is_none());

        // Still idempotent on a second call.
        let again = resubscribe(&pool, &locks, &base.id).await.unwrap();
        assert_eq!(again.id, base.id);
        assert_eq!(count_registrations(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_resubscribe_from_old_link_appends_to_tail() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();
        let base = base_registration(&pool).await;
        repository::mark_notification_sent(&pool, &base.id, "LEG")
            .await
            .unwrap();
        let reg1 = chain_link(&pool, &base, true).await;
        let reg2 = chain_link(&pool, &reg1, true).await;

        let result = resubscribe(&pool, &locks, &base.id).await.unwrap();
        assert_eq!(count_registrations(&pool).await, 4);
        assert_eq!(result.resubscribed_from.as_deref(), Some(reg2.id.as_str()));
    }

    #[tokio::test]
    async fn test_resubscribe_from_old_link_finds_pending_tail() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();
        let base = base_registration(&pool).await;
        repository::mark_notification_sent(&pool, &base.id, "LEG")
            .await
            .unwrap();
        let reg1 = chain_link(&pool, &base, true).await;
        let reg2 = chain_link(&pool, &reg1, true).await;
        let reg3 = chain_link(&pool, &reg2, false).await;

        let result = resubscribe(&pool, &locks, &base.id).await.unwrap();
        assert_eq!(count_registrations(&pool).await, 4);
        assert_eq!(result.id, reg3.id);
    }

    #[tokio::test]
    async fn test_resubscribe_exhausted_chain_creates_exactly_one_tail() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();
        let base = base_registration(&pool).await;
        repository::mark_notification_sent(&pool, &base.id, "LEG")
            .await
            .unwrap();
        let reg1 = chain_link(&pool, &base, true).await;

        let first = resubscribe(&pool, &locks, &base.id).await.unwrap();
        assert_eq!(first.resubscribed_from.as_deref(), Some(reg1.id.as_str()));
        assert_eq!(count_registrations(&pool).await, 3);

        let second = resubscribe(&pool, &locks, &base.id).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(count_registrations(&pool).await, 3);
    }

    #[tokio::test]
    async fn test_resubscribe_unknown_id_is_not_found() {
        let pool = setup_test_db().await;
        let locks = KeyedLocks::new();

        let res = resubscribe(&pool, &locks, "nope").await;
        assert!(matches!(res, Err(AppError::NotFound)));
    }
}
