use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db::repository;
use crate::delivery::DeliveryClient;
use crate::error::AppError;
use crate::models::{AlertSource, Registration, Section, SectionStatus, normalize_section_code};
use crate::options;
use crate::registrar::{CoursePayload, RegistrarClient};
use crate::services::locks::KeyedLocks;

/// A transition is alert-worthy iff the new status is Open, regardless of
/// the previous status. Reopenings after a flicker still alert: the
/// per-registration sent flag is the dedup mechanism, not this comparison.
pub fn should_alert(old: Option<SectionStatus>, new: SectionStatus) -> bool {
    if old.is_none() {
        debug!("no prior status recorded; evaluating on new status alone");
    }
    new.is_open()
}

/// Unsent registrations for a semester, grouped by canonical section code.
/// Registrations keep insertion order within a group. Empty map when there
/// is nothing to do.
pub async fn collect_registrations(
    db: &SqlitePool,
    semester: &str,
) -> Result<HashMap<String, Vec<String>>, AppError> {
    let rows = repository::collect_unsent_by_semester(db, semester).await?;
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for (section_code, reg_id) in rows {
        groups.entry(section_code).or_default().push(reg_id);
    }
    Ok(groups)
}

/// Currently-active (unsent) registrations for one section.
pub async fn get_active_registrations(
    db: &SqlitePool,
    section_code: &str,
    semester: &str,
) -> Result<Vec<Registration>, AppError> {
    match repository::find_section(db, section_code, semester).await? {
        Some(section) => Ok(repository::find_active_by_section(db, &section.id).await?),
        None => Ok(Vec::new()),
    }
}

/// What a status event did: the stored status it replaced and whether a
/// delivery pass ran.
#[derive(Debug, Clone, Copy)]
pub struct StatusEventOutcome {
    pub old_status: Option<SectionStatus>,
    pub alert_sent: bool,
}

pub struct AlertService {
    db: SqlitePool,
    registrar: Arc<dyn RegistrarClient>,
    delivery: Arc<dyn DeliveryClient>,
    locks: Arc<KeyedLocks>,
}

impl AlertService {
    pub fn new(
        db: SqlitePool,
        registrar: Arc<dyn RegistrarClient>,
        delivery: Arc<dyn DeliveryClient>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            db,
            registrar,
            delivery,
            locks,
        }
    }

    /// Deliver one alert and claim the sent flag. Returns whether anything
    /// was delivered. A registration that is already sent is skipped, and
    /// the flag is only written after a channel send was issued, so a
    /// delivery failure leaves it claimable by a later pass.
    pub async fn send_alert(
        &self,
        reg_id: &str,
        section_code: &str,
        source: AlertSource,
    ) -> Result<bool, AppError> {
        let reg = repository::find_registration(&self.db, reg_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if reg.notification_sent {
            return Ok(false);
        }

        let mut delivered = false;
        if reg.email.is_some() {
            match self.delivery.send_email(&reg, section_code).await {
                Ok(()) => delivered = true,
                Err(e) => warn!("email delivery failed for registration {}: {}", reg.id, e),
            }
        }
        if reg.phone.is_some() {
            match self.delivery.send_sms(&reg, section_code).await {
                Ok(()) => delivered = true,
                Err(e) => warn!("sms delivery failed for registration {}: {}", reg.id, e),
            }
        }

        if !delivered {
            warn!("no channel delivered for registration {}; leaving unsent", reg.id);
            return Ok(false);
        }

        repository::mark_notification_sent(&self.db, &reg.id, source.as_code()).await?;
        Ok(true)
    }

    /// Dispatch unit for one section: fetch fresh status from the registrar
    /// (the slow call), overwrite the stored status, and alert the given
    /// registrations when the section is open. Fetch failures abort with no
    /// side effects; the next poll retries. Serialized per section code.
    pub async fn send_alerts_for_section(
        &self,
        section_code: &str,
        reg_ids: &[String],
        semester: &str,
        source: AlertSource,
    ) -> Result<(), AppError> {
        let _guard = self.locks.acquire(section_code).await;

        let payload = match self.registrar.fetch_section(section_code, semester).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                warn!("no registrar data for {} {}; skipping dispatch", section_code, semester);
                return Ok(());
            }
            Err(e) => {
                warn!("registrar fetch failed for {} {}: {}", section_code, semester, e);
                return Ok(());
            }
        };

        let Some(new_status) = SectionStatus::from_code(payload.status.trim()) else {
            warn!(
                "unparseable status {:?} for {}; skipping dispatch",
                payload.status, section_code
            );
            return Ok(());
        };

        let section = repository::get_or_create_section(&self.db, section_code, semester).await?;
        let was = section.status();
        repository::update_section_status(&self.db, &section.id, new_status.as_code()).await?;

        if !should_alert(Some(was), new_status) {
            return Ok(());
        }

        for reg_id in reg_ids {
            // Failures are isolated per registration; siblings still go out.
            if let Err(e) = self.send_alert(reg_id, section_code, source).await {
                warn!("alert failed for registration {}: {}", reg_id, e);
            }
        }

        Ok(())
    }

    /// Webhook path: the event already carries the new status, so there is
    /// no registrar round trip. Mirrors the status into the store and, when
    /// `deliver` is set, alerts every currently-active registration of the
    /// section. The whole sequence holds the section lock: a poll dispatch
    /// parked in its registrar fetch cannot overwrite the event's status
    /// with a stale payload, and vice versa. Duplicate invocations are
    /// no-ops for registrations already marked sent.
    pub async fn ingest_status_event(
        &self,
        section_code: &str,
        semester: &str,
        new_status: SectionStatus,
        deliver: bool,
        source: AlertSource,
    ) -> Result<StatusEventOutcome, AppError> {
        let _guard = self.locks.acquire(section_code).await;

        let old_status = repository::find_section(&self.db, section_code, semester)
            .await?
            .map(|s| s.status());
        let section = repository::get_or_create_section(&self.db, section_code, semester).await?;
        repository::update_section_status(&self.db, &section.id, new_status.as_code()).await?;

        let mut alert_sent = false;
        if deliver && should_alert(old_status, new_status) {
            let registrations = repository::find_active_by_section(&self.db, &section.id).await?;
            let mut sent = 0;
            for reg in &registrations {
                match self.send_alert(&reg.id, section_code, source).await {
                    Ok(true) => sent += 1,
                    Ok(false) => {}
                    Err(e) => warn!("alert failed for registration {}: {}", reg.id, e),
                }
            }
            info!("alerted {} of {} registrations for {}", sent, registrations.len(), section_code);
            alert_sent = true;
        }

        Ok(StatusEventOutcome {
            old_status,
            alert_sent,
        })
    }

    /// Bulk status ingestion for a course-code prefix. Falls back to the
    /// `SEMESTER` option when no semester is supplied.
    pub async fn load_courses(
        &self,
        query: &str,
        semester: Option<&str>,
    ) -> Result<usize, AppError> {
        let semester = match semester {
            Some(s) => s.to_string(),
            None => options::get_value(&self.db, "SEMESTER")
                .await?
                .ok_or_else(|| AppError::BadRequest("no default semester configured".to_string()))?,
        };

        info!("loading courses with prefix {:?} for {}", query, semester);
        let results = self.registrar.fetch_courses(query, &semester).await?;

        let mut upserted = 0;
        for payload in &results {
            if self.upsert_from_payload(payload, &semester).await?.is_some() {
                upserted += 1;
            }
        }
        Ok(upserted)
    }

    async fn upsert_from_payload(
        &self,
        payload: &CoursePayload,
        semester: &str,
    ) -> Result<Option<Section>, AppError> {
        let Some(code) = normalize_section_code(&payload.course_section) else {
            warn!("skipping malformed course code {:?}", payload.course_section);
            return Ok(None);
        };
        let Some(status) = SectionStatus::from_code(payload.status.trim()) else {
            warn!("skipping unknown status {:?} for {}", payload.status, code);
            return Ok(None);
        };

        let section = repository::get_or_create_section(&self.db, &code, semester).await?;
        repository::update_section_status(&self.db, &section.id, status.as_code()).await?;
        Ok(Some(section))
    }
}
