use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::delivery::DeliveryClient;
use crate::models::AlertSource;
use crate::options;
use crate::registrar::RegistrarClient;
use crate::services::alerts::{AlertService, collect_registrations};
use crate::services::locks::KeyedLocks;

/// Background poll loop: every interval, group unsent registrations by
/// section and spawn one dispatch task per section. Sections are
/// independent; ordering across them is not guaranteed.
pub struct AlertScheduler {
    db: SqlitePool,
    registrar: Arc<dyn RegistrarClient>,
    delivery: Arc<dyn DeliveryClient>,
    locks: Arc<KeyedLocks>,
    interval: Duration,
}

impl AlertScheduler {
    pub fn new(
        db: SqlitePool,
        registrar: Arc<dyn RegistrarClient>,
        delivery: Arc<dyn DeliveryClient>,
        locks: Arc<KeyedLocks>,
        interval_secs: u64,
    ) -> Self {
        Self {
            db,
            registrar,
            delivery,
            locks,
            interval: Duration::from_secs(interval_secs),
        }
    }

    pub async fn start(self) {
        info!("Starting alert poll scheduler (interval: {:?})", self.interval);

        loop {
            tokio::time::sleep(self.interval).await;

            if let Err(e) = self.run_once().await {
                // Keep polling; the next pass retries everything unsent.
                warn!("Alert poll pass failed: {:?}", e);
            }
        }
    }

    async fn run_once(&self) -> Result<(), crate::error::AppError> {
        let Some(semester) = options::get_value(&self.db, "SEMESTER").await? else {
            warn!("SEMESTER option not set; skipping poll pass");
            return Ok(());
        };

        let groups = collect_registrations(&self.db, &semester).await?;
        if groups.is_empty() {
            return Ok(());
        }
        info!("dispatching alerts for {} sections", groups.len());

        for (section_code, reg_ids) in groups {
            let service = AlertService::new(
                self.db.clone(),
                self.registrar.clone(),
                self.delivery.clone(),
                self.locks.clone(),
            );
            let semester = semester.clone();
            tokio::spawn(async move {
                if let Err(e) = service
                    .send_alerts_for_section(
                        &section_code,
                        &reg_ids,
                        &semester,
                        AlertSource::LegacyPoll,
                    )
                    .await
                {
                    warn!("dispatch failed for {}: {:?}", section_code, e);
                }
            });
        }

        Ok(())
    }
}
