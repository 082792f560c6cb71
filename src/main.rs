use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use course_alert::delivery::{DeliveryClient, DeliveryConfig, HttpDeliveryClient, NoopDeliveryClient};
use course_alert::registrar::{
    NoopRegistrarClient, RegistrarClient, RegistrarConfig, RegistrarHttpClient,
};
use course_alert::routes::router;
use course_alert::services::{AlertScheduler, KeyedLocks};
use course_alert::state::{AppState, WebhookAuth};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "course_alert=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://course_alert.db".to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let registrar: Arc<dyn RegistrarClient> = match RegistrarConfig::new_from_env() {
        Ok(config) => Arc::new(RegistrarHttpClient::new(config)?),
        Err(e) => {
            warn!("registrar not configured ({}); dispatch will see no data", e);
            Arc::new(NoopRegistrarClient)
        }
    };

    let delivery: Arc<dyn DeliveryClient> = match DeliveryConfig::new_from_env() {
        Ok(config) => Arc::new(HttpDeliveryClient::new(config)?),
        Err(e) => {
            warn!("delivery relays not configured ({}); alerts will be dropped", e);
            Arc::new(NoopDeliveryClient)
        }
    };

    let webhook_auth = match WebhookAuth::new_from_env() {
        Ok(auth) => auth,
        Err(e) => {
            warn!("webhook auth not configured ({}); webhook ingestion disabled", e);
            WebhookAuth::default()
        }
    };

    let locks = Arc::new(KeyedLocks::new());

    let poll_interval_secs = std::env::var("POLL_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300);
    let scheduler = AlertScheduler::new(
        pool.clone(),
        registrar.clone(),
        delivery.clone(),
        locks.clone(),
        poll_interval_secs,
    );
    tokio::spawn(scheduler.start());

    let state = AppState {
        db: pool.clone(),
        registrar,
        delivery,
        locks,
        webhook_auth,
    };

    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
