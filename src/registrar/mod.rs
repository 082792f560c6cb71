pub mod dto;

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use crate::error::AppError;

pub use dto::CoursePayload;

#[derive(Clone, Debug)]
pub struct RegistrarConfig {
    pub base_url: String,
    pub api_token: String,
    pub timeout_secs: u64,
}

impl RegistrarConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let base_url = env::var("REGISTRAR_BASE_URL")
            .map_err(|_| AppError::BadRequest("REGISTRAR_BASE_URL is not set".to_string()))?;
        let api_token = env::var("REGISTRAR_TOKEN")
            .map_err(|_| AppError::BadRequest("REGISTRAR_TOKEN is not set".to_string()))?;
        let timeout_secs = env::var("REGISTRAR_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            base_url,
            api_token,
            timeout_secs,
        })
    }
}

/// Authoritative course-data source. The status fetch is a slow external
/// call; dispatch runs it from background tasks, never inside a request.
#[async_trait]
pub trait RegistrarClient: Send + Sync {
    /// Fresh status payload for one section, `None` when the registrar has
    /// no record of it.
    async fn fetch_section(
        &self,
        section_code: &str,
        semester: &str,
    ) -> Result<Option<CoursePayload>, AppError>;

    /// All course payloads matching a course-code prefix.
    async fn fetch_courses(
        &self,
        query: &str,
        semester: &str,
    ) -> Result<Vec<CoursePayload>, AppError>;
}

pub struct RegistrarHttpClient {
    client: Client,
    config: RegistrarConfig,
}

impl RegistrarHttpClient {
    pub fn new(config: RegistrarConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::BadRequest(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn query_page(&self, url: &str) -> Result<dto::ResultPage, AppError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.config.api_token))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("registrar request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "registrar API error {}: {}",
                status, body
            )));
        }

        response
            .json::<dto::ResultPage>()
            .await
            .map_err(|e| AppError::Upstream(format!("failed to parse registrar response: {}", e)))
    }
}

#[async_trait]
impl RegistrarClient for RegistrarHttpClient {
    async fn fetch_section(
        &self,
        section_code: &str,
        semester: &str,
    ) -> Result<Option<CoursePayload>, AppError> {
        let url = format!(
            "{}/courses/{}/{}",
            self.config.base_url, semester, section_code
        );
        let page = self.query_page(&url).await?;
        if page.result_data.is_empty() {
            warn!("registrar returned no data for {} {}", section_code, semester);
        }
        Ok(page.result_data.into_iter().next())
    }

    async fn fetch_courses(
        &self,
        query: &str,
        semester: &str,
    ) -> Result<Vec<CoursePayload>, AppError> {
        let url = format!(
            "{}/courses/{}?course_id={}",
            self.config.base_url, semester, query
        );
        let page = self.query_page(&url).await?;
        Ok(page.result_data)
    }
}

/// Stand-in used when no registrar credentials are configured. Every fetch
/// reports "no data", so dispatch aborts without side effects.
pub struct NoopRegistrarClient;

#[async_trait]
impl RegistrarClient for NoopRegistrarClient {
    async fn fetch_section(
        &self,
        _section_code: &str,
        _semester: &str,
    ) -> Result<Option<CoursePayload>, AppError> {
        Ok(None)
    }

    async fn fetch_courses(
        &self,
        _query: &str,
        _semester: &str,
    ) -> Result<Vec<CoursePayload>, AppError> {
        Ok(Vec::new())
    }
}
