use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::AppError;
use crate::models::Registration;

#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    pub email_relay_url: String,
    pub sms_relay_url: String,
    pub api_token: String,
}

impl DeliveryConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let email_relay_url = env::var("EMAIL_RELAY_URL")
            .map_err(|_| AppError::BadRequest("EMAIL_RELAY_URL is not set".to_string()))?;
        let sms_relay_url = env::var("SMS_RELAY_URL")
            .map_err(|_| AppError::BadRequest("SMS_RELAY_URL is not set".to_string()))?;
        let api_token = env::var("DELIVERY_TOKEN")
            .map_err(|_| AppError::BadRequest("DELIVERY_TOKEN is not set".to_string()))?;

        Ok(Self {
            email_relay_url,
            sms_relay_url,
            api_token,
        })
    }
}

/// Outbound alert channels. Each send is fire-and-forget from the core's
/// perspective: a failure is logged by the caller and never retried within
/// the same dispatch.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send_email(&self, reg: &Registration, section_code: &str) -> Result<(), AppError>;
    async fn send_sms(&self, reg: &Registration, section_code: &str) -> Result<(), AppError>;
}

#[derive(Debug, Serialize)]
struct AlertMessage<'a> {
    to: &'a str,
    subject: &'a str,
    body: String,
}

pub struct HttpDeliveryClient {
    client: Client,
    config: DeliveryConfig,
}

impl HttpDeliveryClient {
    pub fn new(config: DeliveryConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::BadRequest(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn post_message(&self, url: &str, message: &AlertMessage<'_>) -> Result<(), AppError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.config.api_token))
            .json(message)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("delivery request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "delivery relay error {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn send_email(&self, reg: &Registration, section_code: &str) -> Result<(), AppError> {
        let Some(email) = reg.email.as_deref() else {
            return Ok(());
        };
        let message = AlertMessage {
            to: email,
            subject: "A course is now open",
            body: format!(
                "{} is now open for registration. Sign up before it fills!",
                section_code
            ),
        };
        self.post_message(&self.config.email_relay_url, &message).await
    }

    async fn send_sms(&self, reg: &Registration, section_code: &str) -> Result<(), AppError> {
        let Some(phone) = reg.phone.as_deref() else {
            return Ok(());
        };
        let message = AlertMessage {
            to: phone,
            subject: "Course alert",
            body: format!("{} is now open for registration!", section_code),
        };
        self.post_message(&self.config.sms_relay_url, &message).await
    }
}

pub struct NoopDeliveryClient;

#[async_trait]
impl DeliveryClient for NoopDeliveryClient {
    async fn send_email(&self, _reg: &Registration, _section_code: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn send_sms(&self, _reg: &Registration, _section_code: &str) -> Result<(), AppError> {
        Ok(())
    }
}
