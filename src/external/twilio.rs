use crate::config::TwilioConfig;
use crate::error::{AppError, AppResult};
use crate::external::InviteNotifier;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SendSmsResponse {
    pub sid: String,
    pub status: String,
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
}

pub fn invite_message(inviter_name: &str, link: &str) -> String {
    format!("{inviter_name} invited you to join. Sign up here: {link}")
}

#[derive(Clone)]
pub struct TwilioService {
    client: Client,
    config: TwilioConfig,
}

impl TwilioService {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.account_sid.is_empty() && !self.config.auth_token.is_empty()
    }

    async fn send_sms(&self, phone: &str, body: &str) -> AppResult<SendSmsResponse> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.config.account_sid
        );

        let params = [
            ("To", phone),
            ("From", self.config.from_phone.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json::<SendSmsResponse>().await?)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(AppError::ExternalApiError(format!(
                "SMS sending failed: {error_text}"
            )))
        }
    }
}

#[async_trait]
impl InviteNotifier for TwilioService {
    async fn send_invite(&self, phone: &str, inviter_name: &str, link: &str) -> AppResult<()> {
        if !self.is_configured() {
            log::debug!("Twilio not configured, skipping invite SMS to {phone}");
            return Ok(());
        }

        match self.send_sms(phone, &invite_message(inviter_name, link)).await {
            Ok(resp) => {
                log::info!("Invite SMS sent to {phone}: sid {} ({})", resp.sid, resp.status);
                Ok(())
            }
            Err(e) => {
                log::error!("Invite SMS to {phone} failed: {e}");
                Err(e)
            }
        }
    }
}
