//! Telegram chat alerts via the Bot API `sendMessage` endpoint

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::AlertNotifier;

pub struct TelegramNotifier {
    api_url: String,
    token: String,
    chat_id: String,
    http_client: Client,
}

impl TelegramNotifier {
    pub fn new(api_url: String, token: String, chat_id: String) -> Self {
        Self {
            api_url,
            token,
            chat_id,
            http_client: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_url.trim_end_matches('/'),
            self.token
        )
    }
}

#[async_trait]
impl AlertNotifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, message: &str) -> Result<()> {
        debug!("Sending tamper alert to Telegram chat {}", self.chat_id);

        let response = self
            .http_client
            .get(self.endpoint())
            .query(&[("chat_id", self.chat_id.as_str()), ("text", message)])
            .send()
            .await
            .map_err(|e| anyhow!("Telegram request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!("Telegram API returned {}", response.status()));
        }

        Ok(())
    }
}
