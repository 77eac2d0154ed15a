use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TelegramConfig;

/// Delivers a composed alert to the configured destination
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Telegram Bot API `sendMessage` client
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("uriwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client for Telegram")?;

        let endpoint = format!(
            "{}/bot{}/sendMessage",
            config.api_url.trim_end_matches('/'),
            config.bot_token
        );

        Ok(Self {
            client,
            endpoint,
            chat_id: config.chat_id.clone(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await
            // The endpoint embeds the bot token, keep it out of the logs
            .map_err(|e| e.without_url())
            .context("failed to reach Telegram")?;

        let status = response.status();
        let body: BotResponse = response
            .json()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("unexpected Telegram response (HTTP {status})"))?;

        if !body.ok {
            bail!(
                "Telegram rejected the message (HTTP {}): {}",
                status,
                body.description.unwrap_or_else(|| "no description".to_string())
            );
        }

        debug!("Alert delivered to chat {}", self.chat_id);
        Ok(())
    }
}
