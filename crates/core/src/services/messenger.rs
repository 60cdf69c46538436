//! Outbound chat messages.
//!
//! Provides an abstraction over the chat transport. The shipped
//! implementation talks to the Telegram Bot API.

use std::{sync::Arc, time::Duration};

use accord_common::{AppError, AppResult, config::TelegramConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A message to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    /// Post as a reply to this message, keeping it in the message's thread.
    pub reply_to_message_id: Option<i32>,
    /// Render `text` as Markdown.
    pub markdown: bool,
}

impl OutboundMessage {
    /// Plain-text message to a chat.
    #[must_use]
    pub fn plain(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            reply_to_message_id: None,
            markdown: false,
        }
    }

    /// Markdown message to a chat.
    #[must_use]
    pub fn markdown(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            markdown: true,
            ..Self::plain(chat_id, text)
        }
    }

    /// Thread the message under `message_id`.
    #[must_use]
    pub const fn in_reply_to(mut self, message_id: Option<i32>) -> Self {
        self.reply_to_message_id = message_id;
        self
    }
}

/// Chat transport.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver a message.
    async fn send(&self, message: OutboundMessage) -> AppResult<()>;

    /// Create a single-use invite link for `chat_id`.
    async fn create_invite_link(&self, chat_id: i64, label: &str) -> AppResult<String>;
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct BotResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InviteLink {
    invite_link: String,
}

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i32>,
    disable_web_page_preview: bool,
}

/// Telegram Bot API messenger.
#[derive(Clone)]
pub struct TelegramMessenger {
    api_base: String,
    http_client: Arc<reqwest::Client>,
}

impl TelegramMessenger {
    /// Create a messenger for the configured bot.
    pub fn new(config: &TelegramConfig) -> AppResult<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(AppError::Config("telegram.bot_token is empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_base: format!(
                "{}/bot{}",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
            http_client: Arc::new(http_client),
        })
    }

    async fn call<T, B>(&self, method: &str, body: &B) -> AppResult<T>
    where
        T: for<'de> Deserialize<'de>,
        B: Serialize + Sync,
    {
        let response = self
            .http_client
            .post(format!("{}/{method}", self.api_base))
            .json(body)
            .send()
            .await
            // reqwest errors can carry the URL, which embeds the bot token
            .map_err(|e| {
                AppError::ExternalService(format!("Telegram {method} failed: {}", e.without_url()))
            })?;

        let status = response.status();
        let envelope: BotResponse<T> = response.json().await.map_err(|e| {
            AppError::ExternalService(format!(
                "Telegram {method} returned HTTP {status} with unreadable body: {}",
                e.without_url()
            ))
        })?;

        match envelope {
            BotResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            BotResponse { description, .. } => Err(AppError::ExternalService(format!(
                "Telegram {method} rejected (HTTP {status}): {}",
                description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, message: OutboundMessage) -> AppResult<()> {
        let body = SendMessageBody {
            chat_id: message.chat_id,
            text: &message.text,
            parse_mode: message.markdown.then_some("Markdown"),
            reply_to_message_id: message.reply_to_message_id,
            disable_web_page_preview: true,
        };

        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    async fn create_invite_link(&self, chat_id: i64, label: &str) -> AppResult<String> {
        // Bot API caps link names at 32 characters
        let name: String = label.chars().take(32).collect();
        let body = json!({
            "chat_id": chat_id,
            "name": name,
            "member_limit": 1,
        });

        let link: InviteLink = self.call("createChatInviteLink", &body).await?;
        Ok(link.invite_link)
    }
}
