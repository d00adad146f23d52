//! Minimal Telegram Bot API client: long polling plus message sending.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Default Bot API root.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
/// Telegram's per-message text limit.
pub const MESSAGE_LIMIT: usize = 4096;

/// Errors returned by the Bot API client.
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    /// Transport or decoding failure.
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The API answered `ok: false`.
    #[error("telegram API error in {method}: {description}")]
    Api {
        /// Bot API method.
        method: &'static str,
        /// Error description from Telegram.
        description: String,
    },
}

/// Envelope every Bot API response is wrapped in.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// Success flag.
    pub ok: bool,
    /// Payload when `ok`.
    pub result: Option<T>,
    /// Error description when not `ok`.
    pub description: Option<String>,
}

/// One inbound update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Monotonic update id.
    pub update_id: i64,
    /// New message, when the update carries one.
    pub message: Option<Message>,
}

/// Chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message id within the chat.
    pub message_id: i64,
    /// Sender; absent for channel posts.
    pub from: Option<User>,
    /// Chat the message belongs to.
    pub chat: Chat,
    /// Text body, absent for media.
    pub text: Option<String>,
    /// Unix timestamp.
    pub date: i64,
}

/// Telegram user or bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: i64,
    /// True for bots.
    pub is_bot: bool,
    /// First name.
    pub first_name: String,
    /// Username without `@`.
    pub username: Option<String>,
}

/// Chat descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    /// Chat id.
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`.
    #[serde(rename = "type")]
    pub chat_type: String,
}

/// Text message from a human, extracted from an [`Update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Chat to reply to.
    pub chat_id: i64,
    /// Sender id, used as the session key.
    pub user_id: i64,
    /// Message text.
    pub text: String,
}

impl Update {
    /// Text messages from humans only; bots and media are skipped.
    pub fn inbound(&self) -> Option<Inbound> {
        let message = self.message.as_ref()?;
        let from = message.from.as_ref()?;
        if from.is_bot {
            return None;
        }
        let text = message.text.as_ref()?;
        Some(Inbound {
            chat_id: message.chat.id,
            user_id: from.id,
            text: text.clone(),
        })
    }
}

/// Reply keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyboardButton {
    /// Button label, sent back verbatim when pressed.
    pub text: String,
}

/// Keyboard attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReplyMarkup {
    /// Show a custom keyboard.
    Keyboard {
        /// Button rows.
        keyboard: Vec<Vec<KeyboardButton>>,
        /// Let clients shrink the keyboard.
        resize_keyboard: bool,
    },
    /// Hide any custom keyboard.
    Remove {
        /// Always true.
        remove_keyboard: bool,
    },
}

impl ReplyMarkup {
    /// Keyboard from rows of labels.
    pub fn keyboard(rows: &[&[&str]]) -> Self {
        Self::Keyboard {
            keyboard: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|label| KeyboardButton {
                            text: (*label).to_string(),
                        })
                        .collect()
                })
                .collect(),
            resize_keyboard: true,
        }
    }

    /// Keyboard removal.
    pub fn remove() -> Self {
        Self::Remove {
            remove_keyboard: true,
        }
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a ReplyMarkup>,
}

#[derive(Serialize)]
struct SendChatAction {
    chat_id: i64,
    action: &'static str,
}

/// Async Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base: String,
}

impl TelegramClient {
    /// Client for `token` against `api_base` (normally [`DEFAULT_API_BASE`]).
    pub fn new(token: &str, api_base: &str) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), token.trim()),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base)
    }

    async fn unwrap_response<T: DeserializeOwned>(
        method: &'static str,
        response: reqwest::Response,
    ) -> Result<T, TelegramError> {
        let body: ApiResponse<T> = response.json().await?;
        match (body.ok, body.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TelegramError::Api {
                method,
                description: body.description.unwrap_or_else(|| "missing result".into()),
            }),
        }
    }

    /// Identity of the bot behind the token.
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        let response = self.client.get(self.url("getMe")).send().await?;
        Self::unwrap_response("getMe", response).await
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        let response = self
            .client
            .get(self.url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout.as_secs().to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .timeout(timeout + Duration::from_secs(10))
            .send()
            .await?;
        Self::unwrap_response("getUpdates", response).await
    }

    /// Sends plain text, optionally with a keyboard.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<&ReplyMarkup>,
    ) -> Result<(), TelegramError> {
        let response = self
            .client
            .post(self.url("sendMessage"))
            .json(&SendMessage {
                chat_id,
                text,
                reply_markup: markup,
            })
            .timeout(Duration::from_secs(30))
            .send()
            .await?;
        Self::unwrap_response::<serde_json::Value>("sendMessage", response).await?;
        Ok(())
    }

    /// Shows the "typing…" indicator.
    pub async fn send_typing(&self, chat_id: i64) -> Result<(), TelegramError> {
        let response = self
            .client
            .post(self.url("sendChatAction"))
            .json(&SendChatAction {
                chat_id,
                action: "typing",
            })
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        Self::unwrap_response::<bool>("sendChatAction", response).await?;
        Ok(())
    }
}

/// Splits `text` into pieces of at most `limit` characters, preferring
/// line breaks as cut points.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut parts = Vec::new();
    let mut rest = text;
    while rest.chars().count() > limit {
        let hard_cut = rest
            .char_indices()
            .nth(limit)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        match rest[..hard_cut].rfind('\n').filter(|&idx| idx > 0) {
            Some(newline) => {
                parts.push(rest[..newline].to_string());
                rest = &rest[newline + 1..];
            }
            None => {
                parts.push(rest[..hard_cut].to_string());
                rest = &rest[hard_cut..];
            }
        }
    }
    if !rest.is_empty() || parts.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_updates_and_skips_bots() {
        let body = serde_json::json!({
            "ok": true,
            "result": [
                {"update_id": 10, "message": {"message_id": 1, "date": 0,
                    "from": {"id": 7, "is_bot": false, "first_name": "Аня"},
                    "chat": {"id": 70, "type": "private"}, "text": "Привет"}},
                {"update_id": 11, "message": {"message_id": 2, "date": 0,
                    "from": {"id": 8, "is_bot": true, "first_name": "bot"},
                    "chat": {"id": 70, "type": "private"}, "text": "spam"}},
                {"update_id": 12, "message": {"message_id": 3, "date": 0,
                    "from": {"id": 7, "is_bot": false, "first_name": "Аня"},
                    "chat": {"id": 70, "type": "private"}}},
                {"update_id": 13}
            ]
        });
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_value(body).unwrap();
        let updates = parsed.result.unwrap();
        let inbound: Vec<Inbound> = updates.iter().filter_map(Update::inbound).collect();
        assert_eq!(
            inbound,
            vec![Inbound {
                chat_id: 70,
                user_id: 7,
                text: "Привет".into()
            }]
        );
    }

    #[test]
    fn serializes_keyboards() {
        let keyboard = serde_json::to_value(ReplyMarkup::keyboard(&[&["A", "B"], &["C"]])).unwrap();
        assert_eq!(
            keyboard,
            serde_json::json!({
                "keyboard": [[{"text": "A"}, {"text": "B"}], [{"text": "C"}]],
                "resize_keyboard": true
            })
        );
        let remove = serde_json::to_value(ReplyMarkup::remove()).unwrap();
        assert_eq!(remove, serde_json::json!({"remove_keyboard": true}));
    }

    #[test]
    fn short_messages_stay_whole() {
        assert_eq!(split_message("ответ", MESSAGE_LIMIT), vec!["ответ"]);
        assert_eq!(split_message("", MESSAGE_LIMIT), vec![""]);
    }

    #[test]
    fn splits_on_newlines_then_hard_cuts() {
        assert_eq!(split_message("абв\nгде", 5), vec!["абв", "где"]);
        assert_eq!(split_message("абвгдеж", 3), vec!["абв", "где", "ж"]);
        let long = "я".repeat(MESSAGE_LIMIT * 2 + 1);
        let parts = split_message(&long, MESSAGE_LIMIT);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.chars().count() <= MESSAGE_LIMIT));
    }
}
