//! Telegram Bot API client over HTTPS long polling.

use std::time::Duration;

use async_trait::async_trait;
use leaveflow_core::config::TelegramConfig;
use leaveflow_core::domain::UserId;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::commands::split_command;
use crate::events::{ActionEvent, ChatEvent, CommandEvent, Sender, TextMessageEvent, Update};
use crate::messages::{InlineKeyboard, MessageTemplate};
use crate::transport::{ChatId, ChatTransport, MessageRef, TransportError, UpdateSource};

/// Slack on top of the long-poll timeout before the HTTP request itself gives up.
const HTTP_GRACE_SECS: u64 = 10;

pub struct TelegramClient {
    http: Client,
    api_base_url: String,
    bot_token: SecretString,
    poll_timeout_secs: u64,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + HTTP_GRACE_SECS))
            .build()
            .map_err(|error| TransportError::Request(error.without_url().to_string()))?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{method}", self.api_base_url, self.bot_token.expose_secret());
        // Errors are stripped of their URL, which embeds the bot token.
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|error| TransportError::Request(error.without_url().to_string()))?;

        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await.map_err(|error| {
            TransportError::Decode(format!("{method} ({status}): {}", error.without_url()))
        })?;
        envelope.into_result(method)
    }

    /// Asks the API who this bot is; used to tell our commands from other bots'.
    pub async fn bot_username(&self) -> Result<Option<String>, TransportError> {
        let me: WireUser = self.call("getMe", &serde_json::json!({})).await?;
        Ok(me.username)
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &MessageTemplate,
    ) -> Result<MessageRef, TransportError> {
        let body = SendMessage {
            chat_id: chat_id.0,
            text: &message.text,
            reply_markup: message.keyboard.as_ref(),
        };
        let sent: WireMessage = self.call("sendMessage", &body).await?;
        Ok(MessageRef { chat_id: ChatId(sent.chat.id), message_id: sent.message_id })
    }

    async fn edit_message(
        &self,
        target: MessageRef,
        message: &MessageTemplate,
    ) -> Result<(), TransportError> {
        let body = EditMessageText {
            chat_id: target.chat_id.0,
            message_id: target.message_id,
            text: &message.text,
            reply_markup: message.keyboard.as_ref(),
        };
        // The API answers with the edited message, or `true` for inline messages.
        let _: serde_json::Value = self.call("editMessageText", &body).await?;
        Ok(())
    }

    async fn answer_action(
        &self,
        action_id: &str,
        notice: Option<&str>,
    ) -> Result<(), TransportError> {
        let body = AnswerCallbackQuery { callback_query_id: action_id, text: notice };
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn next_batch(&self, offset: Option<i64>) -> Result<Option<Vec<Update>>, TransportError> {
        let body = GetUpdates {
            offset,
            timeout: self.poll_timeout_secs,
            allowed_updates: &["message", "callback_query"],
        };
        let updates: Vec<WireUpdate> = self.call("getUpdates", &body).await?;
        debug!(event_name = "ingress.telegram.batch", count = updates.len(), "polled updates");
        Ok(Some(updates.into_iter().map(parse_update).collect()))
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> Result<T, TransportError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(TransportError::Decode(format!("{method}: missing result"))),
            (false, _) => Err(TransportError::Api {
                method: method.to_owned(),
                description: self.description.unwrap_or_else(|| "unknown error".to_owned()),
            }),
        }
    }
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboard>,
}

#[derive(Serialize)]
struct EditMessageText<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboard>,
}

#[derive(Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub callback_query: Option<WireCallbackQuery>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireMessage {
    pub message_id: i64,
    pub chat: WireChat,
    #[serde(default)]
    pub from: Option<WireUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireChat {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl WireUser {
    fn sender(&self) -> Sender {
        let display_name = match self.last_name.as_deref().filter(|last| !last.is_empty()) {
            Some(last) => format!("{} {last}", self.first_name),
            None => self.first_name.clone(),
        };
        Sender { user_id: UserId(self.id), display_name, handle: self.username.clone() }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireCallbackQuery {
    pub id: String,
    pub from: WireUser,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Maps a raw update onto the chat event model.
pub fn parse_update(update: WireUpdate) -> Update {
    let event = if let Some(query) = update.callback_query {
        ChatEvent::Action(ActionEvent {
            action_id: query.id,
            message: query.message.map(|message| MessageRef {
                chat_id: ChatId(message.chat.id),
                message_id: message.message_id,
            }),
            sender: query.from.sender(),
            data: query.data,
        })
    } else if let Some(message) = update.message {
        parse_message(message)
    } else {
        ChatEvent::Unsupported { kind: "update".to_owned() }
    };

    Update { update_id: update.update_id, event }
}

fn parse_message(message: WireMessage) -> ChatEvent {
    let (Some(from), Some(text)) = (message.from, message.text) else {
        return ChatEvent::Unsupported { kind: "message".to_owned() };
    };
    let chat_id = ChatId(message.chat.id);
    let sender = from.sender();

    match split_command(&text) {
        Some((command, args)) => ChatEvent::Command(CommandEvent {
            chat_id,
            sender,
            command: command.to_owned(),
            args: args.to_owned(),
        }),
        None => ChatEvent::Text(TextMessageEvent { chat_id, sender, text }),
    }
}
