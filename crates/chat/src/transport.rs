use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::Update;
use crate::messages::MessageTemplate;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a message already delivered, used to edit it in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Request(String),
    #[error("chat api rejected `{method}`: {description}")]
    Api { method: String, description: String },
    #[error("transport response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &MessageTemplate,
    ) -> Result<MessageRef, TransportError>;

    async fn edit_message(
        &self,
        target: MessageRef,
        message: &MessageTemplate,
    ) -> Result<(), TransportError>;

    /// Acknowledges a button press so the client stops waiting.
    async fn answer_action(&self, action_id: &str, notice: Option<&str>)
        -> Result<(), TransportError>;
}

/// Source of inbound updates. `Ok(None)` means the stream has ended.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn next_batch(&self, offset: Option<i64>) -> Result<Option<Vec<Update>>, TransportError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent { chat_id: ChatId, message: MessageTemplate },
    Edited { target: MessageRef, message: MessageTemplate },
    Answered { action_id: String, notice: Option<String> },
}

/// Records everything it is asked to deliver. Sends to chats listed in
/// `failing_chats` fail with [`TransportError::Request`].
#[derive(Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<RecordingState>>,
}

#[derive(Default)]
struct RecordingState {
    deliveries: Vec<Delivery>,
    failing_chats: Vec<ChatId>,
    next_message_id: i64,
}

impl RecordingTransport {
    pub fn fail_sends_to(&self, chat_id: ChatId) {
        self.with_state(|state| state.failing_chats.push(chat_id));
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.with_state(|state| state.deliveries.clone())
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<MessageTemplate> {
        self.deliveries()
            .into_iter()
            .filter_map(|delivery| match delivery {
                Delivery::Sent { chat_id: target, message } if target == chat_id => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<(MessageRef, MessageTemplate)> {
        self.deliveries()
            .into_iter()
            .filter_map(|delivery| match delivery {
                Delivery::Edited { target, message } => Some((target, message)),
                _ => None,
            })
            .collect()
    }

    pub fn answered(&self) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .filter_map(|delivery| match delivery {
                Delivery::Answered { action_id, .. } => Some(action_id),
                _ => None,
            })
            .collect()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RecordingState) -> T) -> T {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &MessageTemplate,
    ) -> Result<MessageRef, TransportError> {
        self.with_state(|state| {
            if state.failing_chats.contains(&chat_id) {
                return Err(TransportError::Request(format!("chat {chat_id} unreachable")));
            }
            state.next_message_id += 1;
            state.deliveries.push(Delivery::Sent { chat_id, message: message.clone() });
            Ok(MessageRef { chat_id, message_id: state.next_message_id })
        })
    }

    async fn edit_message(
        &self,
        target: MessageRef,
        message: &MessageTemplate,
    ) -> Result<(), TransportError> {
        self.with_state(|state| {
            state.deliveries.push(Delivery::Edited { target, message: message.clone() });
            Ok(())
        })
    }

    async fn answer_action(
        &self,
        action_id: &str,
        notice: Option<&str>,
    ) -> Result<(), TransportError> {
        self.with_state(|state| {
            state.deliveries.push(Delivery::Answered {
                action_id: action_id.to_owned(),
                notice: notice.map(str::to_owned),
            });
            Ok(())
        })
    }
}
