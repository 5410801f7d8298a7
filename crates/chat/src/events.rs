use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use leaveflow_core::domain::{Approver, Requester, UserId};
use thiserror::Error;

use crate::{
    commands::{CommandParseError, CommandRouteError, CommandRouter, CommandService},
    messages::MessageTemplate,
    transport::{ChatId, MessageRef},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    pub event: ChatEvent,
}

impl Update {
    /// Chat a `Responded` result is delivered to.
    pub fn reply_chat(&self) -> Option<ChatId> {
        match &self.event {
            ChatEvent::Command(event) => Some(event.chat_id),
            ChatEvent::Text(event) => Some(event.chat_id),
            ChatEvent::Action(event) => event.message.map(|message| message.chat_id),
            ChatEvent::Unsupported { .. } => None,
        }
    }

    pub fn sender_id(&self) -> Option<UserId> {
        match &self.event {
            ChatEvent::Command(event) => Some(event.sender.user_id),
            ChatEvent::Text(event) => Some(event.sender.user_id),
            ChatEvent::Action(event) => Some(event.sender.user_id),
            ChatEvent::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    Command(CommandEvent),
    Text(TextMessageEvent),
    Action(ActionEvent),
    Unsupported { kind: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::Command(_) => ChatEventType::Command,
            Self::Text(_) => ChatEventType::Text,
            Self::Action(_) => ChatEventType::Action,
            Self::Unsupported { .. } => ChatEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    Command,
    Text,
    Action,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub display_name: String,
    pub handle: Option<String>,
}

impl Sender {
    pub fn requester(&self) -> Requester {
        Requester {
            id: self.user_id,
            display_name: self.display_name.clone(),
            handle: self.handle.clone(),
        }
    }

    pub fn approver(&self) -> Approver {
        Approver { id: self.user_id, display_name: self.display_name.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEvent {
    pub chat_id: ChatId,
    pub sender: Sender,
    /// Raw command token including the leading slash, e.g. `/request@leave_bot`.
    pub command: String,
    pub args: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessageEvent {
    pub chat_id: ChatId,
    pub sender: Sender,
    pub text: String,
}

impl TextMessageEvent {
    /// Private chats share their id with the user.
    pub fn is_private(&self) -> bool {
        self.chat_id.0 == self.sender.user_id.0
    }
}

impl CommandEvent {
    pub fn is_private(&self) -> bool {
        self.chat_id.0 == self.sender.user_id.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionEvent {
    pub action_id: String,
    /// Message carrying the pressed button; absent when it is too old to edit.
    pub message: Option<MessageRef>,
    pub sender: Sender,
    pub data: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl EventContext {
    pub fn for_update(update_id: i64) -> Self {
        Self { correlation_id: format!("update-{update_id}") }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Route(#[from] CommandRouteError),
    #[error("conversation handler failure: {0}")]
    Conversation(String),
    #[error("action handler failure: {0}")]
    Action(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChatEventType;
    async fn handle(
        &self,
        update: &Update,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChatEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        update: &Update,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&update.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(update, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Registers one handler per supported event type, all backed by `service`.
pub fn bot_dispatcher<S>(service: S) -> EventDispatcher
where
    S: CommandService + TextMessageService + ActionService + Clone + 'static,
{
    bot_dispatcher_for(service, None)
}

/// Like [`bot_dispatcher`], but commands addressed to another bot are ignored.
pub fn bot_dispatcher_for<S>(service: S, bot_username: Option<String>) -> EventDispatcher
where
    S: CommandService + TextMessageService + ActionService + Clone + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(CommandHandler::new(service.clone()).addressed_to(bot_username));
    dispatcher.register(TextMessageHandler::new(service.clone()));
    dispatcher.register(ActionHandler::new(service));
    dispatcher
}

pub struct CommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> CommandHandler<S>
where
    S: CommandService,
{
    pub fn new(service: S) -> Self {
        Self { router: CommandRouter::new(service) }
    }

    pub fn addressed_to(self, bot_username: Option<String>) -> Self {
        Self { router: self.router.addressed_to(bot_username) }
    }
}

#[async_trait]
impl<S> EventHandler for CommandHandler<S>
where
    S: CommandService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Command
    }

    async fn handle(
        &self,
        update: &Update,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::Command(event) = &update.event else {
            return Ok(HandlerResult::Ignored);
        };

        match self.router.route(event, ctx).await? {
            Some(message) => Ok(HandlerResult::Responded(message)),
            None => Ok(HandlerResult::Ignored),
        }
    }
}

#[async_trait]
pub trait TextMessageService: Send + Sync {
    async fn handle_text_message(
        &self,
        event: &TextMessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError>;
}

pub struct TextMessageHandler<S> {
    service: S,
}

impl<S> TextMessageHandler<S>
where
    S: TextMessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for TextMessageHandler<S>
where
    S: TextMessageService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Text
    }

    async fn handle(
        &self,
        update: &Update,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::Text(event) = &update.event else {
            return Ok(HandlerResult::Ignored);
        };

        let message = self.service.handle_text_message(event, ctx).await?;
        Ok(match message {
            Some(message) => HandlerResult::Responded(message),
            None => HandlerResult::Processed,
        })
    }
}

/// Button presses. Implementations deliver their own edits and answers, so
/// the handler never responds through the dispatcher.
#[async_trait]
pub trait ActionService: Send + Sync {
    async fn handle_action(
        &self,
        event: &ActionEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;
}

pub struct ActionHandler<S> {
    service: S,
}

impl<S> ActionHandler<S>
where
    S: ActionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ActionHandler<S>
where
    S: ActionService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Action
    }

    async fn handle(
        &self,
        update: &Update,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::Action(event) = &update.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.service.handle_action(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}
