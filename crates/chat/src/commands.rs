use async_trait::async_trait;
use thiserror::Error;

use crate::events::{CommandEvent, EventContext, EventHandlerError};
use crate::messages::{self, MessageTemplate};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Request,
    Balance,
    Cancel,
    Unknown { name: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("not a bot command: `{0}`")]
    NotACommand(String),
    #[error("empty bot command")]
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

impl BotCommand {
    /// Parses a command token such as `/request` or `/request@leave_bot`.
    /// Names are matched case-insensitively.
    pub fn parse(token: &str) -> Result<Self, CommandParseError> {
        let token = token.trim();
        let Some(body) = token.strip_prefix('/') else {
            return Err(CommandParseError::NotACommand(token.to_owned()));
        };
        let name = body.split_once('@').map_or(body, |(name, _bot)| name);
        if name.is_empty() {
            return Err(CommandParseError::Empty);
        }

        Ok(match name.to_ascii_lowercase().as_str() {
            "start" | "help" => Self::Start,
            "request" => Self::Request,
            "balance" => Self::Balance,
            "cancel" => Self::Cancel,
            other => Self::Unknown { name: other.to_owned() },
        })
    }
}

/// The bot a command token is addressed to, e.g. `leave_bot` in `/request@leave_bot`.
pub fn addressee(token: &str) -> Option<&str> {
    token.trim().split_once('@').map(|(_, bot)| bot).filter(|bot| !bot.is_empty())
}

/// Splits message text into its leading command token and the remainder.
pub fn split_command(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }
    Some(match text.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (text, ""),
    })
}

#[async_trait]
pub trait CommandService: Send + Sync {
    async fn start(
        &self,
        event: &CommandEvent,
        ctx: &EventContext,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn request(
        &self,
        event: &CommandEvent,
        ctx: &EventContext,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn balance(
        &self,
        event: &CommandEvent,
        ctx: &EventContext,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn cancel(
        &self,
        event: &CommandEvent,
        ctx: &EventContext,
    ) -> Result<MessageTemplate, CommandRouteError>;
}

pub struct CommandRouter<S> {
    service: S,
    bot_username: Option<String>,
}

impl<S> CommandRouter<S>
where
    S: CommandService,
{
    pub fn new(service: S) -> Self {
        Self { service, bot_username: None }
    }

    /// Commands suffixed with another bot's name are left alone once the
    /// router knows its own username.
    pub fn addressed_to(mut self, bot_username: Option<String>) -> Self {
        self.bot_username = bot_username
            .map(|name| name.trim_start_matches('@').to_owned())
            .filter(|name| !name.is_empty());
        self
    }

    fn is_for_this_bot(&self, token: &str) -> bool {
        match (addressee(token), self.bot_username.as_deref()) {
            (Some(target), Some(own)) => target.eq_ignore_ascii_case(own),
            _ => true,
        }
    }

    /// Returns `None` for commands meant for a different bot.
    pub async fn route(
        &self,
        event: &CommandEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        if !self.is_for_this_bot(&event.command) {
            return Ok(None);
        }

        let message = match BotCommand::parse(&event.command)? {
            BotCommand::Start => self.service.start(event, ctx).await?,
            BotCommand::Request => self.service.request(event, ctx).await?,
            BotCommand::Balance => self.service.balance(event, ctx).await?,
            BotCommand::Cancel => self.service.cancel(event, ctx).await?,
            BotCommand::Unknown { name } => messages::unknown_command_message(&format!("/{name}")),
        };
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use leaveflow_core::domain::UserId;

    use super::{
        addressee, split_command, BotCommand, CommandParseError, CommandRouteError, CommandRouter,
        CommandService,
    };
    use crate::events::{CommandEvent, EventContext, Sender};
    use crate::messages::MessageTemplate;
    use crate::transport::ChatId;

    struct NamedReplies;

    #[async_trait]
    impl CommandService for NamedReplies {
        async fn start(
            &self,
            _event: &CommandEvent,
            _ctx: &EventContext,
        ) -> Result<MessageTemplate, CommandRouteError> {
            Ok(MessageTemplate::plain("start"))
        }

        async fn request(
            &self,
            _event: &CommandEvent,
            _ctx: &EventContext,
        ) -> Result<MessageTemplate, CommandRouteError> {
            Ok(MessageTemplate::plain("request"))
        }

        async fn balance(
            &self,
            _event: &CommandEvent,
            _ctx: &EventContext,
        ) -> Result<MessageTemplate, CommandRouteError> {
            Ok(MessageTemplate::plain("balance"))
        }

        async fn cancel(
            &self,
            _event: &CommandEvent,
            _ctx: &EventContext,
        ) -> Result<MessageTemplate, CommandRouteError> {
            Ok(MessageTemplate::plain("cancel"))
        }
    }

    fn group_command(token: &str) -> CommandEvent {
        CommandEvent {
            chat_id: ChatId(-100),
            sender: Sender { user_id: UserId(42), display_name: "Ana Lima".to_owned(), handle: None },
            command: token.to_owned(),
            args: String::new(),
        }
    }

    #[tokio::test]
    async fn commands_for_other_bots_are_left_alone() {
        let router = CommandRouter::new(NamedReplies).addressed_to(Some("@Leave_Bot".to_owned()));
        let ctx = EventContext::default();

        let other = router.route(&group_command("/request@some_other_bot"), &ctx).await;
        let own = router.route(&group_command("/request@leave_bot"), &ctx).await;
        let bare = router.route(&group_command("/request"), &ctx).await;

        assert_eq!(other, Ok(None));
        assert_eq!(own, Ok(Some(MessageTemplate::plain("request"))));
        assert_eq!(bare, Ok(Some(MessageTemplate::plain("request"))));
    }

    #[tokio::test]
    async fn router_without_username_accepts_any_suffix() {
        let router = CommandRouter::new(NamedReplies);

        let routed =
            router.route(&group_command("/balance@whatever_bot"), &EventContext::default()).await;

        assert_eq!(routed, Ok(Some(MessageTemplate::plain("balance"))));
    }

    #[test]
    fn addressee_is_the_suffix_after_the_at_sign() {
        assert_eq!(addressee("/request@leave_bot"), Some("leave_bot"));
        assert_eq!(addressee("/request"), None);
        assert_eq!(addressee("/request@"), None);
    }

    #[test]
    fn parses_known_commands_with_bot_suffix() {
        assert_eq!(BotCommand::parse("/request"), Ok(BotCommand::Request));
        assert_eq!(BotCommand::parse("/Balance@leave_bot"), Ok(BotCommand::Balance));
        assert_eq!(BotCommand::parse(" /cancel "), Ok(BotCommand::Cancel));
        assert_eq!(BotCommand::parse("/start"), Ok(BotCommand::Start));
    }

    #[test]
    fn unknown_and_malformed_commands() {
        assert_eq!(
            BotCommand::parse("/approve"),
            Ok(BotCommand::Unknown { name: "approve".to_owned() })
        );
        assert_eq!(BotCommand::parse("/@leave_bot"), Err(CommandParseError::Empty));
        assert_eq!(
            BotCommand::parse("request"),
            Err(CommandParseError::NotACommand("request".to_owned()))
        );
    }

    #[test]
    fn splits_command_from_arguments() {
        assert_eq!(split_command("/request  now please"), Some(("/request", "now please")));
        assert_eq!(split_command("/cancel"), Some(("/cancel", "")));
        assert_eq!(split_command("2025-02-15"), None);
    }
}
