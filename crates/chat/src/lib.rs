//! Chat interface for leaveflow.
//!
//! - **Events** (`events`) - update model, dispatcher and handlers
//! - **Commands** (`commands`) - `/start`, `/request`, `/balance`, `/cancel`
//! - **Messages** (`messages`) - text templates with inline approval buttons
//! - **Telegram** (`telegram`) - Bot API client implementing the transport traits
//! - **Poller** (`poller`) - long-polling loop with backoff
//!
//! # Architecture
//!
//! ```text
//! Telegram getUpdates → UpdatePoller → EventDispatcher → LeaveBot → core services
//!                                                           ↓
//!                              ChatNotifier ← Notifier ← ApprovalEngine
//! ```

pub mod commands;
pub mod events;
pub mod messages;
pub mod notifier;
pub mod poller;
pub mod service;
pub mod telegram;
pub mod transport;

pub use events::{bot_dispatcher, bot_dispatcher_for, EventDispatcher};
pub use notifier::ChatNotifier;
pub use poller::{PollerError, ReconnectPolicy, UpdatePoller};
pub use service::LeaveBot;
pub use telegram::TelegramClient;
pub use transport::{ChatId, ChatTransport, MessageRef, RecordingTransport, TransportError};
