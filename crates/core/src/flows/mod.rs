pub mod engine;
pub mod grammar;
pub mod service;
pub mod states;

pub use engine::advance;
pub use grammar::{parse_date_span, parse_hours, parse_remarks, ValidationError};
pub use service::ConversationService;
pub use states::{
    CompletedDraft, ConversationDraft, ConversationReply, ConversationStep, Prompt, StepOutcome,
};
