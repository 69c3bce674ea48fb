//! Labpilot Chat crate - the conversational orchestration core.
//!
//! A message flows through the [`IntentRouter`] (which asks a
//! [`LanguageModel`] what the user wants), the [`ResponseComposer`] (which runs
//! the matching [`CapabilityAdapters`] operation or falls back to free
//! conversation), and lands in the session history via [`ChatService`].

pub mod adapters;
pub mod composer;
pub mod error;
pub mod model;
pub mod remote;
pub mod router;
pub mod rules;
pub mod service;

pub use adapters::{CapabilityAdapters, CapabilityOutput};
pub use composer::{validate_transition, ComposeState, MessageLifecycle, ResponseComposer};
pub use error::{AdapterError, ChatError};
pub use model::{
    Action, ActiveDataset, Classification, GenerationRequest, LanguageModel, RoutingContext,
    ToolResult,
};
pub use remote::OpenAiCompatibleModel;
pub use router::{IntentRouter, RoutingDecision, Target};
pub use rules::RuleBasedModel;
pub use service::{ChatReply, ChatService};
