//! The natural-language-to-query pipeline.

pub mod delegate;
pub mod display;
pub mod engine;
pub mod presenter;
pub mod prompts;
pub mod router;
pub mod selector;
pub mod synthesizer;

pub use delegate::RemoteToolDelegate;
pub use display::{FormatClassifier, FormatHint};
pub use engine::{ChatPipeline, LocalLookup, ToolBackend};
pub use presenter::{AssistantReply, PresentationRouter, TurnOutcome};
pub use router::{ChatDecision, IntentRouter};
pub use selector::CollectionSelector;
pub use synthesizer::QuerySynthesizer;
