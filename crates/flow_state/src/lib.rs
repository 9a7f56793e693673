//! flow_state - Conversation flow state machine for content-creation sessions
//!
//! This crate holds the pure parts of the flow: the per-session data model,
//! the reducer with its effect list, the keyword intent heuristics and the
//! version-suffix disambiguator. Nothing here owns a clock, a timer or a lock.

pub mod context;
pub mod intent;
pub mod machine;
pub mod naming;
pub mod versions;

// Re-export commonly used types
pub use context::{
    AppletRef, ContentType, ConversationContext, GenerationState, ModificationState,
    NamingState, Production, SearchResult, SearchState, UserIntent, VersionChoice,
};
pub use intent::{
    analyze_user_intent, detect_modification_intent, DetectionMethod, ModificationDetection,
};
pub use machine::{
    transition, FlowAction, FlowEffect, FlowState, FlowStateKind, Transition, TransitionEnv,
};
pub use naming::{KeywordNameSuggester, NameSuggester};
pub use versions::{base_title, check_multiple_versions};
