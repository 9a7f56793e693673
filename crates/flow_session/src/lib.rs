//! # Flow Session
//!
//! Keeps one conversation flow per session id, applies actions to it through
//! the `flow_state` reducer, and drives the naming timers that dispatch
//! synthetic actions when the user stays silent.

pub mod config;
pub mod error;
pub mod registry;
pub mod timeouts;

pub use config::FlowConfig;
pub use error::{FlowError, Result};
pub use registry::{
    DispatchSource, FlowEvent, RequestClassification, SessionRegistry, SessionRegistryBuilder,
};
pub use timeouts::{TimeoutCoordinator, TimeoutHandler, TimerKind};

// Re-export the reducer types callers need to build actions and read contexts
pub use flow_state::{ConversationContext, FlowAction, FlowStateKind};
