//! State machine module
//!
//! Contains the pure reducer for the conversation flow.

mod actions;
mod states;
mod transitions;

pub use actions::FlowAction;
pub use states::{FlowState, FlowStateKind};
pub use transitions::{transition, FlowEffect, Transition, TransitionEnv};
