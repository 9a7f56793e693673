//! Flow states - Defines all possible phases of a conversation
//!
//! Each variant carries only the records that are valid in that phase.

use serde::{Deserialize, Serialize};

use crate::context::{GenerationState, ModificationState, NamingState, Production, SearchState};

/// Defines the possible states of a conversation flow.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(tag = "flow_state", rename_all = "snake_case")]
pub enum FlowState {
    // ========== Rest ==========
    /// No negotiation in progress.
    #[default]
    Idle,

    // ========== Naming Negotiation ==========
    /// The assistant is about to ask the user for a name.
    RequestingName(NamingState),

    /// The user has been asked for a name; the response window is open.
    AwaitingNameResponse(NamingState),

    /// The user did not answer in time and a name was generated.
    SuggestingName(NamingState),

    /// A suggested name is waiting for the user's confirmation.
    ConfirmingSuggestedName(NamingState),

    // ========== Production ==========
    /// The generation backend is producing the artifact.
    Generating(Production),

    /// The artifact is ready (or a search resolved to one item).
    GenerationComplete(Production),

    // ========== Modification ==========
    /// The request targets an already loaded artifact.
    ModificationDetected(ModificationState),

    /// The user must choose how the modified artifact is saved.
    AwaitingVersionDecision(ModificationState),

    // ========== Search ==========
    /// The search backend is running.
    Searching(SearchState),

    /// Results collapse to several versions of one item; the user must pick.
    AwaitingVersionSelection(SearchState),

    // ========== Failure ==========
    /// Sticky failure, left only through a reset.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Fieldless discriminant of [`FlowState`], used for guards, logging and
/// read accessors.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlowStateKind {
    Idle,
    RequestingName,
    AwaitingNameResponse,
    SuggestingName,
    ConfirmingSuggestedName,
    Generating,
    GenerationComplete,
    ModificationDetected,
    AwaitingVersionDecision,
    Searching,
    AwaitingVersionSelection,
    Error,
}

impl FlowStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::RequestingName => "requesting_name",
            Self::AwaitingNameResponse => "awaiting_name_response",
            Self::SuggestingName => "suggesting_name",
            Self::ConfirmingSuggestedName => "confirming_suggested_name",
            Self::Generating => "generating",
            Self::GenerationComplete => "generation_complete",
            Self::ModificationDetected => "modification_detected",
            Self::AwaitingVersionDecision => "awaiting_version_decision",
            Self::Searching => "searching",
            Self::AwaitingVersionSelection => "awaiting_version_selection",
            Self::Error => "error",
        }
    }

    /// Check if a suggestion auto-proceed timer may act in this state.
    pub fn accepts_suggestion_timeout(&self) -> bool {
        matches!(self, Self::SuggestingName | Self::ConfirmingSuggestedName)
    }
}

impl std::fmt::Display for FlowStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FlowState {
    pub fn kind(&self) -> FlowStateKind {
        match self {
            Self::Idle => FlowStateKind::Idle,
            Self::RequestingName(_) => FlowStateKind::RequestingName,
            Self::AwaitingNameResponse(_) => FlowStateKind::AwaitingNameResponse,
            Self::SuggestingName(_) => FlowStateKind::SuggestingName,
            Self::ConfirmingSuggestedName(_) => FlowStateKind::ConfirmingSuggestedName,
            Self::Generating(_) => FlowStateKind::Generating,
            Self::GenerationComplete(_) => FlowStateKind::GenerationComplete,
            Self::ModificationDetected(_) => FlowStateKind::ModificationDetected,
            Self::AwaitingVersionDecision(_) => FlowStateKind::AwaitingVersionDecision,
            Self::Searching(_) => FlowStateKind::Searching,
            Self::AwaitingVersionSelection(_) => FlowStateKind::AwaitingVersionSelection,
            Self::Error { .. } => FlowStateKind::Error,
        }
    }

    pub fn naming(&self) -> Option<&NamingState> {
        match self {
            Self::RequestingName(naming)
            | Self::AwaitingNameResponse(naming)
            | Self::SuggestingName(naming)
            | Self::ConfirmingSuggestedName(naming) => Some(naming),
            Self::Generating(production) | Self::GenerationComplete(production) => {
                production.naming.as_ref()
            }
            _ => None,
        }
    }

    pub fn generation(&self) -> Option<&GenerationState> {
        match self {
            Self::Generating(production) | Self::GenerationComplete(production) => {
                production.generation.as_ref()
            }
            _ => None,
        }
    }

    pub fn modification(&self) -> Option<&ModificationState> {
        match self {
            Self::ModificationDetected(modification)
            | Self::AwaitingVersionDecision(modification) => Some(modification),
            Self::Generating(production) | Self::GenerationComplete(production) => {
                production.modification.as_ref()
            }
            _ => None,
        }
    }

    pub fn search(&self) -> Option<&SearchState> {
        match self {
            Self::Searching(search) | Self::AwaitingVersionSelection(search) => Some(search),
            Self::Generating(production) | Self::GenerationComplete(production) => {
                production.search.as_ref()
            }
            _ => None,
        }
    }

    /// Records that survive into `generating` / `generation_complete`.
    pub fn production(&self) -> Production {
        match self {
            Self::Generating(production) | Self::GenerationComplete(production) => {
                production.clone()
            }
            _ => Production {
                naming: self.naming().cloned(),
                generation: None,
                modification: self.modification().cloned(),
                search: self.search().cloned(),
            },
        }
    }
}
