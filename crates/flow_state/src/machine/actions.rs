//! Flow actions - Typed events that request a state transition

use serde::{Deserialize, Serialize};

use crate::context::{SearchResult, UserIntent, VersionChoice};

/// Defines the actions that can be dispatched into a conversation flow.
///
/// On the wire an action is a JSON object tagged by `type`, e.g.
/// `{"type": "NAME_PROVIDED", "name": "Todo Helper"}`. Unrecognized tags
/// decode to [`FlowAction::Unknown`], which the reducer ignores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowAction {
    // ========== Naming ==========
    StartFlow {
        request: String,
        intent: UserIntent,
    },

    RequestName {
        suggested_name: String,
    },

    NameProvided {
        name: String,
    },

    /// Synthetic: dispatched by the name-response timer.
    NameTimeout,

    SuggestName {
        name: String,
    },

    ConfirmSuggestedName {
        confirmed: bool,
    },

    // ========== Generation ==========
    StartGeneration {
        request: String,
    },

    GenerationProgress {
        progress: u8,
        phase: String,
    },

    GenerationComplete {
        #[serde(default)]
        result: serde_json::Value,
    },

    // ========== Modification ==========
    DetectModification {
        request: String,
        #[serde(default)]
        current_applet_id: Option<String>,
    },

    ConfirmModification {
        confirmed: bool,
    },

    RequestVersionDecision {
        options: Vec<VersionChoice>,
    },

    VersionDecision {
        #[serde(default)]
        choice: Option<VersionChoice>,
    },

    // ========== Search ==========
    StartSearch {
        query: String,
    },

    SearchComplete {
        results: Vec<SearchResult>,
    },

    VersionSelectionRequired,

    SelectVersion {
        #[serde(default)]
        applet_id: Option<String>,
    },

    // ========== Control ==========
    Error {
        #[serde(default)]
        message: Option<String>,
    },

    Reset,

    /// Any action type this build does not know about.
    #[serde(other)]
    Unknown,
}

impl FlowAction {
    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartFlow { .. } => "START_FLOW",
            Self::RequestName { .. } => "REQUEST_NAME",
            Self::NameProvided { .. } => "NAME_PROVIDED",
            Self::NameTimeout => "NAME_TIMEOUT",
            Self::SuggestName { .. } => "SUGGEST_NAME",
            Self::ConfirmSuggestedName { .. } => "CONFIRM_SUGGESTED_NAME",
            Self::StartGeneration { .. } => "START_GENERATION",
            Self::GenerationProgress { .. } => "GENERATION_PROGRESS",
            Self::GenerationComplete { .. } => "GENERATION_COMPLETE",
            Self::DetectModification { .. } => "DETECT_MODIFICATION",
            Self::ConfirmModification { .. } => "CONFIRM_MODIFICATION",
            Self::RequestVersionDecision { .. } => "REQUEST_VERSION_DECISION",
            Self::VersionDecision { .. } => "VERSION_DECISION",
            Self::StartSearch { .. } => "START_SEARCH",
            Self::SearchComplete { .. } => "SEARCH_COMPLETE",
            Self::VersionSelectionRequired => "VERSION_SELECTION_REQUIRED",
            Self::SelectVersion { .. } => "SELECT_VERSION",
            Self::Error { .. } => "ERROR",
            Self::Reset => "RESET",
            Self::Unknown => "UNKNOWN",
        }
    }
}
