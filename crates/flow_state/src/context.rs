//! Conversation context - per-session data model
//!
//! A `ConversationContext` is the unit the reducer consumes and produces.
//! Phase-specific records live inside the `FlowState` variant they belong to,
//! so a naming record cannot exist while the session is searching.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::machine::{FlowState, FlowStateKind};

/// What the user is trying to do in this conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserIntent {
    #[default]
    Unknown,
    Create,
    Modify,
    Search,
}

/// Kind of artifact the assistant produces.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Applet,
    Page,
    Document,
    Image,
}

/// The artifact currently loaded in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AppletRef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content_type: ContentType,
}

/// A single hit returned by the search backend.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    pub applet_id: String,
    pub title: String,
}

impl SearchResult {
    pub fn new(applet_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            applet_id: applet_id.into(),
            title: title.into(),
        }
    }
}

/// Ways a modified artifact can be saved.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VersionChoice {
    /// Keep the existing artifact and save the change as a new version.
    NewVersion,
    /// Replace the existing artifact in place.
    Overwrite,
    /// Save the change as an unrelated copy.
    Copy,
}

/// Naming negotiation record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct NamingState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_provided_name: Option<String>,
    #[serde(default)]
    pub confirmation_asked: bool,
    #[serde(default)]
    pub confirmation_received: bool,
    /// When the name-response window opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_started: Option<DateTime<Utc>>,
    /// When the auto-proceed window for a suggestion opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_timeout: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_name: Option<String>,
}

/// Progress of one call into the generation backend.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GenerationState {
    pub call_id: Uuid,
    pub request: String,
    pub start_time: DateTime<Utc>,
    /// Percentage in `0..=100`.
    pub progress: u8,
    pub phase: String,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl GenerationState {
    pub fn started(request: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            request: request.into(),
            start_time: now,
            progress: 0,
            phase: "starting".to_string(),
            is_complete: false,
            result: None,
        }
    }
}

/// Modification negotiation record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ModificationState {
    pub modification_request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_applet_id: Option<String>,
    pub is_modification: bool,
    pub is_major_change: bool,
    pub versioning_decision_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioning_options: Option<Vec<VersionChoice>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_choice: Option<VersionChoice>,
}

/// Search and version-selection record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct SearchState {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchResult>>,
    pub multiple_versions_found: bool,
    pub version_selection_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_applet_id: Option<String>,
}

/// Records carried into `generating` / `generation_complete` from the phase
/// that led there.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Production {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naming: Option<NamingState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification: Option<ModificationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchState>,
}

/// Full state of one conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationContext {
    pub session_id: String,
    pub user_id: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_name: Option<String>,

    pub state: FlowState,
    pub user_intent: UserIntent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_applet: Option<AppletRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ConversationContext {
    /// Create an idle context whose lifetime is fixed at `now + ttl`.
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        assistant_name: Option<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            assistant_name,
            state: FlowState::Idle,
            user_intent: UserIntent::Unknown,
            original_request: None,
            current_applet: None,
            last_error: None,
            created_at: now,
            last_updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn flow_state(&self) -> FlowStateKind {
        self.state.kind()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn naming_state(&self) -> Option<&NamingState> {
        self.state.naming()
    }

    pub fn generation_state(&self) -> Option<&GenerationState> {
        self.state.generation()
    }

    pub fn modification_state(&self) -> Option<&ModificationState> {
        self.state.modification()
    }

    pub fn search_state(&self) -> Option<&SearchState> {
        self.state.search()
    }

    pub fn finalized_name(&self) -> Option<&str> {
        self.naming_state()
            .and_then(|naming| naming.finalized_name.as_deref())
    }

    pub fn is_name_finalized(&self) -> bool {
        self.finalized_name().is_some()
    }

    /// Content type used when asking the naming collaborator for a name.
    pub fn content_type(&self) -> ContentType {
        self.current_applet
            .as_ref()
            .map(|applet| applet.content_type)
            .unwrap_or_default()
    }
}
