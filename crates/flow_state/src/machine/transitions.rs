//! State transitions - the flow reducer
//!
//! `transition` is pure: it reads the current context and an action and
//! returns the next context plus the timer effects the session owner must
//! apply. Clock and naming collaborator come in through [`TransitionEnv`].

use chrono::{DateTime, Utc};
use tracing::debug;

use super::actions::FlowAction;
use super::states::{FlowState, FlowStateKind};
use crate::context::{
    AppletRef, ConversationContext, GenerationState, ModificationState, NamingState, Production,
    SearchState, UserIntent,
};
use crate::naming::NameSuggester;
use crate::versions::check_multiple_versions;

/// Side effects requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEffect {
    /// Arm (or re-arm) the name-response timer.
    ArmNameTimeout,
    /// Arm (or re-arm) the suggestion auto-proceed timer.
    ArmSuggestionTimeout,
    /// Cancel both naming timers.
    ClearTimeouts,
}

/// Inputs the reducer needs besides context and action.
pub struct TransitionEnv<'a> {
    pub now: DateTime<Utc>,
    pub namer: &'a dyn NameSuggester,
}

/// Represents a state transition result.
#[derive(Debug, Clone)]
pub struct Transition {
    /// The state before the transition.
    pub from: FlowStateKind,
    /// The state after the transition.
    pub to: FlowStateKind,
    /// The context after the transition.
    pub context: ConversationContext,
    /// Timer work to run right after the context is stored.
    pub effects: Vec<FlowEffect>,
}

impl Transition {
    /// Whether the flow state actually changed.
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Compute the next context for `action`.
pub fn transition(
    context: &ConversationContext,
    action: &FlowAction,
    env: &TransitionEnv<'_>,
) -> Transition {
    let from = context.flow_state();
    let mut next = context.clone();
    let mut effects = Vec::new();

    // `error` is left only through RESET; a repeated ERROR may refresh the message.
    if from == FlowStateKind::Error
        && !matches!(action, FlowAction::Reset | FlowAction::Error { .. })
    {
        debug!(
            "Session {} is in error, ignoring {}",
            context.session_id,
            action.name()
        );
        return Transition {
            from,
            to: from,
            context: next,
            effects,
        };
    }

    match action {
        // ========== Naming ==========
        FlowAction::StartFlow { request, intent } => {
            next.original_request = Some(request.clone());
            next.user_intent = *intent;
            // A new flow negotiates its name from scratch.
            next.state = FlowState::RequestingName(NamingState::default());
        }

        FlowAction::RequestName { suggested_name } => {
            let mut naming = naming_of(context);
            naming.suggested_name = Some(suggested_name.clone());
            naming.timeout_started = Some(env.now);
            next.state = FlowState::AwaitingNameResponse(naming);
            effects.push(FlowEffect::ArmNameTimeout);
        }

        FlowAction::NameProvided { name } => {
            effects.push(FlowEffect::ClearTimeouts);
            let mut production = context.state.production();
            let mut naming = production.naming.take().unwrap_or_default();
            naming.user_provided_name = Some(name.clone());
            naming.finalized_name = Some(name.clone());
            production.naming = Some(naming);
            next.state = FlowState::Generating(production);
        }

        FlowAction::NameTimeout => {
            if let FlowState::AwaitingNameResponse(naming) = &context.state {
                let request = context.original_request.as_deref().unwrap_or_default();
                let mut naming = naming.clone();
                naming.suggested_name =
                    Some(env.namer.suggest_name(request, context.content_type()));
                naming.suggestion_timeout = Some(env.now);
                next.state = FlowState::SuggestingName(naming);
                effects.push(FlowEffect::ArmSuggestionTimeout);
            } else {
                debug!(
                    "Ignoring NAME_TIMEOUT for session {} in state {}",
                    context.session_id, from
                );
            }
        }

        FlowAction::SuggestName { name } => {
            let mut naming = naming_of(context);
            naming.suggested_name = Some(name.clone());
            naming.confirmation_asked = true;
            naming.suggestion_timeout = Some(env.now);
            next.state = FlowState::ConfirmingSuggestedName(naming);
            effects.push(FlowEffect::ArmSuggestionTimeout);
        }

        FlowAction::ConfirmSuggestedName { confirmed } => {
            effects.push(FlowEffect::ClearTimeouts);
            if *confirmed {
                let mut production = context.state.production();
                let mut naming = production.naming.take().unwrap_or_default();
                naming.confirmation_received = true;
                naming.finalized_name = naming.suggested_name.clone();
                production.naming = Some(naming);
                next.state = FlowState::Generating(production);
            } else {
                // Rejected suggestion: ask again from scratch.
                let mut naming = naming_of(context);
                naming.confirmation_asked = false;
                naming.confirmation_received = false;
                naming.suggestion_timeout = None;
                next.state = FlowState::RequestingName(naming);
            }
        }

        // ========== Generation ==========
        FlowAction::StartGeneration { request } => {
            let mut production = context.state.production();
            production.generation = Some(GenerationState::started(request.clone(), env.now));
            next.state = FlowState::Generating(production);
        }

        FlowAction::GenerationProgress { progress, phase } => {
            if let Some(production) = production_mut(&mut next.state) {
                if let Some(generation) = production
                    .generation
                    .as_mut()
                    .filter(|generation| !generation.is_complete)
                {
                    generation.progress = (*progress).min(100);
                    generation.phase = phase.clone();
                }
            }
        }

        FlowAction::GenerationComplete { result } => {
            if context.generation_state().is_some() {
                let mut production = context.state.production();
                if let Some(generation) = production.generation.as_mut() {
                    generation.progress = 100;
                    generation.phase = "complete".to_string();
                    generation.is_complete = true;
                    generation.result = Some(result.clone());
                }
                next.state = FlowState::GenerationComplete(production);
            }
        }

        // ========== Modification ==========
        FlowAction::DetectModification {
            request,
            current_applet_id,
        } => {
            next.user_intent = UserIntent::Modify;
            next.state = FlowState::ModificationDetected(ModificationState {
                modification_request: request.clone(),
                target_applet_id: current_applet_id
                    .clone()
                    .or_else(|| context.current_applet.as_ref().map(|a| a.id.clone())),
                is_modification: true,
                ..ModificationState::default()
            });
        }

        FlowAction::ConfirmModification { confirmed } => {
            if *confirmed {
                next.state = FlowState::Generating(context.state.production());
            } else {
                next.user_intent = UserIntent::Create;
                next.state = FlowState::RequestingName(naming_of(context));
            }
        }

        FlowAction::RequestVersionDecision { options } => {
            if let Some(modification) = context.modification_state() {
                let mut modification = modification.clone();
                modification.versioning_decision_required = true;
                modification.versioning_options = Some(options.clone());
                next.state = FlowState::AwaitingVersionDecision(modification);
            }
        }

        FlowAction::VersionDecision { choice } => {
            if context.modification_state().is_some() {
                let mut production = context.state.production();
                if let Some(modification) = production.modification.as_mut() {
                    modification.versioning_decision_required = false;
                    modification.version_choice = *choice;
                }
                next.state = FlowState::Generating(production);
            }
        }

        // ========== Search ==========
        FlowAction::StartSearch { query } => {
            next.user_intent = UserIntent::Search;
            next.state = FlowState::Searching(SearchState {
                query: query.clone(),
                ..SearchState::default()
            });
        }

        FlowAction::SearchComplete { results } => {
            if let Some(search) = context.search_state() {
                let multiple = check_multiple_versions(results);
                let mut search = search.clone();
                search.results = Some(results.clone());
                search.multiple_versions_found = multiple;
                search.version_selection_required = multiple;
                next.state = if multiple {
                    FlowState::AwaitingVersionSelection(search)
                } else {
                    FlowState::GenerationComplete(Production {
                        search: Some(search),
                        ..Production::default()
                    })
                };
            }
        }

        FlowAction::VersionSelectionRequired => {
            let mut search = context.search_state().cloned().unwrap_or_default();
            search.version_selection_required = true;
            next.state = FlowState::AwaitingVersionSelection(search);
        }

        FlowAction::SelectVersion { applet_id } => {
            let mut production = context.state.production();
            if let (Some(search), Some(applet_id)) = (production.search.as_mut(), applet_id) {
                search.version_selection_required = false;
                search.selected_applet_id = Some(applet_id.clone());
                let selected = search
                    .results
                    .iter()
                    .flatten()
                    .find(|result| &result.applet_id == applet_id);
                if let Some(result) = selected {
                    next.current_applet = Some(AppletRef {
                        id: result.applet_id.clone(),
                        title: result.title.clone(),
                        content_type: context.content_type(),
                    });
                }
            }
            next.state = FlowState::GenerationComplete(production);
        }

        // ========== Control ==========
        FlowAction::Error { message } => {
            next.last_error = message.clone();
            next.state = FlowState::Error {
                message: message.clone(),
            };
        }

        FlowAction::Reset => {
            effects.push(FlowEffect::ClearTimeouts);
            next.user_intent = UserIntent::Unknown;
            next.last_error = None;
            next.state = FlowState::Idle;
        }

        FlowAction::Unknown => {}
    }

    let to = next.flow_state();
    debug!(
        "Session {}: {} --{}--> {}",
        context.session_id,
        from,
        action.name(),
        to
    );

    Transition {
        from,
        to,
        context: next,
        effects,
    }
}

/// Naming record to carry into a naming state.
fn naming_of(context: &ConversationContext) -> NamingState {
    context.naming_state().cloned().unwrap_or_default()
}

fn production_mut(state: &mut FlowState) -> Option<&mut Production> {
    match state {
        FlowState::Generating(production) | FlowState::GenerationComplete(production) => {
            Some(production)
        }
        _ => None,
    }
}
