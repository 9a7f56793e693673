//! Session registry - owns every conversation context
//!
//! All mutation goes through one async mutex per session, so user dispatches
//! and timer-driven dispatches for a session are applied in a single order
//! while different sessions proceed independently. Timer effects are applied
//! while that mutex is still held.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flow_state::{
    analyze_user_intent, detect_modification_intent, transition, AppletRef, ConversationContext,
    FlowAction, FlowEffect, FlowStateKind, KeywordNameSuggester, ModificationDetection,
    NameSuggester, Transition, TransitionEnv, UserIntent,
};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::FlowConfig;
use crate::error::{FlowError, Result};
use crate::timeouts::{TimeoutCoordinator, TimeoutHandler, TimerKind};

type SessionSlot = Arc<Mutex<ConversationContext>>;

/// Who caused a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "timer", rename_all = "snake_case")]
pub enum DispatchSource {
    User,
    Timer(TimerKind),
}

/// Emitted for every applied dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEvent {
    pub session_id: String,
    pub action: &'static str,
    pub from: FlowStateKind,
    pub to: FlowStateKind,
    /// False when the action left the flow state where it was.
    pub changed: bool,
    pub source: DispatchSource,
    pub at: DateTime<Utc>,
}

/// Intent reading of a free-text request in the context of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestClassification {
    pub intent: UserIntent,
    pub modification: ModificationDetection,
}

struct RegistryInner {
    self_ref: Weak<RegistryInner>,
    sessions: DashMap<String, SessionSlot>,
    timeouts: TimeoutCoordinator,
    namer: Arc<dyn NameSuggester>,
    config: FlowConfig,
    session_ttl: chrono::Duration,
    event_tx: Option<mpsc::Sender<FlowEvent>>,
}

/// Handle to the session registry. Clones share the same sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

/// Builder for [`SessionRegistry`].
pub struct SessionRegistryBuilder {
    config: FlowConfig,
    namer: Arc<dyn NameSuggester>,
    event_tx: Option<mpsc::Sender<FlowEvent>>,
}

impl SessionRegistryBuilder {
    pub fn name_suggester(mut self, namer: Arc<dyn NameSuggester>) -> Self {
        self.namer = namer;
        self
    }

    pub fn event_channel(mut self, tx: mpsc::Sender<FlowEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Validate the config and create the registry.
    pub fn build(self) -> Result<SessionRegistry> {
        self.config.validate()?;
        let session_ttl = chrono::Duration::from_std(self.config.session_ttl())
            .map_err(|e| FlowError::Config(format!("session_ttl_secs out of range: {}", e)))?;

        let inner = Arc::new_cyclic(|self_ref| RegistryInner {
            self_ref: self_ref.clone(),
            sessions: DashMap::new(),
            timeouts: TimeoutCoordinator::new(),
            namer: self.namer,
            config: self.config,
            session_ttl,
            event_tx: self.event_tx,
        });
        Ok(SessionRegistry { inner })
    }
}

impl SessionRegistry {
    /// Registry with the keyword name suggester and no observer.
    pub fn new(config: FlowConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: FlowConfig) -> SessionRegistryBuilder {
        SessionRegistryBuilder {
            config,
            namer: Arc::new(KeywordNameSuggester),
            event_tx: None,
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.inner.config
    }

    /// Return the session's context, creating an idle one on first use.
    ///
    /// Concurrent first calls for the same id observe one context.
    pub async fn get_or_create_context(
        &self,
        session_id: &str,
        user_id: &str,
        tenant_id: &str,
        assistant_name: Option<&str>,
    ) -> ConversationContext {
        let (slot, created) = match self.inner.sessions.entry(session_id.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let context = ConversationContext::new(
                    session_id,
                    user_id,
                    tenant_id,
                    assistant_name.map(str::to_string),
                    Utc::now(),
                    self.inner.session_ttl,
                );
                let slot = Arc::new(Mutex::new(context));
                entry.insert(slot.clone());
                (slot, true)
            }
        };

        if created {
            info!(
                "Created flow context for session {} (user {}, tenant {})",
                session_id, user_id, tenant_id
            );
            self.inner.schedule_expiry(session_id, &slot);
        }

        let context = slot.lock().await;
        context.clone()
    }

    /// Run `action` through the flow reducer for an existing session.
    pub async fn dispatch(
        &self,
        session_id: &str,
        action: FlowAction,
    ) -> Result<ConversationContext> {
        let slot = self.inner.slot(session_id)?;
        let mut context = slot.lock().await;
        self.inner.ensure_registered(session_id, &slot)?;

        self.inner.apply(&mut context, action, DispatchSource::User);
        Ok(context.clone())
    }

    /// Cancel the session's timers and drop its context.
    pub async fn cleanup(&self, session_id: &str) -> bool {
        match self.inner.slot(session_id) {
            Ok(slot) => self.inner.remove_slot(session_id, &slot, "cleanup").await,
            Err(_) => false,
        }
    }

    /// Drop every context whose lifetime has run out. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let slots: Vec<(String, SessionSlot)> = self
            .inner
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut removed = 0;
        for (session_id, slot) in slots {
            let expired = slot.lock().await.is_expired(now);
            if expired && self.inner.remove_slot(&session_id, &slot, "expiry sweep").await {
                removed += 1;
            }
        }
        removed
    }

    /// Record (or clear) the artifact currently loaded in the session.
    pub async fn set_current_applet(
        &self,
        session_id: &str,
        applet: Option<AppletRef>,
    ) -> Result<ConversationContext> {
        let slot = self.inner.slot(session_id)?;
        let mut context = slot.lock().await;
        self.inner.ensure_registered(session_id, &slot)?;

        context.current_applet = applet;
        context.last_updated_at = Utc::now();
        Ok(context.clone())
    }

    /// Classify `text` against the applet currently loaded in the session.
    pub async fn classify(&self, session_id: &str, text: &str) -> Result<RequestClassification> {
        let context = self
            .get_context(session_id)
            .await
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))?;
        let applet_id = context.current_applet.as_ref().map(|applet| applet.id.as_str());

        Ok(RequestClassification {
            intent: analyze_user_intent(text),
            modification: detect_modification_intent(text, applet_id),
        })
    }

    // ========== Read accessors ==========

    pub async fn get_context(&self, session_id: &str) -> Option<ConversationContext> {
        let slot = self.inner.slot(session_id).ok()?;
        let context = slot.lock().await;
        Some(context.clone())
    }

    pub async fn get_flow_state(&self, session_id: &str) -> Option<FlowStateKind> {
        let slot = self.inner.slot(session_id).ok()?;
        let context = slot.lock().await;
        Some(context.flow_state())
    }

    pub async fn is_name_finalized(&self, session_id: &str) -> bool {
        self.get_finalized_name(session_id).await.is_some()
    }

    pub async fn get_finalized_name(&self, session_id: &str) -> Option<String> {
        let slot = self.inner.slot(session_id).ok()?;
        let context = slot.lock().await;
        context.finalized_name().map(str::to_string)
    }

    /// Timer kinds currently armed for the session.
    pub fn pending_timers(&self, session_id: &str) -> Vec<TimerKind> {
        self.inner.timeouts.pending(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }
}

impl RegistryInner {
    fn slot(&self, session_id: &str) -> Result<SessionSlot> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))
    }

    /// A slot taken from the map may have been removed while its lock was awaited.
    fn is_registered(&self, session_id: &str, slot: &SessionSlot) -> bool {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::ptr_eq(entry.value(), slot))
            .unwrap_or(false)
    }

    fn ensure_registered(&self, session_id: &str, slot: &SessionSlot) -> Result<()> {
        if self.is_registered(session_id, slot) {
            Ok(())
        } else {
            Err(FlowError::SessionNotFound(session_id.to_string()))
        }
    }

    fn timeout_handler(&self) -> Weak<dyn TimeoutHandler> {
        self.self_ref.clone()
    }

    /// Reduce, store, run effects and notify. Caller holds the session lock.
    fn apply(&self, context: &mut ConversationContext, action: FlowAction, source: DispatchSource) {
        let now = Utc::now();
        let env = TransitionEnv {
            now,
            namer: self.namer.as_ref(),
        };
        let result = transition(context, &action, &env);
        let changed = result.changed();
        let Transition {
            from,
            to,
            context: next,
            effects,
        } = result;

        *context = next;
        context.last_updated_at = now;

        for effect in effects {
            self.run_effect(&context.session_id, effect);
        }

        self.emit(FlowEvent {
            session_id: context.session_id.clone(),
            action: action.name(),
            from,
            to,
            changed,
            source,
            at: now,
        });
    }

    fn run_effect(&self, session_id: &str, effect: FlowEffect) {
        match effect {
            FlowEffect::ArmNameTimeout => {
                self.timeouts.arm(
                    session_id,
                    TimerKind::NameResponse,
                    self.config.name_response_timeout(),
                    self.timeout_handler(),
                );
            }
            FlowEffect::ArmSuggestionTimeout => {
                if self.config.auto_proceed_suggestions {
                    self.timeouts.arm(
                        session_id,
                        TimerKind::SuggestionAutoProceed,
                        self.config.suggestion_timeout(),
                        self.timeout_handler(),
                    );
                } else {
                    debug!(
                        "Auto-proceed disabled, not arming suggestion timer for session {}",
                        session_id
                    );
                }
            }
            FlowEffect::ClearTimeouts => self.timeouts.clear_name_timeout(session_id),
        }
    }

    fn emit(&self, event: FlowEvent) {
        if let Some(tx) = &self.event_tx {
            if let Err(e) = tx.try_send(event) {
                warn!("Dropping flow event: {}", e);
            }
        }
    }

    fn schedule_expiry(&self, session_id: &str, slot: &SessionSlot) {
        let registry = self.self_ref.clone();
        let slot = Arc::downgrade(slot);
        let session_id = session_id.to_string();
        let ttl = self.config.session_ttl();

        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let (Some(registry), Some(slot)) = (registry.upgrade(), slot.upgrade()) {
                registry.remove_slot(&session_id, &slot, "expiry").await;
            }
        });
    }

    /// Remove `slot` if it is still the session's registered context.
    async fn remove_slot(&self, session_id: &str, slot: &SessionSlot, reason: &str) -> bool {
        // Wait for any in-flight dispatch on this session to finish.
        let _context = slot.lock().await;
        if !self.is_registered(session_id, slot) {
            return false;
        }

        self.timeouts.clear_name_timeout(session_id);
        let removed = self
            .sessions
            .remove_if(session_id, |_, current| Arc::ptr_eq(current, slot))
            .is_some();
        if removed {
            info!("Removed flow context for session {} ({})", session_id, reason);
        }
        removed
    }
}

#[async_trait]
impl TimeoutHandler for RegistryInner {
    async fn on_timeout(&self, session_id: &str, kind: TimerKind, timer_id: u64) {
        let slot = match self.slot(session_id) {
            Ok(slot) => slot,
            Err(_) => return,
        };
        let mut context = slot.lock().await;

        // Cancelled or superseded while waiting for the lock.
        if !self.timeouts.take_if_current(session_id, kind, timer_id) {
            debug!(
                "Dropping stale {} timer {} for session {}",
                kind.as_str(),
                timer_id,
                session_id
            );
            return;
        }
        if !self.is_registered(session_id, &slot) {
            return;
        }

        let state = context.flow_state();
        let action = match kind {
            TimerKind::NameResponse if state == FlowStateKind::AwaitingNameResponse => {
                FlowAction::NameTimeout
            }
            TimerKind::SuggestionAutoProceed if state.accepts_suggestion_timeout() => {
                FlowAction::ConfirmSuggestedName { confirmed: true }
            }
            _ => {
                debug!(
                    "{} timer for session {} fired in state {}, nothing to do",
                    kind.as_str(),
                    session_id,
                    state
                );
                return;
            }
        };

        info!(
            "{} timer fired for session {}, dispatching {}",
            kind.as_str(),
            session_id,
            action.name()
        );
        self.apply(&mut context, action, DispatchSource::Timer(kind));
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        self.timeouts.cancel_all();
    }
}
