use std::sync::Arc;
use std::time::Duration;

use flow_session::{
    DispatchSource, FlowAction, FlowConfig, FlowError, FlowEvent, FlowStateKind, SessionRegistry,
    TimerKind,
};
use flow_state::{AppletRef, ContentType, NameSuggester, UserIntent};
use tokio::sync::mpsc;

const USER: &str = "user-1";
const TENANT: &str = "tenant-1";

fn registry_with_events(config: FlowConfig) -> (SessionRegistry, mpsc::Receiver<FlowEvent>) {
    let (tx, rx) = mpsc::channel(config.event_buffer);
    let registry = SessionRegistry::builder(config)
        .event_channel(tx)
        .build()
        .unwrap();
    (registry, rx)
}

fn drain(rx: &mut mpsc::Receiver<FlowEvent>) -> Vec<FlowEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn create(registry: &SessionRegistry, session_id: &str) {
    registry
        .get_or_create_context(session_id, USER, TENANT, Some("applet-builder"))
        .await;
}

fn start_flow(request: &str) -> FlowAction {
    FlowAction::StartFlow {
        request: request.to_string(),
        intent: UserIntent::Create,
    }
}

fn request_name(suggested: &str) -> FlowAction {
    FlowAction::RequestName {
        suggested_name: suggested.to_string(),
    }
}

#[tokio::test]
async fn test_dispatch_to_unknown_session_fails() {
    let registry = SessionRegistry::new(FlowConfig::default()).unwrap();

    let err = registry
        .dispatch("missing", FlowAction::Reset)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::SessionNotFound(id) if id == "missing"));
    assert!(registry.get_context("missing").await.is_none());
    assert!(registry.get_flow_state("missing").await.is_none());
    assert!(!registry.is_name_finalized("missing").await);
}

#[tokio::test]
async fn test_get_or_create_returns_same_context() {
    let registry = SessionRegistry::new(FlowConfig::default()).unwrap();

    let first = registry
        .get_or_create_context("s1", USER, TENANT, None)
        .await;
    let second = registry
        .get_or_create_context("s1", "someone-else", "other-tenant", Some("x"))
        .await;

    assert_eq!(first.flow_state(), FlowStateKind::Idle);
    assert_eq!(second.user_id, USER);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(
        first.expires_at - first.created_at,
        chrono::Duration::seconds(1800)
    );
    assert_eq!(registry.session_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_creates_one_context() {
    let registry = SessionRegistry::new(FlowConfig::default()).unwrap();

    let mut handles = Vec::new();
    for i in 0..32 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .get_or_create_context("shared", &format!("user-{}", i), TENANT, None)
                .await
        }));
    }

    let mut contexts = Vec::new();
    for handle in handles {
        contexts.push(handle.await.unwrap());
    }

    assert_eq!(registry.session_count(), 1);
    let owner = &contexts[0].user_id;
    assert!(contexts.iter().all(|c| &c.user_id == owner));
    assert!(contexts.iter().all(|c| c.created_at == contexts[0].created_at));
}

#[tokio::test(start_paused = true)]
async fn test_request_name_arms_name_timer() {
    let registry = SessionRegistry::new(FlowConfig::default()).unwrap();
    create(&registry, "s1").await;

    let context = registry
        .dispatch("s1", request_name("Todo Helper"))
        .await
        .unwrap();

    assert_eq!(context.flow_state(), FlowStateKind::AwaitingNameResponse);
    let naming = context.naming_state().unwrap();
    assert_eq!(naming.suggested_name.as_deref(), Some("Todo Helper"));
    assert!(naming.timeout_started.is_some());
    assert_eq!(registry.pending_timers("s1"), vec![TimerKind::NameResponse]);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_request_name_fires_one_timeout() {
    let (registry, mut rx) = registry_with_events(FlowConfig::default());
    create(&registry, "s1").await;

    registry.dispatch("s1", request_name("First")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    registry.dispatch("s1", request_name("Second")).await.unwrap();

    // The first timer would have fired at 10s; only the second, at 13s, may.
    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(
        registry.get_flow_state("s1").await,
        Some(FlowStateKind::AwaitingNameResponse)
    );

    tokio::time::sleep(Duration::from_secs(3)).await;
    let timeouts: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|event| event.action == "NAME_TIMEOUT")
        .collect();
    assert_eq!(timeouts.len(), 1);
    assert_eq!(
        timeouts[0].source,
        DispatchSource::Timer(TimerKind::NameResponse)
    );
    assert_eq!(timeouts[0].from, FlowStateKind::AwaitingNameResponse);
    assert_eq!(timeouts[0].to, FlowStateKind::SuggestingName);
}

#[tokio::test(start_paused = true)]
async fn test_name_provided_cancels_timer() {
    let (registry, mut rx) = registry_with_events(FlowConfig::default());
    create(&registry, "s1").await;

    registry.dispatch("s1", request_name("Todo Helper")).await.unwrap();
    let context = registry
        .dispatch(
            "s1",
            FlowAction::NameProvided {
                name: "Shopping List".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(context.flow_state(), FlowStateKind::Generating);
    assert!(registry.pending_timers("s1").is_empty());

    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(
        registry.get_flow_state("s1").await,
        Some(FlowStateKind::Generating)
    );
    assert_eq!(
        registry.get_finalized_name("s1").await.as_deref(),
        Some("Shopping List")
    );
    assert!(drain(&mut rx)
        .iter()
        .all(|event| event.source == DispatchSource::User));
}

#[tokio::test(start_paused = true)]
async fn test_timer_does_nothing_after_state_moves_on() {
    let (registry, mut rx) = registry_with_events(FlowConfig::default());
    create(&registry, "s1").await;

    registry.dispatch("s1", request_name("Todo Helper")).await.unwrap();
    let context = registry
        .dispatch(
            "s1",
            FlowAction::Error {
                message: Some("backend unavailable".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(context.flow_state(), FlowStateKind::Error);
    assert_eq!(context.last_error.as_deref(), Some("backend unavailable"));

    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(
        registry.get_flow_state("s1").await,
        Some(FlowStateKind::Error)
    );
    assert!(registry.pending_timers("s1").is_empty());
    assert!(drain(&mut rx)
        .iter()
        .all(|event| event.action != "NAME_TIMEOUT"));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_suggestion_asks_again() {
    let registry = SessionRegistry::new(FlowConfig::default()).unwrap();
    create(&registry, "s1").await;

    let context = registry
        .dispatch(
            "s1",
            FlowAction::SuggestName {
                name: "Todo Helper".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(context.flow_state(), FlowStateKind::ConfirmingSuggestedName);
    assert_eq!(
        registry.pending_timers("s1"),
        vec![TimerKind::SuggestionAutoProceed]
    );

    let context = registry
        .dispatch("s1", FlowAction::ConfirmSuggestedName { confirmed: false })
        .await
        .unwrap();

    assert_eq!(context.flow_state(), FlowStateKind::RequestingName);
    let naming = context.naming_state().unwrap();
    assert!(!naming.confirmation_asked);
    assert!(naming.suggestion_timeout.is_none());
    assert!(registry.pending_timers("s1").is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(
        registry.get_flow_state("s1").await,
        Some(FlowStateKind::RequestingName)
    );
}

#[tokio::test(start_paused = true)]
async fn test_silent_user_gets_suggestion_then_reset() {
    let registry = SessionRegistry::new(FlowConfig::default()).unwrap();
    create(&registry, "s1").await;

    let context = registry
        .dispatch("s1", start_flow("make a todo app"))
        .await
        .unwrap();
    assert_eq!(context.flow_state(), FlowStateKind::RequestingName);
    assert_eq!(context.user_intent, UserIntent::Create);

    registry.dispatch("s1", request_name("Todo Helper")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;

    let context = registry.get_context("s1").await.unwrap();
    assert_eq!(context.flow_state(), FlowStateKind::SuggestingName);
    let naming = context.naming_state().unwrap();
    assert_eq!(naming.suggested_name.as_deref(), Some("Todo Helper"));
    assert!(naming.suggestion_timeout.is_some());
    assert_eq!(
        registry.pending_timers("s1"),
        vec![TimerKind::SuggestionAutoProceed]
    );

    let context = registry.dispatch("s1", FlowAction::Reset).await.unwrap();
    assert_eq!(context.flow_state(), FlowStateKind::Idle);
    assert!(context.naming_state().is_none());
    assert!(registry.pending_timers("s1").is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(
        registry.get_flow_state("s1").await,
        Some(FlowStateKind::Idle)
    );
}

#[tokio::test(start_paused = true)]
async fn test_suggestion_auto_proceeds() {
    let (registry, mut rx) = registry_with_events(FlowConfig::default());
    create(&registry, "s1").await;

    registry
        .dispatch("s1", start_flow("make a todo app"))
        .await
        .unwrap();
    registry.dispatch("s1", request_name("Ignored")).await.unwrap();

    // 10s name window, then 5s suggestion window.
    tokio::time::sleep(Duration::from_secs(16)).await;

    let context = registry.get_context("s1").await.unwrap();
    assert_eq!(context.flow_state(), FlowStateKind::Generating);
    assert_eq!(context.finalized_name(), Some("Todo Helper"));
    assert!(context.naming_state().unwrap().confirmation_received);
    assert!(registry.is_name_finalized("s1").await);
    assert!(registry.pending_timers("s1").is_empty());

    let timer_actions: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|event| matches!(event.source, DispatchSource::Timer(_)))
        .map(|event| event.action)
        .collect();
    assert_eq!(timer_actions, vec!["NAME_TIMEOUT", "CONFIRM_SUGGESTED_NAME"]);
}

#[tokio::test(start_paused = true)]
async fn test_auto_proceed_disabled_leaves_suggestion_pending() {
    let config = FlowConfig {
        auto_proceed_suggestions: false,
        ..FlowConfig::default()
    };
    let registry = SessionRegistry::new(config).unwrap();
    create(&registry, "s1").await;

    registry
        .dispatch("s1", start_flow("make a todo app"))
        .await
        .unwrap();
    registry.dispatch("s1", request_name("Ignored")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(
        registry.get_flow_state("s1").await,
        Some(FlowStateKind::SuggestingName)
    );
    assert!(registry.pending_timers("s1").is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(
        registry.get_flow_state("s1").await,
        Some(FlowStateKind::SuggestingName)
    );
}

#[tokio::test(start_paused = true)]
async fn test_custom_name_suggester_is_used() {
    struct FixedNamer;

    impl NameSuggester for FixedNamer {
        fn suggest_name(&self, _original_request: &str, content_type: ContentType) -> String {
            format!("Fixed {:?}", content_type)
        }
    }

    let registry = SessionRegistry::builder(FlowConfig::default())
        .name_suggester(Arc::new(FixedNamer))
        .build()
        .unwrap();
    create(&registry, "s1").await;

    registry
        .dispatch("s1", start_flow("anything at all"))
        .await
        .unwrap();
    registry.dispatch("s1", request_name("Ignored")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;

    let context = registry.get_context("s1").await.unwrap();
    assert_eq!(
        context.naming_state().unwrap().suggested_name.as_deref(),
        Some("Fixed Applet")
    );
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_cancels_timers_and_forgets_session() {
    let (registry, mut rx) = registry_with_events(FlowConfig::default());
    create(&registry, "s1").await;
    registry.dispatch("s1", request_name("Todo Helper")).await.unwrap();

    assert!(registry.cleanup("s1").await);
    assert!(registry.pending_timers("s1").is_empty());
    assert!(registry.get_context("s1").await.is_none());
    assert!(!registry.cleanup("s1").await);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(registry.get_context("s1").await.is_none());
    assert_eq!(drain(&mut rx).len(), 1);

    let err = registry
        .dispatch("s1", FlowAction::Reset)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::SessionNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_leaves_other_sessions_alone() {
    let registry = SessionRegistry::new(FlowConfig::default()).unwrap();
    create(&registry, "a").await;
    create(&registry, "b").await;
    registry.dispatch("a", request_name("A")).await.unwrap();
    registry.dispatch("b", request_name("B")).await.unwrap();

    registry.cleanup("a").await;
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(registry.session_count(), 1);
    assert_eq!(
        registry.get_flow_state("b").await,
        Some(FlowStateKind::SuggestingName)
    );
}

#[tokio::test(start_paused = true)]
async fn test_session_expires_after_ttl() {
    let config = FlowConfig {
        session_ttl_secs: 60,
        ..FlowConfig::default()
    };
    let registry = SessionRegistry::new(config).unwrap();
    create(&registry, "s1").await;
    registry.dispatch("s1", request_name("Todo Helper")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(registry.get_context("s1").await.is_some());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(registry.get_context("s1").await.is_none());
    assert_eq!(registry.session_count(), 0);
    assert!(registry.pending_timers("s1").is_empty());
}

#[tokio::test]
async fn test_sweep_keeps_live_sessions() {
    let registry = SessionRegistry::new(FlowConfig::default()).unwrap();
    create(&registry, "s1").await;
    create(&registry, "s2").await;

    assert_eq!(registry.sweep_expired().await, 0);
    assert_eq!(registry.session_count(), 2);
}

#[tokio::test]
async fn test_classify_uses_loaded_applet() {
    let registry = SessionRegistry::new(FlowConfig::default()).unwrap();
    create(&registry, "s1").await;

    let plain = registry
        .classify("s1", "please change the colors")
        .await
        .unwrap();
    assert!(plain.modification.current_applet.is_none());

    registry
        .set_current_applet(
            "s1",
            Some(AppletRef {
                id: "applet-7".to_string(),
                title: "Budget".to_string(),
                content_type: ContentType::Applet,
            }),
        )
        .await
        .unwrap();

    let loaded = registry
        .classify("s1", "please change the colors")
        .await
        .unwrap();
    assert_eq!(
        loaded.modification.current_applet.as_deref(),
        Some("applet-7")
    );
    assert!(loaded.modification.confidence > plain.modification.confidence);

    let search = registry
        .classify("s1", "find my budget tracker")
        .await
        .unwrap();
    assert_eq!(search.intent, UserIntent::Search);
}

#[tokio::test]
async fn test_events_carry_session_and_action() {
    let (registry, mut rx) = registry_with_events(FlowConfig::default());
    create(&registry, "s1").await;

    registry
        .dispatch("s1", start_flow("make a todo app"))
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].session_id, "s1");
    assert_eq!(events[0].action, "START_FLOW");
    assert_eq!(events[0].from, FlowStateKind::Idle);
    assert_eq!(events[0].to, FlowStateKind::RequestingName);
    assert_eq!(events[0].source, DispatchSource::User);
}

#[tokio::test]
async fn test_oversized_ttl_is_rejected_at_build() {
    let config = FlowConfig {
        session_ttl_secs: 10_000_000_000_000_000,
        ..FlowConfig::default()
    };

    let err = SessionRegistry::new(config.clone()).err().unwrap();
    assert!(matches!(err, FlowError::Config(_)));

    let (tx, _rx) = mpsc::channel(1);
    let err = SessionRegistry::builder(config)
        .event_channel(tx)
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, FlowError::Config(_)));
}

#[tokio::test]
async fn test_zero_event_buffer_is_rejected_at_build() {
    let config = FlowConfig {
        event_buffer: 0,
        ..FlowConfig::default()
    };
    assert!(matches!(
        SessionRegistry::new(config),
        Err(FlowError::Config(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_sweep_removes_expired_session_and_its_timers() {
    let config = FlowConfig {
        session_ttl_secs: 1,
        ..FlowConfig::default()
    };
    let registry = SessionRegistry::new(config).unwrap();
    create(&registry, "old").await;
    registry.dispatch("old", request_name("Todo Helper")).await.unwrap();
    assert_eq!(registry.pending_timers("old"), vec![TimerKind::NameResponse]);

    // Advance the wall clock only; the paused tokio clock keeps every timer asleep.
    std::thread::sleep(Duration::from_millis(1100));

    assert_eq!(registry.sweep_expired().await, 1);
    assert_eq!(registry.session_count(), 0);
    assert!(registry.pending_timers("old").is_empty());
    let err = registry
        .dispatch("old", FlowAction::Reset)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::SessionNotFound(id) if id == "old"));
    assert_eq!(registry.sweep_expired().await, 0);
}

#[tokio::test]
async fn test_events_flag_dispatches_that_leave_state_alone() {
    let (registry, mut rx) = registry_with_events(FlowConfig::default());
    create(&registry, "s1").await;

    registry
        .dispatch("s1", FlowAction::NameTimeout)
        .await
        .unwrap();
    registry
        .dispatch("s1", start_flow("make a todo app"))
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(!events[0].changed);
    assert_eq!(events[0].from, FlowStateKind::Idle);
    assert_eq!(events[0].to, FlowStateKind::Idle);
    assert!(events[1].changed);
}
