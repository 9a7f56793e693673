use chrono::{Duration, Utc};
use flow_state::{
    transition, ConversationContext, FlowAction, FlowEffect, FlowStateKind, KeywordNameSuggester,
    TransitionEnv, UserIntent, VersionChoice,
};
use serde_json::json;

fn run(
    context: &ConversationContext,
    action: serde_json::Value,
) -> (ConversationContext, Vec<FlowEffect>) {
    let action: FlowAction = serde_json::from_value(action).unwrap();
    let env = TransitionEnv {
        now: Utc::now(),
        namer: &KeywordNameSuggester,
    };
    let result = transition(context, &action, &env);
    (result.context, result.effects)
}

fn fresh() -> ConversationContext {
    ConversationContext::new(
        "wire-1",
        "user-1",
        "tenant-1",
        None,
        Utc::now(),
        Duration::minutes(30),
    )
}

#[test]
fn test_modification_path_from_wire_actions() {
    let ctx = fresh();

    let (ctx, _) = run(
        &ctx,
        json!({
            "type": "DETECT_MODIFICATION",
            "request": "make it dark",
            "current_applet_id": "applet-3"
        }),
    );
    assert_eq!(ctx.flow_state(), FlowStateKind::ModificationDetected);
    assert_eq!(ctx.user_intent, UserIntent::Modify);

    let (ctx, _) = run(
        &ctx,
        json!({"type": "REQUEST_VERSION_DECISION", "options": ["new_version", "overwrite"]}),
    );
    assert_eq!(ctx.flow_state(), FlowStateKind::AwaitingVersionDecision);
    assert!(ctx.modification_state().unwrap().versioning_decision_required);

    let (ctx, _) = run(&ctx, json!({"type": "VERSION_DECISION", "choice": "overwrite"}));
    assert_eq!(ctx.flow_state(), FlowStateKind::Generating);
    let modification = ctx.modification_state().unwrap();
    assert_eq!(modification.version_choice, Some(VersionChoice::Overwrite));
    assert_eq!(modification.target_applet_id.as_deref(), Some("applet-3"));

    let (ctx, _) = run(&ctx, json!({"type": "START_GENERATION", "request": "make it dark"}));
    let (ctx, _) = run(
        &ctx,
        json!({"type": "GENERATION_PROGRESS", "progress": 250, "phase": "styling"}),
    );
    assert_eq!(ctx.generation_state().unwrap().progress, 100);

    let (ctx, _) = run(&ctx, json!({"type": "GENERATION_COMPLETE", "result": {"ok": true}}));
    assert_eq!(ctx.flow_state(), FlowStateKind::GenerationComplete);
    let generation = ctx.generation_state().unwrap();
    assert!(generation.is_complete);
    assert_eq!(generation.result, Some(json!({"ok": true})));
    assert!(ctx.modification_state().is_some());
}

#[test]
fn test_search_path_with_duplicate_versions() {
    let ctx = fresh();

    let (ctx, _) = run(&ctx, json!({"type": "START_SEARCH", "query": "widget"}));
    assert_eq!(ctx.flow_state(), FlowStateKind::Searching);

    let (ctx, _) = run(
        &ctx,
        json!({"type": "SEARCH_COMPLETE", "results": [
            {"applet_id": "a1", "title": "Widget v1"},
            {"applet_id": "a2", "title": "Widget v2"}
        ]}),
    );
    assert_eq!(ctx.flow_state(), FlowStateKind::AwaitingVersionSelection);
    assert!(ctx.search_state().unwrap().multiple_versions_found);

    let (ctx, _) = run(&ctx, json!({"type": "SELECT_VERSION", "applet_id": "a2"}));
    assert_eq!(ctx.flow_state(), FlowStateKind::GenerationComplete);
    assert_eq!(
        ctx.search_state().unwrap().selected_applet_id.as_deref(),
        Some("a2")
    );
    assert_eq!(ctx.current_applet.as_ref().unwrap().title, "Widget v2");
}

#[test]
fn test_unknown_wire_action_is_a_no_op() {
    let ctx = fresh();
    let (next, effects) = run(&ctx, json!({"type": "TELEPORT", "where": "moon"}));
    assert_eq!(next, ctx);
    assert!(effects.is_empty());
}

#[test]
fn test_context_json_shape() {
    let ctx = fresh();
    let (ctx, effects) = run(
        &ctx,
        json!({"type": "REQUEST_NAME", "suggested_name": "Todo Helper"}),
    );
    assert_eq!(effects, vec![FlowEffect::ArmNameTimeout]);

    let value = serde_json::to_value(&ctx).unwrap();
    assert_eq!(value["state"]["flow_state"], "awaiting_name_response");
    assert_eq!(value["state"]["suggested_name"], "Todo Helper");
    assert_eq!(value["user_intent"], "unknown");
}
