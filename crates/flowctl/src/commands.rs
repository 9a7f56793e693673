//! JSON-lines requests understood by `flowctl`

use std::time::Duration;

use flow_session::{FlowAction, SessionRegistry};
use flow_state::AppletRef;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One input line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Dispatch {
        session_id: String,
        action: FlowAction,
    },
    Classify {
        session_id: String,
        text: String,
    },
    Show {
        session_id: String,
    },
    LoadApplet {
        session_id: String,
        #[serde(default)]
        applet: Option<AppletRef>,
    },
    Cleanup {
        session_id: String,
    },
    /// Let armed timers run before reading the next line.
    Wait {
        secs: u64,
    },
}

/// One output line.
#[derive(Debug, Serialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    fn ok(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(message.into()),
        }
    }
}

/// Identity used when a dispatch creates a session.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub tenant_id: String,
    pub assistant_name: Option<String>,
}

pub async fn handle(registry: &SessionRegistry, identity: &Identity, request: Request) -> Reply {
    match run(registry, identity, request).await {
        Ok(result) => Reply::ok(result),
        Err(e) => Reply::error(e.to_string()),
    }
}

async fn run(
    registry: &SessionRegistry,
    identity: &Identity,
    request: Request,
) -> anyhow::Result<Value> {
    match request {
        Request::Dispatch { session_id, action } => {
            registry
                .get_or_create_context(
                    &session_id,
                    &identity.user_id,
                    &identity.tenant_id,
                    identity.assistant_name.as_deref(),
                )
                .await;
            let context = registry.dispatch(&session_id, action).await?;
            Ok(serde_json::to_value(context)?)
        }
        Request::Classify { session_id, text } => {
            let classification = registry.classify(&session_id, &text).await?;
            Ok(serde_json::to_value(classification)?)
        }
        Request::Show { session_id } => {
            let context = registry
                .get_context(&session_id)
                .await
                .ok_or_else(|| anyhow::anyhow!("Session not found: {}", session_id))?;
            Ok(json!({
                "context": context,
                "pending_timers": registry.pending_timers(&session_id),
            }))
        }
        Request::LoadApplet { session_id, applet } => {
            let context = registry.set_current_applet(&session_id, applet).await?;
            Ok(serde_json::to_value(context)?)
        }
        Request::Cleanup { session_id } => {
            let removed = registry.cleanup(&session_id).await;
            Ok(json!({ "removed": removed }))
        }
        Request::Wait { secs } => {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            Ok(json!({ "waited_secs": secs }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_session::{FlowConfig, FlowStateKind};

    fn identity() -> Identity {
        Identity {
            user_id: "cli-user".to_string(),
            tenant_id: "default".to_string(),
            assistant_name: None,
        }
    }

    #[test]
    fn test_parse_dispatch_line() {
        let line = r#"{"op":"dispatch","session_id":"s1","action":{"type":"NAME_PROVIDED","name":"Budget"}}"#;
        let request: Request = serde_json::from_str(line).unwrap();
        assert_eq!(
            request,
            Request::Dispatch {
                session_id: "s1".to_string(),
                action: FlowAction::NameProvided {
                    name: "Budget".to_string()
                },
            }
        );
    }

    #[test]
    fn test_unknown_action_type_still_parses() {
        let line = r#"{"op":"dispatch","session_id":"s1","action":{"type":"DANCE"}}"#;
        let request: Request = serde_json::from_str(line).unwrap();
        assert!(matches!(
            request,
            Request::Dispatch {
                action: FlowAction::Unknown,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"op":"explode"}"#).is_err());
    }

    #[tokio::test]
    async fn test_dispatch_creates_session() {
        let registry = SessionRegistry::new(FlowConfig::default()).unwrap();
        let request = Request::Dispatch {
            session_id: "s1".to_string(),
            action: FlowAction::Reset,
        };

        let reply = handle(&registry, &identity(), request).await;
        assert!(reply.ok);
        assert_eq!(
            registry.get_flow_state("s1").await,
            Some(FlowStateKind::Idle)
        );
        let result = reply.result.unwrap();
        assert_eq!(result["user_id"], "cli-user");
    }

    #[tokio::test]
    async fn test_show_missing_session_is_an_error_reply() {
        let registry = SessionRegistry::new(FlowConfig::default()).unwrap();
        let reply = handle(
            &registry,
            &identity(),
            Request::Show {
                session_id: "nope".to_string(),
            },
        )
        .await;

        assert!(!reply.ok);
        assert!(reply.error.unwrap().contains("nope"));
    }
}
