//! Dispatch: route one inbound event to its agent and generate the reply.
//!
//! Resolution order is explicit mapping, then default agent. When neither
//! exists the event is reported as unhandled rather than failed: a fresh
//! install receives events before any agent is configured, and callers
//! need to distinguish "nobody answers this" from a broken backend.

use crate::agents::{Agent, AgentRegistry};
use crate::error::Error;
use crate::llm::{ChatMessage, LlmBackend};
use crate::routing::{MappingStore, Resolution};
use crate::sources::SourceRef;

/// One inbound contact event from a source.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub source: SourceRef,
    pub body: InboundBody,
}

/// What arrived: a direct message or a captured lead's submitted fields.
#[derive(Debug, Clone)]
pub enum InboundBody {
    Message(String),
    LeadFields(serde_json::Map<String, serde_json::Value>),
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The resolved agent produced a reply.
    Replied { agent_id: String, reply: String },
    /// No mapping and no default agent; the event was accepted but no
    /// reply was generated.
    Unhandled,
}

/// Run one generation turn for an agent: its stored prompt as the system
/// message, the inbound content as the user message. `fallback_model` is
/// used when the agent does not set a model of its own.
pub async fn run_agent_turn<B: LlmBackend>(
    backend: &B,
    agent: &Agent,
    fallback_model: &str,
    content: &str,
) -> Result<String, Error> {
    let mut messages = Vec::with_capacity(2);
    if !agent.prompt.trim().is_empty() {
        messages.push(ChatMessage::system(agent.prompt.clone()));
    }
    messages.push(ChatMessage::user(content));

    let model = agent.model.trim();
    let model = if model.is_empty() { fallback_model } else { model };
    log::info!("dispatch: agent {} using model {}", agent.id, model);

    let reply = backend.chat(model, messages).await?;
    Ok(reply)
}

/// Resolve the agent for an inbound event and return its reply. Lead
/// fields are rendered as one "name: value" line per field so the agent
/// sees the full submission.
pub async fn dispatch_event<B: LlmBackend>(
    mappings: &MappingStore,
    agents: &AgentRegistry,
    backend: &B,
    fallback_model: &str,
    event: &InboundEvent,
) -> Result<DispatchOutcome, Error> {
    let agent = match mappings.resolve(&event.source, agents).await {
        Resolution::Explicit(agent) => {
            log::debug!(
                "dispatch: {} {} -> mapped agent {}",
                event.source.kind,
                event.source.external_id,
                agent.id
            );
            agent
        }
        Resolution::Default(agent) => {
            log::debug!(
                "dispatch: {} {} -> default agent {}",
                event.source.kind,
                event.source.external_id,
                agent.id
            );
            agent
        }
        Resolution::Unresolved => {
            log::info!(
                "dispatch: no agent for {} {}; event left unhandled",
                event.source.kind,
                event.source.external_id
            );
            return Ok(DispatchOutcome::Unhandled);
        }
    };

    let content = match &event.body {
        InboundBody::Message(text) => text.clone(),
        InboundBody::LeadFields(fields) => render_lead_fields(fields),
    };
    let reply = run_agent_turn(backend, &agent, fallback_model, &content).await?;
    Ok(DispatchOutcome::Replied {
        agent_id: agent.id,
        reply,
    })
}

fn render_lead_fields(fields: &serde_json::Map<String, serde_json::Value>) -> String {
    let mut out = String::from("New lead received:\n");
    for (name, value) in fields {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(name);
        out.push_str(": ");
        out.push_str(&value);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    struct StubBackend {
        reply: String,
        fail: bool,
        seen: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    impl StubBackend {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                fail: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: String::new(),
                fail: true,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmBackend for StubBackend {
        async fn chat(
            &self,
            model: &str,
            messages: Vec<ChatMessage>,
        ) -> Result<String, LlmError> {
            if self.fail {
                return Err(LlmError::Api("model offline".to_string()));
            }
            self.seen.lock().await.push((model.to_string(), messages));
            Ok(self.reply.clone())
        }
    }

    fn message_event(source: SourceRef, text: &str) -> InboundEvent {
        InboundEvent {
            source,
            body: InboundBody::Message(text.to_string()),
        }
    }

    #[tokio::test]
    async fn mapped_agent_answers_before_the_default() {
        let agents = AgentRegistry::new();
        let fallback = agents.create("Fallback", "", "m", true).await;
        let specialist = agents.create("Specialist", "", "m", false).await;
        let mappings = MappingStore::new();
        mappings
            .create(SourceRef::form("123"), &specialist.id)
            .await
            .unwrap();
        let backend = StubBackend::replying("hello");

        let mapped = dispatch_event(
            &mappings,
            &agents,
            &backend,
            "m",
            &message_event(SourceRef::form("123"), "hi"),
        )
        .await
        .unwrap();
        match mapped {
            DispatchOutcome::Replied { agent_id, reply } => {
                assert_eq!(agent_id, specialist.id);
                assert_eq!(reply, "hello");
            }
            other => panic!("expected a reply, got {:?}", other),
        }

        let unmapped = dispatch_event(
            &mappings,
            &agents,
            &backend,
            "m",
            &message_event(SourceRef::form("999"), "hi"),
        )
        .await
        .unwrap();
        match unmapped {
            DispatchOutcome::Replied { agent_id, .. } => assert_eq!(agent_id, fallback.id),
            other => panic!("expected a reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn no_agent_means_unhandled_not_error() {
        let agents = AgentRegistry::new();
        let mappings = MappingStore::new();
        let backend = StubBackend::replying("never sent");

        let outcome = dispatch_event(
            &mappings,
            &agents,
            &backend,
            "m",
            &message_event(SourceRef::sender("wa-1"), "hi"),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Unhandled));
        assert!(backend.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn prompt_and_lead_fields_reach_the_backend() {
        let agents = AgentRegistry::new();
        agents
            .create("Sales", "You close deals.", "llama3.2:latest", true)
            .await;
        let mappings = MappingStore::new();
        let backend = StubBackend::replying("ok");

        let fields = match json!({"full_name": "Jane", "email": "jane@x.io"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let event = InboundEvent {
            source: SourceRef::form("123"),
            body: InboundBody::LeadFields(fields),
        };
        dispatch_event(&mappings, &agents, &backend, "m", &event)
            .await
            .unwrap();

        let seen = backend.seen.lock().await;
        let (model, messages) = &seen[0];
        assert_eq!(model, "llama3.2:latest");
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "You close deals.");
        assert_eq!(messages[1].role, "user");
        assert!(messages[1].content.contains("full_name: Jane"));
        assert!(messages[1].content.contains("email: jane@x.io"));
    }

    #[tokio::test]
    async fn empty_agent_model_uses_the_fallback() {
        let agents = AgentRegistry::new();
        let agent = agents.create("NoModel", "", "", true).await;
        let backend = StubBackend::replying("ok");

        run_agent_turn(&backend, &agent, "default-model", "hi")
            .await
            .unwrap();

        let seen = backend.seen.lock().await;
        assert_eq!(seen[0].0, "default-model");
        // No system message when the prompt is empty.
        assert_eq!(seen[0].1.len(), 1);
        assert_eq!(seen[0].1[0].role, "user");
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_upstream() {
        let agents = AgentRegistry::new();
        agents.create("Sales", "", "m", true).await;
        let mappings = MappingStore::new();
        let backend = StubBackend::failing();

        let err = dispatch_event(
            &mappings,
            &agents,
            &backend,
            "m",
            &message_event(SourceRef::form("1"), "hi"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
        assert!(err.to_string().contains("model offline"));
    }
}
