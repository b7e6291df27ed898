//! HTTP API server: agent registry, source registry, Facebook sync,
//! agent mappings, and inbound dispatch.

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agents::{Agent, AgentRegistry, AgentUpdate};
use crate::api::wire::{
    CreateAgentBody, CreateMappingBody, DispatchBody, DispatchResponse, LeadsQuery, MappingView,
    SourcesQuery, SyncAllLeadsResponse, SyncFormsResponse, SyncLeadsResponse, TestAgentBody,
    TestAgentResponse, UpsertSourceBody,
};
use crate::config::{self, Config};
use crate::dispatch::{self, DispatchOutcome, InboundBody, InboundEvent};
use crate::error::Error;
use crate::facebook::GraphClient;
use crate::leads::{Lead, LeadStore};
use crate::llm::{OllamaClient, OpenAiClient};
use crate::routing::{Mapping, MappingStore};
use crate::sources::{Source, SourceKind, SourceRef, SourceRegistry};
use crate::sync;

const DEFAULT_MODEL_FALLBACK: &str = "llama3.2:latest";
const DEFAULT_MODEL_FALLBACK_OPENAI: &str = "gpt-4o-mini";

/// Which LLM backend serves generation requests (from llm.backend).
#[derive(Clone, Copy)]
enum BackendChoice {
    Ollama,
    OpenAi,
}

/// Resolve backend from config. Uses llm.backend ("ollama" | "openai",
/// case-insensitive). Defaults to Ollama when absent or invalid.
fn resolve_backend(llm: &crate::config::LlmConfig) -> BackendChoice {
    let b = llm
        .backend
        .as_deref()
        .unwrap_or("ollama")
        .trim()
        .to_lowercase();
    if b == "openai" || b == "open_ai" {
        BackendChoice::OpenAi
    } else {
        BackendChoice::Ollama
    }
}

/// Resolve the fallback model for agents that set none of their own.
/// Uses llm.defaultModel when set, otherwise a per-backend fallback.
fn resolve_model(config_model: Option<&str>, backend: BackendChoice) -> String {
    let s = config_model
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    match (s, backend) {
        (Some(name), _) => name,
        (None, BackendChoice::Ollama) => DEFAULT_MODEL_FALLBACK.to_string(),
        (None, BackendChoice::OpenAi) => DEFAULT_MODEL_FALLBACK_OPENAI.to_string(),
    }
}

/// Shared state for all handlers: config, the four stores, and the
/// external clients.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sources: Arc<SourceRegistry>,
    pub agents: Arc<AgentRegistry>,
    pub leads: Arc<LeadStore>,
    pub mappings: Arc<MappingStore>,
    pub graph: GraphClient,
    pub ollama: OllamaClient,
    pub openai: OpenAiClient,
}

impl AppState {
    /// Build state from config: load the stores from the data directory
    /// and construct the external clients.
    pub async fn from_config(config: Config, config_path: &std::path::Path) -> Self {
        let data_dir = config::resolve_data_dir(&config, config_path);
        log::debug!("stores loading from {}", data_dir.display());
        let sources = Arc::new(SourceRegistry::load(data_dir.join("sources.json")).await);
        let agents = Arc::new(AgentRegistry::load(data_dir.join("agents.json")).await);
        let leads = Arc::new(LeadStore::load(data_dir.join("leads.json")).await);
        let mappings = Arc::new(MappingStore::load(data_dir.join("mappings.json")).await);
        let graph = GraphClient::new(
            config::resolve_facebook_token(&config),
            config.facebook.page_id.clone(),
            config.facebook.api_base.clone(),
        );
        let ollama = OllamaClient::new(config.llm.ollama_base_url.clone());
        let openai = OpenAiClient::new(
            config.llm.openai_base_url.clone(),
            config::resolve_openai_api_key(&config),
        );
        Self {
            config: Arc::new(config),
            sources,
            agents,
            leads,
            mappings,
            graph,
            ollama,
            openai,
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/agents", get(list_agents).post(create_agent))
        .route(
            "/agents/:id",
            get(get_agent).put(update_agent).delete(delete_agent),
        )
        .route("/agents/:id/test", post(test_agent))
        .route("/sources", get(list_sources).post(upsert_source))
        .route("/facebook/forms/sync", post(sync_forms))
        .route("/facebook/syncForms", post(sync_forms))
        .route("/facebook/forms", get(list_forms))
        .route("/facebook/forms/:form_id/sync-leads", post(sync_form_leads))
        .route("/facebook/leads/sync", post(sync_all_leads))
        .route("/facebook/leads", get(list_leads))
        .route("/map-agent", get(list_mappings).post(create_mapping))
        .route("/map-agent/:id", delete(delete_mapping))
        .route("/dispatch", post(dispatch_inbound))
        .with_state(state)
}

/// Run the API server; binds to config.server.bind:config.server.port.
/// Blocks until shutdown (SIGINT or SIGTERM).
/// `config_path` is the path to the config file (used to resolve the data directory).
pub async fn run_server(config: Config, config_path: PathBuf) -> Result<()> {
    let bind = config.server.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "binding to non-loopback address {} with no authentication; front with a reverse proxy",
            bind
        );
    }
    let port = config.server.port;
    let state = AppState::from_config(config, &config_path).await;
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("api listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("api server exited")?;
    log::info!("api stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}

/// GET / returns a simple health JSON (for probes).
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "running",
        "service": "ruta",
        "port": state.config.server.port,
    }))
}

// --- agents ---

async fn list_agents(State(state): State<AppState>) -> Json<Vec<Agent>> {
    Json(state.agents.list().await)
}

async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, Error> {
    state
        .agents
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("agent not found: {}", id)))
}

async fn create_agent(
    State(state): State<AppState>,
    Json(body): Json<CreateAgentBody>,
) -> Result<(StatusCode, Json<Agent>), Error> {
    let name = required_text(body.name, "name")?;
    let model = required_text(body.model, "model")?;
    let prompt = body.prompt.unwrap_or_default();
    let agent = state
        .agents
        .create(&name, &prompt, &model, body.is_default.unwrap_or(false))
        .await;
    log::info!("agents: created {} ({})", agent.id, agent.name);
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AgentUpdate>,
) -> Result<Json<Agent>, Error> {
    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return Err(Error::validation("name cannot be empty"));
        }
    }
    let agent = state.agents.update(&id, body).await?;
    Ok(Json(agent))
}

/// Deleting an agent that still answers for some source would leave those
/// sources dangling, so mappings must be removed first.
async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, Error> {
    if state.agents.get(&id).await.is_none() {
        return Err(Error::not_found(format!("agent not found: {}", id)));
    }
    if state.mappings.exists_for_agent(&id).await {
        return Err(Error::conflict(
            "agent is mapped to one or more sources; delete those mappings first",
        ));
    }
    state.agents.delete(&id).await?;
    log::info!("agents: deleted {}", id);
    Ok(Json(json!({ "ok": true })))
}

async fn test_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TestAgentBody>,
) -> Result<Json<TestAgentResponse>, Error> {
    let agent = state
        .agents
        .get(&id)
        .await
        .ok_or_else(|| Error::not_found(format!("agent not found: {}", id)))?;
    let message = required_text(body.message, "message")?;

    let backend_choice = resolve_backend(&state.config.llm);
    let fallback_model = resolve_model(state.config.llm.default_model.as_deref(), backend_choice);
    let reply = match backend_choice {
        BackendChoice::Ollama => {
            dispatch::run_agent_turn(&state.ollama, &agent, &fallback_model, &message).await?
        }
        BackendChoice::OpenAi => {
            dispatch::run_agent_turn(&state.openai, &agent, &fallback_model, &message).await?
        }
    };
    Ok(Json(TestAgentResponse {
        reply,
        agent_id: agent.id,
    }))
}

// --- sources ---

async fn list_sources(
    State(state): State<AppState>,
    Query(query): Query<SourcesQuery>,
) -> Result<Json<Vec<Source>>, Error> {
    let kind = match query.kind.as_deref().map(str::trim) {
        Some(k) if !k.is_empty() => Some(k.parse::<SourceKind>()?),
        _ => None,
    };
    Ok(Json(state.sources.list(kind).await))
}

async fn upsert_source(
    State(state): State<AppState>,
    Json(body): Json<UpsertSourceBody>,
) -> Result<Json<Source>, Error> {
    let kind = required_text(body.kind, "kind")?.parse::<SourceKind>()?;
    let external_id = required_text(body.external_id, "externalId")?;
    let name = body
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| external_id.clone());
    let source = state.sources.upsert(kind, &external_id, &name).await;
    Ok(Json(source))
}

// --- facebook sync ---

async fn sync_forms(State(state): State<AppState>) -> Result<Json<SyncFormsResponse>, Error> {
    let forms = sync::sync_forms(&state.graph, &state.sources).await?;
    let count = forms.len();
    Ok(Json(SyncFormsResponse {
        success: true,
        forms,
        count,
    }))
}

async fn list_forms(State(state): State<AppState>) -> Json<Vec<Source>> {
    Json(state.sources.list(Some(SourceKind::Form)).await)
}

async fn sync_form_leads(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
) -> Result<Json<SyncLeadsResponse>, Error> {
    let leads = sync::sync_form_leads(&state.graph, &state.sources, &state.leads, &form_id).await?;
    let count = leads.len();
    Ok(Json(SyncLeadsResponse {
        success: true,
        leads,
        count,
    }))
}

async fn sync_all_leads(State(state): State<AppState>) -> Json<SyncAllLeadsResponse> {
    let results = sync::sync_all_leads(&state.graph, &state.sources, &state.leads).await;
    let success = results.iter().all(|o| o.error.is_none());
    let count = results.iter().map(|o| o.inserted).sum();
    Json(SyncAllLeadsResponse {
        success,
        results,
        count,
    })
}

/// Leads, newest first. `formId` filters by external form ID; an unknown
/// form yields an empty list rather than an error, matching what a
/// dashboard table expects.
async fn list_leads(
    State(state): State<AppState>,
    Query(query): Query<LeadsQuery>,
) -> Json<Vec<Lead>> {
    let form_id = query
        .form_id
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty());
    match form_id {
        Some(external_id) => {
            match state.sources.get_by_ref(&SourceRef::form(external_id)).await {
                Some(source) => Json(state.leads.list(Some(&source.id)).await),
                None => Json(Vec::new()),
            }
        }
        None => Json(state.leads.list(None).await),
    }
}

// --- mappings ---

async fn list_mappings(State(state): State<AppState>) -> Json<Vec<MappingView>> {
    let mappings = state.mappings.list().await;
    let mut views = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let source_name = state
            .sources
            .get_by_ref(&mapping.source)
            .await
            .map(|s| s.name)
            .unwrap_or_default();
        let agent_name = state
            .agents
            .get(&mapping.agent_id)
            .await
            .map(|a| a.name)
            .unwrap_or_default();
        views.push(MappingView {
            id: mapping.id,
            kind: mapping.source.kind,
            external_id: mapping.source.external_id,
            source_name,
            agent_id: mapping.agent_id,
            agent_name,
            created_at: mapping.created_at,
        });
    }
    Json(views)
}

async fn create_mapping(
    State(state): State<AppState>,
    Json(body): Json<CreateMappingBody>,
) -> Result<(StatusCode, Json<Mapping>), Error> {
    let agent_id = required_text(body.agent_id, "agentId")?;
    let source_ref = source_selection(body.form_id, body.sender_id)?;

    if state.sources.get_by_ref(&source_ref).await.is_none() {
        return Err(Error::not_found(format!(
            "unknown {} {}",
            source_ref.kind, source_ref.external_id
        )));
    }
    if state.agents.get(&agent_id).await.is_none() {
        return Err(Error::not_found(format!("agent not found: {}", agent_id)));
    }
    let mapping = state.mappings.create(source_ref, &agent_id).await?;
    log::info!(
        "mappings: {} {} -> agent {}",
        mapping.source.kind,
        mapping.source.external_id,
        mapping.agent_id
    );
    Ok((StatusCode::CREATED, Json(mapping)))
}

async fn delete_mapping(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, Error> {
    state.mappings.delete(&id).await?;
    log::info!("mappings: deleted {}", id);
    Ok(Json(json!({ "ok": true })))
}

// --- dispatch ---

async fn dispatch_inbound(
    State(state): State<AppState>,
    Json(body): Json<DispatchBody>,
) -> Result<Json<DispatchResponse>, Error> {
    let source = source_selection(body.form_id, body.sender_id)?;
    let inbound_body = match (body.message, body.fields) {
        (Some(message), _) if !message.trim().is_empty() => InboundBody::Message(message),
        (_, Some(fields)) if !fields.is_empty() => InboundBody::LeadFields(fields),
        _ => {
            return Err(Error::validation(
                "a message or a fields object is required",
            ))
        }
    };
    let event = InboundEvent {
        source,
        body: inbound_body,
    };

    let backend_choice = resolve_backend(&state.config.llm);
    let fallback_model = resolve_model(state.config.llm.default_model.as_deref(), backend_choice);
    let outcome = match backend_choice {
        BackendChoice::Ollama => {
            dispatch::dispatch_event(
                &state.mappings,
                &state.agents,
                &state.ollama,
                &fallback_model,
                &event,
            )
            .await?
        }
        BackendChoice::OpenAi => {
            dispatch::dispatch_event(
                &state.mappings,
                &state.agents,
                &state.openai,
                &fallback_model,
                &event,
            )
            .await?
        }
    };
    let response = match outcome {
        DispatchOutcome::Replied { agent_id, reply } => DispatchResponse {
            handled: true,
            agent_id: Some(agent_id),
            reply: Some(reply),
        },
        DispatchOutcome::Unhandled => DispatchResponse {
            handled: false,
            agent_id: None,
            reply: None,
        },
    };
    Ok(Json(response))
}

// --- helpers ---

/// A required string field: present and non-blank, trimmed.
fn required_text(value: Option<String>, field: &str) -> Result<String, Error> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::validation(format!("{} is required", field)))
}

/// Turn the formId/senderId pair into a source reference. Exactly one of
/// the two must be set.
fn source_selection(
    form_id: Option<String>,
    sender_id: Option<String>,
) -> Result<SourceRef, Error> {
    let form_id = form_id
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty());
    let sender_id = sender_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    match (form_id, sender_id) {
        (Some(form), None) => Ok(SourceRef::form(form)),
        (None, Some(sender)) => Ok(SourceRef::sender(sender)),
        (Some(_), Some(_)) => Err(Error::validation(
            "formId and senderId are mutually exclusive",
        )),
        (None, None) => Err(Error::validation("a formId or senderId is required")),
    }
}
