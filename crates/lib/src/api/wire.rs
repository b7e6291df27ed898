//! REST request and response bodies.
//!
//! Request bodies keep every field optional and let the handlers
//! validate, so a missing field comes back as a 400 with an `{error}`
//! body instead of a framework rejection.

use serde::{Deserialize, Serialize};

use crate::leads::Lead;
use crate::sources::{Source, SourceKind};
use crate::sync::FormSyncOutcome;

/// Body for POST /agents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentBody {
    pub name: Option<String>,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub is_default: Option<bool>,
}

/// Body for POST /agents/:id/test.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAgentBody {
    pub message: Option<String>,
}

/// Response for POST /agents/:id/test.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAgentResponse {
    pub reply: String,
    pub agent_id: String,
}

/// Body for POST /sources.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSourceBody {
    pub kind: Option<String>,
    pub external_id: Option<String>,
    pub name: Option<String>,
}

/// Query for GET /sources.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesQuery {
    pub kind: Option<String>,
}

/// Query for GET /facebook/leads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadsQuery {
    /// External form ID; when set, only that form's leads are returned.
    pub form_id: Option<String>,
}

/// Response for POST /facebook/forms/sync.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFormsResponse {
    pub success: bool,
    pub forms: Vec<Source>,
    pub count: usize,
}

/// Response for POST /facebook/forms/:formId/sync-leads. `leads` holds
/// only the rows inserted by this run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLeadsResponse {
    pub success: bool,
    pub leads: Vec<Lead>,
    pub count: usize,
}

/// Response for POST /facebook/leads/sync: one outcome per registered form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAllLeadsResponse {
    /// True when every form synced cleanly.
    pub success: bool,
    pub results: Vec<FormSyncOutcome>,
    /// Total leads inserted across all forms.
    pub count: usize,
}

/// Body for POST /map-agent. Exactly one of formId/senderId selects the source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMappingBody {
    pub form_id: Option<String>,
    pub sender_id: Option<String>,
    pub agent_id: Option<String>,
}

/// One mapping joined with its source and agent names for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingView {
    pub id: String,
    pub kind: SourceKind,
    pub external_id: String,
    pub source_name: String,
    pub agent_id: String,
    pub agent_name: String,
    pub created_at: String,
}

/// Body for POST /dispatch. Exactly one of formId/senderId selects the
/// source; message carries a direct text, fields a lead submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchBody {
    pub form_id: Option<String>,
    pub sender_id: Option<String>,
    pub message: Option<String>,
    pub fields: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Response for POST /dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    /// False when no agent was available for the source.
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}
