//! Lead synchronization: pull forms and leads from the external provider
//! into the local stores.
//!
//! Sync is safe to repeat: forms are upserted by external ID and leads
//! are inserted only when their external ID is new, so an interrupted run
//! can simply be retried. In a batch run one form's provider failure is
//! recorded in that form's outcome and the rest of the batch continues.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Error;
use crate::leads::{Lead, LeadStore};
use crate::sources::{Source, SourceKind, SourceRef, SourceRegistry};

/// A lead form as reported by the provider.
#[derive(Debug, Clone)]
pub struct RemoteForm {
    pub id: String,
    pub name: String,
}

/// A submitted lead as reported by the provider.
#[derive(Debug, Clone)]
pub struct RemoteLead {
    pub id: String,
    pub created_time: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// External system the synchronizer pulls forms and leads from.
#[async_trait]
pub trait LeadProvider: Send + Sync {
    /// All lead forms visible to the configured account.
    async fn list_forms(&self) -> Result<Vec<RemoteForm>, Error>;

    /// All submissions for one form, by its external ID.
    async fn list_leads(&self, form_external_id: &str) -> Result<Vec<RemoteLead>, Error>;
}

/// Result of syncing one form's leads in a batch run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSyncOutcome {
    pub source_id: String,
    pub external_id: String,
    pub name: String,
    /// Leads newly stored in this run; re-synced rows do not count.
    pub inserted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Upsert every remote form into the registry. Returns the synced sources;
/// a provider failure here fails the whole call since nothing was listed.
pub async fn sync_forms<P: LeadProvider>(
    provider: &P,
    sources: &SourceRegistry,
) -> Result<Vec<Source>, Error> {
    let forms = provider.list_forms().await?;
    let mut synced = Vec::with_capacity(forms.len());
    for form in forms {
        synced.push(sources.upsert(SourceKind::Form, &form.id, &form.name).await);
    }
    log::info!("sync: {} form(s) upserted", synced.len());
    Ok(synced)
}

/// Fetch one form's leads and store the ones not yet present. Returns only
/// the newly inserted rows. The form must already be registered (run a
/// form sync first).
pub async fn sync_form_leads<P: LeadProvider>(
    provider: &P,
    sources: &SourceRegistry,
    leads: &LeadStore,
    form_external_id: &str,
) -> Result<Vec<Lead>, Error> {
    let source = sources
        .get_by_ref(&SourceRef::form(form_external_id))
        .await
        .ok_or_else(|| {
            Error::not_found(format!(
                "unknown form {}; sync forms first",
                form_external_id
            ))
        })?;
    let remote = provider.list_leads(form_external_id).await?;
    let batch: Vec<Lead> = remote
        .into_iter()
        .map(|r| Lead {
            id: r.id,
            source_id: source.id.clone(),
            fields: r.fields,
            created_time: r.created_time,
            synced_at: crate::now_iso(),
        })
        .collect();
    let inserted = leads.insert_new(batch).await;
    log::info!(
        "sync: form {} -> {} new lead(s)",
        form_external_id,
        inserted.len()
    );
    Ok(inserted)
}

/// Sync leads for every registered form. One form's failure is recorded in
/// its outcome and does not abort the others, so a flaky provider still
/// yields whatever it can.
pub async fn sync_all_leads<P: LeadProvider>(
    provider: &P,
    sources: &SourceRegistry,
    leads: &LeadStore,
) -> Vec<FormSyncOutcome> {
    let forms = sources.list(Some(SourceKind::Form)).await;
    let mut outcomes = Vec::with_capacity(forms.len());
    for form in forms {
        let outcome = match sync_form_leads(provider, sources, leads, &form.external_id).await {
            Ok(new) => FormSyncOutcome {
                source_id: form.id.clone(),
                external_id: form.external_id.clone(),
                name: form.name.clone(),
                inserted: new.len(),
                error: None,
            },
            Err(e) => {
                log::warn!("sync: form {} failed: {}", form.external_id, e);
                FormSyncOutcome {
                    source_id: form.id.clone(),
                    external_id: form.external_id.clone(),
                    name: form.name.clone(),
                    inserted: 0,
                    error: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}
