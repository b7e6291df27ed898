//! Source registry: persisted lead forms and direct-message senders.
//!
//! A source is anywhere an inbound contact can originate. Each is keyed by
//! its external ID (Facebook form ID, WhatsApp sender ID) so repeated syncs
//! converge on one record per real-world source.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

/// Kind of inbound source: a lead-gen form or a direct-message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Form,
    Sender,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Form => write!(f, "form"),
            SourceKind::Sender => write!(f, "sender"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "form" => Ok(SourceKind::Form),
            "sender" => Ok(SourceKind::Sender),
            other => Err(crate::error::Error::validation(format!(
                "unknown source kind: {} (expected \"form\" or \"sender\")",
                other
            ))),
        }
    }
}

/// Identity of a source: its kind plus the external ID issued by the
/// source system. Two sources are the same exactly when these match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub kind: SourceKind,
    pub external_id: String,
}

impl SourceRef {
    pub fn form(external_id: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Form,
            external_id: external_id.into(),
        }
    }

    pub fn sender(external_id: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Sender,
            external_id: external_id.into(),
        }
    }
}

/// One registered source. The local ID is stable across re-syncs; only the
/// display name may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub kind: SourceKind,
    pub external_id: String,
    pub name: String,
}

impl Source {
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            kind: self.kind,
            external_id: self.external_id.clone(),
        }
    }
}

/// In-memory registry of sources; can load/save from a JSON file.
pub struct SourceRegistry {
    path: Option<std::path::PathBuf>,
    entries: RwLock<HashMap<SourceRef, Source>>,
}

impl SourceRegistry {
    /// Ephemeral registry with no backing file.
    pub fn new() -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Load registry from path; if file missing or invalid, starts empty.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let list: Vec<Source> = match tokio::fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Vec::new()),
            Err(_) => Vec::new(),
        };
        let entries = list.into_iter().map(|s| (s.source_ref(), s)).collect();
        Self {
            path: Some(path),
            entries: RwLock::new(entries),
        }
    }

    async fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let entries = self.entries.read().await;
        let mut list: Vec<&Source> = entries.values().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        let json = serde_json::to_string_pretty(&list)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await
    }

    async fn persist(&self) {
        if let Err(e) = self.save().await {
            log::warn!("sources: persist failed: {}", e);
        }
    }

    /// Create or refresh the source for this (kind, external ID) and persist.
    /// An existing source keeps its local ID; only the name is updated.
    pub async fn upsert(&self, kind: SourceKind, external_id: &str, name: &str) -> Source {
        let key = SourceRef {
            kind,
            external_id: external_id.to_string(),
        };
        let source = {
            let mut entries = self.entries.write().await;
            match entries.get_mut(&key) {
                Some(existing) => {
                    existing.name = name.to_string();
                    existing.clone()
                }
                None => {
                    let source = Source {
                        id: format!("src-{}", uuid::Uuid::new_v4()),
                        kind,
                        external_id: external_id.to_string(),
                        name: name.to_string(),
                    };
                    entries.insert(key, source.clone());
                    source
                }
            }
        };
        self.persist().await;
        source
    }

    /// Look up by local ID.
    pub async fn get(&self, id: &str) -> Option<Source> {
        let entries = self.entries.read().await;
        entries.values().find(|s| s.id == id).cloned()
    }

    /// Look up by (kind, external ID).
    pub async fn get_by_ref(&self, source_ref: &SourceRef) -> Option<Source> {
        let entries = self.entries.read().await;
        entries.get(source_ref).cloned()
    }

    /// All sources, optionally restricted to one kind, sorted by name.
    pub async fn list(&self, kind: Option<SourceKind>) -> Vec<Source> {
        let entries = self.entries.read().await;
        let mut sources: Vec<Source> = entries
            .values()
            .filter(|s| kind.map_or(true, |k| s.kind == k))
            .cloned()
            .collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.external_id.cmp(&b.external_id)));
        sources
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_idempotent_per_external_id() {
        let registry = SourceRegistry::new();
        let first = registry.upsert(SourceKind::Form, "9001", "Spring campaign").await;
        let second = registry.upsert(SourceKind::Form, "9001", "Spring campaign (renamed)").await;

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Spring campaign (renamed)");
        assert_eq!(registry.list(None).await.len(), 1);
    }

    #[tokio::test]
    async fn same_external_id_different_kind_is_a_different_source() {
        let registry = SourceRegistry::new();
        let form = registry.upsert(SourceKind::Form, "77", "A form").await;
        let sender = registry.upsert(SourceKind::Sender, "77", "A sender").await;

        assert_ne!(form.id, sender.id);
        assert_eq!(registry.list(None).await.len(), 2);
        assert_eq!(registry.list(Some(SourceKind::Sender)).await.len(), 1);
    }

    #[tokio::test]
    async fn lookup_by_ref_and_by_id() {
        let registry = SourceRegistry::new();
        let source = registry.upsert(SourceKind::Sender, "wa-4415", "Support line").await;

        let by_ref = registry.get_by_ref(&SourceRef::sender("wa-4415")).await;
        assert_eq!(by_ref.map(|s| s.id), Some(source.id.clone()));
        assert!(registry.get(&source.id).await.is_some());
        assert!(registry.get("src-missing").await.is_none());
    }
}
