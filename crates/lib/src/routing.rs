//! Source–agent mapping for routing: which agent answers which source.
//!
//! Inbound: an event from a source (form submission, direct message) is
//! routed to the explicitly mapped agent when one exists, otherwise to the
//! default agent. A source carries at most one mapping; the check and the
//! insert happen under one write lock, so of two concurrent creates for
//! the same source exactly one wins and the other gets Conflict.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;

use crate::agents::{Agent, AgentRegistry};
use crate::error::Error;
use crate::sources::SourceRef;

/// One source-to-agent binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub id: String,
    #[serde(flatten)]
    pub source: SourceRef,
    pub agent_id: String,
    pub created_at: String,
}

/// How an agent was resolved for a source.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The source has an explicit mapping.
    Explicit(Agent),
    /// No mapping; the default agent applies.
    Default(Agent),
    /// Neither a mapping nor a default agent exists. This is a normal
    /// state for a fresh install, not an error.
    Unresolved,
}

impl Resolution {
    pub fn agent(&self) -> Option<&Agent> {
        match self {
            Resolution::Explicit(agent) | Resolution::Default(agent) => Some(agent),
            Resolution::Unresolved => None,
        }
    }

    /// The resolved agent, or NoAgentAvailable when unresolved. For
    /// callers that need an agent rather than an outcome.
    pub fn into_agent(self) -> Result<Agent, Error> {
        match self {
            Resolution::Explicit(agent) | Resolution::Default(agent) => Ok(agent),
            Resolution::Unresolved => Err(Error::NoAgentAvailable),
        }
    }
}

/// In-memory store of source-to-agent mappings; can load/save from a JSON file.
pub struct MappingStore {
    path: Option<std::path::PathBuf>,
    entries: RwLock<Vec<Mapping>>,
}

impl MappingStore {
    /// Ephemeral store with no backing file.
    pub fn new() -> Self {
        Self {
            path: None,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Load store from path; if file missing or invalid, starts empty.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Vec::new()),
            Err(_) => Vec::new(),
        };
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
        let json = serde_json::to_string_pretty(&*entries)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await
    }

    async fn persist(&self) {
        if let Err(e) = self.save().await {
            log::warn!("mappings: persist failed: {}", e);
        }
    }

    /// Bind a source to an agent and persist. Fails with Conflict when the
    /// source already has a mapping; callers must delete the old one first.
    /// Source and agent existence checks belong to the caller.
    pub async fn create(&self, source: SourceRef, agent_id: &str) -> Result<Mapping, Error> {
        let mapping = {
            let mut entries = self.entries.write().await;
            if entries.iter().any(|m| m.source == source) {
                return Err(Error::conflict(format!(
                    "{} {} is already mapped to an agent",
                    source.kind, source.external_id
                )));
            }
            let mapping = Mapping {
                id: format!("map-{}", uuid::Uuid::new_v4()),
                source,
                agent_id: agent_id.to_string(),
                created_at: crate::now_iso(),
            };
            entries.push(mapping.clone());
            mapping
        };
        self.persist().await;
        Ok(mapping)
    }

    /// Remove a mapping by ID and persist; the source becomes free to remap.
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        {
            let mut entries = self.entries.write().await;
            let Some(idx) = entries.iter().position(|m| m.id == id) else {
                return Err(Error::not_found(format!("mapping not found: {}", id)));
            };
            entries.remove(idx);
        }
        self.persist().await;
        Ok(())
    }

    /// The mapping for a source, if any.
    pub async fn find_by_source(&self, source: &SourceRef) -> Option<Mapping> {
        let entries = self.entries.read().await;
        entries.iter().find(|m| &m.source == source).cloned()
    }

    /// True when any mapping points at this agent.
    pub async fn exists_for_agent(&self, agent_id: &str) -> bool {
        let entries = self.entries.read().await;
        entries.iter().any(|m| m.agent_id == agent_id)
    }

    /// All mappings, oldest first.
    pub async fn list(&self) -> Vec<Mapping> {
        let entries = self.entries.read().await;
        let mut mappings = entries.clone();
        mappings.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        mappings
    }

    /// Resolve the agent for a source: explicit mapping first, then the
    /// default agent, then Unresolved.
    pub async fn resolve(&self, source: &SourceRef, agents: &AgentRegistry) -> Resolution {
        if let Some(mapping) = self.find_by_source(source).await {
            if let Some(agent) = agents.get(&mapping.agent_id).await {
                return Resolution::Explicit(agent);
            }
            log::warn!(
                "routing: mapping {} references unknown agent {}",
                mapping.id,
                mapping.agent_id
            );
        }
        match agents.default_agent().await {
            Some(agent) => Resolution::Default(agent),
            None => Resolution::Unresolved,
        }
    }
}

impl Default for MappingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceRef;
    use std::sync::Arc;

    #[tokio::test]
    async fn one_mapping_per_source() {
        let store = MappingStore::new();
        store.create(SourceRef::form("123"), "agent-a").await.unwrap();

        let err = store
            .create(SourceRef::form("123"), "agent-b")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.list().await.len(), 1);

        // A sender with the same external id is a different source.
        store.create(SourceRef::sender("123"), "agent-b").await.unwrap();
        assert_eq!(store.list().await.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_creates_for_one_source_yield_one_winner() {
        let store = Arc::new(MappingStore::new());
        let s1 = store.clone();
        let s2 = store.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { s1.create(SourceRef::form("555"), "agent-a").await }),
            tokio::spawn(async move { s2.create(SourceRef::form("555"), "agent-b").await }),
        );
        let outcomes = [r1.unwrap(), r2.unwrap()];
        let wins = outcomes.iter().filter(|r| r.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|r| matches!(r, Err(Error::Conflict(_))))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn delete_frees_the_source() {
        let store = MappingStore::new();
        let mapping = store.create(SourceRef::form("9"), "agent-a").await.unwrap();
        store.delete(&mapping.id).await.unwrap();

        assert!(matches!(
            store.delete(&mapping.id).await.unwrap_err(),
            Error::NotFound(_)
        ));
        store.create(SourceRef::form("9"), "agent-b").await.unwrap();
    }

    #[tokio::test]
    async fn explicit_mapping_wins_then_falls_back_after_delete() {
        let agents = AgentRegistry::new();
        let fallback = agents.create("Fallback", "", "m", true).await;
        let specialist = agents.create("Specialist", "", "m", false).await;
        let store = MappingStore::new();
        let source = SourceRef::form("123");

        // No mapping yet: the default agent answers.
        match store.resolve(&source, &agents).await {
            Resolution::Default(a) => assert_eq!(a.id, fallback.id),
            other => panic!("expected default resolution, got {:?}", other),
        }

        let mapping = store.create(source.clone(), &specialist.id).await.unwrap();
        match store.resolve(&source, &agents).await {
            Resolution::Explicit(a) => assert_eq!(a.id, specialist.id),
            other => panic!("expected explicit resolution, got {:?}", other),
        }

        store.delete(&mapping.id).await.unwrap();
        match store.resolve(&source, &agents).await {
            Resolution::Default(a) => assert_eq!(a.id, fallback.id),
            other => panic!("expected default resolution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unresolved_without_mapping_or_default() {
        let agents = AgentRegistry::new();
        agents.create("NotDefault", "", "m", false).await;
        let store = MappingStore::new();

        let resolution = store.resolve(&SourceRef::sender("wa-1"), &agents).await;
        assert!(matches!(resolution, Resolution::Unresolved));
        assert!(resolution.agent().is_none());
        assert!(matches!(
            resolution.into_agent().unwrap_err(),
            Error::NoAgentAvailable
        ));
    }
}
