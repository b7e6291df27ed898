//! Agent registry: persisted responder definitions.
//!
//! An agent bundles a display name, a behavior prompt, and a model name.
//! At most one agent carries the default flag; flagging one clears the
//! others inside the same write lock so concurrent flips cannot leave two.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;

use crate::error::Error;

/// One configured agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Behavior instructions, sent as the system message on every turn.
    pub prompt: String,
    /// Model name passed to the backend (e.g. "llama3.2:latest"). Empty
    /// means use the configured default model.
    pub model: String,
    /// Fallback responder for sources without an explicit mapping.
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Partial update for an agent; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub is_default: Option<bool>,
}

/// In-memory registry of agents; can load/save from a JSON file.
pub struct AgentRegistry {
    path: Option<std::path::PathBuf>,
    entries: RwLock<Vec<Agent>>,
}

impl AgentRegistry {
    /// Ephemeral registry with no backing file.
    pub fn new() -> Self {
        Self {
            path: None,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Load registry from path; if file missing or invalid, starts empty.
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
            log::warn!("agents: persist failed: {}", e);
        }
    }

    /// Create an agent and persist. When `is_default` is set, any other
    /// default flag is cleared in the same write.
    pub async fn create(&self, name: &str, prompt: &str, model: &str, is_default: bool) -> Agent {
        let now = crate::now_iso();
        let agent = Agent {
            id: format!("agent-{}", uuid::Uuid::new_v4()),
            name: name.trim().to_string(),
            prompt: prompt.to_string(),
            model: model.trim().to_string(),
            is_default,
            created_at: now.clone(),
            updated_at: now,
        };
        {
            let mut entries = self.entries.write().await;
            if is_default {
                for a in entries.iter_mut() {
                    a.is_default = false;
                }
            }
            entries.push(agent.clone());
        }
        self.persist().await;
        agent
    }

    /// Apply a partial update and persist. Unknown IDs leave the registry
    /// untouched and report NotFound.
    pub async fn update(&self, id: &str, update: AgentUpdate) -> Result<Agent, Error> {
        let updated = {
            let mut entries = self.entries.write().await;
            let Some(idx) = entries.iter().position(|a| a.id == id) else {
                return Err(Error::not_found(format!("agent not found: {}", id)));
            };
            if update.is_default == Some(true) {
                for (i, a) in entries.iter_mut().enumerate() {
                    if i != idx {
                        a.is_default = false;
                    }
                }
            }
            let agent = &mut entries[idx];
            if let Some(name) = update.name {
                agent.name = name.trim().to_string();
            }
            if let Some(prompt) = update.prompt {
                agent.prompt = prompt;
            }
            if let Some(model) = update.model {
                agent.model = model.trim().to_string();
            }
            if let Some(flag) = update.is_default {
                agent.is_default = flag;
            }
            agent.updated_at = crate::now_iso();
            agent.clone()
        };
        self.persist().await;
        Ok(updated)
    }

    /// Remove an agent and persist. Mapping checks belong to the caller;
    /// the registry itself only knows agents.
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        {
            let mut entries = self.entries.write().await;
            let Some(idx) = entries.iter().position(|a| a.id == id) else {
                return Err(Error::not_found(format!("agent not found: {}", id)));
            };
            entries.remove(idx);
        }
        self.persist().await;
        Ok(())
    }

    /// Look up by ID.
    pub async fn get(&self, id: &str) -> Option<Agent> {
        let entries = self.entries.read().await;
        entries.iter().find(|a| a.id == id).cloned()
    }

    /// The agent carrying the default flag, if any.
    pub async fn default_agent(&self) -> Option<Agent> {
        let entries = self.entries.read().await;
        entries.iter().find(|a| a.is_default).cloned()
    }

    /// All agents, oldest first.
    pub async fn list(&self) -> Vec<Agent> {
        let entries = self.entries.read().await;
        let mut agents = entries.clone();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        agents
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn second_default_clears_the_first() {
        let registry = AgentRegistry::new();
        let first = registry.create("Sales", "Sell things.", "llama3.2:latest", true).await;
        let second = registry.create("Support", "Help people.", "llama3.2:latest", true).await;

        let agents = registry.list().await;
        let defaults: Vec<&Agent> = agents.iter().filter(|a| a.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, second.id);
        assert!(!registry.get(&first.id).await.unwrap().is_default);
    }

    #[tokio::test]
    async fn update_flips_default_atomically() {
        let registry = AgentRegistry::new();
        let a = registry.create("A", "", "m", true).await;
        let b = registry.create("B", "", "m", false).await;

        let update = AgentUpdate {
            is_default: Some(true),
            ..AgentUpdate::default()
        };
        registry.update(&b.id, update).await.unwrap();

        assert!(!registry.get(&a.id).await.unwrap().is_default);
        assert!(registry.get(&b.id).await.unwrap().is_default);
        assert_eq!(registry.default_agent().await.map(|x| x.id), Some(b.id));
    }

    #[tokio::test]
    async fn concurrent_default_flips_leave_exactly_one() {
        let registry = Arc::new(AgentRegistry::new());
        let a = registry.create("A", "", "m", false).await;
        let b = registry.create("B", "", "m", false).await;

        let ra = registry.clone();
        let rb = registry.clone();
        let ida = a.id.clone();
        let idb = b.id.clone();
        let flip_a = AgentUpdate {
            is_default: Some(true),
            ..AgentUpdate::default()
        };
        let flip_b = flip_a.clone();
        let (ua, ub) = tokio::join!(
            tokio::spawn(async move { ra.update(&ida, flip_a).await }),
            tokio::spawn(async move { rb.update(&idb, flip_b).await }),
        );
        ua.unwrap().unwrap();
        ub.unwrap().unwrap();

        let defaults = registry
            .list()
            .await
            .into_iter()
            .filter(|x| x.is_default)
            .count();
        assert_eq!(defaults, 1);
    }

    #[tokio::test]
    async fn update_unknown_agent_reports_not_found() {
        let registry = AgentRegistry::new();
        let err = registry
            .update("agent-missing", AgentUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(matches!(
            registry.delete("agent-missing").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn reload_sees_persisted_agents() {
        let dir = std::env::temp_dir().join(format!("ruta-agents-{}", uuid::Uuid::new_v4()));
        let path = dir.join("agents.json");

        let registry = AgentRegistry::load(&path).await;
        let created = registry.create("Sales", "Sell.", "llama3.2:latest", true).await;

        let reloaded = AgentRegistry::load(&path).await;
        let found = reloaded.get(&created.id).await.unwrap();
        assert_eq!(found.name, "Sales");
        assert!(found.is_default);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
