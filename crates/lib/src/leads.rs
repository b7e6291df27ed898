//! Lead store: local cache of captured form submissions.
//!
//! Rows are append-only. The external lead ID is the dedup key, so a
//! re-sync after a partial failure inserts only what is still missing
//! and never duplicates or rewrites an existing row.
//!
//! Field sets vary per form; the alias lists below cover the common
//! spellings forms use for contact columns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

/// Field names checked in order when looking for the contact's name.
pub const NAME_ALIASES: &[&str] = &["full_name", "name", "first_name"];
/// Field names checked in order when looking for the contact's email.
pub const EMAIL_ALIASES: &[&str] = &["email", "email_address", "work_email"];
/// Field names checked in order when looking for the contact's phone number.
pub const PHONE_ALIASES: &[&str] = &["phone_number", "phone", "mobile_number", "whatsapp_number"];

/// One captured lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    /// External lead ID issued by the source system; globally unique there.
    pub id: String,
    /// Local ID of the owning form source.
    pub source_id: String,
    /// Submitted values keyed by form field name, in form order.
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// Submission timestamp as reported by the source system, kept verbatim.
    pub created_time: String,
    /// When this row was first stored locally (RFC 3339).
    pub synced_at: String,
}

impl Lead {
    /// First non-empty value among the given field-name aliases.
    pub fn first_field(&self, aliases: &[&str]) -> Option<String> {
        for key in aliases {
            if let Some(value) = self.fields.get(*key) {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if !text.trim().is_empty() {
                    return Some(text);
                }
            }
        }
        None
    }

    pub fn contact_name(&self) -> Option<String> {
        self.first_field(NAME_ALIASES)
    }

    pub fn email(&self) -> Option<String> {
        self.first_field(EMAIL_ALIASES)
    }

    pub fn phone(&self) -> Option<String> {
        self.first_field(PHONE_ALIASES)
    }
}

/// In-memory lead cache; can load/save from a JSON file.
pub struct LeadStore {
    path: Option<std::path::PathBuf>,
    entries: RwLock<HashMap<String, Lead>>,
}

impl LeadStore {
    /// Ephemeral store with no backing file.
    pub fn new() -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Load store from path; if file missing or invalid, starts empty.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let list: Vec<Lead> = match tokio::fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Vec::new()),
            Err(_) => Vec::new(),
        };
        let entries = list.into_iter().map(|l| (l.id.clone(), l)).collect();
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
        let mut list: Vec<&Lead> = entries.values().collect();
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
            log::warn!("leads: persist failed: {}", e);
        }
    }

    /// Insert leads whose IDs are not yet present; existing rows are never
    /// touched. Returns the rows actually inserted.
    pub async fn insert_new(&self, batch: Vec<Lead>) -> Vec<Lead> {
        let inserted = {
            let mut entries = self.entries.write().await;
            let mut inserted = Vec::new();
            for lead in batch {
                if entries.contains_key(&lead.id) {
                    continue;
                }
                entries.insert(lead.id.clone(), lead.clone());
                inserted.push(lead);
            }
            inserted
        };
        if !inserted.is_empty() {
            self.persist().await;
        }
        inserted
    }

    /// Leads, optionally restricted to one source, newest first.
    pub async fn list(&self, source_id: Option<&str>) -> Vec<Lead> {
        let entries = self.entries.read().await;
        let mut leads: Vec<Lead> = entries
            .values()
            .filter(|l| source_id.map_or(true, |id| l.source_id == id))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_time.cmp(&a.created_time).then_with(|| a.id.cmp(&b.id)));
        leads
    }

    /// Total stored leads.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for LeadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lead(id: &str, source_id: &str, created: &str, fields: serde_json::Value) -> Lead {
        let fields = match fields {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Lead {
            id: id.to_string(),
            source_id: source_id.to_string(),
            fields,
            created_time: created.to_string(),
            synced_at: crate::now_iso(),
        }
    }

    #[tokio::test]
    async fn insert_new_skips_known_ids() {
        let store = LeadStore::new();
        let batch = vec![
            lead("L1", "src-a", "2024-05-01T10:00:00+0000", json!({"email": "a@x.io"})),
            lead("L2", "src-a", "2024-05-01T11:00:00+0000", json!({"email": "b@x.io"})),
        ];

        let first = store.insert_new(batch.clone()).await;
        assert_eq!(first.len(), 2);

        let second = store.insert_new(batch).await;
        assert!(second.is_empty());
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn list_filters_by_source_and_sorts_newest_first() {
        let store = LeadStore::new();
        store
            .insert_new(vec![
                lead("L1", "src-a", "2024-05-01T10:00:00+0000", json!({})),
                lead("L2", "src-b", "2024-05-02T10:00:00+0000", json!({})),
                lead("L3", "src-a", "2024-05-03T10:00:00+0000", json!({})),
            ])
            .await;

        let all = store.list(None).await;
        assert_eq!(all[0].id, "L3");
        assert_eq!(all[2].id, "L1");

        let only_a: Vec<String> = store
            .list(Some("src-a"))
            .await
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(only_a, vec!["L3", "L1"]);
    }

    #[test]
    fn contact_aliases_fall_through_in_order() {
        let full = lead(
            "L1",
            "src-a",
            "2024-05-01T10:00:00+0000",
            json!({"full_name": "Jane Doe", "name": "ignored", "email": "jane@x.io"}),
        );
        assert_eq!(full.contact_name().as_deref(), Some("Jane Doe"));
        assert_eq!(full.email().as_deref(), Some("jane@x.io"));

        let sparse = lead(
            "L2",
            "src-a",
            "2024-05-01T10:00:00+0000",
            json!({"first_name": "Ana", "whatsapp_number": "+5511999", "full_name": ""}),
        );
        assert_eq!(sparse.contact_name().as_deref(), Some("Ana"));
        assert_eq!(sparse.phone().as_deref(), Some("+5511999"));
        assert_eq!(sparse.email(), None);
    }
}
