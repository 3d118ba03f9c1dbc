//! # Conversation Store
//!
//! Persists the server-side conversation id per agent so a restarted
//! session resumes the same thread. Saves go through a temp file and
//! rename so an interrupted write never corrupts the store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    conversations: HashMap<String, String>,
}

pub struct ConversationStore {
    path: PathBuf,
    data: StoreData,
}

impl ConversationStore {
    /// Open the store, tolerating a missing or unreadable file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self { path, data }
    }

    pub fn get(&self, agent_key: &str) -> Option<&str> {
        self.data.conversations.get(agent_key).map(String::as_str)
    }

    pub fn set(&mut self, agent_key: &str, conversation_id: &str) -> Result<()> {
        let previous = self
            .data
            .conversations
            .insert(agent_key.to_string(), conversation_id.to_string());
        if previous.as_deref() == Some(conversation_id) {
            return Ok(());
        }
        debug!("Conversation for '{}' is now {}", agent_key, conversation_id);
        self.save()
    }

    /// Drop a stored conversation, forcing a fresh thread next turn.
    pub fn reset(&mut self, agent_key: &str) -> Result<()> {
        if self.data.conversations.remove(agent_key).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.json");

        let mut store = ConversationStore::open(&path);
        assert!(store.get("dev").is_none());
        store.set("dev", "conv-1").unwrap();

        let reopened = ConversationStore::open(&path);
        assert_eq!(reopened.get("dev"), Some("conv-1"));
    }

    #[test]
    fn test_reset_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.json");

        let mut store = ConversationStore::open(&path);
        store.set("dev", "conv-1").unwrap();
        store.reset("dev").unwrap();

        let reopened = ConversationStore::open(&path);
        assert!(reopened.get("dev").is_none());
    }

    #[test]
    fn test_corrupt_store_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.json");
        std::fs::write(&path, "not json").unwrap();

        let store = ConversationStore::open(&path);
        assert!(store.get("dev").is_none());
    }

    #[test]
    fn test_no_rewrite_for_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.json");

        let mut store = ConversationStore::open(&path);
        store.set("dev", "conv-1").unwrap();
        let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();
        store.set("dev", "conv-1").unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), mtime);
    }
}
