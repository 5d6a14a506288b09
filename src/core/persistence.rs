//! Saved panel state, keyed by panel id.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::conversation::{Conversation, ConversationStore};
use crate::core::error::StoreError;
use crate::core::ids::{ConversationId, PanelId};
use crate::core::relay::RelaySettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSnapshot {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub active_conversation: Option<ConversationId>,
    #[serde(default)]
    pub selected_model: Option<String>,
    #[serde(default)]
    pub relay: RelaySettings,
}

impl PanelSnapshot {
    pub fn capture(
        conversations: &ConversationStore,
        selected_model: Option<&str>,
        relay: RelaySettings,
    ) -> Self {
        Self {
            conversations: conversations.conversations().to_vec(),
            active_conversation: Some(conversations.active_id().clone()),
            selected_model: selected_model.map(str::to_owned),
            relay,
        }
    }

    pub fn conversation_store(&self) -> ConversationStore {
        ConversationStore::from_parts(
            self.conversations.clone(),
            self.active_conversation.clone(),
        )
    }
}

pub trait PanelStore: Send {
    fn load(&self, panel: &PanelId) -> Result<Option<PanelSnapshot>, StoreError>;
    fn save(&mut self, panel: &PanelId, snapshot: &PanelSnapshot) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: HashMap<PanelId, PanelSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PanelStore for MemoryStore {
    fn load(&self, panel: &PanelId) -> Result<Option<PanelSnapshot>, StoreError> {
        Ok(self.snapshots.get(panel).cloned())
    }

    fn save(&mut self, panel: &PanelId, snapshot: &PanelSnapshot) -> Result<(), StoreError> {
        self.snapshots.insert(panel.clone(), snapshot.clone());
        Ok(())
    }
}

/// One pretty-printed JSON file per panel, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, panel: &PanelId) -> PathBuf {
        self.dir.join(format!("{panel}.json"))
    }
}

impl PanelStore for JsonFileStore {
    fn load(&self, panel: &PanelId) -> Result<Option<PanelSnapshot>, StoreError> {
        let path = self.path_for(panel);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let snapshot =
            serde_json::from_str(&contents).map_err(|source| StoreError::Json { path, source })?;
        Ok(Some(snapshot))
    }

    fn save(&mut self, panel: &PanelId, snapshot: &PanelSnapshot) -> Result<(), StoreError> {
        let path = self.path_for(panel);
        let io_error = |source: std::io::Error| StoreError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_error)?;
        let contents = serde_json::to_string_pretty(snapshot).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        let mut temp_file = NamedTempFile::new_in(&self.dir).map_err(io_error)?;
        temp_file.write_all(contents.as_bytes()).map_err(io_error)?;
        temp_file.as_file_mut().sync_all().map_err(io_error)?;
        temp_file
            .persist(&path)
            .map_err(|err| StoreError::Persist {
                path: path.clone(),
                message: err.error.to_string(),
            })?;
        debug!(%panel, path = %path.display(), "panel snapshot saved");
        Ok(())
    }
}
