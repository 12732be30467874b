//! Per-traveller state files.
//!
//! Directory layout:
//!   {data_dir}/users/{user_id}.json
//!
//! Each file holds exactly the persisted keys of [`TravelState`]. Nothing is
//! saved implicitly; callers persist after each turn.

use super::state::TravelState;
use crate::{ConciergeError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// JSON file store for traveller state
pub struct StateStore {
    users_dir: PathBuf,
}

impl StateStore {
    /// Create a new store. Creates the directory if needed.
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let users_dir = data_dir.join("users");
        fs::create_dir_all(&users_dir).await?;
        Ok(Self { users_dir })
    }

    /// Load a traveller's state, creating and saving the seeded default for
    /// travellers seen for the first time.
    pub async fn load_or_default(&self, user_id: &str) -> Result<TravelState> {
        if let Some(state) = self.load(user_id).await? {
            return Ok(state);
        }
        let state = TravelState::seeded();
        self.save(user_id, &state).await?;
        info!("Created default state for user {}", user_id);
        Ok(state)
    }

    /// Load a previously saved state. Returns None if none exists.
    ///
    /// Missing or malformed sections load as empty collections; a file that
    /// is not JSON at all is an error so it is never silently overwritten.
    pub async fn load(&self, user_id: &str) -> Result<Option<TravelState>> {
        let path = self.user_path(user_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            ConciergeError::Storage(format!("{} is not valid JSON: {}", path.display(), e))
        })?;

        debug!("Loaded state for user {}", user_id);
        Ok(Some(TravelState::from_value(&value)))
    }

    /// Save the persisted part of a traveller's state.
    pub async fn save(&self, user_id: &str, state: &TravelState) -> Result<()> {
        let path = self.user_path(user_id);
        let content = serde_json::to_string_pretty(&state.to_persisted())?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        debug!("Saved state for user {}", user_id);
        Ok(())
    }

    pub fn has_user(&self, user_id: &str) -> bool {
        self.user_path(user_id).exists()
    }

    /// List all saved user IDs.
    pub async fn list_users(&self) -> Result<Vec<String>> {
        let mut users = Vec::new();
        let mut entries = fs::read_dir(&self.users_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(user_id) = name.strip_suffix(".json") {
                    users.push(user_id.to_string());
                }
            }
        }
        users.sort();
        Ok(users)
    }

    /// Delete a user's state file. Returns false if there was none.
    pub async fn delete(&self, user_id: &str) -> Result<bool> {
        let path = self.user_path(user_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).await?;
        info!("Deleted state for user {}", user_id);
        Ok(true)
    }

    fn user_path(&self, user_id: &str) -> PathBuf {
        // Sanitize user_id for use as filename
        let safe_id: String = user_id
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.users_dir.join(format!("{}.json", safe_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_user_path_is_sanitized() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path()).await.unwrap();
        let path = store.user_path("../evil user");
        assert_eq!(path.file_name().unwrap(), "___evil_user.json");
        assert!(path.starts_with(dir.path().join("users")));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path()).await.unwrap();
        fs::write(store.user_path("bob"), "{ not json").await.unwrap();
        assert!(matches!(
            store.load("bob").await,
            Err(ConciergeError::Storage(_))
        ));
    }
}
