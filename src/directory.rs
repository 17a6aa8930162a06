use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::chat::ChatId;
use crate::error::Result;

/// Standard storage directory name under the user's home.
pub const CHATD_DIR: &str = ".chatd";

/// Configuration file name.
pub const CONFIG_FILE: &str = "config.json";

/// Chats subdirectory name.
pub const CHATS_DIR: &str = "chats";

/// Chat index file name, kept inside the chats subdirectory.
pub const INDEX_FILE: &str = "index.json";

/// Represents the chatd storage root and its layout.
#[derive(Debug, Clone)]
pub struct ChatdDirectory {
    /// Root path of the storage directory
    pub root: PathBuf,

    /// Path to config.json
    pub config_file: PathBuf,

    /// Path to the chats/ subdirectory
    pub chats_dir: PathBuf,

    /// Path to chats/index.json
    pub index_file: PathBuf,
}

impl ChatdDirectory {
    /// Create a new ChatdDirectory from a root path.
    pub fn new(root: PathBuf) -> Self {
        let config_file = root.join(CONFIG_FILE);
        let chats_dir = root.join(CHATS_DIR);
        let index_file = chats_dir.join(INDEX_FILE);

        Self {
            root,
            config_file,
            chats_dir,
            index_file,
        }
    }

    /// Check if this directory exists on disk.
    pub fn exists(&self) -> bool {
        self.root.exists() && self.root.is_dir()
    }

    /// Create the directory structure.
    pub fn create(&self) -> Result<()> {
        info!(
            "Creating chatd directory structure at: {}",
            self.root.display()
        );

        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(&self.chats_dir)?;

        debug!("Created chatd directory structure successfully");
        Ok(())
    }

    /// Get the path to a chat transcript file.
    pub fn chat_file(&self, id: &ChatId) -> PathBuf {
        self.chats_dir.join(format!("{}.json", id))
    }

    /// List the ids of transcript files currently on disk, sorted for
    /// deterministic iteration. The index file itself is skipped.
    pub fn list_chat_files(&self) -> Result<Vec<ChatId>> {
        if !self.chats_dir.exists() {
            return Ok(vec![]);
        }

        let mut ids = Vec::new();

        for entry in fs::read_dir(&self.chats_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path == self.index_file {
                continue;
            }

            if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(ChatId::from(stem));
                }
            }
        }

        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }
}

/// Get the default storage directory (~/.chatd).
pub fn default_chatd_dir() -> Option<ChatdDirectory> {
    let home_dir = dirs::home_dir()?;
    Some(ChatdDirectory::new(home_dir.join(CHATD_DIR)))
}
