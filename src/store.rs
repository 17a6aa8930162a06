use std::collections::HashSet;
use std::fs;
use std::io;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::chat::{ChatId, ChatIndexEntry, ChatRecord};
use crate::directory::ChatdDirectory;
use crate::error::{Result, StoreError};

/// Outcome of an index repair pass.
#[derive(Debug, Default)]
pub struct RepairReport {
    /// Entries dropped because no transcript file backs them.
    pub dropped: Vec<ChatIndexEntry>,
    /// Entries added for transcript files the index did not know about.
    pub added: Vec<ChatIndexEntry>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty() && self.added.is_empty()
    }
}

/// Orchestrates chat transcripts and the chat index.
///
/// The index is the authoritative list for display; the set of transcript
/// files is the authoritative source of existence. Every mutation keeps the
/// two in step, and `repair_index` reconciles them after a crash. All writes
/// go through one lock and land via atomic temp-file-then-rename, so a
/// partially-written file is never observable.
pub struct ChatStore {
    dir: ChatdDirectory,
    write_lock: Mutex<()>,
}

impl ChatStore {
    /// Create a store over the given storage directory.
    pub fn new(dir: ChatdDirectory) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a new empty chat and register it in the index.
    ///
    /// The transcript file is written before the index entry, so a crash in
    /// between leaves an untracked file (which `repair_index` re-adds), never
    /// an index entry pointing at nothing.
    pub fn create_chat(&self, initial_system_prompt: &str) -> Result<ChatRecord> {
        let _guard = self.lock_writes();

        if !self.dir.exists() {
            self.dir.create()?;
        }

        let record = ChatRecord::new(ChatId::new(), initial_system_prompt);

        self.write_record(&record)?;

        let mut index = self.load_index()?;
        index.push(record.index_entry());
        self.save_index(&index)?;

        info!("Created chat {}", record.id);
        Ok(record)
    }

    /// Load the transcript for `id`.
    ///
    /// A missing file is `ChatNotFound` regardless of what the index claims;
    /// the mismatch is left for `repair_index` rather than treated as fatal.
    pub fn load_chat(&self, id: &ChatId) -> Result<ChatRecord> {
        let path = self.dir.chat_file(id);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No transcript file for chat {}", id);
                return Err(StoreError::ChatNotFound(id.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let record: ChatRecord =
            serde_json::from_str(&content).map_err(|source| StoreError::CorruptChatFile {
                id: id.clone(),
                source,
            })?;

        debug!(
            "Loaded chat {} ({} messages)",
            record.id,
            record.messages.len()
        );
        Ok(record)
    }

    /// Overwrite the transcript for `record.id`, syncing the index title if
    /// it changed.
    pub fn save_chat(&self, record: &ChatRecord) -> Result<()> {
        let _guard = self.lock_writes();

        self.write_record(record)?;

        let mut index = self.load_index()?;
        match index.iter_mut().find(|entry| entry.id == record.id) {
            Some(entry) if entry.title != record.title => {
                entry.title = record.title.clone();
                self.save_index(&index)?;
            }
            Some(_) => {}
            None => {
                warn!(
                    "Chat {} had no index entry on save, re-adding it",
                    record.id
                );
                index.push(record.index_entry());
                self.save_index(&index)?;
            }
        }

        debug!("Saved chat {}", record.id);
        Ok(())
    }

    /// Retitle a chat, keeping transcript and index in step.
    pub fn rename_chat(&self, id: &ChatId, title: &str) -> Result<()> {
        let mut record = self.load_chat(id)?;
        record.set_title(title);
        self.save_chat(&record)?;

        info!("Renamed chat {} to '{}'", id, title);
        Ok(())
    }

    /// Delete a chat. Idempotent: deleting an id with no transcript and no
    /// index entry succeeds without complaint.
    ///
    /// The transcript goes first, the index second. A crash in between leaves
    /// a dangling index entry, a detectable inconsistency `repair_index`
    /// drops, rather than an orphaned file the index no longer tracks.
    pub fn delete_chat(&self, id: &ChatId) -> Result<()> {
        let _guard = self.lock_writes();

        let path = self.dir.chat_file(id);
        match fs::remove_file(&path) {
            Ok(()) => info!("Deleted transcript for chat {}", id),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Transcript for chat {} already absent", id);
            }
            Err(e) => return Err(e.into()),
        }

        let mut index = self.load_index()?;
        let before = index.len();
        index.retain(|entry| &entry.id != id);
        if index.len() != before {
            self.save_index(&index)?;
            info!("Removed chat {} from index", id);
        }

        Ok(())
    }

    /// Current index contents, without touching any transcript file.
    pub fn list_chats(&self) -> Result<Vec<ChatIndexEntry>> {
        if !self.dir.index_file.exists() {
            let _guard = self.lock_writes();
            if !self.dir.index_file.exists() {
                debug!(
                    "No index file at {}, creating empty index",
                    self.dir.index_file.display()
                );
                self.save_index(&[])?;
            }
        }

        self.load_index()
    }

    /// Reconcile the index with the transcript files on disk.
    ///
    /// Entries without a backing file are dropped; files without an entry are
    /// appended, recovering the title from the transcript where it parses and
    /// deriving a placeholder where it does not (the chat stays listed so the
    /// damage is visible instead of silently vanishing).
    pub fn repair_index(&self) -> Result<RepairReport> {
        let _guard = self.lock_writes();

        let files = self.dir.list_chat_files()?;
        let on_disk: HashSet<&ChatId> = files.iter().collect();

        let index = match self.load_index() {
            Ok(index) => index,
            Err(StoreError::CorruptIndex { path, source }) => {
                warn!(
                    "Index {} is corrupt ({}), rebuilding from transcript files",
                    path.display(),
                    source
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut report = RepairReport::default();
        let mut repaired = Vec::with_capacity(index.len());
        let mut seen: HashSet<ChatId> = HashSet::new();

        for entry in index {
            if on_disk.contains(&entry.id) {
                seen.insert(entry.id.clone());
                repaired.push(entry);
            } else {
                warn!(
                    "Index entry '{}' ({}) has no transcript file, dropping it",
                    entry.title, entry.id
                );
                report.dropped.push(entry);
            }
        }

        for id in files {
            if seen.contains(&id) {
                continue;
            }

            let title = match self.load_chat(&id) {
                Ok(record) => record.title,
                Err(StoreError::CorruptChatFile { id, source }) => {
                    warn!("Transcript for chat {} is corrupt: {}", id, source);
                    placeholder_title(&id)
                }
                Err(e) => return Err(e),
            };

            warn!("Transcript {} missing from index, adding '{}'", id, title);
            let entry = ChatIndexEntry { id, title };
            report.added.push(entry.clone());
            repaired.push(entry);
        }

        if report.is_clean() {
            debug!("Index is consistent, nothing to repair");
        } else {
            self.save_index(&repaired)?;
            info!(
                "Repaired index: dropped {} entries, added {}",
                report.dropped.len(),
                report.added.len()
            );
        }

        Ok(report)
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_record(&self, record: &ChatRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record).map_err(io::Error::from)?;
        write_atomic(&self.dir.chat_file(&record.id), &content)
    }

    fn load_index(&self) -> Result<Vec<ChatIndexEntry>> {
        if !self.dir.index_file.exists() {
            return Ok(vec![]);
        }

        let content = fs::read_to_string(&self.dir.index_file)?;

        serde_json::from_str(&content).map_err(|source| StoreError::CorruptIndex {
            path: self.dir.index_file.clone(),
            source,
        })
    }

    fn save_index(&self, entries: &[ChatIndexEntry]) -> Result<()> {
        let content = serde_json::to_string_pretty(entries).map_err(io::Error::from)?;
        write_atomic(&self.dir.index_file, &content)
    }
}

/// Stand-in title for a transcript whose own title cannot be read.
fn placeholder_title(id: &ChatId) -> String {
    let short = id.as_str().get(..8).unwrap_or(id.as_str());
    format!("Recovered chat {}", short)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Message, DEFAULT_CHAT_TITLE};
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> ChatStore {
        ChatStore::new(ChatdDirectory::new(temp_dir.path().join(".chatd")))
    }

    #[test]
    fn test_create_chat_is_listed_and_loadable() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let record = store.create_chat("You are a helpful assistant.").unwrap();
        assert_eq!(record.title, DEFAULT_CHAT_TITLE);
        assert!(record.messages.is_empty());

        let chats = store.list_chats().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, record.id);
        assert_eq!(chats[0].title, DEFAULT_CHAT_TITLE);

        assert_eq!(store.load_chat(&record.id).unwrap(), record);
    }

    #[test]
    fn test_append_save_load_preserves_message_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let mut record = store.create_chat("prompt").unwrap();
        record.push_message(Message::user("hi"));
        record.push_message(Message::assistant("hello"));
        store.save_chat(&record).unwrap();

        let loaded = store.load_chat(&record.id).unwrap();
        assert_eq!(
            loaded.messages,
            vec![Message::user("hi"), Message::assistant("hello")]
        );
    }

    #[test]
    fn test_delete_first_of_two_leaves_second() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let first = store.create_chat("").unwrap();
        let second = store.create_chat("").unwrap();

        store.delete_chat(&first.id).unwrap();

        let chats = store.list_chats().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, second.id);

        assert!(store.load_chat(&first.id).unwrap_err().is_not_found());
        assert!(store.load_chat(&second.id).is_ok());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let record = store.create_chat("").unwrap();
        store.delete_chat(&record.id).unwrap();
        store.delete_chat(&record.id).unwrap();

        assert!(store.list_chats().unwrap().is_empty());

        // Deleting an id that never existed is also fine.
        store.delete_chat(&ChatId::new()).unwrap();
    }

    #[test]
    fn test_rapid_creation_yields_distinct_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let ids: HashSet<ChatId> = (0..20)
            .map(|_| store.create_chat("").unwrap().id)
            .collect();

        assert_eq!(ids.len(), 20);
        assert_eq!(store.list_chats().unwrap().len(), 20);
    }

    #[test]
    fn test_load_missing_chat_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let err = store.load_chat(&ChatId::new()).unwrap_err();
        assert!(matches!(err, StoreError::ChatNotFound(_)));
    }

    #[test]
    fn test_corrupt_transcript_is_reported_not_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let record = store.create_chat("").unwrap();
        let path = store.dir.chat_file(&record.id);
        fs::write(&path, "{truncated").unwrap();

        let err = store.load_chat(&record.id).unwrap_err();
        assert!(matches!(err, StoreError::CorruptChatFile { .. }));

        // The damaged file stays on disk for inspection.
        assert_eq!(fs::read_to_string(&path).unwrap(), "{truncated");
    }

    #[test]
    fn test_title_change_updates_index() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let mut record = store.create_chat("").unwrap();
        record.set_title("Jokes Chat");
        store.save_chat(&record).unwrap();

        let chats = store.list_chats().unwrap();
        assert_eq!(chats[0].title, "Jokes Chat");
    }

    #[test]
    fn test_rename_chat_updates_transcript_and_index() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let record = store.create_chat("").unwrap();
        store.rename_chat(&record.id, "First Chat").unwrap();

        assert_eq!(store.load_chat(&record.id).unwrap().title, "First Chat");
        assert_eq!(store.list_chats().unwrap()[0].title, "First Chat");
    }

    #[test]
    fn test_save_readds_missing_index_entry() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let record = store.create_chat("").unwrap();
        store.save_index(&[]).unwrap();

        store.save_chat(&record).unwrap();

        let chats = store.list_chats().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, record.id);
    }

    #[test]
    fn test_repair_drops_dangling_entry() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let keep = store.create_chat("").unwrap();
        let gone = store.create_chat("").unwrap();

        // Simulate a crash after the transcript delete but before the index
        // update.
        fs::remove_file(store.dir.chat_file(&gone.id)).unwrap();

        let report = store.repair_index().unwrap();
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].id, gone.id);
        assert!(report.added.is_empty());

        let chats = store.list_chats().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, keep.id);
    }

    #[test]
    fn test_repair_adds_orphan_transcript() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let mut orphan = store.create_chat("").unwrap();
        orphan.set_title("First Chat");
        store.save_chat(&orphan).unwrap();

        // Simulate a crash after the transcript write but before the index
        // update.
        store.save_index(&[]).unwrap();

        let report = store.repair_index().unwrap();
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.added[0].id, orphan.id);
        assert_eq!(report.added[0].title, "First Chat");

        assert_eq!(store.list_chats().unwrap().len(), 1);
    }

    #[test]
    fn test_repair_keeps_corrupt_orphan_visible() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.create_chat("").unwrap();

        let bad_id = ChatId::new();
        fs::write(store.dir.chat_file(&bad_id), "{not a record").unwrap();

        let report = store.repair_index().unwrap();
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.added[0].id, bad_id);
        assert!(report.added[0].title.starts_with("Recovered chat"));

        assert_eq!(store.list_chats().unwrap().len(), 2);
    }

    #[test]
    fn test_repair_on_consistent_store_is_clean() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.create_chat("").unwrap();
        store.create_chat("").unwrap();

        let report = store.repair_index().unwrap();
        assert!(report.is_clean());
        assert_eq!(store.list_chats().unwrap().len(), 2);
    }

    #[test]
    fn test_repair_rebuilds_corrupt_index() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let mut record = store.create_chat("").unwrap();
        record.set_title("Survivor");
        store.save_chat(&record).unwrap();

        fs::write(&store.dir.index_file, "not an array").unwrap();
        assert!(matches!(
            store.list_chats().unwrap_err(),
            StoreError::CorruptIndex { .. }
        ));

        let report = store.repair_index().unwrap();
        assert_eq!(report.added.len(), 1);

        let chats = store.list_chats().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].title, "Survivor");
    }

    #[test]
    fn test_interrupted_write_never_corrupts_committed_version() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let mut record = store.create_chat("").unwrap();
        record.push_message(Message::user("hi"));
        store.save_chat(&record).unwrap();

        // Simulate a save interrupted mid-write: a truncated temp file next
        // to the committed transcript and index.
        let chat_path = store.dir.chat_file(&record.id);
        let tmp_name = format!(
            ".{}.tmp",
            chat_path.file_name().unwrap().to_string_lossy()
        );
        fs::write(store.dir.chats_dir.join(tmp_name), r#"{"id": "#).unwrap();
        fs::write(store.dir.chats_dir.join(".index.json.tmp"), "[").unwrap();

        let loaded = store.load_chat(&record.id).unwrap();
        assert_eq!(loaded.messages, vec![Message::user("hi")]);
        assert_eq!(store.list_chats().unwrap().len(), 1);

        // Repair ignores temp files too.
        assert!(store.repair_index().unwrap().is_clean());
    }

    #[test]
    fn test_list_chats_materializes_empty_index() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        assert!(store.list_chats().unwrap().is_empty());
        assert!(store.dir.index_file.exists());
    }

    #[test]
    fn test_index_preserves_creation_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let first = store.create_chat("").unwrap();
        let second = store.create_chat("").unwrap();
        let third = store.create_chat("").unwrap();

        let ids: Vec<ChatId> = store
            .list_chats()
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }
}
