pub mod atomic;
pub mod chat;
pub mod config;
pub mod directory;
pub mod error;
pub mod store;

// Re-export commonly used types
pub use chat::{ChatId, ChatIndexEntry, ChatRecord, Message, Role, DEFAULT_CHAT_TITLE};
pub use config::{Config, ConfigStore};
pub use directory::{default_chatd_dir, ChatdDirectory};
pub use error::{Result, StoreError};
pub use store::{ChatStore, RepairReport};
