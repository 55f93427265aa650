//! 情景记忆与用户画像：SQLite 持久化 + 中文分词检索

pub mod manager;
pub mod store;
pub mod tokenizer;

pub use manager::MemoryManager;
pub use store::{Episode, MemoryStore, UserProfile};
