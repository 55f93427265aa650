//! 检索增强：文档解析、切块、向量索引与上下文拼装

pub mod chunk;
pub mod ingest;
pub mod retrieve;
pub mod store;

pub use chunk::{chunk_pages, simple_chunk, ChunkRecord, PageText};
pub use ingest::{build_index, collect_pages, parse_document};
pub use retrieve::Retriever;
pub use store::VectorStore;
