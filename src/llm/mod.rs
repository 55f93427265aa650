//! LLM 层：聊天客户端抽象与实现（OpenAI 兼容 / Mock）、嵌入、工具循环网关

pub mod embedding;
pub mod gateway;
pub mod mock;
pub mod openai;
pub mod traits;

pub use embedding::{EmbeddingProvider, HashEmbedder, OpenAiEmbedder};
pub use gateway::{LlmGateway, MAX_TOOL_ROUNDS};
pub use mock::MockChatClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{
    ChatClient, ChatOutcome, GenOptions, TextStream, ToolCallFunction, ToolCallRequest,
    WireMessage, WireRole,
};
