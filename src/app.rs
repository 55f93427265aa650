//! 应用上下文
//!
//! 所有组件显式装配在 AppContext 里，没有全局单例；测试通过
//! with_components 注入 Mock 客户端与确定性嵌入。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::AgentError;
use crate::llm::{ChatClient, EmbeddingProvider, OpenAiClient, OpenAiEmbedder};
use crate::memory::MemoryManager;
use crate::orchestration::OrchestrationRunner;
use crate::workspace::WorkspaceRegistry;

pub struct AppContext {
    pub config: AppConfig,
    pub workspaces: Arc<WorkspaceRegistry>,
    pub memory: Arc<MemoryManager>,
    pub runner: Arc<OrchestrationRunner>,
}

impl AppContext {
    /// 生产装配：真实 LLM 与嵌入后端
    pub fn bootstrap(config: AppConfig) -> Result<Self, AgentError> {
        let llm: Arc<dyn ChatClient> = Arc::new(OpenAiClient::new(
            config.llm.base_url.as_deref(),
            &config.llm.model,
            None,
            config.llm.request_timeout(),
        ));
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbedder::new(
            config.embedding.base_url.as_deref(),
            &config.embedding.model,
            &config.embedding.query_instruction,
            None,
        ));
        Self::with_components(config, llm, embedder)
    }

    /// 测试与演示装配：注入任意 ChatClient / EmbeddingProvider
    pub fn with_components(
        config: AppConfig,
        llm: Arc<dyn ChatClient>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, AgentError> {
        let workspaces = Arc::new(WorkspaceRegistry::new(config.app.workspace_root.clone())?);
        let memory = Arc::new(MemoryManager::new(
            config.memory.db_path.clone(),
            &config.app.user_id,
        )?);
        let runner = Arc::new(OrchestrationRunner::new(
            config.clone(),
            workspaces.clone(),
            llm,
            embedder,
            memory.clone(),
        ));
        Ok(Self {
            config,
            workspaces,
            memory,
            runner,
        })
    }
}
