//! Agent 错误类型
//!
//! 可本地降级的失败（工具执行失败、记忆写入失败、结构化输出解析失败）不会以
//! Err 形式穿出主回答路径；这里的变体对应确实需要上抛给边界层的错误。

use thiserror::Error;

/// 运行过程中可能出现的错误（LLM、解析、工具、持久化、路径校验等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Memory store error: {0}")]
    Memory(#[from] rusqlite::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// 课程名含路径穿越序列或非法字符
    #[error("Invalid workspace name: {0}")]
    InvalidWorkspaceName(String),

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    /// 索引文件缺失或损坏；上层据此提示「未索引」，绝不伪造检索结果
    #[error("No index for course: {0}")]
    NoIndex(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
