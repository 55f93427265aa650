//! 配置加载
//!
//! TOML 文件 + 环境变量覆盖（前缀 XUEBAN，双下划线分隔嵌套键），
//! 例如 `XUEBAN__LLM__MODEL=gpt-4o-mini`。未提供配置文件时全部取默认值。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AgentError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub rag: RagSection,
    pub tools: ToolsSection,
    pub memory: MemorySection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            embedding: EmbeddingSection::default(),
            rag: RagSection::default(),
            tools: ToolsSection::default(),
            memory: MemorySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 所有课程工作区的根目录
    pub workspace_root: PathBuf,
    /// 学习 / 练习模式构造提示词时回放的历史条数上限
    pub history_window: usize,
    /// 考试模式的历史窗口（整张试卷加多题作答需要更长上下文）
    pub exam_history_window: usize,
    pub user_id: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "xueban".to_string(),
            workspace_root: PathBuf::from("./data/workspaces"),
            history_window: 20,
            exam_history_window: 30,
            user_id: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// OpenAI 兼容端点，含版本路径，如 https://api.deepseek.com/v1
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            request_timeout_secs: 60,
        }
    }
}

impl LlmSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub base_url: Option<String>,
    pub model: String,
    /// BGE 系列模型要求的查询前缀；文档向量不加
    pub query_instruction: String,
    /// 本地推理后端的设备选择，远端 API 下忽略
    pub device: String,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "BAAI/bge-small-zh-v1.5".to_string(),
            query_instruction: "为这个句子生成表示以用于检索相关文章：".to_string(),
            device: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagSection {
    /// 切块窗口（字符数，按 char 计，中文安全）
    pub chunk_size: usize,
    /// 相邻块重叠，大于等于 chunk_size 时取 chunk_size/2
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// 考试出卷需要覆盖更多章节
    pub exam_top_k: usize,
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            top_k: 3,
            exam_top_k: 12,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
    pub search_timeout_secs: u64,
    pub max_search_results: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            search_timeout_secs: 10,
            max_search_results: 5,
        }
    }
}

impl ToolsSection {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub db_path: PathBuf,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/memory/memory.db"),
        }
    }
}

/// 加载配置：显式路径 > ./config/default.toml > 纯默认值，最后叠加环境变量
pub fn load_config(path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    let file = path.or_else(|| {
        let default = PathBuf::from("config/default.toml");
        default.exists().then_some(default)
    });
    if let Some(file) = file {
        builder = builder.add_source(config::File::from(file));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("XUEBAN")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .map_err(|e| AgentError::Config(e.to_string()))?;
    cfg.try_deserialize()
        .map_err(|e| AgentError::Config(e.to_string()))
}
