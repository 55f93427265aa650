//! 领域数据结构
//!
//! 三种模式、单轮编排计划、对话消息、检索片段、结构化题目与评分报告。
//! Plan 由 Router 每轮新建，allowed_tools 一律以模式策略表覆盖，不由模型决定。

use serde::{Deserialize, Serialize};

/// 对话模式：学习 / 练习 / 考试
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Learn,
    Practice,
    Exam,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Learn => "learn",
            Mode::Practice => "practice",
            Mode::Exam => "exam",
        }
    }

    pub fn parse(s: &str) -> Option<Mode> {
        match s.trim() {
            "learn" => Some(Mode::Learn),
            "practice" => Some(Mode::Practice),
            "exam" => Some(Mode::Exam),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 回答风格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    #[default]
    StepByStep,
    HintFirst,
    Direct,
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Answer,
    Quiz,
    Exam,
    Report,
}

/// 单轮编排计划：是否检索、允许的工具、任务类型、风格、输出格式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default = "default_need_rag")]
    pub need_rag: bool,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub output_format: OutputFormat,
}

fn default_need_rag() -> bool {
    true
}

fn default_task_type() -> String {
    "learn".to_string()
}

impl Plan {
    /// 某模式下的确定性默认计划（Router 解析失败时的兜底）
    pub fn default_for(mode: Mode, allowed_tools: Vec<String>) -> Self {
        Self {
            need_rag: true,
            allowed_tools,
            task_type: mode.as_str().to_string(),
            style: Style::StepByStep,
            output_format: OutputFormat::Answer,
        }
    }
}

/// 检索片段 + 相似度分数（分数越高越相关，仅在单次查询内有效）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub doc_id: String,
    pub page: Option<u32>,
    pub chunk_id: Option<String>,
    pub score: f32,
}

/// 消息角色（与 LLM API 一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 一次工具调用的留痕：工具名、入参、结果 JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolTrace {
    pub tool: String,
    pub args: serde_json::Value,
    pub result: serde_json::Value,
}

/// 对话消息；历史由调用方每轮回放，runner 本身跨轮无状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<RetrievedChunk>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolTrace>>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            citations: None,
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            citations: None,
            tool_calls: None,
        }
    }
}

/// QuizMaster 的结构化出题契约
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub question: String,
    pub standard_answer: String,
    pub rubric: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub concept: Option<String>,
}

fn default_difficulty() -> String {
    "medium".to_string()
}

impl Quiz {
    /// 出题解析失败时的占位题目
    pub fn placeholder(topic: &str, difficulty: &str) -> Self {
        Self {
            question: "生成题目时出错，请换个说法再试一次。".to_string(),
            standard_answer: "N/A".to_string(),
            rubric: "N/A".to_string(),
            difficulty: difficulty.to_string(),
            chapter: Some(topic.to_string()),
            concept: None,
        }
    }
}

/// Grader 的结构化评分报告契约
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeReport {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub mistake_tags: Vec<String>,
    #[serde(default)]
    pub recommended_review: Vec<String>,
}

impl GradeReport {
    /// 解析失败时的零分兜底报告
    pub fn fallback() -> Self {
        Self {
            score: 0.0,
            feedback: "评分解析失败，已保留原始评语。".to_string(),
            mistake_tags: Vec::new(),
            recommended_review: Vec::new(),
        }
    }
}
