//! 工具注册与执行
//!
//! 工具集合是封闭枚举：新增工具必须加变体、参数类型与分发分支，编译器保证
//! 三处同步。执行结果永远是 ToolResult（success 标志 + 负载），失败不以 Err
//! 穿出，让模型能看到错误信息并自行调整。每次调用输出 JSON 审计日志。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::config::ToolsSection;
use crate::llm::ChatClient;
use crate::memory::MemoryManager;
use crate::rag::Retriever;
use crate::tools::{calculator, filewriter, memory_search, mindmap, websearch};

/// 封闭的工具集合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Calculator,
    WebSearch,
    FileWriter,
    MemorySearch,
    MindMap,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Calculator => "calculator",
            ToolKind::WebSearch => "websearch",
            ToolKind::FileWriter => "filewriter",
            ToolKind::MemorySearch => "memory_search",
            ToolKind::MindMap => "mindmap",
        }
    }

    pub fn from_name(name: &str) -> Option<ToolKind> {
        match name {
            "calculator" => Some(ToolKind::Calculator),
            "websearch" => Some(ToolKind::WebSearch),
            "filewriter" => Some(ToolKind::FileWriter),
            "memory_search" => Some(ToolKind::MemorySearch),
            "mindmap" => Some(ToolKind::MindMap),
            _ => None,
        }
    }

    /// OpenAI function 格式的工具定义
    pub fn schema(&self) -> Value {
        match self {
            ToolKind::Calculator => json!({
                "type": "function",
                "function": {
                    "name": "calculator",
                    "description": "计算数学表达式，支持四则运算、幂、取余与常用函数（sin/cos/sqrt/log 等）",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "expression": {"type": "string", "description": "要计算的数学表达式，如 sqrt(16) + 2^3"}
                        },
                        "required": ["expression"]
                    }
                }
            }),
            ToolKind::WebSearch => json!({
                "type": "function",
                "function": {
                    "name": "websearch",
                    "description": "联网搜索最新资料，返回标题、摘要与链接",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "query": {"type": "string", "description": "搜索关键词"}
                        },
                        "required": ["query"]
                    }
                }
            }),
            ToolKind::FileWriter => json!({
                "type": "function",
                "function": {
                    "name": "filewriter",
                    "description": "把笔记或总结写入当前课程的笔记目录",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "filename": {"type": "string", "description": "文件名（不含目录）"},
                            "content": {"type": "string", "description": "要写入的内容"},
                            "mode": {"type": "string", "enum": ["write", "append"], "description": "写入模式，默认覆盖写"}
                        },
                        "required": ["filename", "content"]
                    }
                }
            }),
            ToolKind::MemorySearch => json!({
                "type": "function",
                "function": {
                    "name": "memory_search",
                    "description": "检索学生的历史学习记录（问答、错题、练习、考试）",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "query": {"type": "string", "description": "检索关键词"},
                            "course_name": {"type": "string", "description": "限定课程，默认当前课程"},
                            "event_types": {
                                "type": "array",
                                "items": {"type": "string", "enum": ["qa", "mistake", "practice", "exam"]},
                                "description": "限定记录类型"
                            }
                        },
                        "required": ["query"]
                    }
                }
            }),
            ToolKind::MindMap => json!({
                "type": "function",
                "function": {
                    "name": "mindmap",
                    "description": "围绕某个主题生成 Mermaid 思维导图",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "topic": {"type": "string", "description": "导图主题，缺省取当前问题"}
                        }
                    }
                }
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CalculatorArgs {
    pub expression: String,
}

#[derive(Debug, Deserialize)]
pub struct WebSearchArgs {
    pub query: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Write,
    Append,
}

#[derive(Debug, Deserialize)]
pub struct FileWriterArgs {
    pub filename: String,
    pub content: String,
    #[serde(default)]
    pub mode: WriteMode,
}

#[derive(Debug, Deserialize)]
pub struct MemorySearchArgs {
    pub query: String,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct MindMapArgs {
    #[serde(default)]
    pub topic: Option<String>,
}

/// 工具执行结果；success=false 时 payload 携带 error 字段
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool: String,
    pub success: bool,
    pub payload: Value,
}

impl ToolResult {
    pub fn ok(tool: &str, payload: Value) -> Self {
        Self {
            tool: tool.to_string(),
            success: true,
            payload,
        }
    }

    pub fn fail(tool: &str, error: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            success: false,
            payload: json!({"error": error.into()}),
        }
    }

    /// 平铺为单个 JSON 对象（tool / success + 负载字段）
    pub fn to_json(&self) -> Value {
        let mut obj = json!({
            "tool": self.tool,
            "success": self.success,
        });
        if let (Some(map), Some(extra)) = (obj.as_object_mut(), self.payload.as_object()) {
            for (k, v) in extra {
                map.insert(k.clone(), v.clone());
            }
        }
        obj
    }

    /// 回填给模型的字符串形式
    pub fn render(&self) -> String {
        self.to_json().to_string()
    }
}

/// 单次请求的工具执行上下文；不持有可变共享状态，每轮对话新建
#[derive(Clone)]
pub struct ToolContext {
    pub course: String,
    pub notes_dir: PathBuf,
    pub user_message: String,
    pub memory: Arc<MemoryManager>,
    pub retriever: Option<Arc<Retriever>>,
    pub llm: Arc<dyn ChatClient>,
    pub http: reqwest::Client,
    pub tools_cfg: ToolsSection,
}

/// 工具执行器：统一超时 + 审计日志
pub struct ToolExecutor {
    timeout: Duration,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new(ToolsSection::default().tool_timeout())
    }
}

impl ToolExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn execute(&self, tool_name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let result = match ToolKind::from_name(tool_name) {
            None => ToolResult::fail(tool_name, format!("未知工具: {tool_name}")),
            Some(kind) => match timeout(self.timeout, dispatch(kind, args, ctx)).await {
                Ok(result) => result,
                Err(_) => ToolResult::fail(tool_name, "工具执行超时"),
            },
        };

        let audit = json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.success,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }
}

async fn dispatch(kind: ToolKind, args: Value, ctx: &ToolContext) -> ToolResult {
    let name = kind.name();
    match kind {
        ToolKind::Calculator => match serde_json::from_value::<CalculatorArgs>(args) {
            Ok(args) => calculator::run(&args),
            Err(e) => ToolResult::fail(name, format!("参数无效: {e}")),
        },
        ToolKind::WebSearch => match serde_json::from_value::<WebSearchArgs>(args) {
            Ok(args) => websearch::run(&args, ctx).await,
            Err(e) => ToolResult::fail(name, format!("参数无效: {e}")),
        },
        ToolKind::FileWriter => match serde_json::from_value::<FileWriterArgs>(args) {
            Ok(args) => filewriter::run(&args, ctx),
            Err(e) => ToolResult::fail(name, format!("参数无效: {e}")),
        },
        ToolKind::MemorySearch => match serde_json::from_value::<MemorySearchArgs>(args) {
            Ok(args) => memory_search::run(&args, ctx),
            Err(e) => ToolResult::fail(name, format!("参数无效: {e}")),
        },
        ToolKind::MindMap => match serde_json::from_value::<MindMapArgs>(args) {
            Ok(args) => mindmap::run(&args, ctx).await,
            Err(e) => ToolResult::fail(name, format!("参数无效: {e}")),
        },
    }
}

/// 按允许清单取工具定义；未知名字忽略
pub fn schemas_for(allowed: &[String]) -> Vec<Value> {
    allowed
        .iter()
        .filter_map(|n| ToolKind::from_name(n))
        .map(|k| k.schema())
        .collect()
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in [
            ToolKind::Calculator,
            ToolKind::WebSearch,
            ToolKind::FileWriter,
            ToolKind::MemorySearch,
            ToolKind::MindMap,
        ] {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("time_travel"), None);
    }

    #[test]
    fn schemas_filter_unknown_names() {
        let schemas = schemas_for(&[
            "calculator".to_string(),
            "不存在".to_string(),
            "websearch".to_string(),
        ]);
        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas[0]["function"]["name"], "calculator");
    }

    #[test]
    fn result_json_is_flat() {
        let r = ToolResult::ok("calculator", json!({"result": 4.0}));
        let v = r.to_json();
        assert_eq!(v["tool"], "calculator");
        assert_eq!(v["success"], true);
        assert_eq!(v["result"], 4.0);

        let f = ToolResult::fail("calculator", "除零");
        assert_eq!(f.to_json()["error"], "除零");
    }
}
