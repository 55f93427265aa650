//! 聊天客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 ChatClient：complete（非流式，可携带工具
//! 定义并返回工具调用请求）、complete_stream（流式 Token）。线上消息结构与
//! OpenAI chat/completions 的 JSON 一一对应，含 tool 角色与 tool_calls 字段。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 线上角色（与 API 字面量一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
    Tool,
}

/// 模型发起的一次工具调用（arguments 是 JSON 字符串，按 API 原样保留）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    pub arguments: String,
}

/// 一条线上消息；assistant 的工具调用轮 content 可为空
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::System,
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Assistant,
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// 模型的工具调用轮，原样回放（保留 call id，content 可能为空）
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: WireRole::Assistant,
            content,
            tool_call_id: None,
            tool_calls: Some(calls),
        }
    }

    /// 工具执行结果，以 call id 关联回请求
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Tool,
            content: Some(content.into()),
            tool_call_id: Some(call_id.into()),
            tool_calls: None,
        }
    }
}

/// 单次请求的生成参数
#[derive(Debug, Clone, Default)]
pub struct GenOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// OpenAI function 格式的工具定义；为空则不附带 tools 字段
    pub tools: Vec<Value>,
    /// 强制本轮不得调用工具（轮数封顶后的收尾请求）
    pub tool_choice_none: bool,
}

/// 一次完成的产出：文本与（可能为空的）工具调用请求
#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, String>> + Send>>;

/// 聊天客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[WireMessage],
        options: &GenOptions,
    ) -> Result<ChatOutcome, String>;

    async fn complete_stream(
        &self,
        messages: &[WireMessage],
        options: &GenOptions,
    ) -> Result<TextStream, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
