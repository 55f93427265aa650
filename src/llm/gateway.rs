//! 工具循环网关
//!
//! 在单次对话轮内驱动「模型请求工具 → 执行 → 回填结果 → 再次请求」的循环，
//! 封顶 MAX_TOOL_ROUNDS 轮；封顶后强制一次不带工具的收尾请求，保证必有文本
//! 产出。工具结果永不以 Err 形式进入循环，失败以结果负载的形式回给模型。
//!
//! 凡不携带工具定义的文本请求一律走 SSE 流式接口逐 Token 聚合；携带工具的
//! 请求需要读取 tool_calls，只能走非流式接口。

use std::sync::Arc;

use futures_util::{stream, StreamExt};
use serde_json::json;

use crate::error::AgentError;
use crate::llm::traits::{ChatClient, GenOptions, TextStream, WireMessage};
use crate::schema::ToolTrace;
use crate::tools::{schemas_for, ToolContext, ToolExecutor};

/// 单轮对话内工具调用回合上限
pub const MAX_TOOL_ROUNDS: usize = 6;

/// 本地模拟打字的块大小（按 char 计）
pub const CHUNK_CHARS: usize = 6;

pub struct LlmGateway {
    llm: Arc<dyn ChatClient>,
    executor: ToolExecutor,
}

impl LlmGateway {
    pub fn new(llm: Arc<dyn ChatClient>, executor: ToolExecutor) -> Self {
        Self { llm, executor }
    }

    /// 不带工具的文本请求：走流式接口，逐 Token 聚合成完整文本
    async fn streamed_text(
        &self,
        messages: &[WireMessage],
        options: &GenOptions,
    ) -> Result<String, AgentError> {
        let mut stream = self
            .llm
            .complete_stream(messages, options)
            .await
            .map_err(AgentError::Llm)?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk.map_err(AgentError::Llm)?);
        }
        Ok(text)
    }

    /// 带工具循环的完成；返回最终文本与全部工具留痕
    pub async fn chat(
        &self,
        mut messages: Vec<WireMessage>,
        mut options: GenOptions,
        allowed_tools: &[String],
        ctx: &ToolContext,
    ) -> Result<(String, Vec<ToolTrace>), AgentError> {
        options.tools = schemas_for(allowed_tools);
        options.tool_choice_none = false;

        if options.tools.is_empty() {
            let content = self.streamed_text(&messages, &options).await?;
            return Ok((content, vec![]));
        }

        let mut traces: Vec<ToolTrace> = Vec::new();

        for round in 0..MAX_TOOL_ROUNDS {
            let outcome = match self.llm.complete(&messages, &options).await {
                Ok(o) => o,
                Err(e) => {
                    // 工具轮传输失败：退化为一次不带工具的普通完成
                    tracing::warn!(error = %e, round, "工具循环中断，退化为普通完成");
                    let mut plain = options.clone();
                    plain.tools.clear();
                    plain.tool_choice_none = true;
                    let content = self.streamed_text(&messages, &plain).await?;
                    return Ok((content, traces));
                }
            };

            if outcome.tool_calls.is_empty() {
                return Ok((outcome.content, traces));
            }

            let content = (!outcome.content.is_empty()).then(|| outcome.content.clone());
            messages.push(WireMessage::assistant_tool_calls(
                content,
                outcome.tool_calls.clone(),
            ));

            for call in &outcome.tool_calls {
                // 参数格式非法时以空对象执行，让工具自己报参数缺失
                let args = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| json!({}));
                let result = self
                    .executor
                    .execute(&call.function.name, args.clone(), ctx)
                    .await;
                traces.push(ToolTrace {
                    tool: call.function.name.clone(),
                    args,
                    result: result.to_json(),
                });
                messages.push(WireMessage::tool(call.id.clone(), result.render()));
            }
        }

        // 轮数封顶：强制一次不得调用工具的收尾请求
        tracing::warn!(rounds = MAX_TOOL_ROUNDS, "工具调用轮数封顶，强制收尾");
        options.tools.clear();
        options.tool_choice_none = true;
        let content = self.streamed_text(&messages, &options).await?;
        Ok((content, traces))
    }
}

/// 把已收集完整的文本按固定块大小切成流（工具轮之后的模拟打字输出）
pub fn simulate_typing(content: String) -> TextStream {
    let chars: Vec<char> = content.chars().collect();
    let chunks: Vec<Result<String, String>> = chars
        .chunks(CHUNK_CHARS)
        .map(|c| Ok(c.iter().collect()))
        .collect();
    Box::pin(stream::iter(chunks))
}
