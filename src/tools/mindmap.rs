//! 思维导图工具
//!
//! 自带一次检索与一次普通 LLM 调用，产出 Mermaid mindmap 代码。
//! 代码块提取是宽容的：优先 ```mermaid 围栏，其次任意围栏，最后整段文本。

use serde_json::json;

use crate::llm::{GenOptions, WireMessage};
use crate::rag::Retriever;
use crate::tools::registry::{MindMapArgs, ToolContext, ToolResult};

const NAME: &str = "mindmap";
const TOP_K: usize = 5;

const MINDMAP_PROMPT: &str = "你是课程知识整理助手。围绕主题「{topic}」生成一张 Mermaid mindmap 思维导图。

参考资料：
{context}

要求：
1. 只输出一个 ```mermaid 代码块，第一行是 mindmap
2. 根节点为主题本身，层级不超过 3 层
3. 节点文字简短，覆盖资料中的关键概念";

pub async fn run(args: &MindMapArgs, ctx: &ToolContext) -> ToolResult {
    let topic = args
        .topic
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| ctx.user_message.clone());
    if topic.trim().is_empty() {
        return ToolResult::fail(NAME, "缺少导图主题");
    }

    let context = match &ctx.retriever {
        Some(retriever) => match retriever.retrieve(&topic, Some(TOP_K)).await {
            Ok(chunks) if !chunks.is_empty() => Retriever::format_context(&chunks),
            Ok(_) => "（无课程资料）".to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "导图检索失败，继续生成");
                "（无课程资料）".to_string()
            }
        },
        None => "（无课程资料）".to_string(),
    };

    let prompt = MINDMAP_PROMPT
        .replace("{topic}", &topic)
        .replace("{context}", &context);

    let outcome = match ctx
        .llm
        .complete(&[WireMessage::user(prompt)], &GenOptions::default())
        .await
    {
        Ok(o) => o,
        Err(e) => return ToolResult::fail(NAME, format!("导图生成失败: {e}")),
    };

    let code = extract_code_block(&outcome.content);
    if code.trim().is_empty() {
        return ToolResult::fail(NAME, "模型未返回导图内容");
    }
    ToolResult::ok(NAME, json!({"topic": topic, "mermaid": code}))
}

/// 提取围栏代码块；无围栏时原样返回
pub fn extract_code_block(text: &str) -> String {
    for fence in ["```mermaid", "```"] {
        if let Some(start) = text.find(fence) {
            let body = &text[start + fence.len()..];
            if let Some(end) = body.find("```") {
                return body[..end].trim().to_string();
            }
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_mermaid_fence() {
        let text = "说明文字\n```mermaid\nmindmap\n  root((线性代数))\n```\n结尾";
        assert_eq!(
            extract_code_block(text),
            "mindmap\n  root((线性代数))"
        );
    }

    #[test]
    fn falls_back_to_plain_fence_then_raw() {
        let fenced = "```\nmindmap\n  root((秩))\n```";
        assert_eq!(extract_code_block(fenced), "mindmap\n  root((秩))");
        assert_eq!(extract_code_block("  mindmap 裸文本  "), "mindmap 裸文本");
    }
}
