//! Mock 聊天客户端：测试与离线演示用
//!
//! 按脚本顺序出队回复；always_tool 模式下只要请求携带工具定义且未被禁用，
//! 就固定返回一次工具调用，用于验证工具循环的轮数封顶。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::traits::{
    ChatClient, ChatOutcome, GenOptions, TextStream, ToolCallFunction, ToolCallRequest,
    WireMessage, WireRole,
};

pub struct MockChatClient {
    script: Mutex<VecDeque<ChatOutcome>>,
    /// Some((工具名, 参数 JSON 字符串)) 时每轮都请求该工具
    always_tool: Option<(String, String)>,
    /// true 时携带工具定义的请求一律返回传输错误
    fail_tool_rounds: bool,
    /// 每次 complete 收到的最后一条 user 消息，按调用顺序留存
    user_prompts: Mutex<Vec<String>>,
    pub completions: AtomicUsize,
    pub stream_completions: AtomicUsize,
}

impl MockChatClient {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            script: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| ChatOutcome {
                        content: r.to_string(),
                        tool_calls: vec![],
                    })
                    .collect(),
            ),
            always_tool: None,
            fail_tool_rounds: false,
            user_prompts: Mutex::new(Vec::new()),
            completions: AtomicUsize::new(0),
            stream_completions: AtomicUsize::new(0),
        }
    }

    pub fn always_calling(tool: &str, args: &str) -> Self {
        Self {
            always_tool: Some((tool.to_string(), args.to_string())),
            ..Self::new(vec![])
        }
    }

    /// 工具轮必失败，用于验证降级路径
    pub fn failing_tool_rounds(replies: Vec<&str>) -> Self {
        Self {
            fail_tool_rounds: true,
            ..Self::new(replies)
        }
    }

    pub fn completion_count(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub fn stream_count(&self) -> usize {
        self.stream_completions.load(Ordering::SeqCst)
    }

    /// 按调用顺序返回各次请求的最后一条 user 消息
    pub fn user_prompts(&self) -> Vec<String> {
        self.user_prompts.lock().expect("mock lock poisoned").clone()
    }

    /// 最近一条 user 消息，便于断言提示词内容
    fn last_user(messages: &[WireMessage]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == WireRole::User)
            .and_then(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(
        &self,
        messages: &[WireMessage],
        options: &GenOptions,
    ) -> Result<ChatOutcome, String> {
        let n = self.completions.fetch_add(1, Ordering::SeqCst);
        self.user_prompts
            .lock()
            .expect("mock lock poisoned")
            .push(Self::last_user(messages));

        if self.fail_tool_rounds && !options.tools.is_empty() && !options.tool_choice_none {
            return Err("模拟传输失败".to_string());
        }

        if let Some((tool, args)) = &self.always_tool {
            if !options.tools.is_empty() && !options.tool_choice_none {
                return Ok(ChatOutcome {
                    content: String::new(),
                    tool_calls: vec![ToolCallRequest {
                        id: format!("call_{n}"),
                        call_type: "function".to_string(),
                        function: ToolCallFunction {
                            name: tool.clone(),
                            arguments: args.clone(),
                        },
                    }],
                });
            }
        }

        let scripted = self.script.lock().expect("mock lock poisoned").pop_front();
        Ok(scripted.unwrap_or_else(|| ChatOutcome {
            content: format!("[mock] {}", Self::last_user(messages)),
            tool_calls: vec![],
        }))
    }

    async fn complete_stream(
        &self,
        messages: &[WireMessage],
        options: &GenOptions,
    ) -> Result<TextStream, String> {
        self.stream_completions.fetch_add(1, Ordering::SeqCst);
        let outcome = self.complete(messages, options).await?;
        Ok(Box::pin(stream::iter(vec![Ok(outcome.content)])))
    }
}
