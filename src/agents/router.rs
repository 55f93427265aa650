//! 调度器
//!
//! 每轮产出 Plan。模型只能建议 need_rag / style / output_format，
//! allowed_tools 与 task_type 一律被模式策略表覆盖；任何解析失败都
//! 落回默认计划，调度永不向上抛错。

use std::sync::Arc;

use crate::agents::extract_json_block;
use crate::llm::{ChatClient, GenOptions, WireMessage};
use crate::orchestration::{policies, prompts};
use crate::schema::{Mode, Plan};

pub struct RouterAgent {
    llm: Arc<dyn ChatClient>,
}

impl RouterAgent {
    pub fn new(llm: Arc<dyn ChatClient>) -> Self {
        Self { llm }
    }

    pub async fn plan(&self, mode: Mode, message: &str) -> Plan {
        let allowed = policies::allowed_tools(mode);
        let prompt = prompts::render(
            prompts::ROUTER_PROMPT,
            &[("mode", mode.as_str()), ("message", message)],
        );
        let options = GenOptions {
            temperature: Some(0.3),
            ..Default::default()
        };

        let outcome = match self
            .llm
            .complete(&[WireMessage::user(prompt)], &options)
            .await
        {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(error = %e, "调度请求失败，使用默认计划");
                return Plan::default_for(mode, allowed);
            }
        };

        let parsed = extract_json_block(&outcome.content)
            .and_then(|json| serde_json::from_str::<Plan>(&json).ok());

        match parsed {
            Some(mut plan) => {
                plan.allowed_tools = allowed;
                plan.task_type = mode.as_str().to_string();
                plan
            }
            None => {
                tracing::warn!(mode = %mode, "计划解析失败，使用默认计划");
                Plan::default_for(mode, allowed)
            }
        }
    }
}
