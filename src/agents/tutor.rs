//! 导师：学习模式的讲解回复，经网关带工具循环

use crate::error::AgentError;
use crate::llm::{GenOptions, LlmGateway, WireMessage};
use crate::orchestration::prompts;
use crate::schema::ToolTrace;
use crate::tools::ToolContext;

pub struct TutorAgent {
    gateway: LlmGateway,
}

impl TutorAgent {
    pub fn new(gateway: LlmGateway) -> Self {
        Self { gateway }
    }

    /// 讲解一轮；history 为已裁窗的线上消息，profile_ctx 为空串时不注入
    #[allow(clippy::too_many_arguments)]
    pub async fn teach(
        &self,
        course: &str,
        question: &str,
        context: &str,
        profile_ctx: &str,
        history: Vec<WireMessage>,
        allowed_tools: &[String],
        temperature: f32,
        ctx: &ToolContext,
    ) -> Result<(String, Vec<ToolTrace>), AgentError> {
        let mut system = prompts::TUTOR_SYSTEM.to_string();
        if !profile_ctx.is_empty() {
            system.push('\n');
            system.push_str(profile_ctx);
        }

        let prompt = prompts::render(
            prompts::TUTOR_PROMPT,
            &[
                ("course", course),
                ("context", context),
                ("question", question),
            ],
        );

        let mut messages = vec![WireMessage::system(system)];
        messages.extend(history);
        messages.push(WireMessage::user(prompt));

        let options = GenOptions {
            temperature: Some(temperature),
            ..Default::default()
        };
        self.gateway.chat(messages, options, allowed_tools, ctx).await
    }
}
