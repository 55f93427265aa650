//! 练习官
//!
//! 两个职责：结构化出题（练习首轮）与对话式练习轮（出题或批改由模型
//! 按提示词自行判断）。结构化出题解析失败时落回占位题目，不中断练习。

use std::sync::Arc;

use crate::agents::extract_json_block;
use crate::error::AgentError;
use crate::llm::{ChatClient, GenOptions, LlmGateway, WireMessage};
use crate::orchestration::prompts;
use crate::schema::{Quiz, ToolTrace};
use crate::tools::ToolContext;

pub struct QuizMaster {
    llm: Arc<dyn ChatClient>,
    gateway: LlmGateway,
}

impl QuizMaster {
    pub fn new(llm: Arc<dyn ChatClient>, gateway: LlmGateway) -> Self {
        Self { llm, gateway }
    }

    /// 结构化出题；difficulty 从学生消息里粗提（简单/困难），默认 medium
    pub async fn generate_quiz(&self, topic: &str, context: &str, message: &str) -> Quiz {
        let difficulty = difficulty_hint(message);
        let prompt = prompts::render(
            prompts::QUIZMASTER_PROMPT,
            &[
                ("context", context),
                ("topic", topic),
                ("difficulty", difficulty),
            ],
        );
        let options = GenOptions {
            temperature: Some(0.8),
            ..Default::default()
        };

        let outcome = match self
            .llm
            .complete(&[WireMessage::user(prompt)], &options)
            .await
        {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(error = %e, "出题请求失败，使用占位题目");
                return Quiz::placeholder(topic, difficulty);
            }
        };

        extract_json_block(&outcome.content)
            .and_then(|json| serde_json::from_str::<Quiz>(&json).ok())
            .unwrap_or_else(|| {
                tracing::warn!("题目解析失败，使用占位题目");
                Quiz::placeholder(topic, difficulty)
            })
    }

    /// 对话式练习轮（出题或批改），带工具循环
    pub async fn practice_turn(
        &self,
        course: &str,
        message: &str,
        context: &str,
        history: Vec<WireMessage>,
        allowed_tools: &[String],
        temperature: f32,
        ctx: &ToolContext,
    ) -> Result<(String, Vec<ToolTrace>), AgentError> {
        let prompt = prompts::render(
            prompts::PRACTICE_PROMPT,
            &[("course", course), ("context", context), ("message", message)],
        );

        let mut messages = vec![WireMessage::system(prompts::PRACTICE_SYSTEM)];
        messages.extend(history);
        messages.push(WireMessage::user(prompt));

        let options = GenOptions {
            temperature: Some(temperature),
            ..Default::default()
        };
        self.gateway.chat(messages, options, allowed_tools, ctx).await
    }
}

fn difficulty_hint(message: &str) -> &'static str {
    if message.contains("简单") || message.contains("容易") || message.contains("易") {
        "easy"
    } else if message.contains("困难") || message.contains("难") {
        "hard"
    } else {
        "medium"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolExecutor;

    fn quizmaster(replies: Vec<&str>) -> QuizMaster {
        let mock: Arc<dyn ChatClient> = Arc::new(crate::llm::MockChatClient::new(replies));
        QuizMaster::new(mock.clone(), LlmGateway::new(mock, ToolExecutor::default()))
    }

    #[tokio::test]
    async fn parses_fenced_quiz_json() {
        let reply = "```json\n{\"question\": \"求矩阵的秩\", \"standard_answer\": \"2\", \"rubric\": \"步骤正确即可\", \"difficulty\": \"medium\"}\n```";
        let qm = quizmaster(vec![reply]);
        let quiz = qm.generate_quiz("矩阵的秩", "（资料）", "出一道题").await;
        assert_eq!(quiz.question, "求矩阵的秩");
        assert_eq!(quiz.difficulty, "medium");
    }

    #[tokio::test]
    async fn malformed_reply_yields_placeholder() {
        let qm = quizmaster(vec!["今天天气不错"]);
        let quiz = qm.generate_quiz("矩阵的秩", "", "来道简单的").await;
        assert_eq!(quiz.standard_answer, "N/A");
        assert_eq!(quiz.difficulty, "easy");
        assert_eq!(quiz.chapter.as_deref(), Some("矩阵的秩"));
    }
}
