//! 编排运行器
//!
//! 单轮无状态：调用方回放完整历史，运行器按模式走「调度 → 检索 → 角色代理 →
//! 阶段检测 → 持久化」的流水线。持久化永远发生在回复内容完整收集之后，
//! 且所有持久化失败只降级记日志，不影响返回给学生的内容。

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use serde_json::json;

use crate::agents::{GraderAgent, QuizMaster, RouterAgent, TutorAgent};
use crate::config::AppConfig;
use crate::error::AgentError;
use crate::llm::{
    gateway::simulate_typing, ChatClient, EmbeddingProvider, GenOptions, LlmGateway, TextStream,
    WireMessage,
};
use crate::memory::MemoryManager;
use crate::orchestration::phase::{self, GradingPhaseDetector};
use crate::orchestration::prompts;
use crate::rag::{Retriever, VectorStore};
use crate::schema::{ChatMessage, Mode, Plan, RetrievedChunk, Role, ToolTrace};
use crate::tools::{ToolContext, ToolExecutor};
use crate::workspace::{Workspace, WorkspaceRegistry};

const NO_MATERIAL_PLACEHOLDER: &str = "（未找到相关教材，请先上传课程资料）";

pub struct OrchestrationRunner {
    cfg: AppConfig,
    workspaces: Arc<WorkspaceRegistry>,
    llm: Arc<dyn ChatClient>,
    embedder: Arc<dyn EmbeddingProvider>,
    memory: Arc<MemoryManager>,
    gateway: LlmGateway,
    router: RouterAgent,
    tutor: TutorAgent,
    quizmaster: QuizMaster,
    grader: GraderAgent,
    practice_detector: Box<dyn GradingPhaseDetector>,
    exam_detector: Box<dyn GradingPhaseDetector>,
    http: reqwest::Client,
}

impl OrchestrationRunner {
    pub fn new(
        cfg: AppConfig,
        workspaces: Arc<WorkspaceRegistry>,
        llm: Arc<dyn ChatClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        memory: Arc<MemoryManager>,
    ) -> Self {
        let executor = || ToolExecutor::new(cfg.tools.tool_timeout());
        Self {
            router: RouterAgent::new(llm.clone()),
            tutor: TutorAgent::new(LlmGateway::new(llm.clone(), executor())),
            quizmaster: QuizMaster::new(llm.clone(), LlmGateway::new(llm.clone(), executor())),
            grader: GraderAgent::new(llm.clone(), memory.clone()),
            gateway: LlmGateway::new(llm.clone(), executor()),
            practice_detector: Box::new(phase::practice_detector()),
            exam_detector: Box::new(phase::exam_detector()),
            http: reqwest::Client::new(),
            cfg,
            workspaces,
            llm,
            embedder,
            memory,
        }
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// 单轮对话；返回助手消息（含引用与工具留痕）与本轮计划
    pub async fn run(
        &self,
        course: &str,
        mode: Mode,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<(ChatMessage, Plan), AgentError> {
        let workspace = self.workspaces.get_or_create(course)?;
        let plan = self.router.plan(mode, message).await;
        tracing::info!(course, mode = %mode, need_rag = plan.need_rag, "开始处理");

        let reply = match mode {
            Mode::Learn => self.run_learn(&workspace, &plan, message, history).await?,
            Mode::Practice => self.run_practice(&workspace, &plan, message, history).await?,
            Mode::Exam => self.run_exam(&workspace, &plan, message, history).await?,
        };
        Ok((reply, plan))
    }

    /// 流式变体：评分与保存提示依赖完整文本，内容收集落盘后再按固定块推送；
    /// 线上侧的逐 Token 流式发生在网关的无工具文本请求里
    pub async fn run_stream(
        &self,
        course: &str,
        mode: Mode,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<(TextStream, ChatMessage, Plan), AgentError> {
        let (reply, plan) = self.run(course, mode, message, history).await?;
        let stream = simulate_typing(reply.content.clone());
        Ok((stream, reply, plan))
    }

    /// 直接执行一个工具（CLI 的 :mindmap 等命令入口）
    pub async fn run_tool(
        &self,
        course: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<crate::tools::ToolResult, AgentError> {
        let workspace = self.workspaces.get_or_create(course)?;
        let retriever = self.load_retriever(&workspace, self.cfg.rag.top_k);
        let ctx = self.tool_context(&workspace, "", retriever);
        let executor = ToolExecutor::new(self.cfg.tools.tool_timeout());
        Ok(executor.execute(tool, args, &ctx).await)
    }

    async fn run_learn(
        &self,
        workspace: &Workspace,
        plan: &Plan,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<ChatMessage, AgentError> {
        let (chunks, context, retriever) = self
            .retrieval(workspace, plan, message, self.cfg.rag.top_k)
            .await;

        let profile_ctx = self
            .memory
            .get_profile_context(&workspace.course_name)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "画像读取失败");
                String::new()
            });

        let ctx = self.tool_context(workspace, message, retriever);
        let (content, traces) = self
            .tutor
            .teach(
                &workspace.course_name,
                message,
                &context,
                &profile_ctx,
                wire_history(history, self.cfg.app.history_window),
                &plan.allowed_tools,
                self.cfg.llm.temperature,
                &ctx,
            )
            .await?;

        // 回复已完整，问答记录与计数失败均不影响输出
        let episode = format!("问：{}\n答：{}", message, truncate(&content, 500));
        if let Err(e) =
            self.memory
                .save_episode(&workspace.course_name, "qa", &episode, 0.5, json!({}))
        {
            tracing::warn!(error = %e, "保存问答记录失败");
        }
        if let Err(e) = self.memory.increment_qa_count(&workspace.course_name) {
            tracing::warn!(error = %e, "问答计数失败");
        }

        Ok(assemble_reply(content, chunks, traces))
    }

    async fn run_practice(
        &self,
        workspace: &Workspace,
        plan: &Plan,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<ChatMessage, AgentError> {
        let (chunks, context, retriever) = self
            .retrieval(workspace, plan, message, self.cfg.rag.top_k)
            .await;

        // 首轮（历史中还没有助手消息）直接结构化出题
        let has_assistant = history.iter().any(|m| m.role == Role::Assistant);
        if !has_assistant {
            let quiz = self
                .quizmaster
                .generate_quiz(message, &context, message)
                .await;
            let mut content = format!(
                "## 练习题目\n\n{}\n\n难度：{}",
                quiz.question, quiz.difficulty
            );
            if let Some(chapter) = &quiz.chapter {
                content.push_str(&format!("　|　章节：{chapter}"));
            }
            content.push_str("\n\n请直接回复你的作答，我会为你批改。");
            return Ok(assemble_reply(content, chunks, vec![]));
        }

        let ctx = self.tool_context(workspace, message, retriever);
        let (mut content, traces) = self
            .quizmaster
            .practice_turn(
                &workspace.course_name,
                message,
                &context,
                wire_history(history, self.cfg.app.history_window),
                &plan.allowed_tools,
                self.cfg.llm.temperature,
                &ctx,
            )
            .await?;

        if self.practice_detector.is_grading(&content) {
            let question = phase::last_assistant_content(history).unwrap_or("（未找到原题）");
            // 评分抽取与落盘都基于未附加保存提示的原始评语
            let (report, parsed) = self.grader.extract_report(question, message, &content).await;
            if let Some(path) =
                self.save_practice_record(workspace, question, message, &content)
            {
                content.push_str(&format!("\n\n📝 本次练习已保存：{}", path.display()));
            }
            self.grader.record_practice(
                &workspace.course_name,
                &workspace.mistakes_dir(),
                question,
                message,
                &report,
                parsed,
            );
        }

        Ok(assemble_reply(content, chunks, traces))
    }

    async fn run_exam(
        &self,
        workspace: &Workspace,
        plan: &Plan,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<ChatMessage, AgentError> {
        let (chunks, context, retriever) = self
            .retrieval(workspace, plan, message, self.cfg.rag.exam_top_k)
            .await;

        let prompt = prompts::render(
            prompts::EXAM_PROMPT,
            &[
                ("course", workspace.course_name.as_str()),
                ("context", context.as_str()),
                ("message", message),
            ],
        );
        let mut messages = vec![WireMessage::system(prompts::EXAM_SYSTEM)];
        messages.extend(wire_history(history, self.cfg.app.exam_history_window));
        messages.push(WireMessage::user(prompt));

        let ctx = self.tool_context(workspace, message, retriever);
        let options = GenOptions {
            temperature: Some(self.cfg.llm.temperature),
            ..Default::default()
        };
        let (mut content, traces) = self
            .gateway
            .chat(messages, options, &plan.allowed_tools, &ctx)
            .await?;

        if self.exam_detector.is_grading(&content) {
            let paper = phase::find_exam_paper(history).unwrap_or("（未找到试卷）");
            let answers = answers_after_paper(history, paper);
            // 评分抽取与落盘都基于未附加保存提示的原始评语
            let (report, parsed) = self.grader.extract_report(paper, &answers, &content).await;
            let summary = if parsed {
                report.feedback.clone()
            } else {
                truncate(&content, 200)
            };
            if let Some(path) = self.save_exam_record(workspace, paper, &answers, &content) {
                content.push_str(&format!("\n\n📝 本次考试已保存：{}", path.display()));
            }
            self.grader
                .record_exam(&workspace.course_name, &report, &summary);
        }

        Ok(assemble_reply(content, chunks, traces))
    }

    /// 检索一轮；need_rag=false 时上下文留空，占位语只用于索引缺失或检索为空
    async fn retrieval(
        &self,
        workspace: &Workspace,
        plan: &Plan,
        query: &str,
        top_k: usize,
    ) -> (Vec<RetrievedChunk>, String, Option<Arc<Retriever>>) {
        let retriever = self.load_retriever(workspace, top_k);
        if !plan.need_rag {
            return (vec![], String::new(), retriever);
        }
        let chunks = match &retriever {
            Some(r) => match r.retrieve(query, Some(top_k)).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    tracing::warn!(error = %e, "检索失败，继续无资料回答");
                    vec![]
                }
            },
            None => vec![],
        };
        let context = if chunks.is_empty() {
            NO_MATERIAL_PLACEHOLDER.to_string()
        } else {
            Retriever::format_context(&chunks)
        };
        (chunks, context, retriever)
    }

    fn load_retriever(&self, workspace: &Workspace, top_k: usize) -> Option<Arc<Retriever>> {
        match VectorStore::load(&workspace.index_base()) {
            Ok(store) => Some(Arc::new(Retriever::new(
                store,
                self.embedder.clone(),
                top_k,
            ))),
            Err(AgentError::NoIndex(_)) => None,
            Err(e) => {
                tracing::warn!(error = %e, course = %workspace.course_name, "索引装载失败");
                None
            }
        }
    }

    fn tool_context(
        &self,
        workspace: &Workspace,
        message: &str,
        retriever: Option<Arc<Retriever>>,
    ) -> ToolContext {
        ToolContext {
            course: workspace.course_name.clone(),
            notes_dir: workspace.notes_dir(),
            user_message: message.to_string(),
            memory: self.memory.clone(),
            retriever,
            llm: self.llm.clone(),
            http: self.http.clone(),
            tools_cfg: self.cfg.tools.clone(),
        }
    }

    fn save_practice_record(
        &self,
        workspace: &Workspace,
        question: &str,
        answer: &str,
        grading: &str,
    ) -> Option<PathBuf> {
        let now = Local::now();
        let path = workspace
            .practices_dir()
            .join(format!("练习记录_{}.md", now.format("%Y%m%d_%H%M%S")));
        let body = format!(
            "# 练习记录\n\n- 时间：{}\n- 课程：{}\n\n## 原题\n{}\n\n## 我的答案\n{}\n\n## 评分反馈\n{}\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            workspace.course_name,
            question,
            answer,
            grading,
        );
        match std::fs::create_dir_all(workspace.practices_dir())
            .and_then(|_| std::fs::write(&path, body))
        {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "练习记录写入失败");
                None
            }
        }
    }

    fn save_exam_record(
        &self,
        workspace: &Workspace,
        paper: &str,
        answers: &str,
        grading: &str,
    ) -> Option<PathBuf> {
        let now = Local::now();
        let path = workspace
            .exams_dir()
            .join(format!("考试记录_{}.md", now.format("%Y%m%d_%H%M%S")));
        let body = format!(
            "# 考试记录\n\n- 时间：{}\n- 课程：{}\n\n## 试卷\n{}\n\n## 我的答案\n{}\n\n## 评分报告\n{}\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            workspace.course_name,
            paper,
            answers,
            grading,
        );
        match std::fs::create_dir_all(workspace.exams_dir())
            .and_then(|_| std::fs::write(&path, body))
        {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "考试记录写入失败");
                None
            }
        }
    }
}

/// 取最近 window 条历史并转为线上消息
fn wire_history(history: &[ChatMessage], window: usize) -> Vec<WireMessage> {
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .map(|m| match m.role {
            Role::User => WireMessage::user(m.content.clone()),
            Role::Assistant => WireMessage::assistant(m.content.clone()),
            Role::System => WireMessage::system(m.content.clone()),
        })
        .collect()
}

/// 试卷之后的全部学生发言，拼成作答汇总
fn answers_after_paper(history: &[ChatMessage], paper: &str) -> String {
    let paper_pos = history
        .iter()
        .position(|m| m.role == Role::Assistant && m.content == paper);
    let slice = match paper_pos {
        Some(pos) => &history[pos + 1..],
        None => history,
    };
    slice
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn assemble_reply(
    content: String,
    chunks: Vec<RetrievedChunk>,
    traces: Vec<ToolTrace>,
) -> ChatMessage {
    ChatMessage {
        role: Role::Assistant,
        content,
        citations: (!chunks.is_empty()).then_some(chunks),
        tool_calls: (!traces.is_empty()).then_some(traces),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}……")
    }
}
