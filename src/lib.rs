//! Xueban - Rust 课程学习智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **schema**: 模式、计划、消息、题目与评分报告等领域结构
//! - **workspace**: 课程工作区（uploads / index / notes / mistakes / exams / practices）
//! - **llm**: 聊天客户端抽象与实现（OpenAI 兼容 / Mock）、嵌入、工具循环网关
//! - **rag**: 文档解析、切块、向量索引与引用上下文
//! - **tools**: 封闭工具集（计算器、搜索、笔记、记忆检索、思维导图）
//! - **agents**: 调度器、导师、练习官、阅卷官
//! - **memory**: 情景记忆与用户画像（SQLite）
//! - **orchestration**: 模式策略、提示词、阶段检测与主运行器
//! - **app**: 显式装配的应用上下文

pub mod agents;
pub mod app;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod orchestration;
pub mod rag;
pub mod schema;
pub mod tools;
pub mod workspace;

pub use app::AppContext;
pub use error::AgentError;
pub use schema::{ChatMessage, GradeReport, Mode, Plan, Quiz};
