//! 模式工具策略
//!
//! 每个模式允许的工具集合是固定表，不由模型决定。考试模式只留计算器，
//! 防止联网搜索或笔记工具泄露答案。

use crate::schema::Mode;

pub fn allowed_tools(mode: Mode) -> Vec<String> {
    let names: &[&str] = match mode {
        Mode::Learn => &["calculator", "websearch", "filewriter", "memory_search"],
        Mode::Practice => &["calculator", "filewriter", "memory_search"],
        Mode::Exam => &["calculator"],
    };
    names.iter().map(|s| s.to_string()).collect()
}

pub fn is_allowed(mode: Mode, tool: &str) -> bool {
    allowed_tools(mode).iter().any(|t| t == tool)
}
