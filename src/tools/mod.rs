//! 工具层：封闭工具集 + 类型化参数 + 显式执行上下文

pub mod calculator;
pub mod filewriter;
pub mod memory_search;
pub mod mindmap;
pub mod registry;
pub mod websearch;

pub use registry::{
    schemas_for, ToolContext, ToolExecutor, ToolKind, ToolResult,
};
