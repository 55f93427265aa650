//! 历史记录检索工具：把情景记忆以工具形式开放给模型

use serde_json::json;

use crate::memory::MemoryManager;
use crate::tools::registry::{MemorySearchArgs, ToolContext, ToolResult};

const NAME: &str = "memory_search";
const LIMIT: usize = 5;

pub fn run(args: &MemorySearchArgs, ctx: &ToolContext) -> ToolResult {
    let course = args.course_name.as_deref().unwrap_or(&ctx.course);
    let event_types = args.event_types.clone().unwrap_or_default();

    let episodes = match ctx
        .memory
        .search_episodes(&args.query, Some(course), &event_types, LIMIT)
    {
        Ok(eps) => eps,
        Err(e) => return ToolResult::fail(NAME, format!("记忆检索失败: {e}")),
    };

    if episodes.is_empty() {
        return ToolResult::ok(
            NAME,
            json!({"query": args.query, "records": [], "summary": "未找到相关历史记录"}),
        );
    }

    let summary = MemoryManager::format_episodes_context(&episodes);
    let records: Vec<_> = episodes
        .iter()
        .map(|ep| {
            json!({
                "event_type": ep.event_type,
                "content": ep.content,
                "importance": ep.importance,
                "created_at": ep.created_at.to_rfc3339(),
            })
        })
        .collect();

    ToolResult::ok(
        NAME,
        json!({"query": args.query, "records": records, "summary": summary}),
    )
}
