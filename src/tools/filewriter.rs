//! 笔记写入工具
//!
//! 只取文件名的 basename，任何目录成分都会被丢弃，写入范围锁死在当前
//! 课程的笔记目录内。

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde_json::json;

use crate::tools::registry::{FileWriterArgs, ToolContext, ToolResult, WriteMode};

const NAME: &str = "filewriter";

pub fn run(args: &FileWriterArgs, ctx: &ToolContext) -> ToolResult {
    let Some(basename) = Path::new(&args.filename).file_name() else {
        return ToolResult::fail(NAME, format!("非法文件名: {}", args.filename));
    };
    if basename.to_string_lossy().starts_with("..") {
        return ToolResult::fail(NAME, format!("非法文件名: {}", args.filename));
    }

    if let Err(e) = fs::create_dir_all(&ctx.notes_dir) {
        return ToolResult::fail(NAME, format!("创建笔记目录失败: {e}"));
    }
    let path = ctx.notes_dir.join(basename);

    let written = match args.mode {
        WriteMode::Write => fs::write(&path, &args.content),
        WriteMode::Append => OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(args.content.as_bytes())),
    };

    match written {
        Ok(()) => ToolResult::ok(
            NAME,
            json!({
                "path": path.display().to_string(),
                "bytes": args.content.len(),
            }),
        ),
        Err(e) => ToolResult::fail(NAME, format!("写入失败: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::ToolsSection;
    use crate::llm::MockChatClient;
    use crate::memory::MemoryManager;

    fn ctx(dir: &Path) -> ToolContext {
        ToolContext {
            course: "c".to_string(),
            notes_dir: dir.join("notes"),
            user_message: String::new(),
            memory: Arc::new(MemoryManager::new(dir.join("memory.db"), "u").unwrap()),
            retriever: None,
            llm: Arc::new(MockChatClient::new(vec![])),
            http: reqwest::Client::new(),
            tools_cfg: ToolsSection::default(),
        }
    }

    #[test]
    fn traversal_components_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let args = FileWriterArgs {
            filename: "../../etc/笔记.md".to_string(),
            content: "重点内容".to_string(),
            mode: WriteMode::Write,
        };
        let result = run(&args, &ctx);
        assert!(result.success);
        let saved = ctx.notes_dir.join("笔记.md");
        assert_eq!(fs::read_to_string(saved).unwrap(), "重点内容");
    }

    #[test]
    fn append_mode_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        for text in ["第一行\n", "第二行\n"] {
            let args = FileWriterArgs {
                filename: "累积.md".to_string(),
                content: text.to_string(),
                mode: WriteMode::Append,
            };
            assert!(run(&args, &ctx).success);
        }
        let saved = fs::read_to_string(ctx.notes_dir.join("累积.md")).unwrap();
        assert_eq!(saved, "第一行\n第二行\n");
    }
}
