//! Xueban - Rust 课程学习智能体
//!
//! 入口：初始化日志与应用上下文，进入命令行 REPL。
//! 命令：:mode learn|practice|exam、:course 名称、:upload 路径、:remove 文件名、
//! :index、:courses、:mindmap 主题、:stats、:quit；其余输入作为消息发给当前课程。

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use serde_json::json;

use xueban::config::load_config;
use xueban::rag::build_index;
use xueban::schema::{ChatMessage, Mode};
use xueban::{observability, AppContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = load_config(config_path).context("配置加载失败")?;
    let app = AppContext::bootstrap(config).context("应用初始化失败")?;

    let mut course = "默认课程".to_string();
    let mut mode = Mode::Learn;
    let mut history: Vec<ChatMessage> = Vec::new();

    println!("学伴已启动。当前课程：{course}，模式：{mode}。输入 :help 查看命令。");

    let stdin = std::io::stdin();
    loop {
        print!("你> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix(':') {
            let mut parts = command.splitn(2, ' ');
            let head = parts.next().unwrap_or("");
            let rest = parts.next().unwrap_or("").trim();
            match head {
                "quit" | "q" => break,
                "help" => {
                    println!(":mode learn|practice|exam  切换模式（清空历史）");
                    println!(":course 名称              切换课程（清空历史）");
                    println!(":upload 本地文件路径      上传资料到当前课程");
                    println!(":remove 文件名            删除当前课程的一份资料");
                    println!(":index                    重建当前课程索引");
                    println!(":courses                  列出全部课程");
                    println!(":mindmap 主题             生成思维导图");
                    println!(":stats                    查看记忆统计");
                    println!(":quit                     退出");
                }
                "mode" => match Mode::parse(rest) {
                    Some(m) => {
                        mode = m;
                        history.clear();
                        println!("已切换到 {mode} 模式。");
                    }
                    None => println!("未知模式：{rest}（learn / practice / exam）"),
                },
                "course" => {
                    if rest.is_empty() {
                        println!("当前课程：{course}");
                    } else {
                        course = rest.to_string();
                        history.clear();
                        match app.workspaces.get_or_create(&course) {
                            Ok(ws) => println!(
                                "已切换到课程「{course}」，资料请放入 {}",
                                ws.uploads_dir().display()
                            ),
                            Err(e) => println!("切换失败：{e}"),
                        }
                    }
                }
                "upload" => {
                    if rest.is_empty() {
                        println!("用法：:upload 本地文件路径");
                    } else if let Err(e) = app.workspaces.get_or_create(&course) {
                        println!("课程不可用：{e}");
                    } else {
                        match app.workspaces.add_document(&course, rest) {
                            Ok(dest) => match std::fs::copy(rest, &dest) {
                                Ok(_) => println!(
                                    "已上传：{}（执行 :index 重建索引后生效）",
                                    dest.display()
                                ),
                                Err(e) => {
                                    let _ = app.workspaces.remove_document(&course, rest);
                                    println!("上传失败：{e}");
                                }
                            },
                            Err(e) => println!("上传失败：{e}"),
                        }
                    }
                }
                "remove" => {
                    if rest.is_empty() {
                        println!("用法：:remove 文件名");
                    } else {
                        match app.workspaces.remove_document(&course, rest) {
                            Ok(()) => println!("已删除：{rest}（执行 :index 重建索引后生效）"),
                            Err(e) => println!("删除失败：{e}"),
                        }
                    }
                }
                "index" => match app.workspaces.get_or_create(&course) {
                    Ok(ws) => {
                        let embedder = Arc::new(xueban::llm::OpenAiEmbedder::new(
                            app.config.embedding.base_url.as_deref(),
                            &app.config.embedding.model,
                            &app.config.embedding.query_instruction,
                            None,
                        ));
                        match build_index(&ws, embedder, &app.config.rag).await {
                            Ok(n) => println!("索引重建完成，共 {n} 块。"),
                            Err(e) => println!("索引重建失败：{e}"),
                        }
                    }
                    Err(e) => println!("课程不可用：{e}"),
                },
                "courses" => {
                    for ws in app.workspaces.list() {
                        println!(
                            "- {}（{} 份资料，索引：{}）",
                            ws.course_name,
                            ws.documents.len(),
                            if ws.has_index() { "已建" } else { "未建" }
                        );
                    }
                }
                "mindmap" => {
                    match app
                        .runner
                        .run_tool(&course, "mindmap", json!({"topic": rest}))
                        .await
                    {
                        Ok(result) if result.success => {
                            println!("{}", result.payload["mermaid"].as_str().unwrap_or(""))
                        }
                        Ok(result) => println!("生成失败：{}", result.payload["error"]),
                        Err(e) => println!("生成失败：{e}"),
                    }
                }
                "stats" => match app.memory.get_stats(&course) {
                    Ok(s) => println!("{s}"),
                    Err(e) => println!("统计失败：{e}"),
                },
                other => println!("未知命令：:{other}"),
            }
            continue;
        }

        match app.runner.run_stream(&course, mode, input, &history).await {
            Ok((mut stream, reply, _plan)) => {
                print!("学伴> ");
                std::io::stdout().flush()?;
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(text) => {
                            print!("{text}");
                            std::io::stdout().flush()?;
                        }
                        Err(e) => {
                            eprintln!("\n[流式输出中断：{e}]");
                            break;
                        }
                    }
                }
                println!();
                if let Some(citations) = &reply.citations {
                    println!("—— 引用 ——");
                    for (i, c) in citations.iter().enumerate() {
                        let page = c
                            .page
                            .map(|p| format!("，第{p}页"))
                            .unwrap_or_default();
                        println!("[来源{}] {}{}", i + 1, c.doc_id, page);
                    }
                }
                history.push(ChatMessage::user(input));
                history.push(reply);
            }
            Err(e) => println!("出错了：{e}"),
        }
    }

    println!("再见！");
    Ok(())
}
