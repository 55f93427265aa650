//! 联网搜索工具（SerpAPI）
//!
//! 密钥取自环境变量 SERPAPI_API_KEY，缺失时返回失败结果而非报错中断，
//! 让模型改用已有知识回答。

use serde_json::{json, Value};

use crate::tools::registry::{ToolContext, ToolResult, WebSearchArgs};

const NAME: &str = "websearch";
const ENDPOINT: &str = "https://serpapi.com/search";

pub async fn run(args: &WebSearchArgs, ctx: &ToolContext) -> ToolResult {
    let Ok(api_key) = std::env::var("SERPAPI_API_KEY") else {
        return ToolResult::fail(NAME, "未配置 SERPAPI_API_KEY，无法联网搜索");
    };
    if api_key.trim().is_empty() {
        return ToolResult::fail(NAME, "未配置 SERPAPI_API_KEY，无法联网搜索");
    }

    let response = ctx
        .http
        .get(ENDPOINT)
        .timeout(ctx.tools_cfg.search_timeout())
        .query(&[
            ("q", args.query.as_str()),
            ("api_key", api_key.as_str()),
            ("num", &ctx.tools_cfg.max_search_results.to_string()),
            ("hl", "zh-cn"),
        ])
        .send()
        .await;

    let response = match response {
        Ok(r) => r,
        Err(e) => return ToolResult::fail(NAME, format!("搜索请求失败: {e}")),
    };
    if !response.status().is_success() {
        return ToolResult::fail(NAME, format!("搜索服务返回 {}", response.status()));
    }

    let body: Value = match response.json().await {
        Ok(v) => v,
        Err(e) => return ToolResult::fail(NAME, format!("搜索结果解析失败: {e}")),
    };

    let results: Vec<Value> = body["organic_results"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .take(ctx.tools_cfg.max_search_results)
                .map(|item| {
                    json!({
                        "title": item["title"].as_str().unwrap_or(""),
                        "snippet": item["snippet"].as_str().unwrap_or(""),
                        "link": item["link"].as_str().unwrap_or(""),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if results.is_empty() {
        return ToolResult::fail(NAME, "未找到搜索结果");
    }
    ToolResult::ok(NAME, json!({"query": args.query, "results": results}))
}
