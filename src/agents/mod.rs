//! 角色代理：调度器、导师、练习官、阅卷官

pub mod grader;
pub mod quizmaster;
pub mod router;
pub mod tutor;

pub use grader::GraderAgent;
pub use quizmaster::QuizMaster;
pub use router::RouterAgent;
pub use tutor::TutorAgent;

/// 从模型输出里提取 JSON 文本：优先 ```json 围栏，其次任意围栏，
/// 最后取首个 '{' 到末个 '}' 的切片
pub fn extract_json_block(text: &str) -> Option<String> {
    for fence in ["```json", "```"] {
        if let Some(start) = text.find(fence) {
            let body = &text[start + fence.len()..];
            if let Some(end) = body.find("```") {
                let candidate = body[..end].trim();
                if candidate.starts_with('{') {
                    return Some(candidate.to_string());
                }
            }
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(text[start..=end].to_string())
    } else {
        None
    }
}
