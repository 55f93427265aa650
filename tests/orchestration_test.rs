//! 端到端编排测试：Mock 聊天客户端 + 确定性嵌入 + 临时工作区

use std::fs;
use std::sync::Arc;

use xueban::app::AppContext;
use xueban::config::AppConfig;
use xueban::llm::{ChatClient, EmbeddingProvider, HashEmbedder, MockChatClient};
use xueban::rag::build_index;
use xueban::schema::{ChatMessage, Mode};

const MATERIAL: &str = "矩阵的秩定义为其行向量组的极大线性无关组所含向量的个数。初等变换不改变矩阵的秩。";

fn test_config(dir: &std::path::Path) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.app.workspace_root = dir.join("workspaces");
    cfg.memory.db_path = dir.join("memory.db");
    cfg
}

fn build_app(dir: &std::path::Path, replies: Vec<&str>) -> (AppContext, Arc<MockChatClient>) {
    let mock = Arc::new(MockChatClient::new(replies));
    let llm: Arc<dyn ChatClient> = mock.clone();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::new());
    let app = AppContext::with_components(test_config(dir), llm, embedder).unwrap();
    (app, mock)
}

async fn index_material(app: &AppContext, course: &str) {
    let ws = app.workspaces.create(course, None).unwrap();
    fs::write(ws.uploads_dir().join("ch1.txt"), MATERIAL).unwrap();
    let n = build_index(&ws, Arc::new(HashEmbedder::new()), &app.config.rag)
        .await
        .unwrap();
    assert!(n >= 1);
}

#[tokio::test]
async fn learn_mode_injects_citations_and_context() {
    let dir = tempfile::tempdir().unwrap();
    // 调度回复合法 JSON；导师轮无脚本，Mock 会回显提示词，借此验证上下文注入
    let router_reply = r#"{"need_rag": true, "task_type": "learn", "style": "step_by_step", "output_format": "answer"}"#;
    let (app, _mock) = build_app(dir.path(), vec![router_reply]);
    index_material(&app, "线性代数").await;

    let (reply, plan) = app
        .runner
        .run("线性代数", Mode::Learn, "什么是矩阵的秩？", &[])
        .await
        .unwrap();

    assert!(plan.need_rag);
    assert_eq!(
        plan.allowed_tools,
        ["calculator", "websearch", "filewriter", "memory_search"]
            .map(String::from)
            .to_vec()
    );

    // 提示词里第一个引用块以 [来源1: 文档名] 开头
    assert!(reply.content.contains("[来源1: ch1.txt]"));
    assert!(reply.content.contains("矩阵的秩"));

    let citations = reply.citations.expect("学习模式应返回引用");
    assert_eq!(citations[0].doc_id, "ch1.txt");
    assert!(citations[0].score > 0.0);

    // 问答落为情景记录并计数
    let eps = app
        .memory
        .search_episodes("矩阵", Some("线性代数"), &["qa".to_string()], 10)
        .unwrap();
    assert_eq!(eps.len(), 1);
    assert_eq!(app.memory.get_profile("线性代数").unwrap().total_qa, 1);
}

#[tokio::test]
async fn learn_without_index_uses_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _mock) = build_app(dir.path(), vec!["不是 JSON 的调度回复"]);

    let (reply, _plan) = app
        .runner
        .run("新课程", Mode::Learn, "讲讲第一章", &[])
        .await
        .unwrap();

    assert!(reply.content.contains("未找到相关教材"));
    assert!(reply.citations.is_none());
}

#[tokio::test]
async fn no_rag_turn_keeps_context_empty() {
    let dir = tempfile::tempdir().unwrap();
    // 课程有索引、调度判定本轮无需检索：提示词里不得声称没有教材
    let router_reply = r#"{"need_rag": false, "task_type": "learn", "style": "step_by_step", "output_format": "answer"}"#;
    let (app, _mock) = build_app(dir.path(), vec![router_reply]);
    index_material(&app, "线性代数").await;

    let (reply, plan) = app
        .runner
        .run("线性代数", Mode::Learn, "你好，今天从哪里学起？", &[])
        .await
        .unwrap();

    assert!(!plan.need_rag);
    assert!(!reply.content.contains("未找到相关教材"));
    assert!(reply.content.contains("今天从哪里学起"));
    assert!(reply.citations.is_none());
}

#[tokio::test]
async fn grader_sees_grading_text_without_save_note() {
    let dir = tempfile::tempdir().unwrap();
    let grading_reply = "得分：90/100\n正确答案：秩为 1\n反馈：判断准确。";
    // 评分抽取轮无脚本，Mock 回显提示词，借此检查喂给评分员的文本
    let (app, mock) = build_app(dir.path(), vec!["调度乱码", grading_reply]);
    index_material(&app, "线性代数").await;

    let history = vec![
        ChatMessage::user("出一道题"),
        ChatMessage::assistant("## 练习题目\n\n求矩阵 [[1,2],[2,4]] 的秩。"),
    ];
    let (reply, _plan) = app
        .runner
        .run("线性代数", Mode::Practice, "秩为 1", &history)
        .await
        .unwrap();

    assert!(reply.content.contains("本次练习已保存"));

    // 最后一次请求是评分抽取：能看到原始评语，看不到保存路径提示
    let prompts = mock.user_prompts();
    let grader_prompt = prompts.last().unwrap();
    assert!(grader_prompt.contains("得分：90/100"));
    assert!(!grader_prompt.contains("已保存"));
}

#[tokio::test]
async fn practice_grading_turn_writes_record_file() {
    let dir = tempfile::tempdir().unwrap();
    let grading_reply = "得分：85/100\n正确答案：秩为 2\n反馈：消元步骤正确，结论表述可以更严谨。";
    let grader_json = r#"{"score": 85, "feedback": "表述可更严谨", "mistake_tags": [], "recommended_review": []}"#;
    let (app, _mock) = build_app(
        dir.path(),
        vec!["调度乱码", grading_reply, grader_json],
    );
    index_material(&app, "线性代数").await;

    let history = vec![
        ChatMessage::user("出一道题"),
        ChatMessage::assistant("## 练习题目\n\n求矩阵 [[1,2],[2,4]] 与 [[1,0],[0,1]] 拼接后的秩。"),
    ];
    let answer = "我的答案是秩为 2，因为第二行是第一行的两倍。";
    let (reply, _plan) = app
        .runner
        .run("线性代数", Mode::Practice, answer, &history)
        .await
        .unwrap();

    assert!(reply.content.contains("本次练习已保存"));

    let practices = app
        .workspaces
        .get("线性代数")
        .unwrap()
        .practices_dir();
    let files: Vec<_> = fs::read_dir(&practices).unwrap().flatten().collect();
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().to_string_lossy().to_string();
    assert!(name.starts_with("练习记录_") && name.ends_with(".md"));

    let body = fs::read_to_string(files[0].path()).unwrap();
    assert!(body.contains(answer));
    assert!(body.contains("求矩阵 [[1,2],[2,4]]"));
    assert!(body.contains("评分反馈"));

    // 85 分不是错题，但计入练习均分
    let profile = app.memory.get_profile("线性代数").unwrap();
    assert_eq!(profile.total_practice, 1);
    assert!((profile.avg_score - 85.0).abs() < 0.1);
}

#[tokio::test]
async fn practice_first_turn_generates_quiz() {
    let dir = tempfile::tempdir().unwrap();
    let quiz_json = r#"{"question": "求矩阵 [[1,2],[3,6]] 的秩", "standard_answer": "1", "rubric": "说明行成比例即可", "difficulty": "easy", "chapter": "矩阵的秩"}"#;
    let (app, _mock) = build_app(dir.path(), vec!["调度乱码", quiz_json]);
    index_material(&app, "线性代数").await;

    let (reply, _plan) = app
        .runner
        .run("线性代数", Mode::Practice, "来一道简单的题", &[])
        .await
        .unwrap();

    assert!(reply.content.starts_with("## 练习题目"));
    assert!(reply.content.contains("求矩阵 [[1,2],[3,6]] 的秩"));
    // 题目轮不触发批改，不产生练习记录
    let practices = app
        .workspaces
        .get("线性代数")
        .unwrap()
        .practices_dir();
    assert_eq!(fs::read_dir(practices).unwrap().count(), 0);
}

#[tokio::test]
async fn exam_mode_restricts_tools_and_saves_report() {
    let dir = tempfile::tempdir().unwrap();
    let report_reply = "总分：72/100\n成绩分析：线性方程组部分薄弱。\n各题评析如下……";
    let grader_json = r#"{"score": 72, "feedback": "方程组部分薄弱", "mistake_tags": ["线性方程组"], "recommended_review": ["消元法"]}"#;
    let (app, _mock) = build_app(
        dir.path(),
        vec!["调度乱码", report_reply, grader_json],
    );
    index_material(&app, "线性代数").await;

    let history = vec![
        ChatMessage::user("开始考试"),
        ChatMessage::assistant("第一部分 选择题\n1. 矩阵的秩……（10 分）"),
        ChatMessage::user("第一题选 A"),
    ];
    let (reply, plan) = app
        .runner
        .run("线性代数", Mode::Exam, "交卷", &history)
        .await
        .unwrap();

    assert_eq!(plan.allowed_tools, vec!["calculator".to_string()]);
    assert!(reply.content.contains("本次考试已保存"));

    let exams = app.workspaces.get("线性代数").unwrap().exams_dir();
    let files: Vec<_> = fs::read_dir(&exams).unwrap().flatten().collect();
    assert_eq!(files.len(), 1);
    let body = fs::read_to_string(files[0].path()).unwrap();
    assert!(body.contains("第一部分 选择题"));
    assert!(body.contains("第一题选 A"));
    assert!(body.contains("总分：72/100"));

    // 考试情景 + 薄弱点落库
    let eps = app
        .memory
        .search_episodes("考试", Some("线性代数"), &["exam".to_string()], 10)
        .unwrap();
    assert_eq!(eps.len(), 1);
    let profile = app.memory.get_profile("线性代数").unwrap();
    assert_eq!(profile.weak_points, vec!["线性方程组".to_string()]);
}

#[tokio::test]
async fn exam_answer_turn_does_not_trigger_grading() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _mock) = build_app(
        dir.path(),
        vec!["调度乱码", "已记录你的作答，还剩 3 题。"],
    );
    index_material(&app, "线性代数").await;

    let history = vec![
        ChatMessage::user("开始考试"),
        ChatMessage::assistant("第一部分 选择题"),
    ];
    let (reply, _plan) = app
        .runner
        .run("线性代数", Mode::Exam, "第一题选 A", &history)
        .await
        .unwrap();

    assert!(!reply.content.contains("本次考试已保存"));
    let exams = app.workspaces.get("线性代数").unwrap().exams_dir();
    assert_eq!(fs::read_dir(exams).unwrap().count(), 0);
}

#[tokio::test]
async fn stream_yields_full_content_in_chunks() {
    use futures_util::StreamExt;

    let dir = tempfile::tempdir().unwrap();
    let (app, _mock) = build_app(dir.path(), vec!["调度乱码"]);

    let (mut stream, reply, _plan) = app
        .runner
        .run_stream("新课程", Mode::Learn, "你好", &[])
        .await
        .unwrap();

    let mut collected = String::new();
    while let Some(chunk) = stream.next().await {
        collected.push_str(&chunk.unwrap());
    }
    assert_eq!(collected, reply.content);
    assert!(!collected.is_empty());
}
