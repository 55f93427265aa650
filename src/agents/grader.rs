//! 阅卷官
//!
//! 把对话式批改文字提炼成结构化 GradeReport，并独占全部记忆写入：
//! 情景记录、画像更新、错题文件。任何持久化失败只记日志，不影响已经
//! 生成的回复内容。解析失败用零分兜底报告，此时不计入滚动均分。

use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use serde_json::json;

use crate::agents::extract_json_block;
use crate::llm::{ChatClient, GenOptions, WireMessage};
use crate::memory::MemoryManager;
use crate::orchestration::{phase, prompts};
use crate::schema::GradeReport;

/// 低于此分的练习记为错题
const MISTAKE_THRESHOLD: f64 = 60.0;

pub struct GraderAgent {
    llm: Arc<dyn ChatClient>,
    memory: Arc<MemoryManager>,
}

impl GraderAgent {
    pub fn new(llm: Arc<dyn ChatClient>, memory: Arc<MemoryManager>) -> Self {
        Self { llm, memory }
    }

    /// 结构化提取；返回 (报告, 是否解析成功)
    pub async fn extract_report(
        &self,
        question: &str,
        answer: &str,
        grading_text: &str,
    ) -> (GradeReport, bool) {
        let prompt = prompts::render(
            prompts::GRADER_PROMPT,
            &[
                ("question", question),
                ("answer", answer),
                ("grading", grading_text),
            ],
        );
        let options = GenOptions {
            temperature: Some(0.2),
            ..Default::default()
        };

        let outcome = match self
            .llm
            .complete(&[WireMessage::user(prompt)], &options)
            .await
        {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(error = %e, "评分提取请求失败，使用兜底报告");
                return (self.fallback_with_score(grading_text), false);
            }
        };

        match extract_json_block(&outcome.content)
            .and_then(|json| serde_json::from_str::<GradeReport>(&json).ok())
        {
            Some(report) => {
                let mut report = report;
                report.score = report.score.clamp(0.0, 100.0);
                (report, true)
            }
            None => {
                tracing::warn!("评分报告解析失败，使用兜底报告");
                (self.fallback_with_score(grading_text), false)
            }
        }
    }

    /// 兜底前先试正则抽分，抽不到才落零分
    fn fallback_with_score(&self, grading_text: &str) -> GradeReport {
        let mut report = GradeReport::fallback();
        if let Some(score) = phase::extract_score(grading_text) {
            report.score = score;
        }
        report
    }

    /// 练习批改的全部持久化：情景记录、薄弱点、错题文件、滚动均分
    pub fn record_practice(
        &self,
        course: &str,
        mistakes_dir: &Path,
        question: &str,
        answer: &str,
        report: &GradeReport,
        parsed: bool,
    ) {
        let content = format!(
            "题目：{}\n作答：{}\n得分：{:.1}\n反馈：{}",
            question, answer, report.score, report.feedback
        );
        let metadata = json!({
            "score": report.score,
            "mistake_tags": report.mistake_tags,
        });

        if report.score < MISTAKE_THRESHOLD {
            self.swallow(
                "保存错题记录",
                self.memory
                    .save_episode(course, "mistake", &content, 0.9, metadata),
            );
            if !report.mistake_tags.is_empty() {
                self.swallow(
                    "更新薄弱知识点",
                    self.memory.update_weak_points(course, &report.mistake_tags),
                );
            }
            self.write_mistake_file(mistakes_dir, question, answer, report);
        } else {
            self.swallow(
                "保存练习记录",
                self.memory
                    .save_episode(course, "practice", &content, 0.4, metadata),
            );
        }

        // 兜底报告的分数不可信，不污染滚动均分
        if parsed {
            self.swallow(
                "更新练习均分",
                self.memory.record_practice_result(course, report.score),
            );
        } else {
            tracing::warn!(course, "评分为兜底结果，跳过均分更新");
        }
    }

    /// 考试总评的持久化：考试情景 + 薄弱点
    pub fn record_exam(&self, course: &str, report: &GradeReport, summary: &str) {
        let content = format!("考试总分：{:.1}\n{}", report.score, summary);
        self.swallow(
            "保存考试记录",
            self.memory.save_episode(
                course,
                "exam",
                &content,
                0.7,
                json!({"score": report.score, "mistake_tags": report.mistake_tags}),
            ),
        );
        if !report.mistake_tags.is_empty() {
            self.swallow(
                "更新薄弱知识点",
                self.memory.update_weak_points(course, &report.mistake_tags),
            );
        }
    }

    fn write_mistake_file(
        &self,
        mistakes_dir: &Path,
        question: &str,
        answer: &str,
        report: &GradeReport,
    ) {
        let ts = Local::now().format("%Y%m%d_%H%M%S");
        let path = mistakes_dir.join(format!("错题记录_{ts}.md"));
        let body = format!(
            "# 错题记录\n\n## 题目\n{}\n\n## 我的答案\n{}\n\n## 得分\n{:.1}/100\n\n## 反馈\n{}\n\n## 建议复习\n{}\n",
            question,
            answer,
            report.score,
            report.feedback,
            report.recommended_review.join("\n"),
        );
        let result = std::fs::create_dir_all(mistakes_dir)
            .and_then(|_| std::fs::write(&path, body))
            .map_err(crate::error::AgentError::from);
        self.swallow("写入错题文件", result.map(|_| String::new()));
    }

    fn swallow<T>(&self, what: &str, result: Result<T, crate::error::AgentError>) {
        if let Err(e) = result {
            tracing::warn!(error = %e, "{what}失败");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockChatClient;

    fn grader(dir: &Path, replies: Vec<&str>) -> GraderAgent {
        let memory = Arc::new(MemoryManager::new(dir.join("memory.db"), "u").unwrap());
        GraderAgent::new(Arc::new(MockChatClient::new(replies)), memory)
    }

    #[tokio::test]
    async fn extracts_structured_report() {
        let dir = tempfile::tempdir().unwrap();
        let reply = r#"{"score": 85, "feedback": "思路正确", "mistake_tags": [], "recommended_review": []}"#;
        let g = grader(dir.path(), vec![reply]);
        let (report, parsed) = g.extract_report("求秩", "2", "得分 85/100，思路正确").await;
        assert!(parsed);
        assert_eq!(report.score, 85.0);
        assert_eq!(report.feedback, "思路正确");
    }

    #[tokio::test]
    async fn fallback_keeps_regex_score() {
        let dir = tempfile::tempdir().unwrap();
        let g = grader(dir.path(), vec!["完全不是 JSON"]);
        let (report, parsed) = g.extract_report("求秩", "2", "得分：70/100，有小错").await;
        assert!(!parsed);
        assert_eq!(report.score, 70.0);
    }

    #[tokio::test]
    async fn low_score_writes_mistake_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let g = grader(dir.path(), vec![]);
        let memory = Arc::new(MemoryManager::new(dir.path().join("memory.db"), "u").unwrap());
        let report = GradeReport {
            score: 40.0,
            feedback: "概念混淆".to_string(),
            mistake_tags: vec!["矩阵的秩".to_string()],
            recommended_review: vec!["初等变换".to_string()],
        };
        let mistakes = dir.path().join("mistakes");
        g.record_practice("线性代数", &mistakes, "求秩", "答错了", &report, true);

        let files: Vec<_> = std::fs::read_dir(&mistakes).unwrap().flatten().collect();
        assert_eq!(files.len(), 1);
        assert!(files[0]
            .file_name()
            .to_string_lossy()
            .starts_with("错题记录_"));

        let eps = memory
            .search_episodes("秩", Some("线性代数"), &["mistake".to_string()], 10)
            .unwrap();
        assert_eq!(eps.len(), 1);
        assert!((eps[0].importance - 0.9).abs() < 1e-9);

        let profile = memory.get_profile("线性代数").unwrap();
        assert_eq!(profile.weak_points, vec!["矩阵的秩".to_string()]);
        assert_eq!(profile.total_practice, 1);
    }
}
