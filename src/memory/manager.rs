//! 记忆管理器
//!
//! 在存储层之上做领域逻辑：查询分词、历史上下文拼装、薄弱知识点合并、
//! 练习滚动均分。所有接口按 (user, course) 粒度操作。

use std::path::PathBuf;

use serde_json::Value;

use crate::error::AgentError;
use crate::memory::store::{Episode, MemoryStore, UserProfile};
use crate::memory::tokenizer;

/// 画像中保留的薄弱知识点上限
pub const MAX_WEAK_POINTS: usize = 20;

pub struct MemoryManager {
    store: MemoryStore,
    user_id: String,
}

impl MemoryManager {
    pub fn new(db_path: impl Into<PathBuf>, user_id: &str) -> Result<Self, AgentError> {
        Ok(Self {
            store: MemoryStore::new(db_path)?,
            user_id: user_id.to_string(),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn save_episode(
        &self,
        course: &str,
        event_type: &str,
        content: &str,
        importance: f64,
        metadata: Value,
    ) -> Result<String, AgentError> {
        self.store
            .save_episode(&self.user_id, course, event_type, content, importance, metadata)
    }

    /// 查询先分词再做关键词 OR 检索；不分词的原始串对中文几乎永远匹配不上
    pub fn search_episodes(
        &self,
        query: &str,
        course: Option<&str>,
        event_types: &[String],
        limit: usize,
    ) -> Result<Vec<Episode>, AgentError> {
        let terms = tokenizer::tokenize(query);
        self.store
            .search_episodes(&self.user_id, course, &terms, event_types, 0.0, limit)
    }

    pub fn get_recent_episodes(
        &self,
        course: &str,
        limit: usize,
    ) -> Result<Vec<Episode>, AgentError> {
        self.store.get_recent_episodes(&self.user_id, course, limit)
    }

    /// 把历史记录拼成可注入提示词的上下文块；高重要度条目加警示标记
    pub fn format_episodes_context(episodes: &[Episode]) -> String {
        if episodes.is_empty() {
            return String::new();
        }
        let mut out = String::from("【相关历史记录】\n");
        for ep in episodes {
            let label = match ep.event_type.as_str() {
                "qa" => "问答",
                "mistake" => "错题",
                "practice" => "练习",
                "exam" => "考试",
                other => other,
            };
            let mark = if ep.importance >= 0.8 { "⚠️ " } else { "" };
            out.push_str(&format!(
                "- {}[{}] {} ({})\n",
                mark,
                label,
                ep.content,
                ep.created_at.format("%Y-%m-%d")
            ));
        }
        out
    }

    pub fn get_profile(&self, course: &str) -> Result<UserProfile, AgentError> {
        self.store.get_profile(&self.user_id, course)
    }

    /// 画像摘要，注入学习模式的系统提示词；空画像返回空串
    pub fn get_profile_context(&self, course: &str) -> Result<String, AgentError> {
        let profile = self.get_profile(course)?;
        let mut parts = Vec::new();
        if !profile.weak_points.is_empty() {
            let top: Vec<&str> = profile
                .weak_points
                .iter()
                .take(8)
                .map(String::as_str)
                .collect();
            parts.push(format!("薄弱知识点：{}", top.join("、")));
        }
        if profile.total_practice > 0 {
            parts.push(format!(
                "已完成 {} 次练习，平均得分 {:.1}",
                profile.total_practice, profile.avg_score
            ));
        }
        if parts.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("【学生情况】{}", parts.join("；")))
    }

    /// 新增薄弱点插到最前，去重，封顶 MAX_WEAK_POINTS
    pub fn update_weak_points(&self, course: &str, new_points: &[String]) -> Result<(), AgentError> {
        if new_points.is_empty() {
            return Ok(());
        }
        let mut profile = self.get_profile(course)?;
        let mut merged: Vec<String> = Vec::new();
        for p in new_points.iter().chain(profile.weak_points.iter()) {
            let p = p.trim();
            if p.is_empty() {
                continue;
            }
            if !merged.iter().any(|m| m == p) {
                merged.push(p.to_string());
            }
            if merged.len() >= MAX_WEAK_POINTS {
                break;
            }
        }
        profile.weak_points = merged;
        self.store.upsert_profile(&profile)
    }

    /// 滚动平均：avg = (old * (n-1) + score) / n，保留一位小数
    pub fn record_practice_result(&self, course: &str, score: f64) -> Result<(), AgentError> {
        let mut profile = self.get_profile(course)?;
        profile.total_practice += 1;
        let n = profile.total_practice as f64;
        let avg = (profile.avg_score * (n - 1.0) + score) / n;
        profile.avg_score = (avg * 10.0).round() / 10.0;
        self.store.upsert_profile(&profile)
    }

    pub fn increment_qa_count(&self, course: &str) -> Result<(), AgentError> {
        let mut profile = self.get_profile(course)?;
        profile.total_qa += 1;
        self.store.upsert_profile(&profile)
    }

    pub fn get_stats(&self, course: &str) -> Result<String, AgentError> {
        let (total, by_type) = self.store.get_stats(&self.user_id, course)?;
        let detail = by_type
            .iter()
            .map(|(t, n)| format!("{t}: {n}"))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("共 {total} 条记录（{detail}）"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager(dir: &std::path::Path) -> MemoryManager {
        MemoryManager::new(dir.join("memory.db"), "u").unwrap()
    }

    #[test]
    fn weak_points_dedupe_and_cap() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let first: Vec<String> = (0..18).map(|i| format!("知识点{i}")).collect();
        m.update_weak_points("c", &first).unwrap();
        // 重复项不新增，新项插到最前
        m.update_weak_points(
            "c",
            &["知识点0".to_string(), "新薄弱点A".to_string(), "新薄弱点B".to_string()],
        )
        .unwrap();

        let p = m.get_profile("c").unwrap();
        assert!(p.weak_points.len() <= MAX_WEAK_POINTS);
        assert_eq!(p.weak_points[0], "知识点0");
        assert_eq!(p.weak_points[1], "新薄弱点A");
        assert_eq!(
            p.weak_points.iter().filter(|w| w.as_str() == "知识点0").count(),
            1
        );
    }

    #[test]
    fn rolling_average_matches_formula() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        m.record_practice_result("c", 80.0).unwrap();
        m.record_practice_result("c", 90.0).unwrap();
        m.record_practice_result("c", 70.0).unwrap();

        let p = m.get_profile("c").unwrap();
        assert_eq!(p.total_practice, 3);
        assert!((p.avg_score - 80.0).abs() < 0.1);
    }

    #[test]
    fn episode_context_marks_important_entries() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        m.save_episode("c", "mistake", "秩的计算出错", 0.9, json!({}))
            .unwrap();
        m.save_episode("c", "qa", "什么是行列式", 0.5, json!({}))
            .unwrap();

        let eps = m.search_episodes("秩 行列式", Some("c"), &[], 10).unwrap();
        let ctx = MemoryManager::format_episodes_context(&eps);
        assert!(ctx.starts_with("【相关历史记录】"));
        assert!(ctx.contains("⚠️ [错题]"));
        assert!(ctx.contains("[问答]"));
    }
}
