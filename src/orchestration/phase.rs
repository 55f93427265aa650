//! 评分阶段检测
//!
//! 练习与考试模式的回复没有结构化阶段标记，靠关键词命中数判定模型刚输出的
//! 是不是评分内容。trait 是替换点，将来模型侧支持显式阶段标签时在此接入。

use regex::Regex;
use std::sync::OnceLock;

use crate::schema::{ChatMessage, Role};

/// 判断一段助手回复是否处于「评分 / 总评」阶段
pub trait GradingPhaseDetector: Send + Sync {
    fn is_grading(&self, text: &str) -> bool;
}

/// 关键词计数检测：命中不同关键词数达到阈值即判定
pub struct KeywordPhaseDetector {
    keywords: Vec<&'static str>,
    min_matches: usize,
}

impl KeywordPhaseDetector {
    pub fn new(keywords: Vec<&'static str>, min_matches: usize) -> Self {
        Self {
            keywords,
            min_matches,
        }
    }
}

impl GradingPhaseDetector for KeywordPhaseDetector {
    fn is_grading(&self, text: &str) -> bool {
        let hits = self
            .keywords
            .iter()
            .filter(|k| text.contains(*k))
            .count();
        hits >= self.min_matches
    }
}

const PRACTICE_GRADING_KEYWORDS: [&str; 8] = [
    "得分", "评分", "分数", "正确答案", "参考答案", "解析", "反馈", "扣分",
];

const EXAM_GRADING_KEYWORDS: [&str; 8] = [
    "总分", "总评", "考试成绩", "得分率", "各题", "评分报告", "成绩分析", "薄弱",
];

const MIN_KEYWORD_MATCHES: usize = 2;

pub fn practice_detector() -> KeywordPhaseDetector {
    KeywordPhaseDetector::new(PRACTICE_GRADING_KEYWORDS.to_vec(), MIN_KEYWORD_MATCHES)
}

pub fn exam_detector() -> KeywordPhaseDetector {
    KeywordPhaseDetector::new(EXAM_GRADING_KEYWORDS.to_vec(), MIN_KEYWORD_MATCHES)
}

/// 从评分文字里抽取 0-100 的分数
pub fn extract_score(text: &str) -> Option<f64> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*/\s*100").unwrap(),
            Regex::new(r"总分[：:\s\*]*(\d{1,3}(?:\.\d+)?)").unwrap(),
            Regex::new(r"得分[：:\s\*]*(\d{1,3}(?:\.\d+)?)").unwrap(),
        ]
    });
    for pattern in patterns {
        if let Some(caps) = pattern.captures(text) {
            if let Ok(score) = caps[1].parse::<f64>() {
                return Some(score.clamp(0.0, 100.0));
            }
        }
    }
    None
}

/// 历史中最后一条助手消息的内容
pub fn last_assistant_content(history: &[ChatMessage]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.content.as_str())
}

const PAPER_MARKERS: [&str; 5] = ["第一部分", "Part 1", "一、", "第1题", "试卷"];

/// 从历史里向前回溯找整张试卷（含结构化标记的最近一条助手消息）
pub fn find_exam_paper(history: &[ChatMessage]) -> Option<&str> {
    history
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .find(|m| PAPER_MARKERS.iter().any(|marker| m.content.contains(marker)))
        .map(|m| m.content.as_str())
}
