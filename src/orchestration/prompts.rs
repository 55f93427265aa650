//! 提示词模板
//!
//! 模板里含大量 JSON 花括号，统一用 {key} 占位符手工替换，不走 format!。

/// 占位符替换；未出现的键原样忽略
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

pub const ROUTER_PROMPT: &str = r#"你是课程学习系统的调度器。根据学生消息与当前模式，输出一个 JSON 编排计划。

当前模式：{mode}
学生消息：{message}

只输出 JSON，不要解释：
{
  "need_rag": true,
  "task_type": "learn",
  "style": "step_by_step",
  "output_format": "answer"
}

字段说明：
- need_rag: 是否需要检索课程资料（闲聊、问候可为 false）
- task_type: learn / practice / exam
- style: step_by_step / hint_first / direct
- output_format: answer / quiz / exam / report"#;

pub const TUTOR_SYSTEM: &str = "你是一位专业的大学课程导师。";

pub const TUTOR_PROMPT: &str = r#"请基于课程资料回答学生的问题。

课程：{course}
课程资料：
{context}

要求：
1. 优先依据课程资料回答，引用资料时标注来源编号，如（来源1）
2. 资料不足时明确说明，再用通用知识补充
3. 讲解循序渐进，先给思路再给结论，可用工具辅助计算或记笔记

学生的问题：{question}"#;

pub const PRACTICE_SYSTEM: &str = "你是一位严格而友善的课程练习官，负责出题与批改。";

pub const PRACTICE_PROMPT: &str = r#"当前是练习模式。根据对话状态二选一：

A. 如果学生在请求新题目（或刚进入练习），基于课程资料出一道题：
   - 给出题目描述，标注难度与涉及章节
   - 不要给出答案

B. 如果学生刚提交了某道题的作答，给出评分报告，必须包含：
   - 得分：X/100
   - 正确答案：……
   - 反馈：逐点指出对错与改进建议

课程：{course}
课程资料：
{context}

学生消息：{message}"#;

pub const QUIZMASTER_PROMPT: &str = r#"基于课程资料出一道练习题，只输出 JSON：

课程资料：
{context}

主题：{topic}
难度：{difficulty}

{
  "question": "题目描述",
  "standard_answer": "标准答案",
  "rubric": "评分要点",
  "difficulty": "easy|medium|hard",
  "chapter": "涉及章节",
  "concept": "核心概念"
}"#;

pub const GRADER_PROMPT: &str = r#"从下面这段批改文字中提取结构化评分报告，只输出 JSON：

题目：{question}
学生作答：{answer}
批改文字：
{grading}

{
  "score": 85.0,
  "feedback": "一句话总评",
  "mistake_tags": ["知识点标签"],
  "recommended_review": ["建议复习的内容"]
}

要求：score 为 0-100 的数字；mistake_tags 用简短的知识点名称；没有错误时两个数组可为空。"#;

pub const EXAM_SYSTEM: &str =
    "你是一位课程考试官，负责出卷、监考与阅卷。考试期间不得直接告知答案。";

pub const EXAM_PROMPT: &str = r#"当前是模拟考试模式，按阶段推进：

阶段一（学生要求开始考试）：基于课程资料生成一份完整试卷。
   - 试卷第一行以「第一部分」开头
   - 覆盖多个章节，题型包含选择、填空与解答
   - 标注每题分值，总分 100

阶段二（学生逐题作答）：只确认收到作答并提示剩余题目，不评分、不给答案。

阶段三（学生说「交卷」或要求评分）：给出总评报告，必须包含：
   - 总分：X/100
   - 各题得分与评析
   - 成绩分析与薄弱知识点

课程：{course}
课程资料：
{context}

学生消息：{message}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_known_keys_only() {
        let out = render("课程：{course}，模式：{mode}", &[("course", "线性代数")]);
        assert_eq!(out, "课程：线性代数，模式：{mode}");
    }

    #[test]
    fn templates_keep_json_braces() {
        let out = render(ROUTER_PROMPT, &[("mode", "learn"), ("message", "你好")]);
        assert!(out.contains("\"need_rag\""));
        assert!(out.contains("当前模式：learn"));
    }
}
