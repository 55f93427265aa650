//! 编排层：模式策略、提示词模板、阶段检测与主运行器

pub mod phase;
pub mod policies;
pub mod prompts;
pub mod runner;

pub use phase::{
    exam_detector, practice_detector, GradingPhaseDetector, KeywordPhaseDetector,
};
pub use runner::OrchestrationRunner;
