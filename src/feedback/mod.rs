//! Feedback-Improvement Loop
//!
//! Rates a mix through an external judge, applies the judge's suggested
//! edits to a new file version and repeats within a fixed budget.

pub mod apply;
pub mod improve;
pub mod judge;
pub mod record;

pub use apply::{apply_feedback_suggestions, ApplyOutcome};
pub use improve::{
    ImprovementLoop, ImprovementOutcome, IterationRecord, IterationStatus, LoopTerminal,
};
pub use judge::{
    get_mix_feedback, interpret, FeedbackReport, FeedbackStrategy, HeuristicTextJudgment,
    JudgeRequest, Judgment, MixJudge, StructuredJudgment,
};
pub use record::{FeedbackRecord, SpecificIssue, SuggestedAction, Suggestion};
