//! Bounded feedback-improvement loop
//!
//! ```text
//! Evaluating ──rating ≥ threshold──▶ Satisfied
//!     │  ▲
//!     │  └──── applied ────┐
//!     ▼                    │
//! Improving ───────────────┘
//!     │ apply error ─────────────▶ Failed
//! Evaluating ── judge error ─────▶ Failed
//! Evaluating ── budget spent ────▶ Exhausted
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::MixerConfig;
use crate::engine::ExportFormat;
use crate::feedback::apply::apply_feedback_suggestions;
use crate::feedback::judge::{get_mix_feedback, MixJudge};
use crate::feedback::record::FeedbackRecord;

/// Outcome of one evaluate/improve cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Improved,
    Satisfied,
    ImprovementFailed,
    Exhausted,
}

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopTerminal {
    Satisfied,
    Exhausted,
    Failed,
}

/// One entry of the append-only iteration history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub feedback: FeedbackRecord,
    pub rating: u8,
    pub status: IterationStatus,
    #[serde(default)]
    pub applied_changes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mix_path: Option<PathBuf>,
}

/// Summary of a whole improvement run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementOutcome {
    /// "completed" or "failed"
    pub status: String,
    pub terminal: LoopTerminal,
    pub final_mix: PathBuf,
    pub iterations: usize,
    pub iteration_history: Vec<IterationRecord>,
    pub final_rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

enum LoopState {
    Evaluating,
    Improving(FeedbackRecord),
    Done(LoopTerminal),
}

/// Judge, improve, repeat; until satisfied or out of budget
pub struct ImprovementLoop<'a> {
    judge: &'a dyn MixJudge,
    satisfaction_threshold: u8,
    max_iterations: usize,
    temp_dir: PathBuf,
    format: ExportFormat,
}

impl<'a> ImprovementLoop<'a> {
    pub fn new(judge: &'a dyn MixJudge, config: &MixerConfig) -> Self {
        Self {
            judge,
            satisfaction_threshold: config.policy.satisfaction_threshold,
            max_iterations: config.policy.max_iterations,
            temp_dir: config.directories.temp_dir.clone(),
            format: ExportFormat::new(config.audio.sample_rate, config.audio.bit_depth),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_threshold(mut self, satisfaction_threshold: u8) -> Self {
        self.satisfaction_threshold = satisfaction_threshold;
        self
    }

    /// Path of the i-th improved version
    pub fn improved_path(&self, iteration: usize) -> PathBuf {
        self.temp_dir
            .join(format!("mix_improved_v{}.wav", iteration))
    }

    /// Run the loop starting from `initial_mix`
    ///
    /// Never returns an error: collaborator failures end the run in the
    /// `Failed` state with the history gathered so far.
    pub fn run(
        &self,
        initial_mix: &Path,
        prompt: &str,
        mix_metadata: Option<&Value>,
    ) -> ImprovementOutcome {
        let mut current_mix = initial_mix.to_path_buf();
        let mut history: Vec<IterationRecord> = Vec::new();
        let mut failure: Option<String> = None;
        let mut state = LoopState::Evaluating;

        let terminal = loop {
            state = match state {
                LoopState::Evaluating if history.len() >= self.max_iterations => {
                    if let Some(last) = history.last_mut() {
                        last.status = IterationStatus::Exhausted;
                    }
                    LoopState::Done(LoopTerminal::Exhausted)
                }
                LoopState::Evaluating => {
                    let iteration = history.len() + 1;
                    info!(iteration, max = self.max_iterations, "evaluating mix");
                    match get_mix_feedback(self.judge, &current_mix, prompt, mix_metadata) {
                        Err(e) => {
                            warn!(iteration, error = %e, "judgment failed");
                            failure = Some(e.to_string());
                            LoopState::Done(LoopTerminal::Failed)
                        }
                        Ok(report) if report.feedback.overall_rating >= self.satisfaction_threshold => {
                            history.push(IterationRecord {
                                iteration,
                                rating: report.feedback.overall_rating,
                                feedback: report.feedback,
                                status: IterationStatus::Satisfied,
                                applied_changes: Vec::new(),
                                error: None,
                                mix_path: Some(current_mix.clone()),
                            });
                            LoopState::Done(LoopTerminal::Satisfied)
                        }
                        Ok(report) => LoopState::Improving(report.feedback),
                    }
                }
                LoopState::Improving(feedback) => {
                    let iteration = history.len() + 1;
                    let output = self.improved_path(iteration);
                    let rating = feedback.overall_rating;
                    match apply_feedback_suggestions(&current_mix, &feedback, &output, self.format) {
                        Ok(applied) => {
                            info!(iteration, rating, changes = applied.applied_changes.len(), "mix improved");
                            current_mix = applied.output_file.clone();
                            history.push(IterationRecord {
                                iteration,
                                feedback,
                                rating,
                                status: IterationStatus::Improved,
                                applied_changes: applied.applied_changes,
                                error: None,
                                mix_path: Some(applied.output_file),
                            });
                            LoopState::Evaluating
                        }
                        Err(e) => {
                            warn!(iteration, error = %e, "applying suggestions failed");
                            failure = Some(e.to_string());
                            history.push(IterationRecord {
                                iteration,
                                feedback,
                                rating,
                                status: IterationStatus::ImprovementFailed,
                                applied_changes: Vec::new(),
                                error: Some(e.to_string()),
                                mix_path: None,
                            });
                            LoopState::Done(LoopTerminal::Failed)
                        }
                    }
                }
                LoopState::Done(terminal) => break terminal,
            };
        };

        let final_rating = history.last().map(|r| r.rating).unwrap_or(0);
        info!(?terminal, iterations = history.len(), final_rating, "improvement loop finished");

        ImprovementOutcome {
            status: if terminal == LoopTerminal::Failed {
                "failed"
            } else {
                "completed"
            }
            .to_string(),
            terminal,
            final_mix: current_mix,
            iterations: history.len(),
            iteration_history: history,
            final_rating,
            error: failure,
        }
    }
}
