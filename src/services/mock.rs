//! Scripted collaborators for tests and offline runs
//!
//! These don't call any external service. Each replays a queue of canned
//! replies so the controller and the feedback loop can be driven
//! deterministically.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::agent::context::Conversation;
use crate::agent::operations::OperationSchema;
use crate::agent::reasoning::{ReasoningService, ReasoningTurn};
use crate::error::{MixerError, Result};
use crate::feedback::judge::{JudgeRequest, Judgment, MixJudge};
use crate::feedback::record::{FeedbackRecord, Suggestion};
use crate::mix::TrackAnalysis;
use crate::services::analysis::FeatureExtractor;
use crate::services::discovery::{DiscoveryQuery, TrackDiscovery};

/// Reasoning service replaying queued turns
///
/// Once the queue is drained it repeats the fallback turn, or fails if
/// there is none.
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    turns: RefCell<VecDeque<Result<ReasoningTurn>>>,
    fallback: Option<ReasoningTurn>,
    requests: Cell<usize>,
}

impl ScriptedReasoner {
    pub fn new(turns: Vec<ReasoningTurn>) -> Self {
        Self {
            turns: RefCell::new(turns.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// Returns the same turn forever
    pub fn repeating(turn: ReasoningTurn) -> Self {
        Self {
            fallback: Some(turn),
            ..Self::default()
        }
    }

    /// Queue a failure after the turns already scripted
    pub fn then_fail(self, reason: &str) -> Self {
        self.turns
            .borrow_mut()
            .push_back(Err(MixerError::dependency("reasoning", reason)));
        self
    }

    /// Number of turns requested so far
    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl ReasoningService for ScriptedReasoner {
    fn next_turn(
        &self,
        _conversation: &Conversation,
        _operations: &[OperationSchema],
    ) -> Result<ReasoningTurn> {
        self.requests.set(self.requests.get() + 1);
        match self.turns.borrow_mut().pop_front() {
            Some(turn) => turn,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| MixerError::dependency("reasoning", "script exhausted")),
        }
    }
}

/// Judge replaying queued judgments
#[derive(Debug, Default)]
pub struct ScriptedJudge {
    judgments: RefCell<VecDeque<Result<Judgment>>>,
}

impl ScriptedJudge {
    pub fn new(judgments: Vec<Judgment>) -> Self {
        Self {
            judgments: RefCell::new(judgments.into_iter().map(Ok).collect()),
        }
    }

    /// Structured judgments with the given ratings, each suggesting a
    /// small volume cut
    pub fn ratings(ratings: &[u8]) -> Self {
        Self::new(
            ratings
                .iter()
                .map(|rating| {
                    Judgment::Structured(FeedbackRecord::rated(*rating, "scripted").with_suggestion(
                        Suggestion::new("volume_adjust", json!({"gain_db": -1.0}), "scripted"),
                    ))
                })
                .collect(),
        )
    }

    pub fn then_fail(self, reason: &str) -> Self {
        self.judgments
            .borrow_mut()
            .push_back(Err(MixerError::dependency("judge", reason)));
        self
    }
}

impl MixJudge for ScriptedJudge {
    fn judge(&self, _request: &JudgeRequest) -> Result<Judgment> {
        self.judgments
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(MixerError::dependency("judge", "script exhausted")))
    }
}

/// Extractor returning fixed analyses keyed by file name
///
/// Unknown files that exist get a default analysis; missing files fail.
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    analyses: HashMap<String, TrackAnalysis>,
}

impl StaticExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_analysis(mut self, file_name: &str, analysis: TrackAnalysis) -> Self {
        self.analyses.insert(file_name.to_string(), analysis);
        self
    }
}

impl FeatureExtractor for StaticExtractor {
    fn analyze(&self, path: &Path) -> Result<TrackAnalysis> {
        if !path.exists() {
            return Err(MixerError::NotFound {
                path: path.display().to_string(),
            });
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut analysis = self
            .analyses
            .get(&file_name)
            .cloned()
            .unwrap_or_else(|| TrackAnalysis::for_path(path.display().to_string()));
        analysis.file_path = path.display().to_string();
        Ok(analysis)
    }
}

/// Discovery that downloads nothing, or hands back preset files
#[derive(Debug, Clone, Default)]
pub struct NullDiscovery {
    files: Vec<PathBuf>,
}

impl NullDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(files: Vec<PathBuf>) -> Self {
        Self { files }
    }
}

impl TrackDiscovery for NullDiscovery {
    fn discover(&self, query: &DiscoveryQuery) -> Vec<PathBuf> {
        self.files.iter().take(query.max_tracks).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::reasoning::OperationCall;

    #[test]
    fn test_scripted_reasoner_replays_then_fails() {
        let reasoner = ScriptedReasoner::new(vec![ReasoningTurn::answer("done")]);
        let conversation = Conversation::new();
        assert!(reasoner.next_turn(&conversation, &[]).unwrap().is_final());
        assert!(reasoner.next_turn(&conversation, &[]).is_err());
        assert_eq!(reasoner.requests(), 2);
    }

    #[test]
    fn test_repeating_reasoner() {
        let turn = ReasoningTurn::calls(vec![OperationCall::new("noop", json!({}))]);
        let reasoner = ScriptedReasoner::repeating(turn.clone());
        let conversation = Conversation::new();
        for _ in 0..3 {
            assert_eq!(reasoner.next_turn(&conversation, &[]).unwrap(), turn);
        }
    }

    #[test]
    fn test_null_discovery_caps_results() {
        let discovery = NullDiscovery::returning(vec![
            PathBuf::from("a.wav"),
            PathBuf::from("b.wav"),
            PathBuf::from("c.wav"),
        ]);
        let mut query = DiscoveryQuery::new("ambient");
        query.max_tracks = 2;
        assert_eq!(discovery.discover(&query).len(), 2);
        assert!(NullDiscovery::new().discover(&query).is_empty());
    }

    #[test]
    fn test_static_extractor_missing_file() {
        let err = StaticExtractor::new()
            .analyze(Path::new("/nonexistent/track.wav"))
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }
}
