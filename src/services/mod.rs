//! External collaborators
//!
//! Track discovery, feature extraction, the chat-completion client used for
//! reasoning and judgment, and export/packaging. `mock` holds scripted
//! stand-ins for all of the trait seams.

pub mod analysis;
pub mod discovery;
pub mod export;
pub mod mock;
pub mod openai;

pub use analysis::{AnalysisEntry, BasicFeatureExtractor, FeatureExtractor};
pub use discovery::{DiscoveryQuery, DiscoveryResult, HttpDiscovery, TrackCandidate, TrackDiscovery};
pub use export::{ExportMetadata, ExportOutcome, Exporter, PackageOutcome};
pub use mock::{NullDiscovery, ScriptedJudge, ScriptedReasoner, StaticExtractor};
pub use openai::OpenAiClient;
