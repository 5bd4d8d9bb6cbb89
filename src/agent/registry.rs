//! Operation dispatch
//!
//! Owns the collaborators every operation needs and the little state that
//! flows between pipeline stages: analyses by path and the latest mix.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::{info, warn};

use super::operations::{AnalysisArgs, ExportArgs, ImprovementArgs, Operation};
use super::reasoning::OperationCall;
use crate::config::MixerConfig;
use crate::error::Result;
use crate::feedback::{ImprovementLoop, MixJudge};
use crate::mix::{MixGenerator, MixOutcome, MixRequest, TrackAnalysis};
use crate::services::analysis::FeatureExtractor;
use crate::services::discovery::{DiscoveryResult, TrackDiscovery};
use crate::services::export::{ExportMetadata, Exporter};

pub struct ToolRegistry {
    config: MixerConfig,
    discovery: Box<dyn TrackDiscovery>,
    extractor: Box<dyn FeatureExtractor>,
    judge: Box<dyn MixJudge>,
    generator: MixGenerator,
    exporter: Exporter,
    analyses: HashMap<String, TrackAnalysis>,
    last_mix: Option<MixOutcome>,
}

impl ToolRegistry {
    pub fn new(
        config: &MixerConfig,
        discovery: Box<dyn TrackDiscovery>,
        extractor: Box<dyn FeatureExtractor>,
        judge: Box<dyn MixJudge>,
    ) -> Self {
        Self {
            config: config.clone(),
            discovery,
            extractor,
            judge,
            generator: MixGenerator::new(config),
            exporter: Exporter::new(config),
            analyses: HashMap::new(),
            last_mix: None,
        }
    }

    /// Most recent successful mix, if any
    pub fn last_mix(&self) -> Option<&MixOutcome> {
        self.last_mix.as_ref()
    }

    /// Decode and run an invocation; failures become error payloads
    pub fn invoke(&mut self, call: &OperationCall) -> Value {
        info!(operation = %call.name, id = %call.id, "invoking operation");
        match Operation::decode(&call.name, &call.arguments).and_then(|op| self.execute(op)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(operation = %call.name, error = %e, "operation failed");
                e.to_payload()
            }
        }
    }

    /// Run a decoded operation
    pub fn execute(&mut self, operation: Operation) -> Result<Value> {
        match operation {
            Operation::MusicDiscovery(query) => {
                let files = self.discovery.discover(&query);
                Ok(serde_json::to_value(DiscoveryResult::new(&query, files))?)
            }
            Operation::BatchAudioAnalysis(args) => self.analyze(args),
            Operation::MixGeneration(request) => self.generate(request),
            Operation::IterativeImprovement(args) => self.improve(args),
            Operation::FinalMixExport(args) => self.export(args),
            Operation::CreateMixPackage(args) => {
                let sources = self
                    .last_mix
                    .as_ref()
                    .map(|mix| mix.sources.clone())
                    .unwrap_or_default();
                let package = self.exporter.create_mix_package(
                    &args.export_result,
                    args.include_source_files,
                    &sources,
                )?;
                Ok(serde_json::to_value(package)?)
            }
        }
    }

    fn analyze(&mut self, args: AnalysisArgs) -> Result<Value> {
        let paths: Vec<PathBuf> = args
            .file_paths
            .iter()
            .map(|p| {
                self.generator
                    .resolve_path(p)
                    .unwrap_or_else(|| PathBuf::from(p))
            })
            .collect();
        let entries = self.extractor.batch_analyze(&paths);

        for (requested, entry) in args.file_paths.iter().zip(&entries) {
            if let Some(analysis) = entry.analysis() {
                self.analyses.insert(requested.clone(), analysis.clone());
                self.analyses
                    .insert(analysis.file_path.clone(), analysis.clone());
            }
        }

        Ok(json!({
            "status": "success",
            "count": entries.len(),
            "analyses": entries,
        }))
    }

    fn generate(&mut self, mut request: MixRequest) -> Result<Value> {
        // Fill missing analyses from earlier analysis runs
        let known = request.analyses.len();
        for path in request.file_paths.iter().skip(known) {
            let analysis = self
                .analyses
                .get(path)
                .cloned()
                .unwrap_or_else(|| TrackAnalysis::for_path(path.as_str()));
            request.analyses.push(analysis);
        }

        let outcome = self.generator.generate_mix(&request)?;
        let payload = serde_json::to_value(&outcome)?;
        self.last_mix = Some(outcome);
        Ok(payload)
    }

    fn improve(&mut self, args: ImprovementArgs) -> Result<Value> {
        let metadata = args.mix_metadata.or_else(|| {
            self.last_mix
                .as_ref()
                .and_then(|mix| serde_json::to_value(&mix.mix_metadata).ok())
        });

        let mut improvement = ImprovementLoop::new(self.judge.as_ref(), &self.config);
        if let Some(requested) = args.max_iterations {
            let budget = self.config.policy.max_iterations;
            let max = requested.min(budget).max(1);
            if max != requested {
                warn!(requested, used = max, "requested iterations outside budget");
            }
            improvement = improvement.with_max_iterations(max);
        }
        let outcome = improvement.run(
            &PathBuf::from(&args.file_path),
            &args.prompt,
            metadata.as_ref(),
        );
        Ok(serde_json::to_value(outcome)?)
    }

    fn export(&mut self, args: ExportArgs) -> Result<Value> {
        if !args.export_format.eq_ignore_ascii_case("wav") {
            warn!(format = %args.export_format, "only WAV export is supported, writing WAV");
        }
        let metadata = self.enrich_metadata(args.metadata, &args.title);
        let outcome = self
            .exporter
            .export_final_mix(&PathBuf::from(&args.file_path), &args.title, &metadata)?;
        Ok(serde_json::to_value(outcome)?)
    }

    /// Fill gaps in export metadata from the latest mix
    fn enrich_metadata(&self, mut metadata: ExportMetadata, title: &str) -> ExportMetadata {
        metadata.title.get_or_insert_with(|| title.to_string());
        if let Some(mix) = &self.last_mix {
            let meta = &mix.mix_metadata;
            metadata.bpm.get_or_insert(meta.final_bpm);
            metadata.genre.get_or_insert_with(|| meta.genre.clone());
            metadata.vibe.get_or_insert_with(|| meta.vibe.clone());
            metadata.tracks_used.get_or_insert(meta.tracks_used);
            metadata
                .mix_style
                .get_or_insert_with(|| meta.mix_style.clone());
            metadata
                .script
                .get_or_insert_with(|| mix.script_text.clone());
        }
        metadata
    }
}
