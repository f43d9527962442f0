use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::artifacts::{ArtifactGuard, ArtifactTracker};
use crate::cancel::CancellationToken;
use crate::config::{Config, ThumbnailMode};
use crate::engine::MediaEngine;
use crate::error::{PipelineError, ThumbnailError, TranscodeError};
use crate::probe::{MetadataProber, SourceFile, VideoMetadata};
use crate::profiles::{ProfileTable, Quality};
use crate::state::{JobState, JobStateMachine};
use crate::thumbnail::{Thumbnail, ThumbnailGenerator, ThumbnailSpec};
use crate::transcode::{QualityTranscoder, TranscodeOutcome, TranscodeSettings};
use crate::validation::{ValidationRules, ValidationVerdict, Validator};

/// Whether failed quality variants fail the whole job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityPolicy {
    /// Failed variants are recorded, the job still completes
    #[default]
    BestEffort,

    /// At least one requested variant must succeed
    RequireAny,

    /// Every requested variant must succeed
    RequireAll,
}

impl QualityPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPolicy::BestEffort => "best-effort",
            QualityPolicy::RequireAny => "require-any",
            QualityPolicy::RequireAll => "require-all",
        }
    }

    /// Whether the outcomes of the requested variants satisfy this policy
    pub fn is_satisfied(&self, outcomes: &BTreeMap<Quality, TranscodeOutcome>) -> bool {
        match self {
            QualityPolicy::BestEffort => true,
            QualityPolicy::RequireAny => {
                outcomes.is_empty() || outcomes.values().any(|o| o.succeeded)
            }
            QualityPolicy::RequireAll => outcomes.values().all(|o| o.succeeded),
        }
    }
}

impl std::fmt::Display for QualityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best-effort" => Ok(QualityPolicy::BestEffort),
            "require-any" => Ok(QualityPolicy::RequireAny),
            "require-all" => Ok(QualityPolicy::RequireAll),
            other => Err(format!("Unknown quality policy: {}", other)),
        }
    }
}

/// Which thumbnails a job should end up with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThumbnailPlan {
    None,

    /// Caller already has a thumbnail; it is passed through untouched
    Supplied(PathBuf),

    /// One capture at `offset` seconds
    Single { offset: u64 },

    /// `count` captures evenly spaced across the duration
    Evenly { count: usize },
}

impl ThumbnailPlan {
    /// Capture specs for a source of `duration` seconds
    pub fn specs(&self, generator: &ThumbnailGenerator, duration: u64) -> Vec<ThumbnailSpec> {
        match self {
            ThumbnailPlan::None | ThumbnailPlan::Supplied(_) => Vec::new(),
            ThumbnailPlan::Single { offset } => {
                let timestamp = if *offset >= duration {
                    duration / 2
                } else {
                    *offset
                };
                vec![generator.spec_at(timestamp)]
            }
            ThumbnailPlan::Evenly { count } => generator.evenly_spaced(duration, *count),
        }
    }
}

/// Everything the coordinator needs to run one job
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub source: SourceFile,
    pub video_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
    pub qualities: Vec<Quality>,
    pub thumbnails: ThumbnailPlan,
}

impl JobRequest {
    pub fn new(source: SourceFile, video_dir: PathBuf, thumbnail_dir: PathBuf) -> Self {
        Self {
            source,
            video_dir,
            thumbnail_dir,
            qualities: Vec::new(),
            thumbnails: ThumbnailPlan::None,
        }
    }

    /// Request with the configured directories, default qualities and thumbnail mode
    pub fn from_config(source: SourceFile, config: &Config) -> Result<Self> {
        let thumbnails = match config.thumbnails.mode {
            ThumbnailMode::None => ThumbnailPlan::None,
            ThumbnailMode::Single => ThumbnailPlan::Single {
                offset: config.thumbnails.default_offset_secs,
            },
            ThumbnailMode::Evenly => ThumbnailPlan::Evenly {
                count: config.thumbnails.default_count,
            },
        };

        Ok(Self {
            source,
            video_dir: config.output.video_dir.clone(),
            thumbnail_dir: config.output.thumbnail_dir.clone(),
            qualities: config.transcode.default_quality_list()?,
            thumbnails,
        })
    }

    pub fn with_qualities(mut self, qualities: impl IntoIterator<Item = Quality>) -> Self {
        self.qualities = qualities.into_iter().collect();
        self
    }

    pub fn with_thumbnails(mut self, plan: ThumbnailPlan) -> Self {
        self.thumbnails = plan;
        self
    }

    /// Reject requests that would run no engine work or point at a missing thumbnail
    pub fn check(&self) -> Result<(), PipelineError> {
        let captures = match &self.thumbnails {
            ThumbnailPlan::None => false,
            ThumbnailPlan::Supplied(path) => {
                if !path.is_file() {
                    return Err(PipelineError::InvalidRequest(format!(
                        "supplied thumbnail not found: {}",
                        path.display()
                    )));
                }
                false
            }
            ThumbnailPlan::Single { .. } => true,
            ThumbnailPlan::Evenly { count } => *count > 0,
        };

        if self.qualities.is_empty() && !captures {
            return Err(PipelineError::InvalidRequest(
                "no qualities or thumbnail captures requested".to_string(),
            ));
        }
        Ok(())
    }

    /// Requested qualities in request order, duplicates removed
    pub fn unique_qualities(&self) -> Vec<Quality> {
        let mut seen = Vec::with_capacity(self.qualities.len());
        for quality in &self.qualities {
            if !seen.contains(quality) {
                seen.push(*quality);
            }
        }
        seen
    }
}

/// Aggregate result of a completed job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub source: SourceFile,
    pub metadata: VideoMetadata,
    pub verdict: ValidationVerdict,
    /// Sorted ascending by timestamp
    pub thumbnails: Vec<Thumbnail>,
    pub quality_outcomes: BTreeMap<Quality, TranscodeOutcome>,
    pub processing_time: Duration,
    pub stages_completed: Vec<JobState>,
}

impl ProcessingResult {
    pub fn successful_qualities(&self) -> Vec<Quality> {
        self.quality_outcomes
            .values()
            .filter(|o| o.succeeded)
            .map(|o| o.quality)
            .collect()
    }

    pub fn failed_qualities(&self) -> Vec<Quality> {
        self.quality_outcomes
            .values()
            .filter(|o| !o.succeeded)
            .map(|o| o.quality)
            .collect()
    }

    pub fn primary_thumbnail(&self) -> Option<&Thumbnail> {
        self.thumbnails.first()
    }

    /// Write the result as pretty JSON
    pub async fn save_report(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json_data = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json_data).await?;
        info!("💾 Results saved to: {}", path.display());
        Ok(())
    }
}

/// One unit of work in the processing fan-out
#[derive(Debug, Clone)]
enum Task {
    Thumbnail { spec: ThumbnailSpec, output: PathBuf },
    Quality { quality: Quality, output: PathBuf },
}

#[derive(Debug)]
enum TaskOutcome {
    Thumbnail {
        output: PathBuf,
        result: Result<Thumbnail, ThumbnailError>,
    },
    Quality {
        quality: Quality,
        output: PathBuf,
        result: Result<PathBuf, TranscodeError>,
    },
}

impl TaskOutcome {
    fn cancelled(task: Task) -> Self {
        match task {
            Task::Thumbnail { output, .. } => TaskOutcome::Thumbnail {
                output,
                result: Err(ThumbnailError::Cancelled),
            },
            Task::Quality { quality, output } => TaskOutcome::Quality {
                quality,
                output,
                result: Err(TranscodeError::Cancelled),
            },
        }
    }

    /// Outcome for a task whose worker died without reporting
    fn aborted(task: Task, message: String) -> Self {
        match task {
            Task::Thumbnail { output, .. } => TaskOutcome::Thumbnail {
                output,
                result: Err(ThumbnailError::Io(message)),
            },
            Task::Quality { quality, output } => TaskOutcome::Quality {
                quality,
                output,
                result: Err(TranscodeError::Io(message)),
            },
        }
    }

    fn is_disk_full(&self) -> bool {
        match self {
            TaskOutcome::Thumbnail { result: Err(e), .. } => e.is_disk_full(),
            TaskOutcome::Quality { result: Err(e), .. } => e.is_disk_full(),
            _ => false,
        }
    }
}

/// Sequences probe, validation and the concurrent thumbnail/transcode fan-out for one job
#[derive(Clone)]
pub struct PipelineCoordinator {
    prober: MetadataProber,
    validator: Validator,
    thumbnails: ThumbnailGenerator,
    transcoder: QualityTranscoder,
    max_workers: Option<usize>,
    quality_policy: QualityPolicy,
}

impl PipelineCoordinator {
    pub fn new(config: &Config, engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            prober: MetadataProber::new(Arc::clone(&engine)),
            validator: Validator::new(ValidationRules::from(&config.validation)),
            thumbnails: ThumbnailGenerator::new(Arc::clone(&engine), &config.thumbnails),
            transcoder: QualityTranscoder::new(
                engine,
                Arc::new(ProfileTable::standard()),
                TranscodeSettings::from(&config.transcode),
            ),
            max_workers: config.performance.max_workers,
            quality_policy: config.transcode.quality_policy,
        }
    }

    /// Replace the quality profile table
    pub fn with_profiles(mut self, profiles: ProfileTable) -> Self {
        self.transcoder = self.transcoder.with_profiles(Arc::new(profiles));
        self
    }

    pub fn with_quality_policy(mut self, policy: QualityPolicy) -> Self {
        self.quality_policy = policy;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    pub fn prober(&self) -> &MetadataProber {
        &self.prober
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn quality_policy(&self) -> QualityPolicy {
        self.quality_policy
    }

    /// Concurrency bound for a job with `task_count` tasks
    pub fn worker_limit(&self, task_count: usize) -> usize {
        self.max_workers
            .unwrap_or_else(num_cpus::get)
            .min(task_count)
            .max(1)
    }

    /// Run a job to completion
    pub async fn process(&self, request: JobRequest) -> Result<ProcessingResult, PipelineError> {
        self.process_with_cancel(request, &CancellationToken::new()).await
    }

    /// Run a job, stopping early and removing every artifact once `cancel` fires
    pub async fn process_with_cancel(
        &self,
        request: JobRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, PipelineError> {
        let start_time = Instant::now();
        let mut machine = JobStateMachine::new();
        let source = request.source.clone();

        info!("🚀 Starting job for {}", source.path().display());

        if cancel.is_cancelled() {
            machine.fail();
            return Err(PipelineError::Cancelled);
        }

        if let Err(e) = request.check() {
            error!("❌ {}", e);
            machine.fail();
            return Err(e);
        }

        // Probe
        let metadata = match self.prober.probe(source.path()).await {
            Ok(metadata) => metadata,
            Err(e) => {
                error!("❌ Probe failed for {}: {}", source.path().display(), e);
                machine.fail();
                return Err(e.into());
            }
        };
        machine.advance(JobState::Probed)?;

        // Validate
        let verdict = self.validator.validate(&metadata);
        for warning in &verdict.warnings {
            warn!("⚠️ {}: {}", source.path().display(), warning);
        }
        if !verdict.is_valid {
            error!(
                "❌ Validation failed for {}: {}",
                source.path().display(),
                verdict.errors.join("; ")
            );
            machine.fail();
            return Err(PipelineError::Validation {
                errors: verdict.errors,
                warnings: verdict.warnings,
            });
        }
        machine.advance(JobState::Validated)?;

        if cancel.is_cancelled() {
            machine.fail();
            return Err(PipelineError::Cancelled);
        }

        // Plan and register every output before anything is written
        let specs = request.thumbnails.specs(&self.thumbnails, metadata.duration);
        let qualities = request.unique_qualities();
        let stem = source.stem();
        let mut tracker = ArtifactTracker::new();
        let mut tasks = Vec::with_capacity(specs.len() + qualities.len());

        for (i, spec) in specs.iter().enumerate() {
            let index = (specs.len() > 1).then_some(i + 1);
            let output = self.thumbnails.output_path(&request.thumbnail_dir, index);
            tracker.register(&output);
            tasks.push(Task::Thumbnail {
                spec: *spec,
                output,
            });
        }

        for quality in &qualities {
            let output = self
                .transcoder
                .output_path(&request.video_dir, &stem, *quality);
            tracker.register(&output);
            tasks.push(Task::Quality {
                quality: *quality,
                output,
            });
        }

        // Job-scoped token; the guard fires it if this future is dropped mid-flight
        let job_cancel = cancel.child_token();
        let mut guard = ArtifactGuard::new(tracker, job_cancel.clone());

        machine.advance(JobState::Processing)?;

        let outcomes = self
            .run_tasks(source.path(), metadata.duration, tasks, &job_cancel)
            .await;

        // Fan-in
        let task_count = outcomes.len();
        let disk_full = outcomes.iter().filter(|o| o.is_disk_full()).count();
        let mut thumbnails = Vec::new();
        let mut thumbnail_errors = Vec::new();
        let mut quality_outcomes = BTreeMap::new();
        let mut failed_outputs = Vec::new();

        for outcome in outcomes {
            match outcome {
                TaskOutcome::Thumbnail {
                    result: Ok(thumbnail),
                    ..
                } => thumbnails.push(thumbnail),
                TaskOutcome::Thumbnail {
                    output,
                    result: Err(e),
                } => {
                    failed_outputs.push(output);
                    thumbnail_errors.push(e);
                }
                TaskOutcome::Quality {
                    quality,
                    result: Ok(path),
                    ..
                } => {
                    quality_outcomes.insert(quality, TranscodeOutcome::success(quality, path));
                }
                TaskOutcome::Quality {
                    quality,
                    output,
                    result: Err(e),
                } => {
                    failed_outputs.push(output);
                    quality_outcomes.insert(quality, TranscodeOutcome::failure(quality, e.to_string()));
                }
            }
        }

        if cancel.is_cancelled() {
            warn!("🛑 Job cancelled: {}", source.path().display());
            return Err(Self::abort(&mut machine, &mut guard, PipelineError::Cancelled).await);
        }

        if !source.exists().await {
            let err = PipelineError::Catastrophic {
                reason: format!(
                    "source file disappeared during processing: {}",
                    source.path().display()
                ),
            };
            return Err(Self::abort(&mut machine, &mut guard, err).await);
        }

        if task_count > 0 && disk_full == task_count {
            let err = PipelineError::Catastrophic {
                reason: "no space left on device for any task".to_string(),
            };
            return Err(Self::abort(&mut machine, &mut guard, err).await);
        }

        if !specs.is_empty() && thumbnails.is_empty() {
            let cause = thumbnail_errors
                .into_iter()
                .next()
                .unwrap_or(ThumbnailError::Io("no thumbnail produced".to_string()));
            return Err(Self::abort(&mut machine, &mut guard, PipelineError::Thumbnail(cause)).await);
        }
        if !thumbnail_errors.is_empty() {
            warn!(
                "⚠️ {} of {} thumbnail(s) failed",
                thumbnail_errors.len(),
                specs.len()
            );
        }

        if !self.quality_policy.is_satisfied(&quality_outcomes) {
            let failures = quality_outcomes
                .values()
                .filter(|o| !o.succeeded)
                .map(|o| (o.quality, o.error_message.clone().unwrap_or_default()))
                .collect();
            let err = PipelineError::QualityPolicy {
                policy: self.quality_policy,
                failures,
            };
            return Err(Self::abort(&mut machine, &mut guard, err).await);
        }

        // Only outputs of failed tasks are removed on completion
        guard
            .tracker()
            .remove(failed_outputs.iter().map(PathBuf::as_path))
            .await;
        guard.disarm();

        if let ThumbnailPlan::Supplied(path) = &request.thumbnails {
            thumbnails.push(Thumbnail::supplied(path.clone()));
        }
        thumbnails.sort_by_key(|t| t.timestamp);

        machine.advance(JobState::Completed)?;

        let result = ProcessingResult {
            source,
            metadata,
            verdict,
            thumbnails,
            quality_outcomes,
            processing_time: start_time.elapsed(),
            stages_completed: machine.visited(),
        };

        info!(
            "🎉 Job completed in {:.2}s: {} thumbnail(s), {}/{} qualities",
            result.processing_time.as_secs_f64(),
            result.thumbnails.len(),
            result.successful_qualities().len(),
            result.quality_outcomes.len()
        );

        Ok(result)
    }

    /// Run every task on a bounded pool and wait for all of them to report.
    ///
    /// Tasks live in a `JoinSet`, so dropping this future aborts every one of them.
    async fn run_tasks(
        &self,
        source: &Path,
        duration: u64,
        tasks: Vec<Task>,
        cancel: &CancellationToken,
    ) -> Vec<TaskOutcome> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let workers = self.worker_limit(tasks.len());
        let semaphore = Arc::new(Semaphore::new(workers));
        info!("⚡ Launching {} task(s) on {} worker(s)", tasks.len(), workers);

        let mut join_set = JoinSet::new();
        for (index, task) in tasks.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let generator = self.thumbnails.clone();
            let transcoder = self.transcoder.clone();
            let source = source.to_path_buf();
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, TaskOutcome::cancelled(task)),
                };

                let outcome = match task {
                    Task::Thumbnail { spec, output } => {
                        let result = generator.generate(&source, &spec, &output, &cancel).await;
                        TaskOutcome::Thumbnail { output, result }
                    }
                    Task::Quality { quality, output } => {
                        let result = transcoder
                            .transcode(&source, quality, &output, duration, &cancel)
                            .await;
                        TaskOutcome::Quality {
                            quality,
                            output,
                            result,
                        }
                    }
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<TaskOutcome>> = tasks.iter().map(|_| None).collect();
        let mut worker_failure = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => {
                    error!("Worker task failed: {}", e);
                    worker_failure = Some(format!("worker task failed: {}", e));
                }
            }
        }

        tasks
            .into_iter()
            .zip(slots)
            .map(|(task, slot)| match slot {
                Some(outcome) => outcome,
                None => TaskOutcome::aborted(
                    task,
                    worker_failure
                        .clone()
                        .unwrap_or_else(|| "worker task failed".to_string()),
                ),
            })
            .collect()
    }

    /// Remove every tracked artifact and move the job to `Failed`
    async fn abort(
        machine: &mut JobStateMachine,
        guard: &mut ArtifactGuard,
        err: PipelineError,
    ) -> PipelineError {
        let report = guard.tracker().remove_all().await;
        guard.disarm();
        if !report.is_clean() {
            warn!("🧹 {} artifact(s) could not be removed", report.failed.len());
        }
        debug!("Aborting job after cleanup of {} file(s)", report.removed.len());
        machine.fail();
        error!("❌ Job failed during {}: {}", err.stage(), err);
        err
    }
}

/// Parse a comma separated or repeated list of quality names
pub fn parse_qualities<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Vec<Quality>> {
    names
        .into_iter()
        .flat_map(|name| name.split(','))
        .filter(|name| !name.trim().is_empty())
        .map(|name| name.parse::<Quality>().map_err(|e| anyhow!(e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::engine::FfmpegEngine;

    fn coordinator(workers: Option<usize>) -> PipelineCoordinator {
        let mut builder = ConfigBuilder::new();
        if let Some(workers) = workers {
            builder = builder.with_workers(workers);
        }
        PipelineCoordinator::new(&builder.build(), Arc::new(FfmpegEngine::default()))
    }

    fn generator() -> ThumbnailGenerator {
        ThumbnailGenerator::new(
            Arc::new(FfmpegEngine::default()),
            &crate::config::ThumbnailConfig::default(),
        )
    }

    #[test]
    fn test_worker_limit() {
        assert_eq!(coordinator(Some(4)).worker_limit(2), 2);
        assert_eq!(coordinator(Some(4)).worker_limit(10), 4);
        assert_eq!(coordinator(Some(4)).worker_limit(0), 1);
        assert!(coordinator(None).worker_limit(64) <= num_cpus::get());
    }

    #[test]
    fn test_quality_policy_parsing() {
        assert_eq!("best-effort".parse::<QualityPolicy>(), Ok(QualityPolicy::BestEffort));
        assert_eq!("Require-All".parse::<QualityPolicy>(), Ok(QualityPolicy::RequireAll));
        assert!("strict".parse::<QualityPolicy>().is_err());
        assert_eq!(QualityPolicy::RequireAny.to_string(), "require-any");
    }

    #[test]
    fn test_quality_policy_satisfaction() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert(Quality::P360, TranscodeOutcome::failure(Quality::P360, "x"));
        outcomes.insert(Quality::P720, TranscodeOutcome::failure(Quality::P720, "y"));

        assert!(QualityPolicy::BestEffort.is_satisfied(&outcomes));
        assert!(!QualityPolicy::RequireAny.is_satisfied(&outcomes));

        outcomes.insert(
            Quality::P720,
            TranscodeOutcome::success(Quality::P720, PathBuf::from("/v/720.mp4")),
        );
        assert!(QualityPolicy::RequireAny.is_satisfied(&outcomes));
        assert!(!QualityPolicy::RequireAll.is_satisfied(&outcomes));
        assert!(QualityPolicy::RequireAny.is_satisfied(&BTreeMap::new()));
    }

    #[test]
    fn test_single_offset_clamped_to_middle() {
        let generator = generator();
        let inside = ThumbnailPlan::Single { offset: 5 }.specs(&generator, 120);
        assert_eq!(inside[0].timestamp, 5);

        let past_end = ThumbnailPlan::Single { offset: 5 }.specs(&generator, 3);
        assert_eq!(past_end[0].timestamp, 1);
    }

    #[test]
    fn test_plan_specs() {
        let generator = generator();
        let stamps: Vec<u64> = ThumbnailPlan::Evenly { count: 3 }
            .specs(&generator, 900)
            .iter()
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(stamps, vec![225, 450, 675]);
        assert!(ThumbnailPlan::None.specs(&generator, 900).is_empty());
        assert!(ThumbnailPlan::Supplied(PathBuf::from("/t.jpg"))
            .specs(&generator, 900)
            .is_empty());
    }

    #[test]
    fn test_duplicate_qualities_collapsed() {
        let request = JobRequest::new(
            SourceFile::new(PathBuf::from("/in.mp4"), 1),
            PathBuf::from("/v"),
            PathBuf::from("/t"),
        )
        .with_qualities([Quality::P720, Quality::P360, Quality::P720]);
        assert_eq!(request.unique_qualities(), vec![Quality::P720, Quality::P360]);
    }

    #[test]
    fn test_parse_qualities() {
        assert_eq!(
            parse_qualities(["360p,720p", "1080p"]).unwrap(),
            vec![Quality::P360, Quality::P720, Quality::P1080]
        );
        assert!(parse_qualities(["4k"]).is_err());
    }

    #[test]
    fn test_request_without_work_is_rejected() {
        let request = JobRequest::new(
            SourceFile::new(PathBuf::from("/in.mp4"), 1),
            PathBuf::from("/v"),
            PathBuf::from("/t"),
        );
        assert!(matches!(request.check(), Err(PipelineError::InvalidRequest(_))));

        let zero_captures = request.clone().with_thumbnails(ThumbnailPlan::Evenly { count: 0 });
        assert!(zero_captures.check().is_err());

        let missing_poster = request
            .clone()
            .with_qualities([Quality::P360])
            .with_thumbnails(ThumbnailPlan::Supplied(PathBuf::from("/no/such/poster.jpg")));
        assert!(matches!(missing_poster.check(), Err(PipelineError::InvalidRequest(_))));

        assert!(request
            .clone()
            .with_thumbnails(ThumbnailPlan::Single { offset: 5 })
            .check()
            .is_ok());
        assert!(request.with_qualities([Quality::P720]).check().is_ok());
    }

    #[test]
    fn test_from_config_follows_thumbnail_mode() {
        let source = SourceFile::new(PathBuf::from("/in.mp4"), 1);
        let mut config = Config::default();

        let request = JobRequest::from_config(source.clone(), &config).unwrap();
        assert_eq!(request.thumbnails, ThumbnailPlan::Evenly { count: 3 });
        assert_eq!(request.qualities, vec![Quality::P360, Quality::P720]);

        config.thumbnails.mode = ThumbnailMode::Single;
        let request = JobRequest::from_config(source.clone(), &config).unwrap();
        assert_eq!(request.thumbnails, ThumbnailPlan::Single { offset: 5 });

        config.thumbnails.mode = ThumbnailMode::None;
        let request = JobRequest::from_config(source, &config).unwrap();
        assert_eq!(request.thumbnails, ThumbnailPlan::None);
    }
}
