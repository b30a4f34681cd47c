// THEORY:
// The `processor` module is the top-level orchestrator of the engine. For
// every classifier it runs the full sweep: each corpus image is predicted
// once in its original form, then re-predicted after a lossy wavelet round
// trip at every depth up to the configured ceiling. The module's real job
// is not the loop but the containment around it.
//
// Key architectural principles:
// 1.  **Supervisor/worker handoff**: each classifier's sweep runs on a
//     blocking worker that streams every completed `DepthResult` back over
//     a channel. The supervisor drains the channel under a deadline, so
//     when the budget expires it already holds everything the worker
//     finished. A forced reclaim never loses completed work.
// 2.  **Classifier-level budget**: the deadline is checked between images
//     in the worker (cooperative stop) AND enforced on the channel drain
//     (hard stop), so a single pathologically slow inference call cannot
//     extend the budget, only waste the remainder of it.
// 3.  **Crash containment**: inference runs under `catch_unwind`. A panic
//     inside one classifier's model marks that classifier's summaries
//     `Failed` and the batch moves on. One bad model never erases another
//     model's finished results.
// 4.  **No shared mutable state**: each sweep owns its accumulator; the
//     configuration is an immutable value fixed at construction, so
//     processors with different configurations coexist freely.

use crate::core_modules::classifier::{
    self, ClassifierHandle, ClassifierSet, Interpolation, Prediction,
};
use crate::core_modules::corpus;
use crate::core_modules::wavelet::WaveletCoder;
use crate::error::{Error, Result};
use crate::parallel_sweep;
use crate::result_manager::{DepthResult, ResultManager, RunStatus, Summary};
use chrono::Utc;
use log::{info, warn};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

/// Immutable configuration for a processor's lifetime.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Corpus root: a flat folder of image files.
    pub data_folder: PathBuf,
    /// Destination for persisted summaries.
    pub results_folder: PathBuf,
    /// Depth ceiling; each sweep covers depths 1..=transform_depth.
    pub transform_depth: u32,
    /// K for Top-K comparison.
    pub top_classes: usize,
    /// Resize strategy for adapting images to model input shapes.
    pub interpolation: Interpolation,
    /// Image-level sweep parallelism. 1 = sequential; 0 = one worker per
    /// available CPU.
    pub workers: usize,
}

/// Call shape for `process_classifiers`. A named set is the supported
/// input; a bare handle is constructible (so the misuse is observable)
/// but always rejected.
pub enum ClassifierInput {
    Named(ClassifierSet),
    Bare(ClassifierHandle),
}

impl From<ClassifierSet> for ClassifierInput {
    fn from(set: ClassifierSet) -> Self {
        ClassifierInput::Named(set)
    }
}

impl From<ClassifierHandle> for ClassifierInput {
    fn from(handle: ClassifierHandle) -> Self {
        ClassifierInput::Bare(handle)
    }
}

/// Runs classifiers over the corpus at every compression depth, with
/// per-classifier budget enforcement and failure isolation.
pub struct ClassifierProcessor {
    config: ProcessorConfig,
    coder: Arc<dyn WaveletCoder>,
    result_manager: ResultManager,
}

impl ClassifierProcessor {
    pub fn new(
        config: ProcessorConfig,
        coder: Arc<dyn WaveletCoder>,
        result_manager: ResultManager,
    ) -> Result<Self> {
        if config.transform_depth == 0 {
            return Err(Error::usage("transform_depth must be positive"));
        }
        if config.top_classes == 0 {
            return Err(Error::usage("top_classes must be positive"));
        }
        Ok(Self {
            config,
            coder,
            result_manager,
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Runs every classifier in the named set, in insertion order, each
    /// under its own `timeout` budget. Returns the per-depth summaries of
    /// every classifier that ran, in processing order; each summary is
    /// also persisted. A bare handle is a usage error: this entry point's
    /// contract is "one or more named classifiers".
    pub async fn process_classifiers(
        &self,
        input: impl Into<ClassifierInput>,
        timeout: Duration,
    ) -> Result<Vec<(String, Vec<Summary>)>> {
        let set = match input.into() {
            ClassifierInput::Named(set) => set,
            ClassifierInput::Bare(_) => {
                return Err(Error::usage(
                    "process_classifiers requires a name -> classifier mapping; \
                     use process_single_classifier for one named handle",
                ));
            }
        };
        if set.is_empty() {
            return Ok(Vec::new());
        }
        let corpus = Arc::new(corpus::list_corpus(&self.config.data_folder)?);
        let mut processed = Vec::with_capacity(set.len());
        for (name, handle) in set {
            let summaries = self.run_classifier(&name, handle, &corpus, timeout).await?;
            processed.push((name, summaries));
        }
        Ok(processed)
    }

    /// Runs exactly one classifier under `timeout` and returns its
    /// per-depth summaries directly. An empty name is the name-less call
    /// shape and is a usage error.
    pub async fn process_single_classifier(
        &self,
        name: &str,
        classifier: ClassifierHandle,
        timeout: Duration,
    ) -> Result<Vec<Summary>> {
        if name.is_empty() {
            return Err(Error::usage(
                "process_single_classifier requires a classifier name",
            ));
        }
        let corpus = Arc::new(corpus::list_corpus(&self.config.data_folder)?);
        self.run_classifier(name, classifier, &corpus, timeout).await
    }

    /// One classifier's supervised sweep: spawn the worker, drain its
    /// results under the deadline, fold whatever arrived into per-depth
    /// summaries, persist them.
    async fn run_classifier(
        &self,
        name: &str,
        handle: ClassifierHandle,
        corpus: &Arc<Vec<PathBuf>>,
        timeout: Duration,
    ) -> Result<Vec<Summary>> {
        info!(
            "sweep start: classifier '{name}', {} images, depths 1..={}, budget {:.1}s",
            corpus.len(),
            self.config.transform_depth,
            timeout.as_secs_f64()
        );
        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = start + timeout;
        let drain_deadline = tokio::time::Instant::now() + timeout;

        let ctx = Arc::new(SweepContext {
            classifier_name: name.to_string(),
            handle,
            coder: Arc::clone(&self.coder),
            interpolation: self.config.interpolation,
            transform_depth: self.config.transform_depth,
            top_classes: self.config.top_classes,
        });
        let (tx, mut rx) = unbounded_channel();
        if self.config.workers == 1 {
            let ctx = Arc::clone(&ctx);
            let corpus = Arc::clone(corpus);
            tokio::task::spawn_blocking(move || sequential_sweep(&ctx, &corpus, deadline, &tx));
        } else {
            let workers = match self.config.workers {
                0 => num_cpus::get(),
                n => n,
            };
            tokio::spawn(parallel_sweep::run(
                Arc::clone(&ctx),
                Arc::clone(corpus),
                deadline,
                tx,
                workers,
            ));
        }

        let mut collected: Vec<(usize, u32, DepthResult)> = Vec::new();
        let mut finished = false;
        let mut failure: Option<String> = None;
        loop {
            match tokio::time::timeout_at(drain_deadline, rx.recv()).await {
                Ok(Some(SweepMessage::Result {
                    corpus_index,
                    depth,
                    result,
                })) => collected.push((corpus_index, depth, result)),
                Ok(Some(SweepMessage::Finished)) => {
                    finished = true;
                    break;
                }
                Ok(Some(SweepMessage::TimedOut)) => break,
                Ok(Some(SweepMessage::Failed(reason))) => {
                    failure = Some(reason);
                    break;
                }
                Ok(None) => {
                    failure = Some("sweep worker terminated unexpectedly".to_string());
                    break;
                }
                Err(_) => break, // budget exhausted while the worker was still busy
            }
        }

        let status = if let Some(reason) = &failure {
            warn!("classifier '{name}' failed: {reason}");
            RunStatus::Failed
        } else if finished {
            RunStatus::Complete
        } else {
            warn!(
                "classifier '{name}' exceeded its {:.1}s budget; keeping partial results",
                timeout.as_secs_f64()
            );
            RunStatus::TimedOut
        };

        let summaries = self.fold_summaries(name, started_at, start.elapsed(), status, collected);
        for summary in &summaries {
            self.result_manager
                .save_summary(&self.config.results_folder, summary)?;
        }
        info!(
            "sweep end: classifier '{name}' {status:?} in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        Ok(summaries)
    }

    /// Groups streamed results into one summary per depth, normalized to
    /// corpus order regardless of completion order. Failed sweeps carry no
    /// image-level data.
    fn fold_summaries(
        &self,
        name: &str,
        started_at: chrono::DateTime<Utc>,
        elapsed: Duration,
        status: RunStatus,
        collected: Vec<(usize, u32, DepthResult)>,
    ) -> Vec<Summary> {
        let ceiling = self.config.transform_depth as usize;
        let mut per_depth: Vec<Vec<(usize, DepthResult)>> = vec![Vec::new(); ceiling];
        if status != RunStatus::Failed {
            for (corpus_index, depth, result) in collected {
                per_depth[depth as usize - 1].push((corpus_index, result));
            }
        }
        per_depth
            .into_iter()
            .enumerate()
            .map(|(i, mut results)| {
                results.sort_by_key(|(corpus_index, _)| *corpus_index);
                Summary {
                    classifier: name.to_string(),
                    depth: i as u32 + 1,
                    corpus: self.config.data_folder.display().to_string(),
                    started_at,
                    duration_secs: elapsed.as_secs_f64(),
                    status,
                    results: results.into_iter().map(|(_, result)| result).collect(),
                }
            })
            .collect()
    }
}

/// Everything a sweep worker needs, fixed for the classifier's run.
pub(crate) struct SweepContext {
    pub(crate) classifier_name: String,
    pub(crate) handle: ClassifierHandle,
    pub(crate) coder: Arc<dyn WaveletCoder>,
    pub(crate) interpolation: Interpolation,
    pub(crate) transform_depth: u32,
    pub(crate) top_classes: usize,
}

/// Worker -> supervisor handoff.
pub(crate) enum SweepMessage {
    Result {
        corpus_index: usize,
        depth: u32,
        result: DepthResult,
    },
    /// Every image processed.
    Finished,
    /// Cooperative stop: the worker saw the deadline pass between images.
    TimedOut,
    /// The sweep aborted (image unreadable, inference error, panic).
    Failed(String),
}

/// Default sweep: images in corpus order, deadline checked between images.
pub(crate) fn sequential_sweep(
    ctx: &SweepContext,
    corpus: &[PathBuf],
    deadline: Instant,
    tx: &UnboundedSender<SweepMessage>,
) {
    for (corpus_index, path) in corpus.iter().enumerate() {
        if Instant::now() >= deadline {
            let _ = tx.send(SweepMessage::TimedOut);
            return;
        }
        match sweep_image(ctx, path) {
            Ok(rows) => {
                for (depth, result) in rows {
                    let sent = tx.send(SweepMessage::Result {
                        corpus_index,
                        depth,
                        result,
                    });
                    if sent.is_err() {
                        return; // supervisor already gave up on us
                    }
                }
            }
            Err(reason) => {
                let _ = tx.send(SweepMessage::Failed(reason));
                return;
            }
        }
    }
    let _ = tx.send(SweepMessage::Finished);
}

/// The per-image unit of work shared by the sequential and parallel
/// sweeps: predict the original exactly once, then one reconstruction and
/// prediction per depth.
pub(crate) fn sweep_image(
    ctx: &SweepContext,
    path: &Path,
) -> std::result::Result<Vec<(u32, DepthResult)>, String> {
    let image = corpus::load_image(path).map_err(|e| e.to_string())?;
    let image_id = corpus::image_id(path);
    let shape = ctx.handle.input_shape();

    let original_input = classifier::preprocess(&image, shape, ctx.interpolation);
    let original_ranked = guarded_predict(ctx, &original_input)?;
    let original_top = classifier::top_k(&original_ranked, ctx.top_classes);

    let mut rows = Vec::with_capacity(ctx.transform_depth as usize);
    for depth in 1..=ctx.transform_depth {
        let coder_start = Instant::now();
        let reconstructed = ctx.coder.encode_decode(&image, depth);
        let encode_decode_ms = coder_start.elapsed().as_secs_f64() * 1000.0;

        let input = classifier::preprocess(&reconstructed, shape, ctx.interpolation);
        let ranked = guarded_predict(ctx, &input)?;
        rows.push((
            depth,
            DepthResult {
                image: image_id.clone(),
                original_top: original_top.clone(),
                reconstructed_top: classifier::top_k(&ranked, ctx.top_classes),
                encode_decode_ms,
            },
        ));
    }
    Ok(rows)
}

/// Runs inference with panic containment. A panic inside a model is
/// reported like any other inference failure.
fn guarded_predict(
    ctx: &SweepContext,
    image: &image::DynamicImage,
) -> std::result::Result<Vec<Prediction>, String> {
    match catch_unwind(AssertUnwindSafe(|| ctx.handle.predict(image))) {
        Ok(Ok(ranked)) => Ok(ranked),
        Ok(Err(e)) => Err(Error::inference(&ctx.classifier_name, e.to_string()).to_string()),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic during inference".to_string());
            Err(Error::inference(&ctx.classifier_name, reason).to_string())
        }
    }
}
