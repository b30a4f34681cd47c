// THEORY:
// The `result_manager` module translates between persisted summaries and
// in-memory comparison tables. It knows nothing about wavelets or models;
// it sees ranked label lists and files on disk.
//
// Key architectural principles:
// 1.  **One artifact per (classifier, depth)**: each summary is a single
//     JSON document, independently loadable. A comparison never has to
//     page in anything it was not asked about.
// 2.  **Explicit gaps**: a comparison over a classifier with no usable
//     summary fails loudly, naming the classifier and depth. Missing data
//     is never averaged in as zero agreement, and a `Failed` run (which
//     carries no image-level data) is treated exactly like an absent file.
// 3.  **Order preservation**: the comparison table keeps its rows in the
//     order classifiers were requested, which is the order they were
//     processed, so extracted metric columns line up run over run.

use crate::core_modules::classifier::Prediction;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Metric column: mean per-image Top-K overlap, as a percentage.
pub const SIMILAR_CLASSES_PCT: &str = "similar classes (%)";
/// Metric column: fraction of images whose rank-1 class is unchanged.
pub const SIMILAR_BEST_CLASS: &str = "similar best class";

/// Outcome of one classifier's sweep at one depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every corpus image was processed within budget.
    Complete,
    /// The wall-clock budget expired mid-sweep; results are a prefix of
    /// the corpus.
    TimedOut,
    /// The sweep aborted (inference failure); no usable image data.
    Failed,
}

/// One image's predictions at one depth: the Top-K on the original frame
/// next to the Top-K on the depth-reconstructed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthResult {
    /// Corpus image identifier (file name).
    pub image: String,
    pub original_top: Vec<Prediction>,
    pub reconstructed_top: Vec<Prediction>,
    /// Wall time of the wavelet round trip for this image.
    pub encode_decode_ms: f64,
}

/// Persisted record of one classifier's predictions across one corpus at
/// one depth. Immutable once written; re-running the same (classifier,
/// depth) overwrites the whole artifact, never merges into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub classifier: String,
    pub depth: u32,
    /// Corpus identity: the data folder the run iterated.
    pub corpus: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub status: RunStatus,
    /// Per-image results, in corpus order.
    pub results: Vec<DepthResult>,
}

impl Summary {
    /// Whether the comparison layer may read image-level data out of this
    /// summary. `Failed` runs carry none.
    pub fn is_usable(&self) -> bool {
        matches!(self.status, RunStatus::Complete | RunStatus::TimedOut) && !self.results.is_empty()
    }
}

/// Aggregated agreement metrics for one classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonRow {
    /// Mean per-image Top-K overlap, 0..=100.
    pub similar_classes_pct: f64,
    /// Fraction of images whose best class is unchanged, 0..=1.
    pub similar_best_class: f64,
}

/// Ordered classifier -> row mapping; row order is request order.
#[derive(Debug, Clone, Default)]
pub struct ComparisonTable {
    rows: Vec<(String, ComparisonRow)>,
}

impl ComparisonTable {
    pub fn rows(&self) -> &[(String, ComparisonRow)] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn push(&mut self, name: String, row: ComparisonRow) {
        self.rows.push((name, row));
    }
}

/// Strategy for collapsing an ordered sequence of per-depth metric values
/// into one value per classifier. A single-depth request is just a
/// one-element sequence under any reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Mean,
    Median,
    Max,
}

impl Reducer {
    fn reduce(self, values: &[f64]) -> f64 {
        match self {
            Reducer::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Reducer::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            Reducer::Max => values.iter().copied().fold(f64::MIN, f64::max),
        }
    }
}

/// Stateless persistence/aggregation collaborator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultManager;

impl ResultManager {
    pub fn new() -> Self {
        Self
    }

    /// Artifact path for one (classifier, depth).
    pub fn summary_path(&self, folder: &Path, classifier: &str, depth: u32) -> PathBuf {
        folder.join(format!("{classifier}_depth_{depth}.json"))
    }

    /// Writes one summary, overwriting any previous artifact for the same
    /// (classifier, depth). Returns the path written.
    pub fn save_summary(&self, folder: &Path, summary: &Summary) -> Result<PathBuf> {
        std::fs::create_dir_all(folder)?;
        let path = self.summary_path(folder, &summary.classifier, summary.depth);
        let json = serde_json::to_string_pretty(summary)
            .map_err(|e| Error::corrupt(path.display().to_string(), e.to_string()))?;
        std::fs::write(&path, json)?;
        info!(
            "saved summary '{}' depth {} ({:?}, {} images) to {}",
            summary.classifier,
            summary.depth,
            summary.status,
            summary.results.len(),
            path.display()
        );
        Ok(path)
    }

    /// Loads one summary independently of any other artifact.
    pub fn load_summary(&self, folder: &Path, classifier: &str, depth: u32) -> Result<Summary> {
        let path = self.summary_path(folder, classifier, depth);
        if !path.is_file() {
            return Err(Error::not_found(format!(
                "summary for '{classifier}' at depth {depth} under '{}'",
                folder.display()
            )));
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::corrupt(path.display().to_string(), e.to_string()))
    }

    /// Reduces stored summaries into one row of agreement metrics per
    /// requested classifier. Row order follows `classifiers`. A classifier
    /// with no usable summary at any requested depth is a hard error, not
    /// a silently dropped row.
    pub fn compare_summaries(
        &self,
        folder: &Path,
        classifiers: &[String],
        depths: &[u32],
        reducer: Reducer,
    ) -> Result<ComparisonTable> {
        if depths.is_empty() {
            return Err(Error::usage("compare_summaries requires at least one depth"));
        }
        let mut table = ComparisonTable::default();
        for name in classifiers {
            let mut overlap_by_depth = Vec::with_capacity(depths.len());
            let mut best_by_depth = Vec::with_capacity(depths.len());
            for &depth in depths {
                let summary = match self.load_summary(folder, name, depth) {
                    Ok(summary) => summary,
                    Err(Error::NotFound(_)) => return Err(Error::missing_data(name, depth)),
                    Err(e) => return Err(e),
                };
                if !summary.is_usable() {
                    return Err(Error::missing_data(name, depth));
                }
                let (overlap, best) = agreement(&summary);
                overlap_by_depth.push(overlap);
                best_by_depth.push(best);
            }
            debug!(
                "comparison '{name}': per-depth overlap {overlap_by_depth:?}, best {best_by_depth:?}"
            );
            table.push(
                name.clone(),
                ComparisonRow {
                    similar_classes_pct: reducer.reduce(&overlap_by_depth),
                    similar_best_class: reducer.reduce(&best_by_depth),
                },
            );
        }
        Ok(table)
    }

    /// Projects one metric column out of a table as parallel (names,
    /// values) sequences in row order.
    pub fn extract_from_comparison(
        &self,
        table: &ComparisonTable,
        metric: &str,
    ) -> Result<(Vec<String>, Vec<f64>)> {
        let select: fn(&ComparisonRow) -> f64 = match metric {
            SIMILAR_CLASSES_PCT => |row| row.similar_classes_pct,
            SIMILAR_BEST_CLASS => |row| row.similar_best_class,
            other => return Err(Error::UnknownMetric(other.to_string())),
        };
        let names = table.rows().iter().map(|(name, _)| name.clone()).collect();
        let values = table.rows().iter().map(|(_, row)| select(row)).collect();
        Ok((names, values))
    }
}

/// Per-summary agreement: (mean Top-K overlap %, rank-1 match fraction),
/// over the images the summary actually covers.
fn agreement(summary: &Summary) -> (f64, f64) {
    let mut overlap_sum = 0.0;
    let mut best_matches = 0usize;
    for result in &summary.results {
        let k = result.original_top.len().max(1);
        let original: HashSet<&str> = result
            .original_top
            .iter()
            .map(|p| p.label.as_str())
            .collect();
        let shared = result
            .reconstructed_top
            .iter()
            .filter(|p| original.contains(p.label.as_str()))
            .count();
        overlap_sum += shared as f64 / k as f64 * 100.0;

        let best_unchanged = match (result.original_top.first(), result.reconstructed_top.first()) {
            (Some(a), Some(b)) => a.label == b.label,
            _ => false,
        };
        if best_unchanged {
            best_matches += 1;
        }
    }
    let n = summary.results.len() as f64;
    (overlap_sum / n, best_matches as f64 / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::classifier::Prediction;

    fn top(labels: &[&str]) -> Vec<Prediction> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| Prediction::new(*label, 1.0 - i as f32 * 0.1))
            .collect()
    }

    fn summary(classifier: &str, depth: u32, results: Vec<DepthResult>) -> Summary {
        Summary {
            classifier: classifier.to_string(),
            depth,
            corpus: "/data/test".to_string(),
            started_at: Utc::now(),
            duration_secs: 1.25,
            status: RunStatus::Complete,
            results,
        }
    }

    fn result(image: &str, original: &[&str], reconstructed: &[&str]) -> DepthResult {
        DepthResult {
            image: image.to_string(),
            original_top: top(original),
            reconstructed_top: top(reconstructed),
            encode_decode_ms: 0.5,
        }
    }

    #[test]
    fn save_then_load_round_trips_field_for_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ResultManager::new();
        let written = summary(
            "VGG19",
            5,
            vec![result("a.png", &["cat", "dog"], &["cat", "fox"])],
        );
        manager.save_summary(dir.path(), &written).expect("save");
        let loaded = manager.load_summary(dir.path(), "VGG19", 5).expect("load");
        assert_eq!(loaded, written);
    }

    #[test]
    fn load_of_absent_summary_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ResultManager::new()
            .load_summary(dir.path(), "VGG19", 5)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn load_of_garbage_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ResultManager::new();
        let path = manager.summary_path(dir.path(), "VGG19", 5);
        std::fs::write(&path, "not json at all").expect("write");
        let err = manager.load_summary(dir.path(), "VGG19", 5).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn comparison_names_the_missing_classifier() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ResultManager::new();
        manager
            .save_summary(
                dir.path(),
                &summary("VGG19", 5, vec![result("a.png", &["cat"], &["cat"])]),
            )
            .expect("save");
        let err = manager
            .compare_summaries(
                dir.path(),
                &["VGG19".to_string(), "ResNet50".to_string()],
                &[5],
                Reducer::Mean,
            )
            .unwrap_err();
        match err {
            Error::MissingData { classifier, depth } => {
                assert_eq!(classifier, "ResNet50");
                assert_eq!(depth, 5);
            }
            other => panic!("expected MissingData, got {other:?}"),
        }
    }

    #[test]
    fn failed_summary_is_a_gap_not_zero_agreement() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ResultManager::new();
        let mut failed = summary("VGG19", 5, vec![]);
        failed.status = RunStatus::Failed;
        manager.save_summary(dir.path(), &failed).expect("save");
        let err = manager
            .compare_summaries(dir.path(), &["VGG19".to_string()], &[5], Reducer::Mean)
            .unwrap_err();
        assert!(matches!(err, Error::MissingData { .. }));
    }

    #[test]
    fn agreement_metrics_are_in_range_and_exact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ResultManager::new();
        // Image 1: full overlap, best unchanged. Image 2: 1 of 2 shared,
        // best changed.
        manager
            .save_summary(
                dir.path(),
                &summary(
                    "VGG19",
                    3,
                    vec![
                        result("a.png", &["cat", "dog"], &["cat", "dog"]),
                        result("b.png", &["cat", "dog"], &["dog", "fox"]),
                    ],
                ),
            )
            .expect("save");
        let table = manager
            .compare_summaries(dir.path(), &["VGG19".to_string()], &[3], Reducer::Mean)
            .expect("compare");
        let row = table.rows()[0].1;
        assert!((row.similar_classes_pct - 75.0).abs() < 1e-9);
        assert!((row.similar_best_class - 0.5).abs() < 1e-9);
    }

    #[test]
    fn reducer_collapses_multiple_depths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ResultManager::new();
        // Depth 1: 100% overlap. Depth 2: 0% overlap.
        manager
            .save_summary(
                dir.path(),
                &summary("VGG19", 1, vec![result("a.png", &["cat"], &["cat"])]),
            )
            .expect("save");
        manager
            .save_summary(
                dir.path(),
                &summary("VGG19", 2, vec![result("a.png", &["cat"], &["dog"])]),
            )
            .expect("save");
        let depths = [1, 2];
        let mean = manager
            .compare_summaries(dir.path(), &["VGG19".to_string()], &depths, Reducer::Mean)
            .expect("compare");
        assert!((mean.rows()[0].1.similar_classes_pct - 50.0).abs() < 1e-9);
        let max = manager
            .compare_summaries(dir.path(), &["VGG19".to_string()], &depths, Reducer::Max)
            .expect("compare");
        assert!((max.rows()[0].1.similar_classes_pct - 100.0).abs() < 1e-9);
        let median = manager
            .compare_summaries(dir.path(), &["VGG19".to_string()], &depths, Reducer::Median)
            .expect("compare");
        assert!((median.rows()[0].1.similar_classes_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn extraction_preserves_row_order_and_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ResultManager::new();
        for name in ["B_model", "A_model"] {
            manager
                .save_summary(
                    dir.path(),
                    &summary(name, 4, vec![result("a.png", &["cat", "dog"], &["cat", "owl"])]),
                )
                .expect("save");
        }
        let requested = ["B_model".to_string(), "A_model".to_string()];
        let table = manager
            .compare_summaries(dir.path(), &requested, &[4], Reducer::Mean)
            .expect("compare");
        let (names, values) = manager
            .extract_from_comparison(&table, SIMILAR_CLASSES_PCT)
            .expect("extract");
        assert_eq!(names, requested);
        assert_eq!(names.len(), values.len());
        assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn extraction_of_unknown_metric_fails() {
        let err = ResultManager::new()
            .extract_from_comparison(&ComparisonTable::default(), "similar vibes")
            .unwrap_err();
        assert!(matches!(err, Error::UnknownMetric(_)));
    }

    #[test]
    fn empty_depth_list_is_a_usage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ResultManager::new()
            .compare_summaries(dir.path(), &["VGG19".to_string()], &[], Reducer::Mean)
            .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }
}
