use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineError, PipelineResult};
use crate::processing::compensation::{
    CompensationFilter, DynamicCompensation, DynamicParams, StaticCompensation, StaticParams,
};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::ProgressRecorder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::task::JoinSet;

/// Chunks scheduled per worker so uneven chunks still balance.
const CHUNKS_PER_WORKER: usize = 4;

/// Half-open axis `start, start + step, ... < stop`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl ParamRange {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self { start, stop, step }
    }

    /// Axis holding the single value `value`.
    pub fn fixed(value: f64) -> Self {
        Self {
            start: value,
            stop: value,
            step: 0.0,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        if self.step <= 0.0 || !self.step.is_finite() {
            return vec![self.start];
        }
        let span = (self.stop - self.start) / self.step;
        if span.is_nan() || span <= 0.0 || span.is_infinite() {
            return Vec::new();
        }
        let count = span.ceil() as usize;
        (0..count)
            .map(|i| self.start + i as f64 * self.step)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticGrid {
    pub compensate_rate: ParamRange,
    pub deceleration_bound: ParamRange,
}

impl Default for StaticGrid {
    fn default() -> Self {
        Self {
            compensate_rate: ParamRange::new(0.0, 1.01, 0.01),
            deceleration_bound: ParamRange::new(0.0, 20.1, 0.1),
        }
    }
}

impl StaticGrid {
    /// Candidates with the rate as the outer axis.
    pub fn candidates(&self) -> Vec<StaticParams> {
        let bounds = self.deceleration_bound.values();
        self.compensate_rate
            .values()
            .into_iter()
            .flat_map(|compensate_rate| {
                bounds.iter().map(move |&deceleration_bound| StaticParams {
                    compensate_rate,
                    deceleration_bound,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicGrid {
    pub compensate_rate_low: ParamRange,
    pub deceleration_bound_low: ParamRange,
    pub compensate_rate_high: ParamRange,
    pub deceleration_bound_high: ParamRange,
    pub motion_threshold: ParamRange,
}

impl Default for DynamicGrid {
    fn default() -> Self {
        Self {
            compensate_rate_low: ParamRange::new(0.0, 1.1, 0.1),
            deceleration_bound_low: ParamRange::new(0.0, 11.0, 1.0),
            compensate_rate_high: ParamRange::new(0.0, 1.1, 0.1),
            deceleration_bound_high: ParamRange::new(0.0, 21.0, 1.0),
            motion_threshold: ParamRange::new(0.0, 5.0, 1.0),
        }
    }
}

impl DynamicGrid {
    /// Candidates enumerated low rate, low bound, high rate, high bound,
    /// threshold, outermost first.
    pub fn candidates(&self) -> Vec<DynamicParams> {
        let rate_low = self.compensate_rate_low.values();
        let bound_low = self.deceleration_bound_low.values();
        let rate_high = self.compensate_rate_high.values();
        let bound_high = self.deceleration_bound_high.values();
        let thresholds = self.motion_threshold.values();

        let mut candidates = Vec::with_capacity(
            rate_low.len() * bound_low.len() * rate_high.len() * bound_high.len() * thresholds.len(),
        );
        for &compensate_rate_low in &rate_low {
            for &deceleration_bound_low in &bound_low {
                for &compensate_rate_high in &rate_high {
                    for &deceleration_bound_high in &bound_high {
                        for &motion_threshold in &thresholds {
                            candidates.push(DynamicParams {
                                compensate_rate_low,
                                deceleration_bound_low,
                                compensate_rate_high,
                                deceleration_bound_high,
                                motion_threshold,
                            });
                        }
                    }
                }
            }
        }
        candidates
    }
}

/// Winning candidate of a grid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult<P> {
    pub params: P,
    pub score: f64,
    /// Position of the winner in enumeration order.
    pub index: usize,
    pub evaluated: usize,
    /// Candidates whose score was not finite.
    pub rejected: usize,
}

#[derive(Debug, Clone, Copy)]
struct Scored {
    index: usize,
    score: f64,
}

impl Scored {
    fn beats(&self, other: &Scored) -> bool {
        self.score < other.score || (self.score == other.score && self.index < other.index)
    }
}

#[derive(Debug, Default)]
struct ChunkOutcome {
    best: Option<Scored>,
    evaluated: usize,
    rejected: usize,
}

fn keep_best(current: Option<Scored>, candidate: Option<Scored>) -> Option<Scored> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(if b.beats(&a) { b } else { a }),
        (a, b) => a.or(b),
    }
}

fn evaluate_chunk<P, F>(candidates: &[P], offset: usize, score: &F, progress: &ProgressRecorder) -> ChunkOutcome
where
    F: Fn(&P) -> f64,
{
    let mut outcome = ChunkOutcome::default();
    for (i, candidate) in candidates.iter().enumerate() {
        let value = score(candidate);
        outcome.evaluated += 1;
        if value.is_finite() {
            outcome.best = keep_best(
                outcome.best,
                Some(Scored {
                    index: offset + i,
                    score: value,
                }),
            );
        } else {
            outcome.rejected += 1;
        }
    }
    progress.record_evaluated(outcome.evaluated);
    progress.record_rejected(outcome.rejected);
    outcome
}

/// Exhaustive parallel search: candidates are scattered to a worker pool in
/// index-tagged chunks and reduced to the minimum score. Ties resolve to the
/// earliest candidate in enumeration order.
///
/// `run` drives its own runtime and must not be called from async code.
pub struct GridSearch {
    workers: usize,
    progress: Arc<ProgressRecorder>,
    logger: LogManager,
}

impl GridSearch {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            progress: Arc::new(ProgressRecorder::new()),
            logger: LogManager::new("optimizer"),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Shared progress counters, readable while a search is running.
    pub fn progress(&self) -> Arc<ProgressRecorder> {
        Arc::clone(&self.progress)
    }

    pub fn run<P, F>(&self, candidates: Vec<P>, score: F) -> PipelineResult<Option<SearchResult<P>>>
    where
        P: Clone + Send + Sync + 'static,
        F: Fn(&P) -> f64 + Send + Sync + 'static,
    {
        if candidates.is_empty() {
            self.logger.warn("empty candidate grid, nothing to search");
            return Ok(None);
        }

        let total = candidates.len();
        let chunk_size = total.div_ceil(self.workers * CHUNKS_PER_WORKER).max(1);
        let candidates = Arc::new(candidates);
        let score = Arc::new(score);

        let runtime = TokioBuilder::new_multi_thread()
            .worker_threads(self.workers)
            .thread_name("grid-search")
            .build()
            .map_err(|err| PipelineError::Internal(format!("building worker pool: {err}")))?;

        let outcome = runtime.block_on(async {
            let mut tasks = JoinSet::new();
            for start in (0..total).step_by(chunk_size) {
                let end = (start + chunk_size).min(total);
                let candidates = Arc::clone(&candidates);
                let score = Arc::clone(&score);
                let progress = Arc::clone(&self.progress);
                tasks.spawn(async move {
                    evaluate_chunk(&candidates[start..end], start, score.as_ref(), &progress)
                });
            }

            let mut merged = ChunkOutcome::default();
            while let Some(joined) = tasks.join_next().await {
                let chunk = joined
                    .map_err(|err| PipelineError::Internal(format!("search worker failed: {err}")))?;
                merged.best = keep_best(merged.best, chunk.best);
                merged.evaluated += chunk.evaluated;
                merged.rejected += chunk.rejected;
            }
            Ok::<_, PipelineError>(merged)
        })?;

        self.logger.record(&format!(
            "evaluated {} candidates on {} workers, {} rejected",
            outcome.evaluated, self.workers, outcome.rejected
        ));

        Ok(outcome.best.map(|best| SearchResult {
            params: candidates[best.index].clone(),
            score: best.score,
            index: best.index,
            evaluated: outcome.evaluated,
            rejected: outcome.rejected,
        }))
    }
}

fn check_lengths(raw: &[f64], truth: &[f64]) -> PipelineResult<()> {
    if raw.len() != truth.len() {
        return Err(PipelineError::InvalidInput(format!(
            "series has {} samples but ground truth has {}",
            raw.len(),
            truth.len()
        )));
    }
    Ok(())
}

/// Mean absolute error of the static filter's output against ground truth.
pub fn static_score(raw: &[f64], truth: &[f64], params: StaticParams) -> f64 {
    let filtered = StaticCompensation::new(params).apply(raw);
    StatsHelper::mean_abs_error(&filtered, truth)
}

/// Mean absolute error of the dynamic filter's output against ground truth.
pub fn dynamic_score(raw: &[f64], truth: &[f64], params: DynamicParams) -> f64 {
    let filtered = DynamicCompensation::new(params).apply(raw);
    StatsHelper::mean_abs_error(&filtered, truth)
}

pub fn optimize_static(
    raw: &[f64],
    truth: &[f64],
    grid: &StaticGrid,
    search: &GridSearch,
) -> PipelineResult<Option<SearchResult<StaticParams>>> {
    check_lengths(raw, truth)?;
    let raw: Arc<[f64]> = Arc::from(raw);
    let truth: Arc<[f64]> = Arc::from(truth);
    search.run(grid.candidates(), move |params| static_score(&raw, &truth, *params))
}

pub fn optimize_dynamic(
    raw: &[f64],
    truth: &[f64],
    grid: &DynamicGrid,
    search: &GridSearch,
) -> PipelineResult<Option<SearchResult<DynamicParams>>> {
    check_lengths(raw, truth)?;
    let raw: Arc<[f64]> = Arc::from(raw);
    let truth: Arc<[f64]> = Arc::from(truth);
    search.run(grid.candidates(), move |params| dynamic_score(&raw, &truth, *params))
}
