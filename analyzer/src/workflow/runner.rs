use crate::logs::parser::{extract_rates, RangingLogParser};
use crate::logs::table::{read_records, write_records, RangingLog};
use crate::report::EvaluationReport;
use crate::workflow::config::{StreamSource, WorkflowConfig};
use anyhow::Context;
use log::{info, warn};
use rangecore::capture::MessageRecord;
use rangecore::processing::{
    apply_offset, correlate_capture, estimate_offset, join_on_common_times, optimize_dynamic, optimize_static,
    summarize_rates, CompensationFilter, CorrelationOutput, DynamicCompensation, ErrorEvaluator, GridSearch,
    RateSummary, StaticCompensation, StreamAligner,
};
use rangecore::series::Series;
use std::fs;

/// Drives the offline stages against the files named by a [`WorkflowConfig`].
#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Capture file to records file.
    pub fn correlate(&self) -> anyhow::Result<CorrelationOutput> {
        let path = &self.config.capture;
        let capture = fs::read_to_string(path).with_context(|| format!("reading capture {}", path.display()))?;
        let output = correlate_capture(&capture, &self.config.pipeline.correlator)
            .with_context(|| format!("correlating capture {}", path.display()))?;
        write_records(&self.config.records, &output.records, output.peer_count())?;
        info!(
            "correlated {} lines into {} records ({} dropped) -> {}",
            output.stats.processed,
            output.stats.emitted,
            output.stats.dropped,
            self.config.records.display()
        );
        Ok(output)
    }

    pub fn read_stream(&self, source: &StreamSource) -> anyhow::Result<Series> {
        let parser = RangingLogParser::new(
            self.config.local_address,
            self.config.neighbor_address,
            self.config.skip_lines_for(source),
        )?;
        let text = fs::read_to_string(&source.path)
            .with_context(|| format!("reading {} log {}", source.name, source.path.display()))?;
        let samples = parser
            .samples(&text)
            .with_context(|| format!("parsing {} log {}", source.name, source.path.display()))?;
        Ok(Series::from_labeled(source.name.clone(), &source.label, samples))
    }

    /// Joins already-loaded streams on the record time base.
    pub fn align_streams(&self, records: &[MessageRecord], streams: &[Series], ground_truth: &Series) -> RangingLog {
        let aligner = StreamAligner::new(records, &self.config.pipeline.aligner);
        let aligned: Vec<Series> = streams.iter().map(|s| aligner.align(s)).collect();
        for series in &aligned {
            if series.is_empty() {
                warn!("{} has no sample matching a reconstructed record", series.name);
            }
        }
        let refs: Vec<&Series> = aligned.iter().collect();
        let rows = join_on_common_times(&refs, ground_truth);
        let names: Vec<String> = streams.iter().map(|s| s.name.clone()).collect();
        RangingLog::from_aligned(&rows, &names, &ground_truth.name)
    }

    /// Records file plus algorithm logs to ranging log.
    pub fn align(&self) -> anyhow::Result<RangingLog> {
        let records = read_records(&self.config.records)?;
        let streams = self
            .config
            .streams
            .iter()
            .map(|source| self.read_stream(source))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let truth = self.read_stream(&self.config.ground_truth)?;

        let log = self.align_streams(&records, &streams, &truth);
        log.write(&self.config.ranging_log)?;
        info!(
            "wrote {} common-valid rows to {}",
            log.len(),
            self.config.ranging_log.display()
        );
        Ok(log)
    }

    /// Ranging log to evaluation report; `search` tunes both filters first.
    pub fn evaluate(&self, search: bool) -> anyhow::Result<EvaluationReport> {
        let log = RangingLog::read(&self.config.ranging_log, &self.config.ground_truth.name)?;
        let truth = self.read_stream(&self.config.ground_truth)?;
        let report = self.evaluate_log(&log, &truth, search)?;
        if let Some(path) = &self.config.report {
            report.write_json(path)?;
        }
        Ok(report)
    }

    /// `full_truth` is the complete ground-truth stream used for offset
    /// calibration; the log's own truth column is scored against.
    pub fn evaluate_log(&self, log: &RangingLog, full_truth: &Series, search: bool) -> anyhow::Result<EvaluationReport> {
        let pipeline = &self.config.pipeline;
        let series = log
            .series_names
            .iter()
            .map(|name| log.series(name).with_context(|| format!("ranging log lost column {name}")))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let refs: Vec<&Series> = series.iter().collect();
        let offset = estimate_offset(&refs, full_truth, &pipeline.calibration);
        let applied = offset.unwrap_or_else(|| {
            warn!("calibration window holds no valid samples, leaving series unshifted");
            0.0
        });
        let mut shifted: Vec<(String, Vec<f64>)> = series
            .iter()
            .map(|s| (s.name.clone(), apply_offset(s, applied).values()))
            .collect();

        let target = &self.config.compensate;
        let raw = shifted
            .iter()
            .find(|(name, _)| name == target)
            .map(|(_, values)| values.clone())
            .with_context(|| format!("ranging log has no {target} column"))?;

        let mut static_params = pipeline.compensation.static_params;
        let mut dynamic_params = pipeline.compensation.dynamic_params;
        let (mut static_search, mut dynamic_search) = (None, None);
        if search {
            let grid_search = GridSearch::new(pipeline.search.workers);
            static_search = optimize_static(&raw, &log.truth, &pipeline.search.static_grid, &grid_search)
                .context("searching static compensation parameters")?;
            dynamic_search = optimize_dynamic(&raw, &log.truth, &pipeline.search.dynamic_grid, &grid_search)
                .context("searching dynamic compensation parameters")?;
            if let Some(best) = &static_search {
                static_params = best.params;
            }
            if let Some(best) = &dynamic_search {
                dynamic_params = best.params;
            }
        }

        shifted.push((
            format!("S-C{target}"),
            StaticCompensation::new(static_params).apply(&raw),
        ));
        shifted.push((
            format!("D-C{target}"),
            DynamicCompensation::new(dynamic_params).apply(&raw),
        ));

        let evaluator = ErrorEvaluator::new(pipeline.calibration.invalid_sentinel, applied);
        let single = shifted
            .iter()
            .map(|(name, values)| Ok((name.clone(), evaluator.evaluate(values, &log.truth)?)))
            .collect::<anyhow::Result<Vec<_>>>()
            .context("scoring series")?;
        let columns: Vec<(&str, &[f64])> = shifted
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
            .collect();
        let common = evaluator
            .evaluate_common(&columns, &log.truth)
            .context("scoring common-valid samples")?;

        Ok(EvaluationReport {
            samples: log.len(),
            offset,
            applied_offset: applied,
            compensated: target.clone(),
            static_params,
            dynamic_params,
            static_search,
            dynamic_search,
            single,
            common,
        })
    }

    pub fn rates(&self) -> anyhow::Result<RateSummary> {
        let path = &self.config.rates;
        let text = fs::read_to_string(path).with_context(|| format!("reading rate log {}", path.display()))?;
        let rates = extract_rates(&text)?;
        if rates.is_empty() {
            warn!("no rate values found in {}", path.display());
        }
        Ok(summarize_rates(&rates))
    }
}
