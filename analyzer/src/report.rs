use anyhow::Context;
use rangecore::processing::{
    CommonEvaluation, DynamicParams, ErrorMetrics, RateSummary, SearchResult, StaticParams,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Outcome of calibrating, compensating and scoring one ranging log.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub samples: usize,
    /// Estimated alignment offset, `None` when the calibration window saw no data.
    pub offset: Option<f64>,
    pub applied_offset: f64,
    pub compensated: String,
    pub static_params: StaticParams,
    pub dynamic_params: DynamicParams,
    pub static_search: Option<SearchResult<StaticParams>>,
    pub dynamic_search: Option<SearchResult<DynamicParams>>,
    pub single: Vec<(String, ErrorMetrics)>,
    pub common: CommonEvaluation,
}

fn metrics_table(title: &str, rows: &[(String, ErrorMetrics)]) -> String {
    let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0).max(6);
    let mut out = format!("==== {title} ====\n");
    let _ = writeln!(
        out,
        "{:<width$}  {:>9}  {:>9}  {:>9}  {:>8}  {:>8}",
        "series", "MAE", "MaxAE", "RMSE", "MRE%", "invalid%"
    );
    for (name, m) in rows {
        let _ = writeln!(
            out,
            "{:<width$}  {:>9.3}  {:>9.3}  {:>9.3}  {:>8.3}  {:>8.2}",
            name, m.mean_abs_error, m.max_abs_error, m.rmse, m.mean_relative_error, m.invalid_rate
        );
    }
    out
}

impl EvaluationReport {
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        match self.offset {
            Some(offset) => {
                let _ = writeln!(out, "samples={} offset={offset:.4}", self.samples);
            }
            None => {
                let _ = writeln!(out, "samples={} offset=undefined (using 0)", self.samples);
            }
        }
        if let Some(best) = &self.static_search {
            let _ = writeln!(
                out,
                "static search: rate={:.2} bound={:.2} mae={:.4} ({} candidates, {} rejected)",
                best.params.compensate_rate,
                best.params.deceleration_bound,
                best.score,
                best.evaluated,
                best.rejected
            );
        }
        if let Some(best) = &self.dynamic_search {
            let p = &best.params;
            let _ = writeln!(
                out,
                "dynamic search: low=({:.2}, {:.2}) high=({:.2}, {:.2}) threshold={:.2} mae={:.4} ({} candidates, {} rejected)",
                p.compensate_rate_low,
                p.deceleration_bound_low,
                p.compensate_rate_high,
                p.deceleration_bound_high,
                p.motion_threshold,
                best.score,
                best.evaluated,
                best.rejected
            );
        }
        out.push('\n');
        out.push_str(&metrics_table("all valid data", &self.single));
        out.push('\n');
        out.push_str(&metrics_table("common valid data", &self.common.series));
        out
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("serializing evaluation report")?;
        fs::write(path, json).with_context(|| format!("writing report {}", path.display()))
    }
}

pub fn render_rates(summary: &RateSummary) -> String {
    format!(
        "Extracted {} rate values.\nAverage rate = {:.6}\nStandard deviation = {:.6}\n",
        summary.count, summary.mean, summary.std_dev
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(mae: f64) -> ErrorMetrics {
        ErrorMetrics {
            mean_abs_error: mae,
            max_abs_error: 2.0 * mae,
            rmse: mae,
            mean_relative_error: 1.0,
            invalid_rate: 0.0,
        }
    }

    fn report() -> EvaluationReport {
        EvaluationReport {
            samples: 3,
            offset: None,
            applied_offset: 0.0,
            compensated: "DSR".into(),
            static_params: StaticParams::default(),
            dynamic_params: DynamicParams::default(),
            static_search: None,
            dynamic_search: None,
            single: vec![("SR".into(), metrics(1.5)), ("S-CDSR".into(), metrics(f64::NAN))],
            common: CommonEvaluation {
                invalid_rate: 100.0,
                series: vec![("SR".into(), metrics(f64::NAN))],
            },
        }
    }

    #[test]
    fn text_report_lists_every_series() {
        let text = report().render_text();
        assert!(text.contains("offset=undefined"));
        assert!(text.contains("==== all valid data ===="));
        assert!(text.lines().any(|l| l.starts_with("S-CDSR") && l.contains("NaN")));
        assert!(text.lines().any(|l| l.starts_with("SR") && l.contains("1.500")));
    }

    #[test]
    fn json_report_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report().write_json(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["samples"], 3);
        assert_eq!(value["compensated"], "DSR");
        assert!(value["offset"].is_null());
    }

    #[test]
    fn rate_summary_text() {
        let text = render_rates(&RateSummary {
            count: 2,
            mean: 0.5,
            std_dev: 0.1,
        });
        assert!(text.contains("Average rate = 0.500000"));
    }
}
