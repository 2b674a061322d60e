use anyhow::{bail, Context};
use rangecore::config::PipelineConfig;
use rangecore::prelude::Address;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One algorithm (or ground-truth) log and the label its lines carry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamSource {
    /// Column name in the ranging log.
    pub name: String,
    pub label: String,
    pub path: PathBuf,
    /// Overrides the workflow-wide banner skip for this file.
    #[serde(default)]
    pub skip_lines: Option<usize>,
}

impl StreamSource {
    pub fn new(name: &str, label: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            path,
            skip_lines: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub local_address: Address,
    pub neighbor_address: Address,
    /// Leading banner lines ignored in every algorithm log.
    pub skip_lines: usize,
    pub capture: PathBuf,
    pub records: PathBuf,
    pub streams: Vec<StreamSource>,
    pub ground_truth: StreamSource,
    pub ranging_log: PathBuf,
    /// Series the compensation filters are applied to and tuned on.
    pub compensate: String,
    pub rates: PathBuf,
    /// JSON report destination; text only when unset.
    pub report: Option<PathBuf>,
    pub pipeline: PipelineConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::from_args(Path::new("data"), 2, 3)
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    /// Conventional file layout of an experiment directory.
    pub fn from_args(data_dir: &Path, local_address: Address, neighbor_address: Address) -> Self {
        let mut ground_truth = StreamSource::new("VICON", "vicon", data_dir.join("vicon.txt"));
        ground_truth.skip_lines = Some(0);
        Self {
            local_address,
            neighbor_address,
            skip_lines: 3,
            capture: data_dir.join("capture.csv"),
            records: data_dir.join("processed_log.csv"),
            streams: vec![
                StreamSource::new("DSR", "DSR", data_dir.join("dynamic_swarm_ranging.txt")),
                StreamSource::new("SR", "SR", data_dir.join("swarm_ranging.txt")),
            ],
            ground_truth,
            ranging_log: data_dir.join("ranging_log.csv"),
            compensate: "DSR".to_string(),
            rates: data_dir.join("rate.txt"),
            report: None,
            pipeline: PipelineConfig::default(),
        }
    }

    pub fn skip_lines_for(&self, source: &StreamSource) -> usize {
        source.skip_lines.unwrap_or(self.skip_lines)
    }

    pub fn series_names(&self) -> Vec<String> {
        self.streams.iter().map(|s| s.name.clone()).collect()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.pipeline.validate().context("invalid pipeline section")?;
        if self.streams.is_empty() {
            bail!("workflow lists no algorithm streams");
        }
        if self.local_address == self.neighbor_address {
            bail!("local and neighbor address are both {}", self.local_address);
        }
        let mut names = self.series_names();
        names.push(self.ground_truth.name.clone());
        names.sort();
        if names.windows(2).any(|pair| pair[0] == pair[1]) || names.iter().any(|n| n == "TIME") {
            bail!("stream names must be unique and not TIME");
        }
        if !self.streams.iter().any(|s| s.name == self.compensate) {
            bail!("compensation target {} is not a configured stream", self.compensate);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_uses_data_dir() {
        let cfg = WorkflowConfig::from_args(Path::new("/tmp/run1"), 4, 5);
        assert_eq!(cfg.records, PathBuf::from("/tmp/run1/processed_log.csv"));
        assert_eq!(cfg.skip_lines_for(&cfg.streams[0]), 3);
        assert_eq!(cfg.skip_lines_for(&cfg.ground_truth), 0);
        cfg.validate().unwrap();
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"local_address: 7\nneighbor_address: 8\ncompensate: SR\npipeline:\n  search:\n    workers: 2\n  aligner:\n    checkpoints: 1\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.local_address, 7);
        assert_eq!(cfg.pipeline.search.workers, 2);
        assert_eq!(cfg.pipeline.aligner.checkpoints, 1);
        assert_eq!(cfg.pipeline.correlator.window_factor, 5);
        assert_eq!(cfg.streams.len(), 2);
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_compensation_target_is_rejected() {
        let mut cfg = WorkflowConfig::default();
        cfg.compensate = "IEEE".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn duplicate_stream_names_are_rejected() {
        let mut cfg = WorkflowConfig::default();
        cfg.streams[1].name = "DSR".into();
        assert!(cfg.validate().is_err());
    }
}
