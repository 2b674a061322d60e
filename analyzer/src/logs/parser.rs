use anyhow::{anyhow, Context};
use rangecore::prelude::Address;
use rangecore::series::LabeledSample;
use regex::Regex;

/// Reads `[local_A <- neighbor_B]: LABEL dist = x, time = t` lines emitted by
/// the ranging firmware and the motion-capture bridge for one node pair.
pub struct RangingLogParser {
    pattern: Regex,
    skip_lines: usize,
}

impl RangingLogParser {
    pub fn new(local: Address, neighbor: Address, skip_lines: usize) -> anyhow::Result<Self> {
        let pattern = Regex::new(&format!(
            r"\[local_{local} <- neighbor_{neighbor}\]:\s*(?P<label>[A-Za-z0-9_\-]+) dist = (?P<dist>-?\d+(?:\.\d+)?), time = (?P<time>\d+)"
        ))
        .context("compiling ranging log pattern")?;
        Ok(Self {
            pattern,
            skip_lines,
        })
    }

    /// Decodes one line. `Ok(None)` for lines that belong to another pair or
    /// carry no distance report.
    pub fn parse_line(&self, line: &str, line_number: usize) -> anyhow::Result<Option<LabeledSample>> {
        let Some(caps) = self.pattern.captures(line) else {
            return Ok(None);
        };
        let value: f64 = caps["dist"]
            .parse()
            .with_context(|| format!("line {line_number}: bad distance {:?}", &caps["dist"]))?;
        let timestamp = caps["time"]
            .parse()
            .with_context(|| format!("line {line_number}: bad timestamp {:?}", &caps["time"]))?;
        Ok(Some(LabeledSample {
            label: caps["label"].to_string(),
            timestamp,
            value,
        }))
    }

    /// Every matching entry of `text` in file order, after the leading
    /// `skip_lines` lines.
    pub fn samples(&self, text: &str) -> anyhow::Result<Vec<LabeledSample>> {
        let mut samples = Vec::new();
        for (idx, line) in text.lines().enumerate().skip(self.skip_lines) {
            if let Some(sample) = self.parse_line(line, idx + 1)? {
                samples.push(sample);
            }
        }
        Ok(samples)
    }
}

/// Compensation factors reported as `rate = x.y` anywhere in `text`.
pub fn extract_rates(text: &str) -> anyhow::Result<Vec<f64>> {
    let pattern = Regex::new(r"rate\s*=\s*(\d+\.\d+)").context("compiling rate pattern")?;
    pattern
        .captures_iter(text)
        .map(|caps| {
            caps[1]
                .parse::<f64>()
                .map_err(|err| anyhow!("bad rate {:?}: {err}", &caps[1]))
        })
        .collect()
}
