use crate::generator::template::distance_profile;
use crate::workflow::config::WorkflowConfig;
use anyhow::{bail, Context};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rangecore::prelude::{Address, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;

/// Configuration for generating a synthetic ranging experiment: a sniffer
/// capture, the SR and DSR algorithm logs and a motion-capture truth log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub participants: Vec<Address>,
    pub local_address: Address,
    pub neighbor_address: Address,
    /// Transmission rounds; every participant sends once per round.
    pub rounds: usize,
    pub period_ms: u64,
    pub start_ms: Timestamp,
    pub tx_pool: usize,
    pub base_distance: f64,
    pub amplitude: f64,
    pub motion_period_ms: u64,
    /// Age of the distance an algorithm reports at reception.
    pub lag_ms: u64,
    /// Constant error of both algorithms against truth.
    pub bias: f64,
    pub noise: f64,
    pub invalid_probability: f64,
    pub truth_period_ms: u64,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            participants: vec![2, 3],
            local_address: 2,
            neighbor_address: 3,
            rounds: 300,
            period_ms: 20,
            start_ms: 500_000,
            tx_pool: 3,
            base_distance: 100.0,
            amplitude: 40.0,
            motion_period_ms: 4_000,
            lag_ms: 40,
            bias: -8.0,
            noise: 1.5,
            invalid_probability: 0.05,
            truth_period_ms: 10,
            seed: 0,
        }
    }
}

impl GeneratorConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.participants.len() < 2 {
            bail!("a ranging scenario needs at least two participants");
        }
        for addr in [self.local_address, self.neighbor_address] {
            if !self.participants.contains(&addr) {
                bail!("address {addr} is not a participant");
            }
        }
        if self.local_address == self.neighbor_address {
            bail!("local and neighbor address must differ");
        }
        if self.rounds < 2 || self.tx_pool == 0 || self.period_ms == 0 || self.truth_period_ms == 0 {
            bail!("rounds, tx_pool, period_ms and truth_period_ms must be positive");
        }
        if self.rounds > usize::from(u16::MAX) {
            bail!("rounds must fit the 16-bit sequence space");
        }
        if !(0.0..=1.0).contains(&self.invalid_probability) || self.noise.is_nan() || self.noise < 0.0 {
            bail!("invalid_probability must lie in [0, 1] and noise must be non-negative");
        }
        Ok(())
    }

    /// Local clock of the participant at `index`, in sniffer milliseconds.
    fn clock_offset(index: usize) -> u64 {
        1_000_003 * (index as u64 + 1)
    }

    fn send_time(&self, index: usize, round: usize) -> Timestamp {
        let spacing = self.period_ms / self.participants.len() as u64;
        self.start_ms + round as u64 * self.period_ms + index as u64 * spacing
    }

    fn truth(&self, t: Timestamp) -> f64 {
        distance_profile(t, self.base_distance, self.amplitude, self.motion_period_ms)
    }
}

/// Generated files, as text.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticScenario {
    pub capture: String,
    /// `(label, log text)` per simulated ranging algorithm.
    pub logs: Vec<(String, String)>,
    pub truth_log: String,
    pub rate_log: String,
}

impl SyntheticScenario {
    /// Writes each artifact to the location the workflow reads it from.
    pub fn write_to(&self, workflow: &WorkflowConfig) -> anyhow::Result<()> {
        let mut targets = vec![
            (workflow.capture.clone(), &self.capture),
            (workflow.ground_truth.path.clone(), &self.truth_log),
            (workflow.rates.clone(), &self.rate_log),
        ];
        for stream in &workflow.streams {
            let (_, text) = self
                .logs
                .iter()
                .find(|(label, _)| *label == stream.label)
                .with_context(|| format!("no synthetic log for label {}", stream.label))?;
            targets.push((stream.path.clone(), text));
        }

        for (path, text) in targets {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
            }
            fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        }
        Ok(())
    }
}

fn capture_header(config: &GeneratorConfig) -> String {
    let mut header = String::from("system_time,src_addr,msg_seq,msg_len,filter");
    for i in 0..config.tx_pool {
        let _ = write!(header, ",Tx{i}_time,Tx{i}_seq");
    }
    for i in 0..config.participants.len() - 1 {
        let _ = write!(header, ",Rx{i}_addr,Rx{i}_time,Rx{i}_seq");
    }
    header
}

/// One sniffer row per transmission. Round 0 happens before the sniffer
/// starts so every row already reports a previous Tx and every peer.
fn build_capture(config: &GeneratorConfig) -> String {
    let mut capture = capture_header(config);
    capture.push('\n');

    for round in 1..config.rounds {
        for (index, &addr) in config.participants.iter().enumerate() {
            let own_clock = GeneratorConfig::clock_offset(index);
            let _ = write!(
                capture,
                "{},{},{},64,0",
                config.send_time(index, round),
                addr,
                round
            );
            for k in 0..config.tx_pool {
                match round.checked_sub(k + 1) {
                    Some(sent) => {
                        let _ = write!(capture, ",{},{}", config.send_time(index, sent) + own_clock, sent);
                    }
                    None => capture.push_str(",0,0"),
                }
            }
            for (peer_index, &peer) in config.participants.iter().enumerate() {
                if peer_index == index {
                    continue;
                }
                let heard = if peer_index < index { round } else { round - 1 };
                let _ = write!(
                    capture,
                    ",{},{},{}",
                    peer,
                    config.send_time(peer_index, heard) + own_clock,
                    heard
                );
            }
            capture.push('\n');
        }
    }
    capture
}

struct PairClocks {
    local_index: usize,
    neighbor_index: usize,
}

fn pair_clocks(config: &GeneratorConfig) -> anyhow::Result<PairClocks> {
    let position = |addr: Address| {
        config
            .participants
            .iter()
            .position(|&p| p == addr)
            .with_context(|| format!("address {addr} is not a participant"))
    };
    Ok(PairClocks {
        local_index: position(config.local_address)?,
        neighbor_index: position(config.neighbor_address)?,
    })
}

/// Distance reports of one algorithm for both directions of the pair.
fn build_algorithm_log(
    config: &GeneratorConfig,
    clocks: &PairClocks,
    label: &str,
    integer: bool,
    rng: &mut StdRng,
) -> String {
    let mut log = format!("{label} ranging started\nparticipants {:?}\nwarming up\n", config.participants);
    let directions = [
        (config.local_address, config.neighbor_address, clocks.local_index, clocks.neighbor_index),
        (config.neighbor_address, config.local_address, clocks.neighbor_index, clocks.local_index),
    ];

    for round in 1..config.rounds {
        for &(receiver, sender, receiver_index, sender_index) in &directions {
            let sent = config.send_time(sender_index, round);
            let reported = if rng.gen_bool(config.invalid_probability) {
                -1.0
            } else {
                let lagged = config.truth(sent.saturating_sub(config.lag_ms));
                lagged + config.bias + rng.gen_range(-config.noise..=config.noise)
            };
            let received = sent + GeneratorConfig::clock_offset(receiver_index);
            let dist = if integer {
                format!("{}", reported.round())
            } else {
                format!("{reported:.2}")
            };
            let _ = writeln!(
                log,
                "[local_{receiver} <- neighbor_{sender}]: {label} dist = {dist}, time = {received}"
            );
        }
    }
    log
}

fn build_truth_log(config: &GeneratorConfig) -> String {
    let end = config.send_time(config.participants.len() - 1, config.rounds);
    let mut log = String::new();
    let mut t = config.start_ms;
    while t <= end {
        let distance = config.truth(t);
        let _ = writeln!(
            log,
            "[local_{} <- neighbor_{}]: vicon dist = {distance:.4}, time = {t}",
            config.local_address, config.neighbor_address
        );
        let _ = writeln!(
            log,
            "[local_{} <- neighbor_{}]: vicon dist = {distance:.4}, time = {t}",
            config.neighbor_address, config.local_address
        );
        t += config.truth_period_ms;
    }
    log
}

fn build_rate_log(config: &GeneratorConfig, rng: &mut StdRng) -> String {
    let mut log = String::new();
    for round in (0..config.rounds).step_by(10) {
        for &addr in &config.participants {
            let _ = writeln!(
                log,
                "[{addr}] round {round} compensate rate = {:.4}",
                rng.gen_range(0.3..0.9)
            );
        }
    }
    log
}

pub fn build_scenario(config: &GeneratorConfig) -> anyhow::Result<SyntheticScenario> {
    config.validate()?;
    let clocks = pair_clocks(config)?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let sr = build_algorithm_log(config, &clocks, "SR", true, &mut rng);
    let dsr = build_algorithm_log(config, &clocks, "DSR", false, &mut rng);

    Ok(SyntheticScenario {
        capture: build_capture(config),
        logs: vec![("SR".to_string(), sr), ("DSR".to_string(), dsr)],
        truth_log: build_truth_log(config),
        rate_log: build_rate_log(config, &mut rng),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::parser::{extract_rates, RangingLogParser};
    use rangecore::config::{AlignerConfig, CorrelatorConfig};
    use rangecore::processing::correlate_capture;
    use rangecore::processing::StreamAligner;
    use rangecore::series::Series;

    #[test]
    fn capture_correlates_without_drops() {
        let config = GeneratorConfig {
            rounds: 40,
            ..Default::default()
        };
        let scenario = build_scenario(&config).unwrap();
        let output = correlate_capture(&scenario.capture, &CorrelatorConfig::default()).unwrap();

        assert_eq!(output.participants, vec![2, 3]);
        assert_eq!(output.stats.processed, 39 * 2);
        // the last four rounds are still inside the window when the capture ends
        assert_eq!(output.records.len(), (40 - 5) * 2);
        assert_eq!(output.stats.dropped, 0);
        assert!(output.records.iter().all(|r| r.rx[0].rx_time != 0));
    }

    #[test]
    fn algorithm_log_aligns_onto_sender_system_time() {
        let config = GeneratorConfig {
            rounds: 30,
            invalid_probability: 0.0,
            ..Default::default()
        };
        let scenario = build_scenario(&config).unwrap();
        let output = correlate_capture(&scenario.capture, &CorrelatorConfig::default()).unwrap();

        let parser = RangingLogParser::new(2, 3, 3).unwrap();
        let (_, dsr_text) = &scenario.logs[1];
        let dsr = Series::from_labeled("DSR", "DSR", parser.samples(dsr_text).unwrap());
        assert_eq!(dsr.len(), 29);

        let aligned = StreamAligner::new(&output.records, &AlignerConfig::default()).align(&dsr);
        assert_eq!(aligned.len(), 30 - 5);
        assert_eq!(aligned.samples[0].timestamp, config.send_time(1, 1));
        assert!(aligned.samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn same_seed_same_scenario() {
        let config = GeneratorConfig {
            rounds: 12,
            seed: 9,
            ..Default::default()
        };
        assert_eq!(build_scenario(&config).unwrap(), build_scenario(&config).unwrap());
        assert!(!extract_rates(&build_scenario(&config).unwrap().rate_log).unwrap().is_empty());
    }

    #[test]
    fn non_participant_pair_is_rejected() {
        let config = GeneratorConfig {
            neighbor_address: 9,
            ..Default::default()
        };
        assert!(build_scenario(&config).is_err());
    }
}
