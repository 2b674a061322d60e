use anyhow::Context;
use clap::{Parser, Subcommand};
use generator::profile::{build_scenario, GeneratorConfig};
use report::render_rates;
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod logs;
mod report;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Offline swarm-ranging capture and accuracy workflow")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long, global = true)]
    workflow: Option<PathBuf>,
    /// Experiment directory used when no workflow file is given
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,
    #[arg(long, global = true, default_value_t = 2)]
    local: u16,
    #[arg(long, global = true, default_value_t = 3)]
    neighbor: u16,
    /// Override the number of ranging participants
    #[arg(long, global = true)]
    participants: Option<usize>,
    /// Override the checkpoint count of the aligner
    #[arg(long, global = true)]
    checkpoints: Option<usize>,
    /// Override the grid-search worker count
    #[arg(long, global = true)]
    workers: Option<usize>,
    /// Write the evaluation report as JSON
    #[arg(long, global = true)]
    report: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild per-message records from the sniffer capture
    Correlate,
    /// Join algorithm logs and ground truth on the record time base
    Align,
    /// Calibrate, compensate and score the ranging log
    Evaluate {
        /// Tune both compensation filters by grid search first
        #[arg(long, default_value_t = false)]
        search: bool,
    },
    /// Correlate, align and evaluate in one pass
    Run {
        #[arg(long, default_value_t = false)]
        search: bool,
    },
    /// Summarize the compensation factors reported by the nodes
    Rates,
    /// Write a synthetic experiment into the configured locations
    Synth {
        #[arg(long, default_value_t = 300)]
        rounds: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

impl Args {
    fn workflow_config(&self) -> anyhow::Result<WorkflowConfig> {
        let mut config = if let Some(path) = &self.workflow {
            WorkflowConfig::load(path)?
        } else {
            WorkflowConfig::from_args(&self.data_dir, self.local, self.neighbor)
        };
        if let Some(count) = self.participants {
            config.pipeline.correlator.participant_count = Some(count);
        }
        if let Some(checkpoints) = self.checkpoints {
            config.pipeline.aligner.checkpoints = checkpoints;
        }
        if let Some(workers) = self.workers {
            config.pipeline.search.workers = workers;
        }
        if self.report.is_some() {
            config.report = self.report.clone();
        }
        config.validate().context("validating workflow config")?;
        Ok(config)
    }
}

fn evaluate(runner: &Runner, search: bool) -> anyhow::Result<()> {
    let report = runner.evaluate(search)?;
    print!("{}", report.render_text());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let workflow_config = args.workflow_config()?;
    let runner = Runner::new(workflow_config.clone());

    match args.command {
        Command::Correlate => {
            let output = runner.correlate()?;
            println!(
                "participants {:?}: {} lines -> {} records, {} dropped",
                output.participants, output.stats.processed, output.stats.emitted, output.stats.dropped
            );
        }
        Command::Align => {
            let log = runner.align()?;
            println!(
                "Ranging log saved to {}, total {} records.",
                workflow_config.ranging_log.display(),
                log.len()
            );
        }
        Command::Evaluate { search } => evaluate(&runner, search)?,
        Command::Run { search } => {
            runner.correlate()?;
            runner.align()?;
            evaluate(&runner, search)?;
        }
        Command::Rates => {
            let summary = runner.rates()?;
            print!("{}", render_rates(&summary));
        }
        Command::Synth { rounds, seed } => {
            let generator = GeneratorConfig {
                local_address: workflow_config.local_address,
                neighbor_address: workflow_config.neighbor_address,
                participants: vec![workflow_config.local_address, workflow_config.neighbor_address],
                rounds,
                seed,
                ..Default::default()
            };
            build_scenario(&generator)?
                .write_to(&workflow_config)
                .context("writing synthetic experiment")?;
            println!("synthetic experiment with {rounds} rounds written");
        }
    }

    Ok(())
}
