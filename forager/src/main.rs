//! Survival-loop CLI.
//!
//! `forager run` drives one or more episodes of the grid-world survival loop;
//! `forager analyze` aggregates saved snapshot files after the fact.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use forager::ace::{Curator, PlaybookConfig, PlaybookStore, Reflector};
use forager::config::{ForagerConfig, PlannerMode, load_config};
use forager::core::execution::ExecutionEngine;
use forager::core::result_format::ResultFormatter;
use forager::core::reward::RewardSynthesizer;
use forager::core::state_format::StateFormatter;
use forager::env::{Environment, GridWorld, GridWorldConfig};
use forager::logging;
use forager::looping::{CurationPipeline, FeedbackLoop};
use forager::memory::MemoryManager;
use forager::planner::{CliDelegate, DelegatedPlanner, HeuristicPlanner, Planner};
use forager::report::{
    EpisodeSummary, RunReport, analyze_files, collect_snapshot_files, write_report,
};
use forager::snapshots::JsonlSnapshotWriter;

#[derive(Parser)]
#[command(
    name = "forager",
    version,
    about = "Survival agent loop with a self-curating playbook"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run episodes of the survival loop against the grid world.
    Run(RunArgs),
    /// Aggregate saved snapshot files into an analysis report.
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Config file; defaults apply when it does not exist.
    #[arg(long, default_value = "forager.toml")]
    config: PathBuf,
    /// Maximum ticks per episode.
    #[arg(long)]
    ticks: Option<u64>,
    /// Episodes to run back to back.
    #[arg(long)]
    episodes: Option<u32>,
    /// Base seed; episode i runs the environment with seed + i.
    #[arg(long)]
    seed: Option<u64>,
    /// Directory for the alert/exploration note logs.
    #[arg(long)]
    memory_root: Option<PathBuf>,
    /// Planning strategy.
    #[arg(long, value_enum)]
    planner_mode: Option<PlannerMode>,
    /// Turn on playbook curation.
    #[arg(long)]
    enable_curation: bool,
    /// Directory for the playbook store.
    #[arg(long)]
    playbook_root: Option<PathBuf>,
    /// Run grow-and-refine every N ticks; 0 disables it.
    #[arg(long)]
    refine_every: Option<u64>,
    /// Accepted playbook deltas per tick.
    #[arg(long)]
    max_deltas: Option<usize>,
    /// Playbook excerpts offered to the planner each tick.
    #[arg(long)]
    context_limit: Option<usize>,
    /// Character cap per playbook excerpt.
    #[arg(long)]
    context_chars: Option<usize>,
    /// Sections kept per playbook file after refine.
    #[arg(long)]
    max_sections: Option<usize>,
    /// Write per-episode snapshot JSONL files into this directory.
    #[arg(long, value_name = "DIR")]
    save_run: Option<PathBuf>,
    /// Write the aggregated run report to this path.
    #[arg(long, value_name = "PATH")]
    save_report: Option<PathBuf>,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Snapshot JSONL files or directories to scan recursively.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// How many playbook targets to rank by applied-update count.
    #[arg(long, default_value = "5")]
    top_targets: usize,
    /// Write the report here instead of stdout.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Analyze(args) => cmd_analyze(args),
    }
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let config = effective_config(&args)?;
    info!(
        ticks = config.tick_limit,
        episodes = config.episodes,
        seed = config.seed,
        planner = ?config.planner.mode,
        curation = config.curation.enabled,
        "starting run"
    );

    let mut memory = MemoryManager::open(&config.memory_root)?;
    let mut planner = build_planner(&config);
    let curation = if config.curation.enabled {
        let store = PlaybookStore::open(
            &config.curation.playbook_root,
            PlaybookConfig::from(&config.curation),
        )?;
        let reflector = build_reflector(&config);
        Some((store, reflector))
    } else {
        None
    };

    let state_formatter = StateFormatter::default();
    let result_formatter = ResultFormatter::default();
    let reward = RewardSynthesizer::default();

    let mut summaries = Vec::new();
    for index in 0..config.episodes {
        let episode = index + 1;
        let mut environment = GridWorld::new(GridWorldConfig {
            seed: config.seed + u64::from(index),
            ..GridWorldConfig::default()
        });
        let engine = ExecutionEngine::new(environment.action_schema().to_vec());

        let mut feedback = FeedbackLoop::new(
            &mut environment,
            planner.as_mut(),
            &engine,
            &state_formatter,
            &result_formatter,
            &reward,
            &mut memory,
        );
        if let Some((store, reflector)) = &curation {
            feedback = feedback.with_curation(CurationPipeline::new(
                store,
                reflector,
                Curator::new(config.curation.max_deltas_per_tick),
                config.curation.refine_interval,
            ));
        }
        if let Some(dir) = &args.save_run {
            feedback = feedback.with_sink(Box::new(JsonlSnapshotWriter::create(dir, episode)?));
        }

        let snapshots = feedback.run(config.tick_limit)?;
        let summary = EpisodeSummary::from_snapshots(episode, &snapshots);
        info!(
            episode = summary.episode,
            ticks = summary.ticks,
            total_reward = summary.total_reward,
            final_life = summary.final_life,
            final_unknown = summary.final_unknown,
            "episode finished"
        );
        summaries.push(summary);
    }

    let aggregate = RunReport::aggregate(&summaries);
    info!(
        episodes = aggregate.episodes,
        avg_ticks = aggregate.avg_ticks,
        avg_reward = aggregate.avg_reward,
        total_reward = aggregate.total_reward,
        "run finished"
    );
    if let Some(path) = &args.save_report {
        write_report(path, &aggregate)?;
        info!(path = %path.display(), "run report written");
    }
    Ok(())
}

fn cmd_analyze(args: AnalyzeArgs) -> Result<()> {
    let files = collect_snapshot_files(&args.paths)?;
    if files.is_empty() {
        bail!("no .jsonl snapshot files found under the given paths");
    }
    let analysis = analyze_files(&files, args.top_targets)?;
    match &args.out {
        Some(path) => {
            write_report(path, &analysis)?;
            info!(path = %path.display(), "analysis report written");
        }
        None => {
            let mut payload =
                serde_json::to_string_pretty(&analysis).context("serialize analysis report")?;
            payload.push('\n');
            print!("{payload}");
        }
    }
    Ok(())
}

/// Flags override the config file, which overrides defaults.
fn effective_config(args: &RunArgs) -> Result<ForagerConfig> {
    let mut config = load_config(&args.config)?;
    if let Some(ticks) = args.ticks {
        config.tick_limit = ticks;
    }
    if let Some(episodes) = args.episodes {
        config.episodes = episodes;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(root) = &args.memory_root {
        config.memory_root = root.clone();
    }
    if let Some(mode) = args.planner_mode {
        config.planner.mode = mode;
    }
    if args.enable_curation {
        config.curation.enabled = true;
    }
    if let Some(root) = &args.playbook_root {
        config.curation.playbook_root = root.clone();
    }
    if let Some(interval) = args.refine_every {
        config.curation.refine_interval = interval;
    }
    if let Some(max) = args.max_deltas {
        config.curation.max_deltas_per_tick = max;
    }
    if let Some(limit) = args.context_limit {
        config.curation.context_limit = limit;
    }
    if let Some(chars) = args.context_chars {
        config.curation.context_chars = chars;
    }
    if let Some(sections) = args.max_sections {
        config.curation.max_sections = sections;
    }
    config.validate()?;
    Ok(config)
}

fn build_planner(config: &ForagerConfig) -> Box<dyn Planner> {
    let fallback = HeuristicPlanner::new(config.seed);
    match config.planner.mode {
        PlannerMode::Heuristic => Box::new(fallback),
        PlannerMode::Delegate => Box::new(DelegatedPlanner::new(
            Box::new(cli_delegate(config, 0)),
            fallback,
        )),
    }
}

/// The reflector follows the planner mode: a delegated planner gets a
/// delegated reflector, otherwise the built-in heuristic reflects.
fn build_reflector(config: &ForagerConfig) -> Reflector {
    let max_items = config.curation.max_deltas_per_tick;
    match config.planner.mode {
        PlannerMode::Heuristic => Reflector::heuristic(max_items),
        PlannerMode::Delegate => {
            Reflector::with_delegate(max_items, Box::new(cli_delegate(config, max_items)))
        }
    }
}

fn cli_delegate(config: &ForagerConfig, max_items: usize) -> CliDelegate {
    CliDelegate {
        binary: config.planner.binary.clone(),
        model: config.planner.model.clone(),
        timeout_secs: config.planner.timeout_secs,
        skip_permissions: config.planner.skip_permissions,
        extra_args: config.planner.extra_args.clone(),
        max_items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_defaults() {
        let cli = Cli::parse_from(["forager", "run"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config, PathBuf::from("forager.toml"));
        assert!(args.ticks.is_none());
        assert!(!args.enable_curation);
    }

    #[test]
    fn parse_run_overrides() {
        let cli = Cli::parse_from([
            "forager",
            "run",
            "--ticks",
            "10",
            "--episodes",
            "3",
            "--seed",
            "7",
            "--planner-mode",
            "delegate",
            "--enable-curation",
            "--refine-every",
            "5",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.ticks, Some(10));
        assert_eq!(args.episodes, Some(3));
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.planner_mode, Some(PlannerMode::Delegate));
        assert!(args.enable_curation);
        assert_eq!(args.refine_every, Some(5));
    }

    #[test]
    fn parse_analyze_requires_paths() {
        assert!(Cli::try_parse_from(["forager", "analyze"]).is_err());
        let cli = Cli::parse_from(["forager", "analyze", "runs/", "--top-targets", "2"]);
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.paths, vec![PathBuf::from("runs/")]);
        assert_eq!(args.top_targets, 2);
        assert!(args.out.is_none());
    }

    #[test]
    fn flags_override_config_file_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("forager.toml");
        std::fs::write(&path, "tick_limit = 20\nseed = 5\n").expect("write");

        let cli = Cli::parse_from([
            "forager",
            "run",
            "--config",
            path.to_str().expect("utf8 path"),
            "--ticks",
            "8",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = effective_config(&args).expect("config");
        assert_eq!(config.tick_limit, 8);
        assert_eq!(config.seed, 5);
        assert_eq!(config.episodes, 1);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli = Cli::parse_from(["forager", "run", "--ticks", "0"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(effective_config(&args).is_err());
    }
}
