//! jailvote CLI
//!
//! One subcommand per pipeline stage; stages communicate only through the
//! artifacts under `--out-dir`, keyed by the run's flag combination, so each
//! stage can be invoked (and re-invoked) independently.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use jv_core::{DataSource, RunOptions, ScoreColumn, StudyConfig};
use jv_panel::WithinRegressor;
use jv_pipeline::{artifacts, balance, heterogeneity, prep, turnout, windows};
use jv_pipeline::{ArtifactPaths, BalanceRecord, ExperimentalWindow, Record};

#[derive(Parser)]
#[command(name = "jailvote")]
#[command(about = "jailvote - pre-election confinement and turnout pipeline")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    /// Every booking; unmatched rows model as non-voters.
    Full,
    /// Voter-matched bookings only.
    Matched,
}

impl From<SourceArg> for DataSource {
    fn from(s: SourceArg) -> Self {
        match s {
            SourceArg::Full => DataSource::Full,
            SourceArg::Matched => DataSource::Matched,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColumnArg {
    /// Name-weighted match probability.
    ScoreWeighted,
    /// Unweighted match probability.
    ScoreUnweighted,
}

impl From<ColumnArg> for ScoreColumn {
    fn from(c: ColumnArg) -> Self {
        match c {
            ColumnArg::ScoreWeighted => ScoreColumn::ScoreWeighted,
            ColumnArg::ScoreUnweighted => ScoreColumn::ScoreUnweighted,
        }
    }
}

/// Sample-selection flags shared by every stage. Together they key the
/// artifact tree, so pass the same combination to each stage of a run.
#[derive(Debug, Clone, Args)]
struct RunFlags {
    /// Record source.
    #[arg(long, value_enum, default_value = "full")]
    source: SourceArg,

    /// Only consider voters demarcated as active.
    #[arg(short = 'a', long)]
    active: bool,

    /// Match probability column on which to threshold records.
    #[arg(short = 'c', long, value_enum)]
    column: ColumnArg,

    /// Only consider voters registered prior to election day.
    #[arg(short = 'r', long)]
    registered: bool,

    /// Threshold above which to consider matched records as matches.
    #[arg(short = 't', long, default_value = "0.75")]
    threshold: f64,

    /// Only consider voters from jails that report bond amounts.
    #[arg(long)]
    exclude_no_bond: bool,

    /// Only consider voters from jails that report charges.
    #[arg(long)]
    exclude_no_charge: bool,

    /// Root directory for all pipeline artifacts.
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,
}

impl RunFlags {
    fn options(&self) -> Result<RunOptions> {
        let opts = RunOptions {
            source: self.source.into(),
            active: self.active,
            column: self.column.into(),
            registered: self.registered,
            threshold: self.threshold,
            exclude_no_bond: self.exclude_no_bond,
            exclude_no_charge: self.exclude_no_charge,
        };
        opts.validate()?;
        Ok(opts)
    }

    fn paths(&self, opts: &RunOptions) -> ArtifactPaths {
        ArtifactPaths::new(&self.out_dir, opts)
    }
}

/// Study-window flags shared by every stage.
#[derive(Debug, Clone, Args)]
struct StudyFlags {
    /// Per-state earliest-voting-date table (CSV: state, earliest_voting_date).
    #[arg(long)]
    voting_dates: PathBuf,

    /// Election day.
    #[arg(long, default_value = "2020-11-03")]
    election_day: NaiveDate,
}

impl StudyFlags {
    fn config(&self) -> Result<StudyConfig> {
        let table = artifacts::read_voting_dates(&self.voting_dates)?;
        Ok(StudyConfig::new(self.election_day, table)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Prep raw merged records: integrity checks, filters, derived features
    Prep {
        /// Raw merged booking/match records (CSV)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        study: StudyFlags,

        #[command(flatten)]
        flags: RunFlags,
    },

    /// Run the balance grid over control windows x treatment rollbacks
    BalanceGrid {
        #[command(flatten)]
        study: StudyFlags,

        #[command(flatten)]
        flags: RunFlags,

        /// Grid worker threads (0 = rayon default)
        #[arg(long, default_value = "15")]
        threads: usize,
    },

    /// Select the balance-safe experimental windows from the grid
    SelectWindows {
        #[command(flatten)]
        study: StudyFlags,

        #[command(flatten)]
        flags: RunFlags,
    },

    /// Re-fit the balance model on each selected window
    ModelBalance {
        #[command(flatten)]
        study: StudyFlags,

        #[command(flatten)]
        flags: RunFlags,
    },

    /// Fit the four turnout designs on each selected window
    ModelTurnout {
        #[command(flatten)]
        study: StudyFlags,

        #[command(flatten)]
        flags: RunFlags,
    },

    /// Fit race-interaction designs on each selected window
    ModelHeterogeneity {
        #[command(flatten)]
        study: StudyFlags,

        #[command(flatten)]
        flags: RunFlags,

        /// Restrict to states that report race directly
        #[arg(long)]
        race_reporting_only: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Prep { input, study, flags } => cmd_prep(&input, &study, &flags),
        Commands::BalanceGrid { study, flags, threads } => cmd_balance_grid(&study, &flags, threads),
        Commands::SelectWindows { study, flags } => cmd_select_windows(&study, &flags),
        Commands::ModelBalance { study, flags } => cmd_model_balance(&study, &flags),
        Commands::ModelTurnout { study, flags } => cmd_model_turnout(&study, &flags),
        Commands::ModelHeterogeneity { study, flags, race_reporting_only } => {
            cmd_model_heterogeneity(&study, &flags, race_reporting_only)
        }
    }
}

fn cmd_prep(input: &PathBuf, study: &StudyFlags, flags: &RunFlags) -> Result<()> {
    let opts = flags.options()?;
    let config = study.config()?;
    let paths = flags.paths(&opts);

    tracing::info!(path = %input.display(), "reading raw records");
    let raw: Vec<Record> = artifacts::read_csv(input)?;
    tracing::info!(records = raw.len(), "records read");

    let prepped = prep::prep(raw, &opts, &config)?;
    let out = paths.prepped_records_csv();
    artifacts::write_csv(&out, &prepped)?;
    tracing::info!(records = prepped.len(), path = %out.display(), "wrote prepped records");
    Ok(())
}

fn cmd_balance_grid(study: &StudyFlags, flags: &RunFlags, threads: usize) -> Result<()> {
    let opts = flags.options()?;
    let config = study.config()?;
    let paths = flags.paths(&opts);

    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }

    let records: Vec<Record> = artifacts::read_csv(&paths.prepped_records_csv())?;
    tracing::info!(records = records.len(), "running balance splits");

    let regressor = WithinRegressor::new();
    let grid = balance::run_grid(&records, &opts, &config, &regressor, Some(&paths))?;
    let out = paths.grid_csv();
    artifacts::write_csv(&out, &grid)?;
    tracing::info!(cells = grid.len(), path = %out.display(), "wrote balance grid");
    Ok(())
}

fn cmd_select_windows(study: &StudyFlags, flags: &RunFlags) -> Result<()> {
    let opts = flags.options()?;
    let config = study.config()?;
    let paths = flags.paths(&opts);

    let grid: Vec<BalanceRecord> = artifacts::read_csv(&paths.grid_csv())?;
    let selected = windows::select(&grid, &config);
    let out = paths.windows_csv();
    artifacts::write_csv(&out, &selected)?;
    tracing::info!(windows = selected.len(), path = %out.display(), "wrote experimental windows");
    Ok(())
}

fn cmd_model_balance(study: &StudyFlags, flags: &RunFlags) -> Result<()> {
    let opts = flags.options()?;
    study.config()?; // fail fast on a bad study table
    let paths = flags.paths(&opts);

    let selected: Vec<ExperimentalWindow> = artifacts::read_csv(&paths.windows_csv())?;
    let regressor = WithinRegressor::new();
    let models = balance::refit_selected(&selected, &opts, &regressor, &paths)?;
    let out = paths.balance_models_json();
    artifacts::write_json(&out, &models)?;
    tracing::info!(splits = models.len(), path = %out.display(), "wrote balance models");
    Ok(())
}

fn cmd_model_turnout(study: &StudyFlags, flags: &RunFlags) -> Result<()> {
    let opts = flags.options()?;
    study.config()?;
    let paths = flags.paths(&opts);

    let selected: Vec<ExperimentalWindow> = artifacts::read_csv(&paths.windows_csv())?;
    let regressor = WithinRegressor::new();
    let models = turnout::model_selected(&selected, &opts, &regressor, &paths)?;
    let out = paths.turnout_models_json();
    artifacts::write_json(&out, &models)?;
    tracing::info!(splits = models.len(), path = %out.display(), "wrote turnout models");
    Ok(())
}

fn cmd_model_heterogeneity(
    study: &StudyFlags,
    flags: &RunFlags,
    race_reporting_only: bool,
) -> Result<()> {
    let opts = flags.options()?;
    study.config()?;
    let paths = flags.paths(&opts);

    let selected: Vec<ExperimentalWindow> = artifacts::read_csv(&paths.windows_csv())?;
    let regressor = WithinRegressor::new();
    let models =
        heterogeneity::model_selected(&selected, &opts, &regressor, &paths, race_reporting_only)?;
    let out = paths.heterogeneity_models_json(race_reporting_only);
    artifacts::write_json(&out, &models)?;
    tracing::info!(splits = models.len(), path = %out.display(), "wrote heterogeneity models");
    Ok(())
}
