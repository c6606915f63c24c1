//! Occupancy Sensor Pipeline CLI
//!
//! Trains and evaluates household occupancy classifiers on motion-sensor
//! snapshots.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use occupancy_sensor_pipeline::{
    config::Config,
    core::{parse_timestamp, AnalysisRange, CountMode, ExclusionReason, Granularity},
    model::ModelKind,
    Pipeline, VERSION,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "occupancy")]
#[command(version = VERSION)]
#[command(about = "Household occupancy classification from motion-sensor snapshots", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that reads a snapshot.
#[derive(Args)]
struct DataArgs {
    /// Path to the SQLite sensor snapshot
    #[arg(long, short)]
    snapshot: PathBuf,

    /// Window length (hourly, half-hourly or daily)
    #[arg(long)]
    granularity: Option<Granularity>,

    /// Which events are counted (all or motion-on)
    #[arg(long)]
    count_mode: Option<CountMode>,

    /// Start of a fixed analysis range (inclusive)
    #[arg(long, requires = "end")]
    start: Option<String>,

    /// End of a fixed analysis range (exclusive)
    #[arg(long, requires = "start")]
    end: Option<String>,

    /// Name of the events table
    #[arg(long)]
    events_table: Option<String>,

    /// Name of the labels table
    #[arg(long)]
    labels_table: Option<String>,
}

/// Options for splitting and model fitting.
#[derive(Args)]
struct ModelArgs {
    /// Classifier (majority, naive-bayes or knn)
    #[arg(long)]
    model: Option<ModelKind>,

    /// Seed for the split and the folds
    #[arg(long)]
    seed: Option<u64>,

    /// Share of houses held out for testing
    #[arg(long)]
    test_ratio: Option<f64>,

    /// Cross-validation folds on the training houses
    #[arg(long)]
    folds: Option<usize>,

    /// Neighbours for the knn classifier
    #[arg(long)]
    knn_k: Option<usize>,

    /// Add VAR(p) coefficients to the features
    #[arg(long)]
    var_lag: Option<usize>,

    /// Split without keeping label proportions
    #[arg(long)]
    no_stratify: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Jsonl,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and evaluate a classifier
    Run {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        model: ModelArgs,

        /// Write the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Evaluate every window granularity side by side
    Compare {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Export windowed counts
    Windows {
        #[command(flatten)]
        data: DataArgs,

        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Export format
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
    },

    /// Show what the snapshot contains and what cleaning removes
    Inspect {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Show configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = dispatch(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            data,
            model,
            report,
        } => {
            let config = build_config(config_path, &data, Some(&model))?;
            cmd_run(config, &data.snapshot, report.as_deref())
        }
        Commands::Compare { data, model } => {
            let config = build_config(config_path, &data, Some(&model))?;
            cmd_compare(config, &data.snapshot)
        }
        Commands::Windows {
            data,
            output,
            format,
        } => {
            let config = build_config(config_path, &data, None)?;
            cmd_windows(config, &data.snapshot, output.as_deref(), format)
        }
        Commands::Inspect { data } => {
            let config = build_config(config_path, &data, None)?;
            cmd_inspect(config, &data.snapshot)
        }
        Commands::Config { init, force } => cmd_config(config_path, init, force),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Config::load().context("loading configuration"),
    }
}

/// Configuration file values with command-line flags on top.
fn build_config(path: Option<&Path>, data: &DataArgs, model: Option<&ModelArgs>) -> Result<Config> {
    let mut config = load_config(path)?;

    if let Some(granularity) = data.granularity {
        config.granularity = granularity;
    }
    if let Some(count_mode) = data.count_mode {
        config.count_mode = count_mode;
    }
    if let (Some(start), Some(end)) = (&data.start, &data.end) {
        let Some(start) = parse_timestamp(start) else {
            bail!("invalid --start timestamp '{start}'");
        };
        let Some(end) = parse_timestamp(end) else {
            bail!("invalid --end timestamp '{end}'");
        };
        config.range = Some(AnalysisRange::new(start, end)?);
    }
    if let Some(table) = &data.events_table {
        config.schema.events_table = table.clone();
    }
    if let Some(table) = &data.labels_table {
        config.schema.labels_table = table.clone();
    }

    if let Some(model) = model {
        if let Some(kind) = model.model {
            config.model.kind = kind;
        }
        if let Some(seed) = model.seed {
            config.split.seed = seed;
        }
        if let Some(ratio) = model.test_ratio {
            config.split.test_ratio = ratio;
        }
        if let Some(folds) = model.folds {
            config.folds = folds;
        }
        if let Some(k) = model.knn_k {
            config.model.knn_k = k;
        }
        if model.var_lag.is_some() {
            config.model.var_lag = model.var_lag;
        }
        if model.no_stratify {
            config.split.stratify = false;
        }
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn cmd_run(config: Config, snapshot: &Path, report_path: Option<&Path>) -> Result<()> {
    println!("Occupancy Sensor Pipeline v{VERSION}");
    println!();

    let pipeline = Pipeline::new(config)?;
    let report = match report_path {
        Some(path) => pipeline.run_to(snapshot, path),
        None => pipeline.run(snapshot),
    }
    .with_context(|| format!("running pipeline on {}", snapshot.display()))?;

    println!("{}", report.summary());

    if let Some(path) = report_path {
        println!();
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn cmd_compare(config: Config, snapshot: &Path) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let loaded = pipeline.load(snapshot)?;

    println!("Granularity comparison ({})", pipeline.config().model.kind);
    println!("=========================================");
    println!();
    println!(
        "{:<12} {:>10} {:>8} {:>10} {:>10} {:>8}",
        "granularity", "rows", "houses", "cv_acc", "test_acc", "f1"
    );

    for granularity in Granularity::ALL {
        match pipeline
            .with_granularity(granularity)
            .run_snapshot(snapshot, &loaded)
        {
            Ok(report) => {
                let cv = report
                    .cross_validation
                    .as_ref()
                    .map(|cv| format!("{:.4}", cv.mean_accuracy))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<12} {:>10} {:>8} {:>10} {:>10.4} {:>8.4}",
                    granularity.as_str(),
                    report.counts.windowed_rows,
                    report.counts.houses_used,
                    cv,
                    report.accuracy(),
                    report.test.evaluation.f1
                );
            }
            Err(e) => println!("{:<12} failed: {e}", granularity.as_str()),
        }
    }
    Ok(())
}

fn cmd_windows(
    config: Config,
    snapshot: &Path,
    output: Option<&Path>,
    format: ExportFormat,
) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let loaded = pipeline.load(snapshot)?;
    let (_, aggregation) = pipeline.windows(&loaded);

    let content = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&aggregation.counts)?,
        ExportFormat::Jsonl => {
            let lines = aggregation
                .counts
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()?;
            lines.join("\n")
        }
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)
                .with_context(|| format!("writing windows to {}", path.display()))?;
            info!(rows = aggregation.counts.len(), path = %path.display(), "windows exported");
            println!(
                "Exported {} windowed rows to {}",
                aggregation.counts.len(),
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{content}")?;
        }
    }
    Ok(())
}

fn cmd_inspect(config: Config, snapshot: &Path) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let loaded = pipeline.load(snapshot)?;
    let prepared = pipeline.prepare(&loaded)?;
    let cleaning = &prepared.cleaning;
    let features = &prepared.features;

    println!("Snapshot: {}", snapshot.display());
    println!("=========");
    println!();
    println!("Rows:");
    println!("  Events: {}", prepared.raw_events);
    println!(
        "  Labels: {} ({} malformed skipped)",
        prepared.raw_labels, prepared.skipped_labels
    );
    println!();
    println!("Cleaning:");
    println!("  Kept: {}", cleaning.kept_rows);
    println!("  Missing field: {}", cleaning.missing_field);
    println!("  Invalid timestamp: {}", cleaning.invalid_timestamp);
    println!("  Invalid state: {}", cleaning.invalid_state);
    println!("  Duplicates: {}", cleaning.duplicates);
    println!();
    println!("Windows ({}):", pipeline.config().granularity);
    println!("  Rows: {}", prepared.aggregation.counts.len());
    println!("  Outside range: {}", prepared.aggregation.out_of_range);
    println!();
    println!("Houses:");
    println!("  Usable: {}", features.houses.len());
    println!("  Rooms: {}", features.rooms.join(", "));
    println!(
        "  Excluded (no events): {}",
        features.exclusions.count(ExclusionReason::NoEvents)
    );
    println!(
        "  Excluded (no label): {}",
        features.exclusions.count(ExclusionReason::NoLabel)
    );
    println!(
        "  Excluded (outside range): {}",
        features.exclusions.count(ExclusionReason::OutOfRange)
    );
    for house in &features.houses {
        println!(
            "    {} {} ({} windows)",
            house.house_id(),
            house.label,
            house.matrix.n_windows()
        );
    }
    Ok(())
}

fn cmd_config(path: Option<&Path>, init: bool, force: bool) -> Result<()> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::config_path);

    if init {
        if config_path.exists() && !force {
            bail!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            );
        }
        Config::default()
            .save_to(&config_path)
            .with_context(|| format!("writing {}", config_path.display()))?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    let config = load_config(path)?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", config_path.display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
