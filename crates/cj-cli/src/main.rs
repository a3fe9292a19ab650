//! Conjoint CLI

mod analysis_spec;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cj_inference::{
    ColumnMatch, EncoderConfig, EncodingMode, OlsOptions, SimpleConjoint, run_bridged_analysis,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "conjoint")]
#[command(about = "Choice-based conjoint analysis with two-stage bridging")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pooled single-stage analysis of one choice table
    Simple {
        /// Input choice table (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Attribute columns to encode (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        predictors: Vec<String>,

        /// Encoding mode: full, reduced, anchored
        #[arg(long, default_value = "reduced")]
        mode: String,

        /// Anchor columns for `--mode anchored` (comma-separated)
        #[arg(long, value_delimiter = ',')]
        anchors: Vec<String>,

        /// Predictor matching: exact or substring
        #[arg(long, default_value = "exact")]
        matching: String,

        /// Accept rank-deficient designs (minimum-norm solution)
        #[arg(long)]
        min_norm_fallback: bool,

        /// Encoded columns summed into a total worth (comma-separated)
        #[arg(long, value_delimiter = ',')]
        prob_mix: Vec<String>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Estimate, bridge and aggregate from a YAML analysis config
    Bridge {
        /// Analysis config (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto). Overrides `execution.threads`.
        #[arg(long)]
        threads: Option<usize>,

        /// Include the per-column branch map in the output.
        #[arg(long)]
        debug: bool,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Simple {
            input,
            predictors,
            mode,
            anchors,
            matching,
            min_norm_fallback,
            prob_mix,
            output,
        } => {
            let encoder = EncoderConfig {
                predictors,
                mode: EncodingMode::from_name(&mode, &anchors)?,
                matching: matching.parse::<ColumnMatch>()?,
            };
            cmd_simple(&input, &encoder, OlsOptions { min_norm_fallback }, &prob_mix, output.as_ref())
        }
        Commands::Bridge { config, output, threads, debug } => {
            cmd_bridge(&config, output.as_ref(), threads, debug)
        }
        Commands::Version => {
            println!("conjoint {}", cj_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_simple(
    input: &PathBuf,
    encoder: &EncoderConfig,
    ols: OlsOptions,
    prob_mix: &[String],
    output: Option<&PathBuf>,
) -> Result<()> {
    tracing::info!(path = %input.display(), "loading choice table");
    let table = analysis_spec::read_choice_table(input)?;
    tracing::info!(observations = table.observations.len(), "choice table loaded");

    let analysis = SimpleConjoint::fit(&table, encoder, ols)?;
    let fit = analysis.regression();
    tracing::info!(rank = fit.rank, r_squared = fit.r_squared, "fit complete");

    let total = if prob_mix.is_empty() { None } else { Some(analysis.prob_mix(prob_mix)?) };

    let output_json = serde_json::json!({
        "columns": fit.names,
        "partworths": analysis.partworths(),
        "n_obs": fit.n_obs,
        "rank": fit.rank,
        "rss": fit.rss,
        "r_squared": fit.r_squared,
        "prob_mix": total,
    });

    write_json(output, output_json)
}

fn cmd_bridge(
    config: &PathBuf,
    output: Option<&PathBuf>,
    threads: Option<usize>,
    debug: bool,
) -> Result<()> {
    tracing::info!(path = %config.display(), "loading analysis config");
    let spec = analysis_spec::read_analysis_spec(config)?;
    let base_dir = config.parent().map(PathBuf::from).unwrap_or_default();
    let plan = analysis_spec::build_run_plan(&spec, &base_dir)?;

    let threads = threads.unwrap_or(plan.threads);
    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }

    let analysis =
        run_bridged_analysis(&plan.stage_1, &plan.stage_1_config, plan.stage_2, &plan.bridge)?;
    tracing::info!(
        bridged = analysis.bridging.table.len(),
        failed = analysis.failures.len(),
        "bridging complete"
    );
    for f in &analysis.failures {
        tracing::warn!(respondent = %f.respondent, kind = f.error.kind(), "{}", f.error);
    }

    let summary = if analysis.bridging.table.is_empty() {
        None
    } else {
        Some(analysis.summary(plan.method)?)
    };
    let total = match &summary {
        Some(s) if !plan.prob_mix.is_empty() => Some(s.prob_mix(&plan.prob_mix)?),
        _ => None,
    };

    let mut output_json = serde_json::json!({
        "stage_1_columns": analysis.stage_1.columns,
        "unified": analysis.bridging.table,
        "failures": analysis.failures,
        "summary": summary,
        "prob_mix": total,
    });
    if debug && let Some(obj) = output_json.as_object_mut() {
        obj.insert("debug".to_string(), serde_json::to_value(&analysis.bridging.debug)?);
    }

    write_json(output, output_json)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
