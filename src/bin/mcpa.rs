use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mcpa::io::{load_pattern_set, write_results};
use mcpa::{run_mcpa, ConfigFile, CorrelationClassifier, DistanceClassifier, McpaConfig, McpaResults, PatternClassifier};

#[derive(Clone, Copy, ValueEnum)]
enum ClassifierArg {
    Correlation,
    Distance,
}

#[derive(Parser)]
#[command(name = "mcpa", about = "Leave-one-subject-out multi-dimensional pattern analysis")]
struct Args {
    /// patterns.safetensors (keys: patterns, dims, event_types, times)
    #[arg(long)]
    input: PathBuf,

    /// JSON analysis configuration; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// results.safetensors output path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Classifier for two-condition analyses
    #[arg(long, value_enum, default_value_t = ClassifierArg::Correlation)]
    classifier: ClassifierArg,

    /// Override the configured feature subset size
    #[arg(long)]
    setsize: Option<usize>,

    /// Override the configured random seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            ConfigFile::from_json(&text)?.into_config()?
        }
        None => McpaConfig::default(),
    };
    if args.setsize.is_some() {
        cfg.setsize = args.setsize;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
        cfg.rsa.seed = seed;
    }

    let data = load_pattern_set(&args.input)?;

    let classifier: &dyn PatternClassifier = match args.classifier {
        ClassifierArg::Correlation => &CorrelationClassifier,
        ClassifierArg::Distance => &DistanceClassifier,
    };
    let results = run_mcpa(cfg, &data, classifier)?;

    match &results {
        McpaResults::Binary(r) => {
            for (c, label) in r.conditions.iter().enumerate() {
                let acc = r.subset_x_subj(c);
                let mean = mcpa::summarize::nan_mean(acc.iter().copied());
                println!("{label:>20}  mean accuracy {mean:.3}  ({} subsets × {} folds)", acc.nrows(), acc.ncols());
            }
        }
        McpaResults::Multiclass(r) => {
            for (subject, acc) in r.subjects.iter().zip(r.mean_accuracy()) {
                println!("subject {subject:>3}  mean accuracy {acc:.3}");
            }
        }
    }

    if let Some(out) = &args.output {
        write_results(&results, out)?;
        println!("Written → {}", out.display());
    }
    Ok(())
}
