use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;
use scene_packer::{
    concat_datasets, dataset_size_bytes, split_dataset, SceneDataset, SplitSpec, GIGABYTE,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Concatenate, split, and inspect chunked driving-scene datasets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Concatenate many datasets into one freshly allocated output
    Concat {
        /// Source dataset directories, copied in order
        #[arg(required = true, value_name = "DIR")]
        sources: Vec<PathBuf>,

        /// Output dataset directory (must not exist)
        #[arg(long, value_name = "DIR")]
        output: PathBuf,
    },
    /// Split one dataset into budget-sized pieces
    Split {
        /// Source dataset directory
        #[arg(long, value_name = "DIR")]
        input: PathBuf,

        /// Directory receiving the split outputs
        #[arg(long, value_name = "DIR")]
        output_dir: PathBuf,

        /// Split spec NAME=SIZE_GB; the last one must be NAME=-1 (remainder)
        #[arg(long = "split", value_name = "NAME=GB", conflicts_with = "spec_file")]
        splits: Vec<SplitSpec>,

        /// JSON file with [{"name": .., "split_size_GB": ..}] records
        #[arg(long, value_name = "FILE")]
        spec_file: Option<PathBuf>,
    },
    /// Print per-level record counts and on-disk size
    Info {
        /// Dataset directories to inspect
        #[arg(required = true, value_name = "DIR")]
        inputs: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match cli.command {
        Commands::Concat { sources, output } => {
            let summary = concat_datasets(&sources, &output)
                .with_context(|| format!("failed to concatenate into {}", output.display()))?;
            info!(
                "Completed concat: {} source(s), {} skipped, {}",
                summary.sources, summary.skipped, summary.totals
            );
        }
        Commands::Split {
            input,
            output_dir,
            splits,
            spec_file,
        } => {
            let specs = match spec_file {
                Some(path) => load_spec_file(&path)?,
                None => splits,
            };
            if specs.is_empty() {
                bail!("provide --split entries or --spec-file");
            }
            let cuts = split_dataset(&input, &output_dir, &specs)
                .with_context(|| format!("failed to split {}", input.display()))?;
            for (spec, (start, end)) in specs.iter().zip(&cuts) {
                info!("{}: scenes [{start}, {end})", spec.name);
            }
        }
        Commands::Info { inputs } => {
            for path in &inputs {
                let dataset = SceneDataset::open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                let bytes = dataset_size_bytes(path)?;
                println!(
                    "{}: {} scenes, {} frames, {} agents, {} tl-faces, {:.3} GB",
                    path.display(),
                    dataset.scenes.len(),
                    dataset.frames.len(),
                    dataset.agents.len(),
                    dataset.tl_faces.len(),
                    bytes as f64 / GIGABYTE as f64,
                );
            }
        }
    }
    Ok(())
}

fn load_spec_file(path: &Path) -> Result<Vec<SplitSpec>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}
