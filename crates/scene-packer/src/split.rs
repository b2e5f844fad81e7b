//! Partition one chunked dataset into budget-sized pieces.

use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use log::info;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::dataset::{ElementCounts, SceneDataset};
use crate::error::DatasetError;
use crate::subset::{copy_scene_range, count_scene_range, default_progress_bar};

pub const GIGABYTE: u64 = 1 << 30;

/// Budget value marking the split that collects all remaining scenes.
pub const REMAINDER_SENTINEL: f64 = -1.0;

/// One requested split: output name plus a size budget in gigabytes.
///
/// The JSON shape (`{"name": .., "split_size_GB": ..}`) is accepted directly,
/// and `NAME=GB` strings parse for command-line use.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SplitSpec {
    pub name: String,
    #[serde(rename = "split_size_GB")]
    pub size_gb: f64,
}

impl SplitSpec {
    pub fn is_remainder(&self) -> bool {
        self.size_gb == REMAINDER_SENTINEL
    }
}

impl FromStr for SplitSpec {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, size) = s
            .split_once('=')
            .ok_or_else(|| DatasetError::Config(format!("expected NAME=GB, got '{s}'")))?;
        if name.is_empty() {
            return Err(DatasetError::Config(format!("empty split name in '{s}'")));
        }
        let size_gb: f64 = size
            .parse()
            .map_err(|_| DatasetError::Config(format!("bad size '{size}' in '{s}'")))?;
        Ok(SplitSpec {
            name: name.to_string(),
            size_gb,
        })
    }
}

/// Total on-disk size of a dataset directory in bytes, nested files included.
pub fn dataset_size_bytes(path: &Path) -> Result<u64, DatasetError> {
    let mut total = 0u64;
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(io::Error::from)?.len();
        }
    }
    Ok(total)
}

/// Split the dataset at `input` into `output_dir/<name>` pieces, one per
/// spec, and return the `(scene_start, scene_end)` cut boundaries in order.
///
/// Exactly the last spec must carry the `-1` remainder sentinel; it receives
/// every scene the budgeted splits leave over. Each budgeted split gets
/// `floor(total_scenes * budget_gb / total_gb)` scenes — a proportional
/// estimate over the whole-dataset byte size. Per-frame agent and tl-face
/// counts vary, so actual output sizes deviate from the requested budgets;
/// callers needing exact cuts should derive them from the returned
/// boundaries. Unlike concatenation, every failure here is fatal: a bad
/// source must not silently produce a partial split set.
pub fn split_dataset(
    input: &Path,
    output_dir: &Path,
    specs: &[SplitSpec],
) -> Result<Vec<(u64, u64)>, DatasetError> {
    let Some((last, budgeted)) = specs.split_last() else {
        return Err(DatasetError::Config(
            "at least one split spec is required".into(),
        ));
    };
    if !last.is_remainder() {
        return Err(DatasetError::Config(format!(
            "last split '{}' must use the -1 remainder sentinel, got {}",
            last.name, last.size_gb
        )));
    }
    for spec in budgeted {
        if spec.is_remainder() {
            return Err(DatasetError::Config(format!(
                "only the last split may use the remainder sentinel, found it on '{}'",
                spec.name
            )));
        }
        if !(spec.size_gb > 0.0) {
            return Err(DatasetError::Config(format!(
                "split '{}' has non-positive size {} GB",
                spec.name, spec.size_gb
            )));
        }
    }

    let src = SceneDataset::open(input)?;
    let total_scenes = src.scenes.len();
    let size_gb = dataset_size_bytes(input)? as f64 / GIGABYTE as f64;
    info!(
        "splitting {} ({} scenes, {size_gb:.3} GB) into {} piece(s)",
        input.display(),
        total_scenes,
        specs.len()
    );

    let mut targets: Vec<u64> = Vec::with_capacity(specs.len());
    let mut claimed = 0u64;
    for spec in budgeted {
        let target = (total_scenes as f64 * spec.size_gb / size_gb) as u64;
        claimed = claimed.saturating_add(target);
        targets.push(target);
    }
    if claimed >= total_scenes {
        return Err(DatasetError::Overflow {
            requested: claimed,
            available: total_scenes,
        });
    }
    targets.push(total_scenes - claimed);

    fs::create_dir_all(output_dir)?;
    let pb = default_progress_bar(total_scenes);
    let mut cuts = Vec::with_capacity(specs.len());
    let mut scene_cursor = 0u64;
    for (spec, target) in specs.iter().zip(&targets) {
        let start = scene_cursor;
        let end = start + target;
        let counts = if end == start {
            ElementCounts::default()
        } else {
            count_scene_range(&src, start, end)?
        };

        let dest = output_dir.join(&spec.name);
        info!("cutting scenes [{start}, {end}) into {}", dest.display());
        pb.set_message(format!("cutting into {}", spec.name));
        let mut dst = SceneDataset::initialize(&dest, counts)?;
        copy_scene_range(&src, &mut dst, start, end, ElementCounts::default(), Some(&pb))?;

        cuts.push((start, end));
        scene_cursor = end;
    }
    pb.finish_with_message("split complete");
    Ok(cuts)
}
