//! Concatenate many chunked datasets into one pre-allocated output.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::dataset::{ElementCounts, SceneDataset};
use crate::error::DatasetError;
use crate::subset::{copy_scene_range, count_scene_range, default_progress_bar};

/// Totals for a finished concatenation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConcatSummary {
    /// Number of sources actually copied.
    pub sources: usize,
    /// Number of sources skipped because they failed to open.
    pub skipped: usize,
    /// Record counts of the output dataset.
    pub totals: ElementCounts,
}

/// Concatenate `sources` (in order) into a freshly allocated dataset at
/// `output`.
///
/// This is a best-effort aggregate: a source that is missing or structurally
/// invalid is logged and skipped, and the output numbering closes over the
/// gap. Any other failure aborts the whole operation. The output path must
/// not exist; it is pre-allocated in one shot from the summed source counts,
/// and the storage layer has no append path.
pub fn concat_datasets(
    sources: &[PathBuf],
    output: &Path,
) -> Result<ConcatSummary, DatasetError> {
    if output.exists() {
        return Err(DatasetError::AlreadyExists {
            path: output.to_path_buf(),
        });
    }

    // Open and size every source up front so the output can be allocated
    // exactly once.
    let mut survivors: Vec<(SceneDataset, ElementCounts)> = Vec::with_capacity(sources.len());
    let mut skipped = 0usize;
    for path in sources {
        match SceneDataset::open(path) {
            Ok(dataset) => {
                let counts = if dataset.scenes.is_empty() {
                    ElementCounts::default()
                } else {
                    count_scene_range(&dataset, 0, dataset.scenes.len())?
                };
                survivors.push((dataset, counts));
            }
            Err(err) if err.is_recoverable() => {
                warn!("skipping {}: {err}", path.display());
                skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    let mut totals = ElementCounts::default();
    for (_, counts) in &survivors {
        totals += *counts;
    }

    let mut dst = SceneDataset::initialize(output, totals)?;
    info!("pre-allocated {} at {}", totals, output.display());

    let pb = default_progress_bar(totals.num_scenes);
    let mut cursor = ElementCounts::default();
    for (src, _) in &survivors {
        pb.set_message(format!("copying {}", src.path().display()));
        cursor = copy_scene_range(src, &mut dst, 0, src.scenes.len(), cursor, Some(&pb))?;
    }
    pb.finish_with_message("concat complete");
    debug_assert_eq!(cursor, totals);

    info!(
        "concatenated {} dataset(s) into {} ({} skipped)",
        survivors.len(),
        output.display(),
        skipped
    );
    Ok(ConcatSummary {
        sources: survivors.len(),
        skipped,
        totals,
    })
}
