//! Tools for managing chunked driving-scene datasets.
//!
//! A dataset is a directory of four NumPy structured arrays — scenes,
//! frames, agents, traffic-light faces — where each level references the
//! next through half-open index intervals laid out contiguously. The
//! operations here merge ([`concat_datasets`]) and partition
//! ([`split_dataset`]) such datasets while keeping every interval pointer
//! consistent: outputs are pre-allocated to their exact final size from
//! boundary-record arithmetic, then filled with bulk copies whose interval
//! fields are rebased by fixed per-level deltas.
//!
//! Control flow is single-threaded and sequential; an interrupted run leaves
//! its destination in an unspecified state and should be discarded.

pub mod concat;
pub mod dataset;
pub mod error;
pub mod schema;
pub mod split;
pub mod subset;

pub use concat::{concat_datasets, ConcatSummary};
pub use dataset::{ArraySeries, ElementCounts, SceneDataset};
pub use error::DatasetError;
pub use schema::{AgentRow, FrameRow, SceneRow, StructuredRow, TlFaceRow};
pub use split::{dataset_size_bytes, split_dataset, SplitSpec, GIGABYTE, REMAINDER_SENTINEL};
pub use subset::{copy_scene_range, count_scene_range};
