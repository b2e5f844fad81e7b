//! Range accounting and contiguous-range copying between datasets.
//!
//! Both operations lean on the contiguity invariant: consecutive parent
//! records cover their child sequence without gaps or overlaps, so counts and
//! rebase deltas fall out of boundary records alone.

use std::path::Path;
use std::slice;

use indicatif::{ProgressBar, ProgressStyle};

use crate::dataset::{ElementCounts, SceneDataset};
use crate::error::DatasetError;

pub(crate) fn default_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> "),
    );
    pb
}

fn interval_bounds(
    interval: [i64; 2],
    path: &Path,
    what: &str,
) -> Result<(u64, u64), DatasetError> {
    let [raw_start, raw_end] = interval;
    let start = u64::try_from(raw_start)
        .map_err(|_| DatasetError::format(path, format!("negative {what} interval start {raw_start}")))?;
    let end = u64::try_from(raw_end)
        .map_err(|_| DatasetError::format(path, format!("negative {what} interval end {raw_end}")))?;
    if end < start {
        return Err(DatasetError::format(
            path,
            format!("inverted {what} interval [{raw_start}, {raw_end})"),
        ));
    }
    Ok((start, end))
}

fn shift_interval(interval: [i64; 2], delta: i64) -> [i64; 2] {
    [interval[0] + delta, interval[1] + delta]
}

/// Count the elements of every level covered by the scene range
/// `[scene_start, scene_end)`.
///
/// Only the four boundary records are read: the contiguity invariant makes
/// each level's count the difference between the last record's interval end
/// and the first record's interval start. Requires a non-empty range inside
/// `[0, len(scenes)]`.
pub fn count_scene_range(
    dataset: &SceneDataset,
    scene_start: u64,
    scene_end: u64,
) -> Result<ElementCounts, DatasetError> {
    let num_scenes = dataset.scenes.len();
    if scene_end <= scene_start || scene_end > num_scenes {
        return Err(DatasetError::OutOfBounds {
            array: "scenes",
            start: scene_start,
            end: scene_end,
            len: num_scenes,
        });
    }

    let first_scene = dataset.scenes.get(scene_start)?;
    let last_scene = dataset.scenes.get(scene_end - 1)?;
    let (frame_lo, _) = interval_bounds(first_scene.frame_index_interval, dataset.path(), "frame")?;
    let (_, frame_hi) = interval_bounds(last_scene.frame_index_interval, dataset.path(), "frame")?;
    let num_frames = frame_hi.checked_sub(frame_lo).ok_or_else(|| {
        DatasetError::format(
            dataset.path(),
            format!("scene frame intervals are not contiguous over [{scene_start}, {scene_end})"),
        )
    })?;

    let (num_agents, num_tl_faces) = if num_frames == 0 {
        (0, 0)
    } else {
        let first_frame = dataset.frames.get(frame_lo)?;
        let last_frame = dataset.frames.get(frame_hi - 1)?;
        let (agent_lo, _) =
            interval_bounds(first_frame.agent_index_interval, dataset.path(), "agent")?;
        let (_, agent_hi) =
            interval_bounds(last_frame.agent_index_interval, dataset.path(), "agent")?;
        let (tl_lo, _) = interval_bounds(
            first_frame.traffic_light_faces_index_interval,
            dataset.path(),
            "tl-face",
        )?;
        let (_, tl_hi) = interval_bounds(
            last_frame.traffic_light_faces_index_interval,
            dataset.path(),
            "tl-face",
        )?;
        let num_agents = agent_hi.checked_sub(agent_lo).ok_or_else(|| {
            DatasetError::format(dataset.path(), "frame agent intervals are not contiguous")
        })?;
        let num_tl_faces = tl_hi.checked_sub(tl_lo).ok_or_else(|| {
            DatasetError::format(dataset.path(), "frame tl-face intervals are not contiguous")
        })?;
        (num_agents, num_tl_faces)
    };

    Ok(ElementCounts {
        num_scenes: scene_end - scene_start,
        num_frames,
        num_agents,
        num_tl_faces,
    })
}

/// Copy the scene range `[scene_start, scene_end)` from `src` into `dst`,
/// starting at the per-level write positions given by `offsets`.
///
/// Every interval field is rebased by a fixed per-level delta
/// (`destination cursor - source block start`) computed once from the first
/// copied records; source blocks are internally contiguous, so the delta
/// holds for the whole range while only the destination cursor advances.
/// Returns the advanced cursor so callers can thread it through consecutive
/// copies without hidden running state.
///
/// The destination must have been pre-allocated large enough; running past
/// its capacity fails with [`DatasetError::OutOfBounds`] and leaves the
/// destination unspecified.
pub fn copy_scene_range(
    src: &SceneDataset,
    dst: &mut SceneDataset,
    scene_start: u64,
    scene_end: u64,
    offsets: ElementCounts,
    progress: Option<&ProgressBar>,
) -> Result<ElementCounts, DatasetError> {
    let num_scenes = src.scenes.len();
    if scene_start > scene_end || scene_end > num_scenes {
        return Err(DatasetError::OutOfBounds {
            array: "scenes",
            start: scene_start,
            end: scene_end,
            len: num_scenes,
        });
    }
    let mut cursor = offsets;
    if scene_start == scene_end {
        return Ok(cursor);
    }

    let first_scene = src.scenes.get(scene_start)?;
    let (range_frame_lo, _) =
        interval_bounds(first_scene.frame_index_interval, src.path(), "frame")?;
    let frame_delta = cursor.num_frames as i64 - range_frame_lo as i64;
    // Agent/tl deltas come from the first frame of the range; resolved lazily
    // so leading scenes with no frames cannot trip the lookup.
    let mut child_deltas: Option<(i64, i64)> = None;

    for scene_index in scene_start..scene_end {
        let mut scene = src.scenes.get(scene_index)?;
        let (frame_lo, frame_hi) =
            interval_bounds(scene.frame_index_interval, src.path(), "frame")?;
        let mut frames = src.frames.read_range(frame_lo, frame_hi)?;

        let (agents, tl_faces, agent_delta, tl_delta) =
            if let (Some(first), Some(last)) = (frames.first(), frames.last()) {
                let (agent_lo, _) =
                    interval_bounds(first.agent_index_interval, src.path(), "agent")?;
                let (_, agent_hi) =
                    interval_bounds(last.agent_index_interval, src.path(), "agent")?;
                let (tl_lo, _) = interval_bounds(
                    first.traffic_light_faces_index_interval,
                    src.path(),
                    "tl-face",
                )?;
                let (_, tl_hi) = interval_bounds(
                    last.traffic_light_faces_index_interval,
                    src.path(),
                    "tl-face",
                )?;
                let (agent_delta, tl_delta) = *child_deltas.get_or_insert((
                    cursor.num_agents as i64 - agent_lo as i64,
                    cursor.num_tl_faces as i64 - tl_lo as i64,
                ));
                let agents = src.agents.read_range(agent_lo, agent_hi)?;
                let tl_faces = src.tl_faces.read_range(tl_lo, tl_hi)?;
                (agents, tl_faces, agent_delta, tl_delta)
            } else {
                (Vec::new(), Vec::new(), 0, 0)
            };

        scene.frame_index_interval = shift_interval(scene.frame_index_interval, frame_delta);
        for frame in &mut frames {
            frame.agent_index_interval = shift_interval(frame.agent_index_interval, agent_delta);
            frame.traffic_light_faces_index_interval =
                shift_interval(frame.traffic_light_faces_index_interval, tl_delta);
        }

        dst.scenes
            .write_range(cursor.num_scenes, slice::from_ref(&scene))?;
        dst.frames.write_range(cursor.num_frames, &frames)?;
        dst.agents.write_range(cursor.num_agents, &agents)?;
        dst.tl_faces.write_range(cursor.num_tl_faces, &tl_faces)?;

        cursor.num_scenes += 1;
        cursor.num_frames += frames.len() as u64;
        cursor.num_agents += agents.len() as u64;
        cursor.num_tl_faces += tl_faces.len() as u64;
        if let Some(pb) = progress {
            pb.inc(1);
        }
    }

    Ok(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AgentRow, FrameRow, SceneRow, TlFaceRow};
    use tempfile::tempdir;

    const FRAMES_PER_SCENE: u64 = 4;
    const AGENTS_PER_FRAME: u64 = 3;
    const TL_EVERY: u64 = 2;

    fn id_bytes(tag: u64) -> [u8; 16] {
        let mut id = [0u8; 16];
        id[..8].copy_from_slice(&tag.to_le_bytes());
        id
    }

    /// Dataset with deterministic payloads: every record is derived from its
    /// global index, so relocation bugs show up as payload mismatches.
    fn build_source(path: &Path, num_scenes: u64) -> SceneDataset {
        let num_frames = num_scenes * FRAMES_PER_SCENE;
        let num_agents = num_frames * AGENTS_PER_FRAME;
        let num_tl_faces = num_frames.div_ceil(TL_EVERY);
        let mut ds = SceneDataset::initialize(
            path,
            ElementCounts {
                num_scenes,
                num_frames,
                num_agents,
                num_tl_faces,
            },
        )
        .unwrap();

        let mut scenes = Vec::new();
        let mut frames = Vec::new();
        let mut agents = Vec::new();
        let mut tl_faces = Vec::new();
        let mut tl_cursor = 0i64;
        for s in 0..num_scenes {
            scenes.push(SceneRow {
                frame_index_interval: [
                    (s * FRAMES_PER_SCENE) as i64,
                    ((s + 1) * FRAMES_PER_SCENE) as i64,
                ],
                host: id_bytes(s),
                start_time: s as i64 * 1_000,
                end_time: s as i64 * 1_000 + 999,
            });
        }
        for f in 0..num_frames {
            let tl_here = f % TL_EVERY == 0;
            frames.push(FrameRow {
                timestamp: f as i64 * 100,
                agent_index_interval: [
                    (f * AGENTS_PER_FRAME) as i64,
                    ((f + 1) * AGENTS_PER_FRAME) as i64,
                ],
                traffic_light_faces_index_interval: [tl_cursor, tl_cursor + tl_here as i64],
                ego_translation: [f as f64, -(f as f64), 0.5],
                ego_rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, f as f64]],
            });
            if tl_here {
                tl_faces.push(TlFaceRow {
                    face_id: id_bytes(f),
                    traffic_light_id: id_bytes(f + 1),
                    traffic_light_face_status: [f as f32, 0.0, 1.0],
                });
                tl_cursor += 1;
            }
            for a in 0..AGENTS_PER_FRAME {
                let g = f * AGENTS_PER_FRAME + a;
                agents.push(AgentRow {
                    centroid: [g as f64, -(g as f64)],
                    extent: [4.0, 1.8, 1.5],
                    yaw: g as f32 * 0.1,
                    velocity: [g as f32, 0.5],
                    track_id: g,
                    label_probabilities: [g as f32 / 1_000.0; 17],
                });
            }
        }
        ds.scenes.write_range(0, &scenes).unwrap();
        ds.frames.write_range(0, &frames).unwrap();
        ds.agents.write_range(0, &agents).unwrap();
        ds.tl_faces.write_range(0, &tl_faces).unwrap();
        ds
    }

    #[test]
    fn counts_full_range_from_boundaries() {
        let dir = tempdir().unwrap();
        let src = build_source(&dir.path().join("src"), 3);
        let counts = count_scene_range(&src, 0, 3).unwrap();
        assert_eq!(counts.num_scenes, 3);
        assert_eq!(counts.num_frames, 12);
        assert_eq!(counts.num_agents, 36);
        assert_eq!(counts.num_tl_faces, 6);
    }

    #[test]
    fn counts_interior_range() {
        let dir = tempdir().unwrap();
        let src = build_source(&dir.path().join("src"), 3);
        let counts = count_scene_range(&src, 1, 3).unwrap();
        assert_eq!(counts.num_scenes, 2);
        assert_eq!(counts.num_frames, 8);
        assert_eq!(counts.num_agents, 24);
        assert_eq!(counts.num_tl_faces, 4);
    }

    #[test]
    fn empty_or_inverted_ranges_are_rejected() {
        let dir = tempdir().unwrap();
        let src = build_source(&dir.path().join("src"), 3);
        for (start, end) in [(1, 1), (2, 1), (0, 4)] {
            let err = count_scene_range(&src, start, end).unwrap_err();
            assert!(matches!(err, DatasetError::OutOfBounds { .. }), "{start}..{end}");
        }
    }

    #[test]
    fn copy_into_fresh_destination_rebases_to_zero() {
        let dir = tempdir().unwrap();
        let src = build_source(&dir.path().join("src"), 3);
        let counts = count_scene_range(&src, 1, 3).unwrap();
        let dst_path = dir.path().join("dst");
        let mut dst = SceneDataset::initialize(&dst_path, counts).unwrap();
        let cursor =
            copy_scene_range(&src, &mut dst, 1, 3, ElementCounts::default(), None).unwrap();
        assert_eq!(cursor, counts);
        drop(dst);

        // Reopening runs the bookkeeping validation over the result.
        let out = SceneDataset::open(&dst_path).unwrap();
        let first_scene = out.scenes.get(0).unwrap();
        assert_eq!(first_scene.frame_index_interval, [0, 4]);
        assert_eq!(first_scene.host, id_bytes(1));
        let first_frame = out.frames.get(0).unwrap();
        assert_eq!(first_frame.agent_index_interval, [0, 3]);
        assert_eq!(first_frame.timestamp, 400);
        // Payloads relocate untouched.
        assert_eq!(
            out.agents.read_range(0, 3).unwrap(),
            src.agents.read_range(12, 15).unwrap()
        );
        assert_eq!(
            out.tl_faces.read_range(0, 1).unwrap(),
            src.tl_faces.read_range(2, 3).unwrap()
        );
    }

    #[test]
    fn consecutive_copies_thread_the_cursor() {
        let dir = tempdir().unwrap();
        let src = build_source(&dir.path().join("src"), 2);
        let per_copy = count_scene_range(&src, 0, 2).unwrap();
        let dst_path = dir.path().join("dst");
        let mut dst = SceneDataset::initialize(&dst_path, per_copy + per_copy).unwrap();

        let cursor =
            copy_scene_range(&src, &mut dst, 0, 2, ElementCounts::default(), None).unwrap();
        let cursor = copy_scene_range(&src, &mut dst, 0, 2, cursor, None).unwrap();
        assert_eq!(cursor, per_copy + per_copy);
        drop(dst);

        let out = SceneDataset::open(&dst_path).unwrap();
        let third_scene = out.scenes.get(2).unwrap();
        assert_eq!(third_scene.frame_index_interval, [8, 12]);
        let fifth_frame = out.frames.get(8).unwrap();
        assert_eq!(fifth_frame.agent_index_interval, [24, 27]);
        assert_eq!(fifth_frame.traffic_light_faces_index_interval, [4, 5]);
    }

    #[test]
    fn copy_past_destination_capacity_fails() {
        let dir = tempdir().unwrap();
        let src = build_source(&dir.path().join("src"), 2);
        let short = count_scene_range(&src, 0, 1).unwrap();
        let mut dst = SceneDataset::initialize(&dir.path().join("dst"), short).unwrap();
        let err =
            copy_scene_range(&src, &mut dst, 0, 2, ElementCounts::default(), None).unwrap_err();
        assert!(matches!(err, DatasetError::OutOfBounds { .. }));
    }
}
