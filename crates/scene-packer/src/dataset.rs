//! On-disk chunked dataset handle backed by pre-allocated `.npy` arrays.
//!
//! A dataset is a directory holding one structured array per level:
//! `scenes.npy`, `frames.npy`, `agents.npy`, `traffic_light_faces.npy`.
//! Arrays are allocated once at their final length and then filled in place
//! through half-open slice writes; they never grow. Growing columnar storage
//! record-by-record is what this layout exists to avoid.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf};

use npyz::{NpyFile, TypeRead, TypeWrite, WriterBuilder};

use crate::error::DatasetError;
use crate::schema::{AgentRow, FrameRow, SceneRow, StructuredRow, TlFaceRow};

pub const SCENES_FILE: &str = "scenes.npy";
pub const FRAMES_FILE: &str = "frames.npy";
pub const AGENTS_FILE: &str = "agents.npy";
pub const TL_FACES_FILE: &str = "traffic_light_faces.npy";

/// Per-level record counts, used both for pre-allocation sizing and as the
/// running write cursor threaded through subset copies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ElementCounts {
    pub num_scenes: u64,
    pub num_frames: u64,
    pub num_agents: u64,
    pub num_tl_faces: u64,
}

impl Add for ElementCounts {
    type Output = ElementCounts;

    fn add(self, rhs: ElementCounts) -> ElementCounts {
        ElementCounts {
            num_scenes: self.num_scenes + rhs.num_scenes,
            num_frames: self.num_frames + rhs.num_frames,
            num_agents: self.num_agents + rhs.num_agents,
            num_tl_faces: self.num_tl_faces + rhs.num_tl_faces,
        }
    }
}

impl AddAssign for ElementCounts {
    fn add_assign(&mut self, rhs: ElementCounts) {
        *self = *self + rhs;
    }
}

impl fmt::Display for ElementCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scenes, {} frames, {} agents, {} tl-faces",
            self.num_scenes, self.num_frames, self.num_agents, self.num_tl_faces
        )
    }
}

/// One pre-allocated structured array opened for random record access.
///
/// The `.npy` header is parsed once at open time; records are addressed by
/// `data_offset + index * BYTES`. Writes require a handle obtained from
/// [`SceneDataset::initialize`].
#[derive(Debug)]
pub struct ArraySeries<T: StructuredRow> {
    file: File,
    path: PathBuf,
    label: &'static str,
    data_offset: u64,
    len: u64,
    _marker: PhantomData<T>,
}

impl<T: StructuredRow> ArraySeries<T> {
    fn open(
        dir: &Path,
        file_name: &str,
        label: &'static str,
        writable: bool,
    ) -> Result<Self, DatasetError> {
        let path = dir.join(file_name);
        let mut file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&path)
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    DatasetError::format(dir, format!("missing {file_name}"))
                } else {
                    DatasetError::Io(err)
                }
            })?;

        let (dtype, shape) = {
            let npy = NpyFile::new(&mut file)
                .map_err(|err| DatasetError::format(&path, format!("bad npy header: {err}")))?;
            (npy.dtype(), npy.shape().to_vec())
        };
        if shape.len() != 1 {
            return Err(DatasetError::format(
                &path,
                format!("expected a 1-D array, found shape {shape:?}"),
            ));
        }
        if dtype != T::dtype() {
            return Err(DatasetError::format(
                &path,
                format!("dtype does not match the {label} schema"),
            ));
        }
        let len = shape[0];

        // Header reads are exact, so the cursor now sits on the first record.
        let data_offset = file.stream_position()?;
        let expected = data_offset + len * T::BYTES as u64;
        let actual = file.metadata()?.len();
        if actual < expected {
            return Err(DatasetError::format(
                &path,
                format!("truncated payload: {actual} bytes on disk, {expected} expected"),
            ));
        }

        Ok(ArraySeries {
            file,
            path,
            label,
            data_offset,
            len,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read one record.
    pub fn get(&self, index: u64) -> Result<T, DatasetError> {
        let mut rows = self.read_range(index, index + 1)?;
        Ok(rows.pop().expect("read_range returned one record"))
    }

    /// Read the half-open record range `[start, end)` in one bulk pass.
    pub fn read_range(&self, start: u64, end: u64) -> Result<Vec<T>, DatasetError> {
        if start > end || end > self.len {
            return Err(DatasetError::OutOfBounds {
                array: self.label,
                start,
                end,
                len: self.len,
            });
        }
        let count = (end - start) as usize;
        if count == 0 {
            return Ok(Vec::new());
        }

        (&self.file).seek(SeekFrom::Start(self.record_offset(start)))?;
        let mut reader = BufReader::new(&self.file);
        let type_reader = T::reader(&T::dtype())
            .map_err(|err| DatasetError::format(&self.path, err.to_string()))?;
        let mut rows = Vec::with_capacity(count);
        for _ in 0..count {
            rows.push(type_reader.read_one(&mut reader)?);
        }
        Ok(rows)
    }

    /// Write `rows` starting at record `start`. The write must fit inside the
    /// pre-allocated length; there is no append path.
    pub fn write_range(&mut self, start: u64, rows: &[T]) -> Result<(), DatasetError> {
        let end = start + rows.len() as u64;
        if end > self.len {
            return Err(DatasetError::OutOfBounds {
                array: self.label,
                start,
                end,
                len: self.len,
            });
        }
        if rows.is_empty() {
            return Ok(());
        }

        (&self.file).seek(SeekFrom::Start(self.record_offset(start)))?;
        let mut writer = BufWriter::new(&self.file);
        let type_writer = T::writer(&T::dtype())
            .map_err(|err| DatasetError::format(&self.path, err.to_string()))?;
        for row in rows {
            type_writer.write_one(&mut writer, row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn record_offset(&self, index: u64) -> u64 {
        self.data_offset + index * T::BYTES as u64
    }
}

fn create_array<T: StructuredRow>(path: &Path, len: u64) -> Result<(), DatasetError> {
    let file = File::create(path)?;
    let mut writer = npyz::WriteOptions::new()
        .dtype(T::dtype())
        .shape(&[len])
        .writer(BufWriter::new(file))
        .begin_nd()
        .map_err(|err| DatasetError::format(path, format!("failed to write header: {err}")))?;
    writer.extend((0..len).map(|_| T::default()))?;
    writer.finish()?;
    Ok(())
}

/// Handle over one chunked scene dataset.
///
/// The handle exclusively owns its four arrays; sequences are never shared
/// across handles. A handle returned by [`SceneDataset::open`] is read-only;
/// [`SceneDataset::initialize`] returns the only writable kind.
#[derive(Debug)]
pub struct SceneDataset {
    path: PathBuf,
    pub scenes: ArraySeries<SceneRow>,
    pub frames: ArraySeries<FrameRow>,
    pub agents: ArraySeries<AgentRow>,
    pub tl_faces: ArraySeries<TlFaceRow>,
}

impl SceneDataset {
    /// Open an existing dataset read-only, validating structure once.
    pub fn open(path: &Path) -> Result<SceneDataset, DatasetError> {
        let dataset = Self::open_with(path, false)?;
        dataset.validate()?;
        Ok(dataset)
    }

    /// Pre-allocate a fresh dataset with exactly `counts` records per level.
    ///
    /// Array contents start zeroed and carry no meaning until written; the
    /// returned handle is writable. Fails if `path` already exists.
    pub fn initialize(path: &Path, counts: ElementCounts) -> Result<SceneDataset, DatasetError> {
        if path.exists() {
            return Err(DatasetError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        fs::create_dir_all(path)?;
        create_array::<SceneRow>(&path.join(SCENES_FILE), counts.num_scenes)?;
        create_array::<FrameRow>(&path.join(FRAMES_FILE), counts.num_frames)?;
        create_array::<AgentRow>(&path.join(AGENTS_FILE), counts.num_agents)?;
        create_array::<TlFaceRow>(&path.join(TL_FACES_FILE), counts.num_tl_faces)?;
        // A half-written destination is not a valid dataset yet, so no
        // bookkeeping validation here.
        Self::open_with(path, true)
    }

    fn open_with(path: &Path, writable: bool) -> Result<SceneDataset, DatasetError> {
        if !path.is_dir() {
            return Err(DatasetError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(SceneDataset {
            path: path.to_path_buf(),
            scenes: ArraySeries::open(path, SCENES_FILE, "scenes", writable)?,
            frames: ArraySeries::open(path, FRAMES_FILE, "frames", writable)?,
            agents: ArraySeries::open(path, AGENTS_FILE, "agents", writable)?,
            tl_faces: ArraySeries::open(path, TL_FACES_FILE, "tl_faces", writable)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Boundary bookkeeping checks: the index chain must start at 0 and end
    /// exactly at the child sequence length, one level at a time. Interior
    /// contiguity follows from how datasets are produced and is not re-walked
    /// here.
    fn validate(&self) -> Result<(), DatasetError> {
        let num_scenes = self.scenes.len();
        if num_scenes == 0 {
            return if self.frames.is_empty() && self.agents.is_empty() && self.tl_faces.is_empty()
            {
                Ok(())
            } else {
                Err(DatasetError::format(
                    &self.path,
                    "empty scene index with dangling child records",
                ))
            };
        }

        let first_scene = self.scenes.get(0)?;
        let last_scene = self.scenes.get(num_scenes - 1)?;
        if first_scene.frame_index_interval[0] != 0 {
            return Err(DatasetError::format(
                &self.path,
                format!(
                    "first scene frame interval starts at {}, expected 0",
                    first_scene.frame_index_interval[0]
                ),
            ));
        }
        let num_frames = self.frames.len();
        if last_scene.frame_index_interval[1] != num_frames as i64 {
            return Err(DatasetError::format(
                &self.path,
                format!(
                    "last scene frame interval ends at {}, but {} frames are stored",
                    last_scene.frame_index_interval[1],
                    num_frames
                ),
            ));
        }

        if num_frames == 0 {
            return if self.agents.is_empty() && self.tl_faces.is_empty() {
                Ok(())
            } else {
                Err(DatasetError::format(
                    &self.path,
                    "empty frame index with dangling agent or tl-face records",
                ))
            };
        }

        let first_frame = self.frames.get(0)?;
        let last_frame = self.frames.get(num_frames - 1)?;
        if first_frame.agent_index_interval[0] != 0
            || last_frame.agent_index_interval[1] != self.agents.len() as i64
        {
            return Err(DatasetError::format(
                &self.path,
                format!(
                    "agent intervals cover [{}, {}), but {} agents are stored",
                    first_frame.agent_index_interval[0],
                    last_frame.agent_index_interval[1],
                    self.agents.len()
                ),
            ));
        }
        if first_frame.traffic_light_faces_index_interval[0] != 0
            || last_frame.traffic_light_faces_index_interval[1] != self.tl_faces.len() as i64
        {
            return Err(DatasetError::format(
                &self.path,
                format!(
                    "tl-face intervals cover [{}, {}), but {} tl-faces are stored",
                    first_frame.traffic_light_faces_index_interval[0],
                    last_frame.traffic_light_faces_index_interval[1],
                    self.tl_faces.len()
                ),
            ));
        }
        Ok(())
    }
}
