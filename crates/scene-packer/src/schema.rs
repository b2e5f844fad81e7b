//! Fixed-layout record schemas for the four dataset arrays.
//!
//! Every level of a dataset (scenes, frames, agents, traffic-light faces) is
//! a NumPy structured array with the dtype described here. Parent records
//! reference child records through half-open `[start, end)` index intervals
//! stored as `[i64; 2]` fields; the copy machinery rewrites those intervals
//! and treats everything else as opaque payload.

use npyz::{DType, Field, TypeStr};

/// Width of fixed byte-string identifier fields (`host`, `face_id`, ...).
pub const ID_BYTES: usize = 16;

/// Number of per-agent class probabilities.
pub const NUM_LABELS: usize = 17;

/// Number of traffic-light face status slots (active/inactive/unknown).
pub const NUM_TL_STATUSES: usize = 3;

/// Trait implemented by structured rows stored in a dataset array.
///
/// Types implementing this trait provide the NumPy dtype descriptor, a
/// declared on-disk record width used to address records inside a
/// pre-allocated array, and the `npyz` serialisation derives.
pub trait StructuredRow: Copy + Default + npyz::Serialize + npyz::Deserialize {
    /// Stable on-disk size of one record in bytes.
    const BYTES: usize;

    /// Return the NumPy dtype descriptor for the row.
    fn dtype() -> DType;
}

fn type_str(s: &str) -> TypeStr {
    s.parse().expect("static dtype strings must parse")
}

/// One driving session, covering a contiguous block of frames.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, npyz::Serialize, npyz::Deserialize, npyz::AutoSerialize,
)]
pub struct SceneRow {
    /// Half-open `[start, end)` range into the frame array.
    pub frame_index_interval: [i64; 2],
    /// NUL-padded host identifier that recorded the scene.
    pub host: [u8; ID_BYTES],
    pub start_time: i64,
    pub end_time: i64,
}

impl StructuredRow for SceneRow {
    const BYTES: usize = 16 + ID_BYTES + 8 + 8;

    fn dtype() -> DType {
        let i8_le = type_str("<i8");
        let u1 = type_str("|u1");
        DType::Record(vec![
            Field {
                name: "frame_index_interval".into(),
                dtype: DType::Array(2, Box::new(DType::Plain(i8_le.clone()))),
            },
            Field {
                name: "host".into(),
                dtype: DType::Array(ID_BYTES as u64, Box::new(DType::Plain(u1))),
            },
            Field {
                name: "start_time".into(),
                dtype: DType::Plain(i8_le.clone()),
            },
            Field {
                name: "end_time".into(),
                dtype: DType::Plain(i8_le),
            },
        ])
    }
}

/// One timestep of a scene, referencing the agents and traffic-light faces
/// observed at that time.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, npyz::Serialize, npyz::Deserialize, npyz::AutoSerialize,
)]
pub struct FrameRow {
    pub timestamp: i64,
    /// Half-open `[start, end)` range into the agent array.
    pub agent_index_interval: [i64; 2],
    /// Half-open `[start, end)` range into the traffic-light face array.
    pub traffic_light_faces_index_interval: [i64; 2],
    pub ego_translation: [f64; 3],
    pub ego_rotation: [[f64; 3]; 3],
}

impl StructuredRow for FrameRow {
    const BYTES: usize = 8 + 16 + 16 + 24 + 72;

    fn dtype() -> DType {
        let i8_le = type_str("<i8");
        let f8_le = type_str("<f8");
        DType::Record(vec![
            Field {
                name: "timestamp".into(),
                dtype: DType::Plain(i8_le.clone()),
            },
            Field {
                name: "agent_index_interval".into(),
                dtype: DType::Array(2, Box::new(DType::Plain(i8_le.clone()))),
            },
            Field {
                name: "traffic_light_faces_index_interval".into(),
                dtype: DType::Array(2, Box::new(DType::Plain(i8_le))),
            },
            Field {
                name: "ego_translation".into(),
                dtype: DType::Array(3, Box::new(DType::Plain(f8_le.clone()))),
            },
            Field {
                name: "ego_rotation".into(),
                dtype: DType::Array(3, Box::new(DType::Array(3, Box::new(DType::Plain(f8_le))))),
            },
        ])
    }
}

/// One detected dynamic object at a frame. Opaque payload to the copy
/// machinery, only relocated.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, npyz::Serialize, npyz::Deserialize, npyz::AutoSerialize,
)]
pub struct AgentRow {
    pub centroid: [f64; 2],
    pub extent: [f32; 3],
    pub yaw: f32,
    pub velocity: [f32; 2],
    pub track_id: u64,
    pub label_probabilities: [f32; NUM_LABELS],
}

impl StructuredRow for AgentRow {
    const BYTES: usize = 16 + 12 + 4 + 8 + 8 + 4 * NUM_LABELS;

    fn dtype() -> DType {
        let f8_le = type_str("<f8");
        let f4_le = type_str("<f4");
        let u8_le = type_str("<u8");
        DType::Record(vec![
            Field {
                name: "centroid".into(),
                dtype: DType::Array(2, Box::new(DType::Plain(f8_le))),
            },
            Field {
                name: "extent".into(),
                dtype: DType::Array(3, Box::new(DType::Plain(f4_le.clone()))),
            },
            Field {
                name: "yaw".into(),
                dtype: DType::Plain(f4_le.clone()),
            },
            Field {
                name: "velocity".into(),
                dtype: DType::Array(2, Box::new(DType::Plain(f4_le.clone()))),
            },
            Field {
                name: "track_id".into(),
                dtype: DType::Plain(u8_le),
            },
            Field {
                name: "label_probabilities".into(),
                dtype: DType::Array(NUM_LABELS as u64, Box::new(DType::Plain(f4_le))),
            },
        ])
    }
}

/// One traffic-light-face observation at a frame. Opaque payload, only
/// relocated.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, npyz::Serialize, npyz::Deserialize, npyz::AutoSerialize,
)]
pub struct TlFaceRow {
    /// NUL-padded face identifier.
    pub face_id: [u8; ID_BYTES],
    /// NUL-padded identifier of the owning traffic light.
    pub traffic_light_id: [u8; ID_BYTES],
    pub traffic_light_face_status: [f32; NUM_TL_STATUSES],
}

impl StructuredRow for TlFaceRow {
    const BYTES: usize = ID_BYTES + ID_BYTES + 4 * NUM_TL_STATUSES;

    fn dtype() -> DType {
        let u1 = type_str("|u1");
        let f4_le = type_str("<f4");
        DType::Record(vec![
            Field {
                name: "face_id".into(),
                dtype: DType::Array(ID_BYTES as u64, Box::new(DType::Plain(u1.clone()))),
            },
            Field {
                name: "traffic_light_id".into(),
                dtype: DType::Array(ID_BYTES as u64, Box::new(DType::Plain(u1))),
            },
            Field {
                name: "traffic_light_face_status".into(),
                dtype: DType::Array(NUM_TL_STATUSES as u64, Box::new(DType::Plain(f4_le))),
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npyz::TypeWrite;

    fn written_bytes<T: StructuredRow>() -> usize {
        let writer = T::writer(&T::dtype()).expect("dtype must describe the row");
        let mut buf = Vec::new();
        writer
            .write_one(&mut buf, &T::default())
            .expect("record must serialise");
        buf.len()
    }

    #[test]
    fn record_widths_match_declared_sizes() {
        assert_eq!(written_bytes::<SceneRow>(), SceneRow::BYTES);
        assert_eq!(written_bytes::<FrameRow>(), FrameRow::BYTES);
        assert_eq!(written_bytes::<AgentRow>(), AgentRow::BYTES);
        assert_eq!(written_bytes::<TlFaceRow>(), TlFaceRow::BYTES);
    }

    #[test]
    fn dtypes_are_records() {
        for dtype in [
            SceneRow::dtype(),
            FrameRow::dtype(),
            AgentRow::dtype(),
            TlFaceRow::dtype(),
        ] {
            assert!(matches!(dtype, DType::Record(_)));
        }
    }
}
