use crate::math::Vec3;

use super::error::{SortError, SortResult};

pub const LANES_PER_SPLAT: usize = 4;
pub const COMPONENTS_PER_CENTER: usize = 3;
/// Largest splat count whose indices are all exact in an `f32`.
pub const MAX_FLOAT_INDEX_SPLATS: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub direction: Vec3,
}

impl CameraPose {
    pub fn new(position: Vec3, direction: Vec3) -> Self {
        Self {
            position,
            direction,
        }
    }

    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.position.max_abs_diff(other.position) < epsilon
            && self.direction.max_abs_diff(other.direction) < epsilon
    }

    pub fn depth_of(&self, point: Vec3) -> f32 {
        (point - self.position).dot(self.direction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Float,
    Integer,
}

impl IndexMode {
    pub fn from_integer_flag(use_integer_indices: bool) -> Self {
        if use_integer_indices {
            Self::Integer
        } else {
            Self::Float
        }
    }

    pub fn check_splat_count(self, splat_count: usize) -> SortResult<()> {
        if self == Self::Float && splat_count > MAX_FLOAT_INDEX_SPLATS {
            return Err(SortError::FloatIndexRange {
                splat_count,
                limit: MAX_FLOAT_INDEX_SPLATS,
            });
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
pub struct CenterBuffer {
    data: Vec<f32>,
}

impl CenterBuffer {
    pub fn new(data: Vec<f32>) -> SortResult<Self> {
        if data.len() % COMPONENTS_PER_CENTER != 0 {
            return Err(SortError::CenterLength { len: data.len() });
        }
        Ok(Self { data })
    }

    pub fn splat_count(&self) -> usize {
        self.data.len() / COMPONENTS_PER_CENTER
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Sorted splat indices, replicated once per quad vertex.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderingBuffer {
    Float(Vec<f32>),
    Integer(Vec<u32>),
}

impl OrderingBuffer {
    pub fn zeroed(mode: IndexMode, splat_count: usize) -> Self {
        let len = splat_count * LANES_PER_SPLAT;
        match mode {
            IndexMode::Float => Self::Float(vec![0.0; len]),
            IndexMode::Integer => Self::Integer(vec![0; len]),
        }
    }

    pub fn mode(&self) -> IndexMode {
        match self {
            Self::Float(_) => IndexMode::Float,
            Self::Integer(_) => IndexMode::Integer,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Float(values) => values.len(),
            Self::Integer(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn splat_count(&self) -> usize {
        self.len() / LANES_PER_SPLAT
    }

    /// Splat index stored at `slot`, with any parity fraction stripped.
    pub fn index_at(&self, slot: usize) -> u32 {
        match self {
            Self::Float(values) => values[slot].floor() as u32,
            Self::Integer(values) => values[slot],
        }
    }

    pub fn lane(&self, lane: usize) -> Vec<u32> {
        (0..self.splat_count())
            .map(|i| self.index_at(i * LANES_PER_SPLAT + lane))
            .collect()
    }

    pub(super) fn write_quad(&mut self, position: usize, index: u32, parity_offset: f32) {
        let start = position * LANES_PER_SPLAT;
        match self {
            Self::Float(values) => {
                values[start..start + LANES_PER_SPLAT].fill(index as f32 + parity_offset)
            }
            Self::Integer(values) => values[start..start + LANES_PER_SPLAT].fill(index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    WithCoordinator,
    InFlightToSorter,
    WithSorter,
    InFlightToCoordinator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStates {
    pub centers: BufferState,
    pub orderings: [BufferState; 2],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_buffer_rejects_partial_triples() {
        let err = CenterBuffer::new(vec![0.0; 7]).unwrap_err();
        assert!(matches!(err, SortError::CenterLength { len: 7 }));
    }

    #[test]
    fn float_quads_strip_parity() {
        let mut buffer = OrderingBuffer::zeroed(IndexMode::Float, 2);
        buffer.write_quad(1, 7, 0.2);
        assert_eq!(buffer.lane(3), vec![0, 7]);
        match &buffer {
            OrderingBuffer::Float(values) => assert!((values[4] - 7.2).abs() < 1e-6),
            OrderingBuffer::Integer(_) => panic!("expected float storage"),
        }
    }

    #[test]
    fn float_mode_rejects_counts_beyond_exact_f32() {
        assert!(IndexMode::Float
            .check_splat_count(MAX_FLOAT_INDEX_SPLATS)
            .is_ok());
        let err = IndexMode::Float
            .check_splat_count(MAX_FLOAT_INDEX_SPLATS + 1)
            .unwrap_err();
        assert!(matches!(
            err,
            SortError::FloatIndexRange {
                splat_count: 16_777_217,
                ..
            }
        ));
        assert!(err.is_precondition());
        assert!(IndexMode::Integer
            .check_splat_count(MAX_FLOAT_INDEX_SPLATS + 1)
            .is_ok());
    }

    #[test]
    fn float_quads_are_exact_up_to_the_limit() {
        let last = (MAX_FLOAT_INDEX_SPLATS - 1) as u32;
        let mut buffer = OrderingBuffer::zeroed(IndexMode::Float, 1);
        buffer.write_quad(0, last, 0.2);
        assert_eq!(buffer.lane(0), vec![last]);

        // One past the limit is no longer representable.
        buffer.write_quad(0, last + 2, 0.2);
        assert_ne!(buffer.lane(0), vec![last + 2]);
    }

    #[test]
    fn pose_gate_uses_every_component() {
        let a = CameraPose::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let mut b = a;
        b.direction.y += 5e-4;
        assert!(a.approx_eq(&b, 1e-3));
        b.position.x += 2e-3;
        assert!(!a.approx_eq(&b, 1e-3));
    }
}
