use thiserror::Error;

use super::types::IndexMode;

pub type SortResult<T> = Result<T, SortError>;

#[derive(Debug, Error)]
pub enum SortError {
    #[error("center buffer length {len} is not a multiple of 3")]
    CenterLength { len: usize },

    #[error("ordering buffer holds {actual} values, expected {expected} (4 per splat)")]
    OrderingLength { expected: usize, actual: usize },

    #[error("ordering buffer uses {actual:?} storage but {requested:?} indices were requested")]
    IndexModeMismatch {
        requested: IndexMode,
        actual: IndexMode,
    },

    #[error("{splat_count} splats exceed the float index limit of {limit}; use integer indices")]
    FloatIndexRange { splat_count: usize, limit: usize },

    #[error("sort coordinator is already initialized")]
    AlreadyInitialized,

    #[error("invalid sort config: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn sort worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl SortError {
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::CenterLength { .. }
                | Self::OrderingLength { .. }
                | Self::IndexModeMismatch { .. }
                | Self::FloatIndexRange { .. }
        )
    }
}
