//! Background depth sorting of splats.
//!
//! [`SortCoordinator`] lives on the caller's thread and owns the installed
//! ordering. [`DepthBucketSorter`] runs on a dedicated thread that owns the
//! splat centers. Ordering buffers ping-pong between the two by value over
//! channels, so neither side can observe a buffer the other is writing.

mod coordinator;
mod error;
mod ledger;
mod sorter;
mod storage;
mod types;
mod worker;

pub use coordinator::{SortCoordinator, SortEvent};
pub use error::{SortError, SortResult};
pub use ledger::{BufferLedger, BufferSlot};
pub use sorter::{depth_range, DepthBucketSorter, SortOutput, SortStats};
pub use storage::{HostVertexStorage, VertexStorage};
pub use types::{
    BufferState, BufferStates, CameraPose, CenterBuffer, IndexMode, OrderingBuffer,
    COMPONENTS_PER_CENTER, LANES_PER_SPLAT,
};
pub use worker::{SorterCommand, SorterReply};
