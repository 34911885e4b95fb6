use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use super::types::{BufferState, BufferStates};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSlot {
    Centers,
    OrderingA,
    OrderingB,
}

impl BufferSlot {
    fn index(self) -> usize {
        match self {
            Self::Centers => 0,
            Self::OrderingA => 1,
            Self::OrderingB => 2,
        }
    }
}

impl BufferState {
    fn to_u8(self) -> u8 {
        match self {
            Self::WithCoordinator => 0,
            Self::InFlightToSorter => 1,
            Self::WithSorter => 2,
            Self::InFlightToCoordinator => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::InFlightToSorter,
            2 => Self::WithSorter,
            3 => Self::InFlightToCoordinator,
            _ => Self::WithCoordinator,
        }
    }
}

/// Ownership record for the exchanged buffers.
///
/// Each side writes the state right before it sends or right after it
/// receives a buffer; the buffers themselves only ever move through channels.
#[derive(Debug, Clone)]
pub struct BufferLedger {
    states: Arc<[AtomicU8; 3]>,
}

impl Default for BufferLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferLedger {
    pub fn new() -> Self {
        let initial = BufferState::WithCoordinator.to_u8();
        Self {
            states: Arc::new([
                AtomicU8::new(initial),
                AtomicU8::new(initial),
                AtomicU8::new(initial),
            ]),
        }
    }

    pub fn set(&self, slot: BufferSlot, state: BufferState) {
        self.states[slot.index()].store(state.to_u8(), Ordering::Release);
    }

    pub fn get(&self, slot: BufferSlot) -> BufferState {
        BufferState::from_u8(self.states[slot.index()].load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> BufferStates {
        BufferStates {
            centers: self.get(BufferSlot::Centers),
            orderings: [self.get(BufferSlot::OrderingA), self.get(BufferSlot::OrderingB)],
        }
    }
}
