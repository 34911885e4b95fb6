use super::types::OrderingBuffer;

/// Implementations copy the ordering into storage they already own; the
/// coordinator keeps the buffer so it can hand it back to the sort thread.
pub trait VertexStorage {
    fn install(&mut self, ordering: &OrderingBuffer);
}

#[derive(Debug, Default)]
pub struct HostVertexStorage {
    contents: Option<OrderingBuffer>,
    uploads: u64,
}

impl HostVertexStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<&OrderingBuffer> {
        self.contents.as_ref()
    }

    pub fn upload_count(&self) -> u64 {
        self.uploads
    }
}

impl VertexStorage for HostVertexStorage {
    fn install(&mut self, ordering: &OrderingBuffer) {
        self.uploads += 1;
        match (&mut self.contents, ordering) {
            (Some(OrderingBuffer::Float(dst)), OrderingBuffer::Float(src)) if dst.len() == src.len() => {
                dst.copy_from_slice(src)
            }
            (Some(OrderingBuffer::Integer(dst)), OrderingBuffer::Integer(src))
                if dst.len() == src.len() =>
            {
                dst.copy_from_slice(src)
            }
            (slot, _) => *slot = Some(ordering.clone()),
        }
    }
}
