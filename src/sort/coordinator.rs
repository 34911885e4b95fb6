use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::SortConfig;
use crate::math::Vec3;

use super::error::{SortError, SortResult};
use super::ledger::{BufferLedger, BufferSlot};
use super::sorter::{DepthBucketSorter, SortOutput};
use super::storage::VertexStorage;
use super::types::{
    BufferState, BufferStates, CameraPose, CenterBuffer, IndexMode, OrderingBuffer,
    LANES_PER_SPLAT,
};
use super::worker::{spawn_sort_thread, CommandSender, ReplyReceiver, SorterCommand, SorterReply};

static NEXT_SORTER_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortEvent {
    Updated {
        generation: u64,
        splat_count: usize,
        sort_time: Duration,
    },
}

struct SortWorker {
    commands: CommandSender,
    replies: ReplyReceiver,
    thread: Option<JoinHandle<()>>,
}

/// Caller-side half of the sorter: forwards camera poses to a dedicated sort
/// thread and installs finished orderings into `S`.
pub struct SortCoordinator<S: VertexStorage> {
    config: SortConfig,
    storage: S,
    worker: Option<SortWorker>,
    installed: Option<(BufferSlot, OrderingBuffer)>,
    subscribers: Vec<Sender<SortEvent>>,
    ledger: BufferLedger,
    generation: u64,
    splat_count: usize,
    index_mode: IndexMode,
}

impl<S: VertexStorage> std::fmt::Debug for SortCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortCoordinator")
            .field("config", &self.config)
            .field("active", &self.is_active())
            .field("generation", &self.generation)
            .field("splat_count", &self.splat_count)
            .field("index_mode", &self.index_mode)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<S: VertexStorage> SortCoordinator<S> {
    pub fn new(storage: S) -> Self {
        Self {
            config: SortConfig::default(),
            storage,
            worker: None,
            installed: None,
            subscribers: Vec::new(),
            ledger: BufferLedger::new(),
            generation: 0,
            splat_count: 0,
            index_mode: IndexMode::Float,
        }
    }

    pub fn with_config(storage: S, config: SortConfig) -> SortResult<Self> {
        config.validate()?;
        let mut coordinator = Self::new(storage);
        coordinator.config = config;
        Ok(coordinator)
    }

    /// Validates the buffers, starts the sort thread and moves `ordering` and
    /// `centers` to it. A copy of `ordering` stays here as the installed buffer.
    pub fn init(
        &mut self,
        ordering: OrderingBuffer,
        centers: Vec<f32>,
        use_integer_indices: bool,
    ) -> SortResult<()> {
        if self.worker.is_some() {
            return Err(SortError::AlreadyInitialized);
        }

        let index_mode = IndexMode::from_integer_flag(use_integer_indices);
        let centers = CenterBuffer::new(centers)?;
        let splat_count = centers.splat_count();
        let expected = splat_count * LANES_PER_SPLAT;
        if ordering.len() != expected {
            return Err(SortError::OrderingLength {
                expected,
                actual: ordering.len(),
            });
        }
        if ordering.mode() != index_mode {
            return Err(SortError::IndexModeMismatch {
                requested: index_mode,
                actual: ordering.mode(),
            });
        }
        index_mode.check_splat_count(splat_count)?;

        let id = NEXT_SORTER_ID.fetch_add(1, Ordering::Relaxed);
        let sorter = DepthBucketSorter::new(self.config).with_ledger(self.ledger.clone());
        let (commands, replies, thread) = spawn_sort_thread(format!("splat-sort-{id}"), sorter)?;

        self.installed = Some((BufferSlot::OrderingB, ordering.clone()));
        self.ledger.set(BufferSlot::OrderingB, BufferState::WithCoordinator);
        self.ledger.set(BufferSlot::Centers, BufferState::InFlightToSorter);
        self.ledger.set(BufferSlot::OrderingA, BufferState::InFlightToSorter);
        let sent = commands.send(SorterCommand::Init {
            centers,
            slot: BufferSlot::OrderingA,
            ordering,
            index_mode,
        });
        if sent.is_err() {
            warn!("sort thread exited before init was delivered");
        }

        self.worker = Some(SortWorker {
            commands,
            replies,
            thread: Some(thread),
        });
        self.splat_count = splat_count;
        self.index_mode = index_mode;
        self.generation = 0;
        info!(id, splat_count, ?index_mode, "sort coordinator initialized");
        Ok(())
    }

    pub fn set_camera(&self, position: Vec3, direction: Vec3) {
        let Some(worker) = &self.worker else {
            debug!("set_camera without an active sort thread");
            return;
        };
        if worker
            .commands
            .send(SorterCommand::SetCamera(CameraPose::new(position, direction)))
            .is_err()
        {
            debug!("sort thread gone, dropping camera update");
        }
    }

    pub fn subscribe(&mut self) -> Receiver<SortEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Installs every result that has arrived, without blocking.
    pub fn poll(&mut self) -> usize {
        let mut installed = 0;
        loop {
            let reply = match &self.worker {
                Some(worker) => worker.replies.try_recv(),
                None => return installed,
            };
            match reply {
                Ok(SorterReply::Sorted(output)) => {
                    self.on_sorted(output);
                    installed += 1;
                }
                Err(TryRecvError::Empty) => return installed,
                Err(TryRecvError::Disconnected) => {
                    debug!("sort thread disconnected");
                    return installed;
                }
            }
        }
    }

    /// Blocks up to `timeout` for the next result, then drains any others.
    pub fn wait_for_update(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let reply = match &self.worker {
            Some(worker) => worker
                .replies
                .recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => return 0,
        };
        match reply {
            Ok(SorterReply::Sorted(output)) => {
                self.on_sorted(output);
                1 + self.poll()
            }
            Err(RecvTimeoutError::Timeout) => 0,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("sort thread disconnected");
                0
            }
        }
    }

    fn on_sorted(&mut self, output: SortOutput) {
        let SortOutput {
            slot,
            ordering,
            stats,
        } = output;
        self.ledger.set(slot, BufferState::WithCoordinator);

        if let (Some(worker), Some((prev_slot, previous))) = (&self.worker, self.installed.take()) {
            self.ledger.set(prev_slot, BufferState::InFlightToSorter);
            if worker
                .commands
                .send(SorterCommand::ReturnBuffer {
                    slot: prev_slot,
                    ordering: previous,
                })
                .is_err()
            {
                debug!("sort thread gone, dropping returned buffer");
            }
        }

        self.storage.install(&ordering);
        self.installed = Some((slot, ordering));
        self.generation += 1;

        let event = SortEvent::Updated {
            generation: self.generation,
            splat_count: stats.splat_count,
            sort_time: stats.elapsed,
        };
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    pub fn destroy(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        let thread = worker.thread.take();
        drop(worker);
        if let Some(thread) = thread {
            if thread.join().is_err() {
                warn!("sort thread panicked");
            }
        }
        self.installed = None;
        self.subscribers.clear();
        info!(generation = self.generation, "sort coordinator destroyed");
    }

    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    pub fn installed(&self) -> Option<&OrderingBuffer> {
        self.installed.as_ref().map(|(_, ordering)| ordering)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn splat_count(&self) -> usize {
        self.splat_count
    }

    /// Last recorded hand-off state of each buffer, or `None` once the sort
    /// thread is gone and its buffers have been dropped.
    pub fn buffer_states(&self) -> Option<BufferStates> {
        self.worker.as_ref().map(|_| self.ledger.snapshot())
    }
}

impl<S: VertexStorage> Drop for SortCoordinator<S> {
    fn drop(&mut self) {
        self.destroy();
    }
}
