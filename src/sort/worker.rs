use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;

use tracing::{debug, info};

use super::ledger::BufferSlot;
use super::sorter::{DepthBucketSorter, SortOutput};
use super::types::{CameraPose, CenterBuffer, IndexMode, OrderingBuffer};

#[derive(Debug)]
pub enum SorterCommand {
    Init {
        centers: CenterBuffer,
        slot: BufferSlot,
        ordering: OrderingBuffer,
        index_mode: IndexMode,
    },
    SetCamera(CameraPose),
    ReturnBuffer {
        slot: BufferSlot,
        ordering: OrderingBuffer,
    },
}

#[derive(Debug)]
pub enum SorterReply {
    Sorted(SortOutput),
}

pub type CommandSender = Sender<SorterCommand>;
pub type ReplyReceiver = Receiver<SorterReply>;

pub fn spawn_sort_thread(
    name: String,
    sorter: DepthBucketSorter,
) -> std::io::Result<(CommandSender, ReplyReceiver, JoinHandle<()>)> {
    let (command_tx, command_rx) = mpsc::channel();
    let (reply_tx, reply_rx) = mpsc::channel();
    let handle = std::thread::Builder::new()
        .name(name)
        .spawn(move || run_sort_loop(sorter, command_rx, reply_tx))?;
    Ok((command_tx, reply_rx, handle))
}

/// Blocks until a command arrives, drains whatever else is queued so only the
/// newest pose is evaluated, then runs at most one pass.
fn run_sort_loop(
    mut sorter: DepthBucketSorter,
    commands: Receiver<SorterCommand>,
    replies: Sender<SorterReply>,
) {
    while let Ok(command) = commands.recv() {
        apply(&mut sorter, command);
        loop {
            match commands.try_recv() {
                Ok(command) => apply(&mut sorter, command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("sort thread channel closed");
                    return;
                }
            }
        }

        if let Some(output) = sorter.update() {
            if replies.send(SorterReply::Sorted(output)).is_err() {
                break;
            }
        }
    }
    info!("sort thread exiting");
}

fn apply(sorter: &mut DepthBucketSorter, command: SorterCommand) {
    match command {
        SorterCommand::Init {
            centers,
            slot,
            ordering,
            index_mode,
        } => sorter.install(centers, slot, ordering, index_mode),
        SorterCommand::SetCamera(pose) => {
            if !sorter.is_initialized() {
                debug!("camera update before init, ignoring");
                return;
            }
            sorter.set_pose(pose);
        }
        SorterCommand::ReturnBuffer { slot, ordering } => sorter.return_buffer(slot, ordering),
    }
}
