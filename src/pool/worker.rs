//! Worker threads for the thread-backed pool.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::error::{Error, Result};

use super::task::{Completion, Envelope};

#[derive(Debug)]
pub(crate) struct WorkerHandle {
    pub(crate) id: usize,
    pub(crate) thread: Option<JoinHandle<()>>,
}

pub(crate) fn spawn_worker(
    id: usize,
    name: String,
    stack_size: Option<usize>,
    queue: Receiver<Envelope>,
    shutdown_now: Arc<AtomicBool>,
) -> Result<WorkerHandle> {
    let mut builder = thread::Builder::new().name(name);
    if let Some(stack_size) = stack_size {
        builder = builder.stack_size(stack_size);
    }

    let thread = builder
        .spawn(move || worker_loop(id, queue, shutdown_now))
        .map_err(|e| Error::spawn(format!("worker thread {}: {}", id, e)))?;

    Ok(WorkerHandle {
        id,
        thread: Some(thread),
    })
}

// Runs until the queue is closed and drained. A panic inside a task is
// captured by the envelope, so the loop itself never unwinds.
fn worker_loop(id: usize, queue: Receiver<Envelope>, shutdown_now: Arc<AtomicBool>) {
    while let Ok(envelope) = queue.recv() {
        if shutdown_now.load(Ordering::Acquire) {
            envelope.abandon();
            continue;
        }

        let task = envelope.id();
        match envelope.execute() {
            Completion::Succeeded | Completion::Skipped => {}
            Completion::Failed(message) => {
                tracing::warn!("worker {} caught panic in task {:?}: {}", id, task, message);
            }
        }
    }

    tracing::trace!("worker {} exiting", id);
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::catch_unwind;

    #[test]
    fn test_panic_message_from_str() {
        let payload = catch_unwind(|| panic!("plain message")).unwrap_err();
        assert_eq!(panic_message(payload), "plain message");
    }

    #[test]
    fn test_panic_message_from_formatted_string() {
        let payload = catch_unwind(|| panic!("value was {}", 41)).unwrap_err();
        assert_eq!(panic_message(payload), "value was 41");
    }

    #[test]
    fn test_panic_message_from_opaque_payload() {
        let payload = catch_unwind(|| std::panic::panic_any(7u32)).unwrap_err();
        assert_eq!(panic_message(payload), "unknown panic");
    }
}
