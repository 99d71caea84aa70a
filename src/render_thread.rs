//! Frame submission to a dedicated render thread.
//!
//! The render graph itself is single threaded. A producer (the game thread)
//! hands finished frame batches to the render thread through a
//! [`FrameMailbox`], a single-slot mailbox: at most one batch is pending at a
//! time, so the producer can never run more than one frame ahead.
//!
//! # Example
//!
//! ```ignore
//! let thread = RenderThread::spawn("render", move |frame: FrameBatch| {
//!     graph.execute(frame.index).ok();
//! })?;
//! thread.submit(FrameBatch { index: 0 })?;
//! let frames = thread.shutdown();
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Error returned when a batch cannot be handed over. Carries the batch back.
#[derive(Error)]
pub enum PushError<T> {
    /// A batch is already pending (only from `try_push`).
    #[error("mailbox already holds a pending batch")]
    Full(T),
    /// The mailbox was shut down.
    #[error("mailbox is shut down")]
    Closed(T),
}

impl<T> PushError<T> {
    /// Recover the batch that was not delivered.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(batch) | PushError::Closed(batch) => batch,
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

struct MailboxState<T> {
    pending: Option<T>,
    running: bool,
}

/// Single-slot blocking mailbox between a producer and the render thread.
pub struct FrameMailbox<T> {
    state: Mutex<MailboxState<T>>,
    /// Signaled when a batch arrives or on shutdown.
    available: Condvar,
    /// Signaled when the pending batch is taken or on shutdown.
    consumed: Condvar,
}

impl<T> FrameMailbox<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MailboxState {
                pending: None,
                running: true,
            }),
            available: Condvar::new(),
            consumed: Condvar::new(),
        }
    }

    /// Hand over a batch, blocking while the previous one is still pending.
    pub fn push(&self, batch: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        while state.running && state.pending.is_some() {
            self.consumed.wait(&mut state);
        }
        if !state.running {
            return Err(PushError::Closed(batch));
        }
        state.pending = Some(batch);
        self.available.notify_one();
        Ok(())
    }

    /// Hand over a batch without blocking.
    pub fn try_push(&self, batch: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        if !state.running {
            return Err(PushError::Closed(batch));
        }
        if state.pending.is_some() {
            return Err(PushError::Full(batch));
        }
        state.pending = Some(batch);
        self.available.notify_one();
        Ok(())
    }

    /// Take the pending batch, blocking until one arrives.
    ///
    /// Returns `None` once the mailbox is shut down and empty; a batch
    /// pushed before shutdown is still delivered.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(batch) = state.pending.take() {
                self.consumed.notify_all();
                return Some(batch);
            }
            if !state.running {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Take the pending batch if there is one.
    pub fn try_pop(&self) -> Option<T> {
        let batch = self.state.lock().pending.take();
        if batch.is_some() {
            self.consumed.notify_all();
        }
        batch
    }

    /// Stop accepting batches and wake every waiter.
    pub fn shutdown(&self) {
        self.state.lock().running = false;
        self.available.notify_all();
        self.consumed.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }
}

impl<T> Default for FrameMailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FrameMailbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FrameMailbox")
            .field("pending", &state.pending.is_some())
            .field("running", &state.running)
            .finish()
    }
}

/// A named thread that consumes one batch per wake-up.
///
/// Dropping the handle shuts the mailbox down and joins the thread; a pass
/// already executing is allowed to finish.
pub struct RenderThread<T: Send + 'static> {
    mailbox: Arc<FrameMailbox<T>>,
    handle: Option<JoinHandle<u64>>,
}

impl<T: Send + 'static> RenderThread<T> {
    pub fn spawn<F>(name: impl Into<String>, mut consumer: F) -> io::Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        let name = name.into();
        let mailbox = Arc::new(FrameMailbox::new());
        let worker = Arc::clone(&mailbox);
        let thread_name = name.clone();

        let handle = thread::Builder::new().name(name).spawn(move || {
            log::debug!("Render thread '{}' started", thread_name);
            let mut frames = 0u64;
            while let Some(batch) = worker.pop() {
                consumer(batch);
                frames += 1;
            }
            log::debug!(
                "Render thread '{}' stopped after {} frames",
                thread_name,
                frames
            );
            frames
        })?;

        Ok(Self {
            mailbox,
            handle: Some(handle),
        })
    }

    /// Submit a batch, blocking while the previous one is pending.
    pub fn submit(&self, batch: T) -> Result<(), PushError<T>> {
        self.mailbox.push(batch)
    }

    /// Submit a batch unless one is already pending.
    pub fn try_submit(&self, batch: T) -> Result<(), PushError<T>> {
        self.mailbox.try_push(batch)
    }

    pub fn mailbox(&self) -> &Arc<FrameMailbox<T>> {
        &self.mailbox
    }

    /// Shut down and join, returning the number of batches processed.
    pub fn shutdown(mut self) -> u64 {
        self.stop()
    }

    fn stop(&mut self) -> u64 {
        self.mailbox.shutdown();
        let Some(handle) = self.handle.take() else {
            return 0;
        };
        match handle.join() {
            Ok(frames) => frames,
            Err(_) => {
                log::error!("Render thread panicked");
                0
            }
        }
    }
}

impl<T: Send + 'static> Drop for RenderThread<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_single_slot() {
        let mailbox = FrameMailbox::new();
        mailbox.try_push(1).unwrap();
        assert!(mailbox.has_pending());
        assert!(matches!(mailbox.try_push(2), Err(PushError::Full(2))));

        assert_eq!(mailbox.try_pop(), Some(1));
        assert_eq!(mailbox.try_pop(), None);
        mailbox.try_push(3).unwrap();
        assert_eq!(mailbox.pop(), Some(3));
    }

    #[test]
    fn test_shutdown_wakes_consumer() {
        let mailbox = Arc::new(FrameMailbox::<u32>::new());
        let consumer = {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || mailbox.pop())
        };
        thread::sleep(Duration::from_millis(20));
        mailbox.shutdown();
        assert_eq!(consumer.join().unwrap(), None);
        assert!(!mailbox.is_running());
    }

    #[test]
    fn test_pending_batch_survives_shutdown() {
        let mailbox = FrameMailbox::new();
        mailbox.push(7).unwrap();
        mailbox.shutdown();
        assert_eq!(mailbox.push(8).unwrap_err().into_inner(), 8);
        assert_eq!(mailbox.pop(), Some(7));
        assert_eq!(mailbox.pop(), None);
    }

    #[test]
    fn test_render_thread_counts_frames() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let thread = {
            let seen = Arc::clone(&seen);
            RenderThread::spawn("test-render", move |frame: u64| seen.lock().push(frame)).unwrap()
        };
        for frame in 0..5 {
            thread.submit(frame).unwrap();
        }
        assert_eq!(thread.shutdown(), 5);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }
}
