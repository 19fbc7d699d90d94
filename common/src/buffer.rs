//! Single-slot, latest-wins frame handoff between a capture producer and a
//! display consumer.
//!
//! The buffer holds at most one frame. Publishing replaces whatever frame is
//! still waiting, so a consumer that falls behind only ever sees the newest
//! capture instead of a growing backlog. Frames that are overwritten before
//! anyone takes them are dropped and counted in [`BufferStats::dropped`].
//!
//! Both async (`take`) and thread-blocking (`take_blocking`) consumers are
//! supported; `publish` and `close` never wait on either.

use std::fmt;
use std::pin::pin;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// Outcome of [`LatestFrameBuffer::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    /// The slot was empty; the frame is now pending.
    Stored,
    /// An unconsumed frame was discarded in favour of this one.
    Replaced,
    /// The buffer is closed; the frame was dropped.
    Closed,
}

/// Outcome of [`LatestFrameBuffer::take_blocking_timeout`].
#[derive(Debug, PartialEq, Eq)]
pub enum TakeTimeout<F> {
    Frame(F),
    Closed,
    TimedOut,
}

/// Counters describing how the drop-latest policy has behaved so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Frames accepted by `publish` (refused frames after close excluded).
    pub published: u64,
    /// Frames handed to a consumer.
    pub taken: u64,
    /// Frames overwritten before any consumer took them.
    pub dropped: u64,
}

struct Slot<F> {
    frame: Option<F>,
    closed: bool,
    stats: BufferStats,
}

impl<F> Slot<F> {
    /// `Some(Some(frame))` when a frame is pending, `Some(None)` once closed
    /// and drained, `None` when the caller has to wait.
    fn take_ready(&mut self) -> Option<Option<F>> {
        if let Some(frame) = self.frame.take() {
            self.stats.taken += 1;
            return Some(Some(frame));
        }
        if self.closed {
            return Some(None);
        }
        None
    }
}

/// Capacity-1, overwrite-on-publish buffer.
///
/// Share it between the producer and consumer behind an `Arc`. All access to
/// the slot goes through `publish`, the `take*` family and `close`.
pub struct LatestFrameBuffer<F> {
    slot: Mutex<Slot<F>>,
    /// Wakes threads parked in `take_blocking*`.
    ready: Condvar,
    /// Wakes tasks suspended in `take` / `closed`.
    notify: Notify,
}

impl<F> LatestFrameBuffer<F> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                frame: None,
                closed: false,
                stats: BufferStats::default(),
            }),
            ready: Condvar::new(),
            notify: Notify::new(),
        }
    }

    // Every critical section leaves the slot consistent, so a panic on another
    // thread while holding the lock cannot corrupt it.
    fn lock(&self) -> MutexGuard<'_, Slot<F>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake_all(&self) {
        self.ready.notify_all();
        self.notify.notify_waiters();
    }

    /// Make `frame` the pending frame, discarding any frame still waiting.
    ///
    /// Never blocks beyond the slot's short critical section. The displaced
    /// frame is dropped after the lock is released.
    pub fn publish(&self, frame: F) -> Published {
        let displaced = {
            let mut slot = self.lock();
            if slot.closed {
                return Published::Closed;
            }
            slot.stats.published += 1;
            let displaced = slot.frame.replace(frame);
            if displaced.is_some() {
                slot.stats.dropped += 1;
            }
            displaced
        };
        self.wake_all();

        match displaced {
            Some(_) => Published::Replaced,
            None => Published::Stored,
        }
    }

    /// Wait for the next frame published since the last take.
    ///
    /// Returns `None` once the buffer is closed and no frame is pending. A
    /// frame published before `close` is still delivered.
    pub async fn take(&self) -> Option<F> {
        loop {
            // Register interest before inspecting the slot so a publish that
            // lands between the check and the await is not missed.
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            let ready = self.lock().take_ready();
            if let Some(outcome) = ready {
                return outcome;
            }
            notified.await;
        }
    }

    /// Thread-blocking variant of [`take`](Self::take).
    pub fn take_blocking(&self) -> Option<F> {
        let mut slot = self.lock();
        loop {
            if let Some(outcome) = slot.take_ready() {
                return outcome;
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`take_blocking`](Self::take_blocking) but gives up after `timeout`.
    pub fn take_blocking_timeout(&self, timeout: Duration) -> TakeTimeout<F> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        loop {
            match slot.take_ready() {
                Some(Some(frame)) => return TakeTimeout::Frame(frame),
                Some(None) => return TakeTimeout::Closed,
                None => {}
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return TakeTimeout::TimedOut;
            }
            slot = self
                .ready
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Take the pending frame without waiting.
    pub fn try_take(&self) -> Option<F> {
        self.lock().take_ready().flatten()
    }

    /// Signal end-of-stream and release every waiting consumer.
    ///
    /// Returns `true` only for the call that actually closed the buffer;
    /// further calls are no-ops.
    pub fn close(&self) -> bool {
        let newly_closed = {
            let mut slot = self.lock();
            !std::mem::replace(&mut slot.closed, true)
        };
        if newly_closed {
            self.wake_all();
        }
        newly_closed
    }

    /// Resolve once the buffer has been closed.
    pub async fn closed(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn has_pending(&self) -> bool {
        self.lock().frame.is_some()
    }

    pub fn stats(&self) -> BufferStats {
        self.lock().stats
    }
}

impl<F> Default for LatestFrameBuffer<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> fmt::Debug for LatestFrameBuffer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.lock();
        f.debug_struct("LatestFrameBuffer")
            .field("pending", &slot.frame.is_some())
            .field("closed", &slot.closed)
            .field("stats", &slot.stats)
            .finish()
    }
}
