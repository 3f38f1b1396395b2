//! Producer/consumer slot rotation between a guest and the compositor.
//!
//! Slots move `Free -> Dequeued -> Queued -> Acquired -> Free`. A cancel
//! returns any non-free slot to the pool. The free pool and the queue
//! sequence are both FIFO, so acquires follow producer order and dequeues
//! hand out the longest-idle slot first.

use std::collections::VecDeque;

use mizu_servctl::{ServctlError, event::Event};
use parking_lot::{Condvar, Mutex};

use crate::types::{
    BinderObjectId, BufferTransformFlags, IgbpBuffer, LayerId, MultiFence, PIXEL_FORMAT_RGBA8888,
    QueryType, Rect,
};

/// Number of slots per queue.
pub const BUFFER_SLOTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferStatus {
    Free,
    Dequeued,
    Queued,
    Acquired,
}

/// One preallocated slot.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub slot: u32,
    pub status: BufferStatus,
    pub igbp: IgbpBuffer,
    pub transform: BufferTransformFlags,
    pub crop: Rect,
    pub swap_interval: u32,
    pub multi_fence: MultiFence,
}

#[derive(Debug)]
struct State {
    slots: Vec<Option<Buffer>>,
    free: VecDeque<u32>,
    queue_sequence: VecDeque<u32>,
    disconnected: bool,
}

impl State {
    fn slot_mut(&mut self, slot: u32) -> Result<&mut Buffer, BufferQueueError> {
        self.slots
            .get_mut(slot as usize)
            .ok_or(BufferQueueError::InvalidSlot(slot))?
            .as_mut()
            .ok_or(BufferQueueError::NotPreallocated(slot))
    }

    fn expect_status(
        &mut self,
        slot: u32,
        expected: BufferStatus,
    ) -> Result<&mut Buffer, BufferQueueError> {
        let buffer = self.slot_mut(slot)?;
        if buffer.status != expected {
            return Err(BufferQueueError::InvalidState {
                slot,
                expected,
                actual: buffer.status,
            });
        }
        Ok(buffer)
    }

    fn take_free(&mut self, width: u32, height: u32) -> Option<u32> {
        let slots = &self.slots;
        let index = self.free.iter().position(|&slot| {
            slots[slot as usize].as_ref().is_some_and(|buffer| {
                buffer.status == BufferStatus::Free
                    && (width == 0 || buffer.igbp.width() == width)
                    && (height == 0 || buffer.igbp.height() == height)
            })
        })?;
        self.free.remove(index)
    }
}

/// A buffer queue backing one layer.
#[derive(Debug)]
pub struct BufferQueue {
    id: BinderObjectId,
    layer_id: LayerId,
    state: Mutex<State>,
    cond: Condvar,
    wait_event: Event,
}

impl BufferQueue {
    pub fn new(id: BinderObjectId, layer_id: LayerId) -> Result<Self, ServctlError> {
        Ok(Self {
            id,
            layer_id,
            state: Mutex::new(State {
                slots: vec![None; BUFFER_SLOTS],
                free: VecDeque::new(),
                queue_sequence: VecDeque::new(),
                disconnected: false,
            }),
            cond: Condvar::new(),
            wait_event: Event::new()?,
        })
    }

    #[inline]
    pub fn id(&self) -> BinderObjectId {
        self.id
    }

    #[inline]
    pub fn layer_id(&self) -> LayerId {
        self.layer_id
    }

    /// Event signaled whenever a slot becomes free.
    #[inline]
    pub fn wait_event(&self) -> &Event {
        &self.wait_event
    }

    fn wake(&self) {
        self.cond.notify_all();
        if let Err(err) = self.wait_event.signal() {
            log::error!(target: "BufferQueue", "critical: failed to signal wait event: {err}");
        }
    }

    /// Installs the buffer of `slot` and marks it free.
    pub fn set_preallocated_buffer(&self, slot: u32, igbp: IgbpBuffer) -> Result<(), BufferQueueError> {
        let mut state = self.state.lock();
        let entry = state
            .slots
            .get_mut(slot as usize)
            .ok_or(BufferQueueError::InvalidSlot(slot))?;
        log::debug!(
            target: "BufferQueue",
            "{}: slot {slot} preallocated {}x{}",
            self.id,
            igbp.width(),
            igbp.height()
        );
        *entry = Some(Buffer {
            slot,
            status: BufferStatus::Free,
            igbp,
            transform: BufferTransformFlags::empty(),
            crop: Rect::default(),
            swap_interval: 1,
            multi_fence: MultiFence::default(),
        });
        state.queue_sequence.retain(|&queued| queued != slot);
        if !state.free.contains(&slot) {
            state.free.push_back(slot);
        }
        drop(state);
        self.wake();
        Ok(())
    }

    /// Takes the oldest free slot matching `width` x `height`, blocking until
    /// one exists. Zero matches any size. Returns `None` once disconnected.
    pub fn dequeue_buffer(&self, width: u32, height: u32) -> Option<(u32, MultiFence)> {
        let mut state = self.state.lock();
        loop {
            if state.disconnected {
                return None;
            }
            if let Some(slot) = state.take_free(width, height) {
                return Some(Self::mark_dequeued(&mut state, slot));
            }
            self.cond.wait(&mut state);
        }
    }

    /// Non-blocking [`dequeue_buffer`](Self::dequeue_buffer).
    pub fn try_dequeue_buffer(&self, width: u32, height: u32) -> Option<(u32, MultiFence)> {
        let mut state = self.state.lock();
        if state.disconnected {
            return None;
        }
        let slot = state.take_free(width, height)?;
        Some(Self::mark_dequeued(&mut state, slot))
    }

    fn mark_dequeued(state: &mut State, slot: u32) -> (u32, MultiFence) {
        let buffer = state.slots[slot as usize]
            .as_mut()
            .map(|buffer| {
                buffer.status = BufferStatus::Dequeued;
                buffer.multi_fence
            })
            .unwrap_or_default();
        log::trace!(target: "BufferQueue", "dequeued slot {slot}");
        (slot, buffer)
    }

    /// Buffer parameters of a dequeued slot.
    pub fn request_buffer(&self, slot: u32) -> Result<IgbpBuffer, BufferQueueError> {
        let mut state = self.state.lock();
        Ok(state.expect_status(slot, BufferStatus::Dequeued)?.igbp.clone())
    }

    pub fn queue_buffer(
        &self,
        slot: u32,
        transform: BufferTransformFlags,
        crop: Rect,
        swap_interval: u32,
        multi_fence: MultiFence,
    ) -> Result<(), BufferQueueError> {
        let mut state = self.state.lock();
        let buffer = state.expect_status(slot, BufferStatus::Dequeued)?;
        buffer.status = BufferStatus::Queued;
        buffer.transform = transform;
        buffer.crop = crop;
        buffer.swap_interval = swap_interval;
        buffer.multi_fence = multi_fence;
        state.queue_sequence.push_back(slot);
        log::trace!(target: "BufferQueue", "queued slot {slot}");
        drop(state);
        self.cond.notify_all();
        Ok(())
    }

    /// Returns a dequeued, queued or acquired slot to the free pool.
    pub fn cancel_buffer(&self, slot: u32, multi_fence: MultiFence) -> Result<(), BufferQueueError> {
        let mut state = self.state.lock();
        let buffer = state.slot_mut(slot)?;
        if buffer.status == BufferStatus::Free {
            return Err(BufferQueueError::AlreadyFree(slot));
        }
        buffer.status = BufferStatus::Free;
        buffer.multi_fence = multi_fence;
        state.free.push_back(slot);
        log::trace!(target: "BufferQueue", "canceled slot {slot}");
        drop(state);
        self.wake();
        Ok(())
    }

    /// Takes the oldest queued slot. Stale sequence entries (slots canceled
    /// after queueing) are skipped.
    pub fn acquire_buffer(&self) -> Option<Buffer> {
        let mut state = self.state.lock();
        while let Some(slot) = state.queue_sequence.pop_front() {
            let Some(buffer) = state.slots[slot as usize].as_mut() else {
                continue;
            };
            if buffer.status == BufferStatus::Queued {
                buffer.status = BufferStatus::Acquired;
                log::trace!(target: "BufferQueue", "acquired slot {slot}");
                return Some(buffer.clone());
            }
        }
        None
    }

    pub fn release_buffer(&self, slot: u32) -> Result<(), BufferQueueError> {
        let mut state = self.state.lock();
        state.expect_status(slot, BufferStatus::Acquired)?.status = BufferStatus::Free;
        state.free.push_back(slot);
        log::trace!(target: "BufferQueue", "released slot {slot}");
        drop(state);
        self.wake();
        Ok(())
    }

    pub fn connect(&self) {
        let mut state = self.state.lock();
        state.disconnected = false;
        state.queue_sequence.clear();
        log::debug!(target: "BufferQueue", "{} connected", self.id);
        drop(state);
        self.cond.notify_all();
    }

    /// Drops every slot and wakes blocked producers.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        state.disconnected = true;
        state.queue_sequence.clear();
        state.free.clear();
        state.slots.iter_mut().for_each(|slot| *slot = None);
        log::debug!(target: "BufferQueue", "{} disconnected", self.id);
        drop(state);
        self.wake();
    }

    pub fn is_connected(&self) -> bool {
        !self.state.lock().disconnected
    }

    pub fn query(&self, what: QueryType) -> Result<u32, BufferQueueError> {
        match what {
            QueryType::NativeWindowFormat => Ok(PIXEL_FORMAT_RGBA8888),
            QueryType::NativeWindowWidth | QueryType::NativeWindowHeight => {
                log::warn!(target: "BufferQueue", "unimplemented query {what:?}");
                Err(BufferQueueError::Unsupported(what))
            }
        }
    }

    pub fn status(&self, slot: u32) -> Option<BufferStatus> {
        let state = self.state.lock();
        state.slots.get(slot as usize)?.as_ref().map(|buffer| buffer.status)
    }

    /// Number of slots currently in the free pool.
    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }
}

/// Error returned when a buffer queue precondition does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferQueueError {
    #[error("slot {0} is out of range")]
    InvalidSlot(u32),
    #[error("slot {0} has no preallocated buffer")]
    NotPreallocated(u32),
    #[error("slot {slot} is {actual:?}, expected {expected:?}")]
    InvalidState {
        slot: u32,
        expected: BufferStatus,
        actual: BufferStatus,
    },
    #[error("slot {0} is already free")]
    AlreadyFree(u32),
    #[error("query {0:?} is not supported")]
    Unsupported(QueryType),
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    fn queue_with(slots: u32) -> BufferQueue {
        let queue = BufferQueue::new(BinderObjectId::new(1), LayerId::new(1)).unwrap();
        for slot in 0..slots {
            queue
                .set_preallocated_buffer(slot, IgbpBuffer::new(256, 256, PIXEL_FORMAT_RGBA8888))
                .unwrap();
        }
        queue
    }

    fn queue(queue: &BufferQueue, slot: u32) {
        queue
            .queue_buffer(slot, BufferTransformFlags::empty(), Rect::default(), 1, MultiFence::default())
            .unwrap();
    }

    #[test]
    fn test_canceled_entry_is_skipped_on_acquire() {
        let bq = queue_with(3);
        assert_eq!(bq.dequeue_buffer(256, 256).unwrap().0, 0);
        queue(&bq, 0);
        assert_eq!(bq.dequeue_buffer(256, 256).unwrap().0, 1);
        queue(&bq, 1);
        bq.cancel_buffer(1, MultiFence::default()).unwrap();

        let acquired = bq.acquire_buffer().unwrap();
        assert_eq!(acquired.slot, 0);
        assert!(bq.acquire_buffer().is_none());

        bq.release_buffer(0).unwrap();
        assert_eq!(bq.dequeue_buffer(256, 256).unwrap().0, 2);
        assert_eq!(bq.dequeue_buffer(256, 256).unwrap().0, 1);
    }

    #[test]
    fn test_preconditions() {
        let bq = queue_with(1);
        assert_eq!(
            bq.request_buffer(0),
            Err(BufferQueueError::InvalidState {
                slot: 0,
                expected: BufferStatus::Dequeued,
                actual: BufferStatus::Free,
            })
        );
        assert_eq!(bq.cancel_buffer(0, MultiFence::default()), Err(BufferQueueError::AlreadyFree(0)));
        assert_eq!(bq.release_buffer(5), Err(BufferQueueError::NotPreallocated(5)));
        assert_eq!(bq.release_buffer(64), Err(BufferQueueError::InvalidSlot(64)));
        assert!(bq.try_dequeue_buffer(128, 128).is_none());
    }

    #[test]
    fn test_query() {
        let bq = queue_with(0);
        assert_eq!(bq.query(QueryType::NativeWindowFormat), Ok(PIXEL_FORMAT_RGBA8888));
        assert_eq!(
            bq.query(QueryType::NativeWindowWidth),
            Err(BufferQueueError::Unsupported(QueryType::NativeWindowWidth))
        );
    }

    #[test]
    fn test_disconnect_wakes_blocked_dequeue() {
        let bq = Arc::new(queue_with(1));
        bq.dequeue_buffer(0, 0).unwrap();

        let producer = {
            let bq = bq.clone();
            thread::spawn(move || bq.dequeue_buffer(256, 256))
        };
        thread::sleep(Duration::from_millis(20));
        bq.disconnect();
        assert!(producer.join().unwrap().is_none());
        assert_eq!(bq.status(0), None);

        bq.connect();
        assert!(bq.is_connected());
    }

    #[test]
    fn test_release_wakes_blocked_dequeue() {
        let bq = Arc::new(queue_with(1));
        bq.dequeue_buffer(256, 256).unwrap();
        queue(&bq, 0);

        let producer = {
            let bq = bq.clone();
            thread::spawn(move || bq.dequeue_buffer(256, 256))
        };
        let acquired = bq.acquire_buffer().unwrap();
        bq.release_buffer(acquired.slot).unwrap();
        assert_eq!(producer.join().unwrap().map(|(slot, _)| slot), Some(0));
        assert!(bq.wait_event().is_signaled());
    }
}
