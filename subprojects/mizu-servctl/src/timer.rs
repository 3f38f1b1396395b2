//! Host timers with one-shot and periodic fires.
//!
//! A [`TimerQueue`] owns one helper thread. Deadlines live in a min-heap;
//! rescheduling or cancelling a timer bumps its generation so stale heap
//! entries are skipped when they come due.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::error::ServctlError;

/// Identifies a timer within its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Timer {
    name: String,
    callback: Callback,
    generation: u64,
    interval: Option<Duration>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    timers: HashMap<u64, Timer>,
    heap: BinaryHeap<Reverse<(Instant, u64, u64)>>,
    shutdown: bool,
}

impl Inner {
    fn arm(&mut self, id: TimerId, delay: Duration, interval: Option<Duration>) -> Result<(), ServctlError> {
        let timer = self
            .timers
            .get_mut(&id.0)
            .ok_or(ServctlError::InvalidHandle)?;
        timer.generation += 1;
        timer.interval = interval;
        let generation = timer.generation;
        self.heap
            .push(Reverse((Instant::now() + delay, id.0, generation)));
        Ok(())
    }
}

struct Shared {
    inner: Mutex<Inner>,
    wakeup: Condvar,
}

/// A set of timers serviced by one helper thread.
///
/// Dropping the queue stops the thread; pending fires are discarded.
pub struct TimerQueue {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl TimerQueue {
    pub fn new() -> Result<Self, ServctlError> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner::default()),
            wakeup: Condvar::new(),
        });
        let worker = shared.clone();
        let thread = std::thread::Builder::new()
            .name("mizu:timer".into())
            .spawn(move || run(&worker))
            .map_err(ServctlError::Os)?;
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Creates a disarmed timer. `callback` receives `payload` on every fire.
    pub fn create<T, F>(&self, name: &str, payload: T, callback: F) -> TimerId
    where
        T: Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut inner = self.shared.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.timers.insert(
            id,
            Timer {
                name: name.to_owned(),
                callback: Arc::new(move || callback(&payload)),
                generation: 0,
                interval: None,
            },
        );
        TimerId(id)
    }

    /// Fires the timer once after `delay`, replacing any earlier schedule.
    pub fn schedule_once(&self, id: TimerId, delay: Duration) -> Result<(), ServctlError> {
        self.shared.inner.lock().arm(id, delay, None)?;
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Fires the timer every `interval`, starting one interval from now.
    pub fn schedule_repeat(&self, id: TimerId, interval: Duration) -> Result<(), ServctlError> {
        if interval.is_zero() {
            return Err(ServctlError::InvalidArgument);
        }
        self.shared.inner.lock().arm(id, interval, Some(interval))?;
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Disarms the timer. It can be scheduled again afterwards.
    pub fn cancel(&self, id: TimerId) -> Result<(), ServctlError> {
        let mut inner = self.shared.inner.lock();
        let timer = inner
            .timers
            .get_mut(&id.0)
            .ok_or(ServctlError::InvalidHandle)?;
        timer.generation += 1;
        timer.interval = None;
        Ok(())
    }

    /// Destroys the timer.
    pub fn close(&self, id: TimerId) -> Result<(), ServctlError> {
        self.shared
            .inner
            .lock()
            .timers
            .remove(&id.0)
            .map(drop)
            .ok_or(ServctlError::InvalidHandle)
    }
}

impl Drop for TimerQueue {
    fn drop(&mut self) {
        self.shared.inner.lock().shutdown = true;
        self.shared.wakeup.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(shared: &Shared) {
    let mut inner = shared.inner.lock();
    loop {
        if inner.shutdown {
            return;
        }

        let Some(&Reverse((deadline, id, generation))) = inner.heap.peek() else {
            shared.wakeup.wait(&mut inner);
            continue;
        };
        if deadline > Instant::now() {
            shared.wakeup.wait_until(&mut inner, deadline);
            continue;
        }
        inner.heap.pop();

        let Some(timer) = inner.timers.get(&id) else {
            continue;
        };
        if timer.generation != generation {
            continue;
        }
        let callback = timer.callback.clone();
        let name = timer.name.clone();
        if let Some(interval) = timer.interval {
            let next = (deadline + interval).max(Instant::now());
            inner.heap.push(Reverse((next, id, generation)));
        }

        drop(inner);
        let outcome = catch_unwind(AssertUnwindSafe(|| callback()));
        inner = shared.inner.lock();

        if outcome.is_err() {
            log::error!(target: "Kernel", "critical: timer {name} callback panicked, closing it");
            inner.timers.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_schedule_once_fires_once() {
        let queue = TimerQueue::new().unwrap();
        let hits = counter();
        let id = queue.create("once", hits.clone(), |hits| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        queue.schedule_once(id, Duration::from_millis(5)).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_schedule_repeat_fires_periodically() {
        let queue = TimerQueue::new().unwrap();
        let hits = counter();
        let id = queue.create("repeat", hits.clone(), |hits| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        queue.schedule_repeat(id, Duration::from_millis(5)).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        queue.cancel(id).unwrap();
        assert!(hits.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_cancel_discards_pending_fire() {
        let queue = TimerQueue::new().unwrap();
        let hits = counter();
        let id = queue.create("cancelled", hits.clone(), |hits| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        queue.schedule_once(id, Duration::from_millis(50)).unwrap();
        queue.cancel(id).unwrap();
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reschedule_replaces_previous_deadline() {
        let queue = TimerQueue::new().unwrap();
        let hits = counter();
        let id = queue.create("rescheduled", hits.clone(), |hits| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        queue.schedule_once(id, Duration::from_millis(10)).unwrap();
        queue.schedule_once(id, Duration::from_millis(20)).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_closes_timer() {
        let queue = TimerQueue::new().unwrap();
        let id = queue.create("panics", (), |_| panic!("boom"));
        queue.schedule_repeat(id, Duration::from_millis(5)).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(matches!(queue.close(id), Err(ServctlError::InvalidHandle)));
    }

    #[test]
    fn test_unknown_timer_is_invalid_handle() {
        let queue = TimerQueue::new().unwrap();
        let id = queue.create("gone", (), |_| {});
        queue.close(id).unwrap();
        assert!(matches!(
            queue.schedule_once(id, Duration::ZERO),
            Err(ServctlError::InvalidHandle)
        ));
        assert!(matches!(
            queue.schedule_repeat(id, Duration::ZERO),
            Err(ServctlError::InvalidArgument)
        ));
    }
}
