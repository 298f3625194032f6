//! Status broadcast: one writer, many readers
//!
//! The controller publishes a snapshot on every phase change and accepted
//! observation. Readers either take the latest snapshot atomically or
//! register a callback. Callbacks run on a dedicated delivery thread,
//! never on the control thread, behind a bounded drop-oldest queue so a
//! slow UI can never stall fishing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use super::phase::Status;

/// Pending snapshots beyond this are dropped oldest-first
const QUEUE_CAP: usize = 64;

pub type StatusCallback = Box<dyn Fn(&Status) + Send + 'static>;

/// Handle returned by [`StatusChannel::subscribe`]; pass it back to
/// [`StatusChannel::unsubscribe`] to detach the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(u64);

struct DeliveryShared {
    queue: Mutex<VecDeque<Status>>,
    available: Condvar,
    exit: AtomicBool,
    subscribers: Mutex<Vec<(u64, StatusCallback)>>,
}

/// Single-writer / multi-reader status broadcast
pub struct StatusChannel {
    latest: RwLock<Status>,
    shared: Arc<DeliveryShared>,
    delivery: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl StatusChannel {
    pub fn new(initial: Status) -> Self {
        let shared = Arc::new(DeliveryShared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            exit: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        });

        let delivery_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("status-delivery".to_string())
            .spawn(move || delivery_loop(delivery_shared))
            .expect("failed to spawn status delivery thread");

        Self {
            latest: RwLock::new(initial),
            shared,
            delivery: Mutex::new(Some(handle)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Publish a new snapshot. Called by the single writer; cheap, never
    /// blocks on subscribers.
    pub fn publish(&self, status: Status) {
        *self.latest.write() = status.clone();

        {
            let mut queue = self.shared.queue.lock();
            if queue.len() >= QUEUE_CAP {
                queue.pop_front();
                tracing::trace!("[STATUS] Delivery queue full, dropped oldest snapshot");
            }
            queue.push_back(status);
        }
        self.shared.available.notify_one();
    }

    /// Latest snapshot, read atomically
    pub fn snapshot(&self) -> Status {
        self.latest.read().clone()
    }

    /// Register a callback invoked on every published snapshot
    pub fn subscribe(&self, callback: StatusCallback) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.subscribers.lock().push((id, callback));
        SubscriptionHandle(id)
    }

    /// Detach a previously registered callback
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.shared.subscribers.lock().retain(|(id, _)| *id != handle.0);
    }
}

impl Drop for StatusChannel {
    fn drop(&mut self) {
        self.shared.exit.store(true, Ordering::SeqCst);
        self.shared.available.notify_all();
        if let Some(handle) = self.delivery.lock().take() {
            let _ = handle.join();
        }
    }
}

fn delivery_loop(shared: Arc<DeliveryShared>) {
    loop {
        // Undelivered snapshots are abandoned on shutdown
        if shared.exit.load(Ordering::SeqCst) {
            return;
        }

        let status = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(status) = queue.pop_front() {
                    break status;
                }
                if shared.exit.load(Ordering::SeqCst) {
                    return;
                }
                // Bounded wait so a missed notify cannot wedge shutdown
                shared
                    .available
                    .wait_for(&mut queue, Duration::from_millis(100));
            }
        };

        let subscribers = shared.subscribers.lock();
        for (_, callback) in subscribers.iter() {
            callback(&status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fishing::phase::Phase;
    use std::time::Instant;

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_snapshot_reflects_latest_publish() {
        let channel = StatusChannel::new(Status::new());
        assert_eq!(channel.snapshot().phase, Phase::Stopped);

        let mut status = Status::new();
        status.phase = Phase::Casting;
        status.round_count = 2;
        channel.publish(status);

        let snap = channel.snapshot();
        assert_eq!(snap.phase, Phase::Casting);
        assert_eq!(snap.round_count, 2);
    }

    #[test]
    fn test_subscriber_receives_updates() {
        let channel = StatusChannel::new(Status::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_cb = seen.clone();
        channel.subscribe(Box::new(move |status| {
            seen_cb.lock().push(status.phase);
        }));

        let mut status = Status::new();
        status.phase = Phase::WaitingInitial;
        channel.publish(status.clone());
        status.phase = Phase::WaitingHook;
        channel.publish(status);

        assert!(wait_until(Duration::from_secs(2), || seen.lock().len() == 2));
        assert_eq!(
            *seen.lock(),
            vec![Phase::WaitingInitial, Phase::WaitingHook]
        );
    }

    #[test]
    fn test_unsubscribe_detaches() {
        let channel = StatusChannel::new(Status::new());
        let count = Arc::new(AtomicU64::new(0));

        let count_cb = count.clone();
        let handle = channel.subscribe(Box::new(move |_| {
            count_cb.fetch_add(1, Ordering::SeqCst);
        }));

        channel.publish(Status::new());
        assert!(wait_until(Duration::from_secs(2), || {
            count.load(Ordering::SeqCst) == 1
        }));

        channel.unsubscribe(handle);
        channel.publish(Status::new());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slow_subscriber_never_blocks_writer() {
        let channel = StatusChannel::new(Status::new());
        channel.subscribe(Box::new(|_| {
            thread::sleep(Duration::from_millis(250));
        }));

        // Far more than QUEUE_CAP publishes must return promptly
        let start = Instant::now();
        for _ in 0..200 {
            channel.publish(Status::new());
        }
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "publish stalled behind a slow subscriber"
        );
    }
}
