//! The job queue coordinator (C3): named FIFO queues, one cooperative
//! worker thread per queue, stats, graceful drain. Queues are independent;
//! there is no global lock, only per-queue inbox locks (spec §4.3/§5).

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::{PageError, Result};
use crate::queue::job::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub high_water_mark: u64,
    pub jobs_remaining: usize,
    pub is_active: bool,
}

struct Inbox {
    queue: Mutex<VecDeque<Box<dyn Job>>>,
    cv: Condvar,
    closed: AtomicBool,
}

struct QueueHandle {
    name: String,
    inbox: Arc<Inbox>,
    high_water_mark: AtomicU64,
    jobs_remaining: Arc<AtomicUsize>,
    executing: Arc<AtomicBool>,
    _worker: std::thread::JoinHandle<()>,
}

impl QueueHandle {
    fn stats(&self) -> QueueStats {
        let jobs_remaining = self.jobs_remaining.load(Ordering::SeqCst);
        QueueStats {
            high_water_mark: self.high_water_mark.load(Ordering::SeqCst),
            jobs_remaining,
            is_active: self.executing.load(Ordering::SeqCst) || jobs_remaining > 0,
        }
    }
}

/// Registers named queues and runs one worker thread per queue. Cloning is
/// cheap; clones share the same underlying registry.
#[derive(Clone)]
pub struct Coordinator {
    queues: Arc<RwLock<HashMap<String, Arc<QueueHandle>>>>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    #[must_use]
    pub fn new() -> Self {
        Self { queues: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Register a queue by name. Idempotent: registering the same name
    /// twice is a no-op and returns the existing queue's worker.
    pub fn register_queue(&self, name: &str) {
        if self.queues.read().contains_key(name) {
            return;
        }
        let mut queues = self.queues.write();
        if queues.contains_key(name) {
            return;
        }
        let inbox = Arc::new(Inbox { queue: Mutex::new(VecDeque::new()), cv: Condvar::new(), closed: AtomicBool::new(false) });
        let jobs_remaining = Arc::new(AtomicUsize::new(0));
        let executing = Arc::new(AtomicBool::new(false));
        let queue_name = name.to_string();

        let worker_inbox = inbox.clone();
        let worker_remaining = jobs_remaining.clone();
        let worker_executing = executing.clone();
        let worker_name = queue_name.clone();
        let worker = std::thread::Builder::new()
            .name(format!("queue-{queue_name}"))
            .spawn(move || worker_loop(&worker_name, &worker_inbox, &worker_remaining, &worker_executing))
            .expect("failed to spawn queue worker thread");

        queues.insert(
            name.to_string(),
            Arc::new(QueueHandle {
                name: queue_name,
                inbox,
                high_water_mark: AtomicU64::new(0),
                jobs_remaining,
                executing,
                _worker: worker,
            }),
        );
    }

    /// Append a job to the named queue's FIFO; never blocks the caller.
    ///
    /// # Errors
    /// Returns [`PageError::NoSuchQueue`] if `queue_name` was never
    /// registered.
    pub fn enqueue(&self, queue_name: &str, job: Box<dyn Job>) -> Result<()> {
        let queues = self.queues.read();
        let handle = queues.get(queue_name).ok_or_else(|| PageError::NoSuchQueue(queue_name.to_string()))?;
        handle.high_water_mark.fetch_add(1, Ordering::SeqCst);
        handle.jobs_remaining.fetch_add(1, Ordering::SeqCst);
        handle.inbox.queue.lock().push_back(job);
        handle.inbox.cv.notify_one();
        Ok(())
    }

    /// # Errors
    /// Returns [`PageError::NoSuchQueue`] if `name` was never registered.
    pub fn queue_stats(&self, name: &str) -> Result<QueueStats> {
        let queues = self.queues.read();
        let handle = queues.get(name).ok_or_else(|| PageError::NoSuchQueue(name.to_string()))?;
        Ok(handle.stats())
    }

    #[must_use]
    pub fn active_queues(&self) -> Vec<(String, QueueStats)> {
        self.queues.read().values().map(|h| (h.name.clone(), h.stats())).filter(|(_, s)| s.is_active).collect()
    }

    /// Wait until every queue reports `is_active = false`, or until
    /// `cancel` is triggered. In-flight jobs run to completion regardless.
    pub async fn drain(&self, cancel: &tokio_util::sync::CancellationToken) {
        loop {
            if self.active_queues().is_empty() {
                return;
            }
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(std::time::Duration::from_millis(20)) => {}
            }
        }
    }
}

fn worker_loop(name: &str, inbox: &Inbox, jobs_remaining: &AtomicUsize, executing: &AtomicBool) {
    loop {
        let job = {
            let mut queue = inbox.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if inbox.closed.load(Ordering::SeqCst) {
                    break None;
                }
                inbox.cv.wait(&mut queue);
            }
        };
        let Some(job) = job else { return };
        executing.store(true, Ordering::SeqCst);
        let job_name = job.name();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| job.execute()));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("job '{job_name}' on queue '{name}' returned an error: {e}"),
            Err(_) => log::error!("job '{job_name}' on queue '{name}' panicked; worker continues"),
        }
        jobs_remaining.fetch_sub(1, Ordering::SeqCst);
        executing.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    struct CountingJob {
        name: String,
        counter: Arc<StdAtomicUsize>,
        order: Arc<Mutex<Vec<usize>>>,
        index: usize,
    }

    impl Job for CountingJob {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn execute(&self) -> Result<()> {
            self.counter.fetch_add(1, Ordering::SeqCst);
            self.order.lock().push(self.index);
            Ok(())
        }
    }

    #[test]
    fn jobs_execute_in_submission_order_within_a_queue() {
        let coordinator = Coordinator::new();
        coordinator.register_queue("q");
        let counter = Arc::new(StdAtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            coordinator
                .enqueue("q", Box::new(CountingJob { name: format!("j{i}"), counter: counter.clone(), order: order.clone(), index: i }))
                .unwrap();
        }
        for _ in 0..200 {
            if coordinator.queue_stats("q").unwrap().jobs_remaining == 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        let stats = coordinator.queue_stats("q").unwrap();
        assert_eq!(stats.high_water_mark, 5);
        assert_eq!(stats.jobs_remaining, 0);
    }

    struct PanickingJob;
    impl Job for PanickingJob {
        fn name(&self) -> String {
            "boom".to_string()
        }
        fn execute(&self) -> Result<()> {
            panic!("deliberate test panic");
        }
    }

    #[test]
    fn worker_survives_a_job_panic() {
        let coordinator = Coordinator::new();
        coordinator.register_queue("q");
        coordinator.enqueue("q", Box::new(PanickingJob)).unwrap();
        let counter = Arc::new(StdAtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        coordinator.enqueue("q", Box::new(CountingJob { name: "after".to_string(), counter: counter.clone(), order, index: 0 })).unwrap();
        for _ in 0..200 {
            if coordinator.queue_stats("q").unwrap().jobs_remaining == 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enqueue_on_unregistered_queue_errors() {
        let coordinator = Coordinator::new();
        let err = coordinator.enqueue("ghost", Box::new(PanickingJob)).unwrap_err();
        assert!(matches!(err, PageError::NoSuchQueue(_)));
    }

    #[test]
    fn register_queue_is_idempotent() {
        let coordinator = Coordinator::new();
        coordinator.register_queue("q");
        coordinator.register_queue("q");
        assert_eq!(coordinator.queues.read().len(), 1);
    }
}
