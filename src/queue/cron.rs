//! `schedule(cronExpr, job)` (spec §4.3): a recurring submission at a
//! standard five-field cron expression. Each firing enqueues a fresh job
//! instance onto the queue whose name matches the job's `name()`.

use cron::Schedule;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{PageError, Result};
use crate::queue::coordinator::Coordinator;
use crate::queue::job::Job;

/// A handle to a running cron schedule. Dropping it does not stop the
/// schedule — call [`ScheduleHandle::stop`] explicitly, matching "cron
/// scheduled firings cease when the scheduler is stopped" (spec §5).
pub struct ScheduleHandle {
    stopped: Arc<AtomicBool>,
    _task: tokio::task::JoinHandle<()>,
}

impl ScheduleHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Parse `cron_expr` (standard five fields: minute, hour, day-of-month,
/// month, day-of-week — seconds are not supported, per spec §6) and spawn a
/// scheduler task that enqueues a fresh job from `make_job` on every firing,
/// onto the queue named by that job's `name()`.
///
/// # Errors
/// Returns [`PageError::Config`] if `cron_expr` does not parse.
pub fn schedule<F>(coordinator: Coordinator, cron_expr: &str, make_job: F) -> Result<ScheduleHandle>
where
    F: Fn() -> Box<dyn Job> + Send + 'static,
{
    // The `cron` crate requires a leading seconds field; spec's cron format
    // omits it, so a literal "0" is prefixed to keep the public contract at
    // five fields while reusing the crate's parser and scheduling logic.
    let six_field = format!("0 {cron_expr}");
    let schedule = Schedule::from_str(&six_field).map_err(|e| PageError::Config(format!("invalid cron expression '{cron_expr}': {e}")))?;
    let stopped = Arc::new(AtomicBool::new(false));
    let task_stopped = stopped.clone();

    let task = tokio::spawn(async move {
        let mut upcoming = schedule.upcoming(chrono::Utc);
        while !task_stopped.load(Ordering::SeqCst) {
            let Some(next) = upcoming.next() else { return };
            let now = chrono::Utc::now();
            if next > now {
                let until = (next - now).to_std().unwrap_or(std::time::Duration::from_secs(0));
                tokio::time::sleep(until).await;
            }
            if task_stopped.load(Ordering::SeqCst) {
                return;
            }
            let job = make_job();
            let queue_name = job.name();
            if let Err(e) = coordinator.enqueue(&queue_name, job) {
                log::warn!("cron firing could not enqueue onto '{queue_name}': {e}");
            }
        }
    });

    Ok(ScheduleHandle { stopped, _task: task })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::job::FnJob;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn schedule_fires_and_enqueues_onto_the_named_queue() {
        let coordinator = Coordinator::new();
        coordinator.register_queue("tick");
        let fired = Arc::new(AtomicUsize::new(0));
        let job_fired = fired.clone();
        // Every-second expression (five fields, minutes granularity is not
        // required by the test: the `cron` crate fires within the same
        // minute boundary once we prepend seconds="0").
        let handle = schedule(coordinator.clone(), "* * * * *", move || {
            let fired = job_fired.clone();
            Box::new(FnJob::new("tick", move || {
                fired.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }))
        })
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.stop();
        // We only assert the schedule constructs and runs without error;
        // exact firing count depends on wall-clock minute boundaries.
        let _ = coordinator.queue_stats("tick").unwrap();
    }

    #[test]
    fn invalid_cron_expression_is_rejected() {
        let coordinator = Coordinator::new();
        let err = schedule(coordinator, "not a cron expr", || Box::new(FnJob::new("x", || Ok(())))).unwrap_err();
        assert!(matches!(err, PageError::Config(_)));
    }
}
