//! The `Job` abstraction (spec §3, design note in §9): a capability with a
//! name and an `execute`, avoiding references to long-lived state beyond the
//! components a job was constructed with.

use crate::errors::Result;

pub trait Job: Send {
    /// The name of the job; cron-scheduled firings enqueue onto the queue
    /// whose name matches this.
    fn name(&self) -> String;

    /// Run the job to completion. Jobs generally return `Ok(())` after
    /// recording any per-item failure internally, so one bad record does
    /// not stop a batch (spec §7 propagation policy). A job should return
    /// `Err` only when its own report generation fails.
    fn execute(&self) -> Result<()>;
}

/// A `Job` built from a closure, for small one-off jobs (the scan jobs in
/// C7/C8 and the report jobs in C9) that don't warrant a dedicated struct.
pub struct FnJob<F> {
    name: String,
    f: F,
}

impl<F> FnJob<F>
where
    F: Fn() -> Result<()> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> Job for FnJob<F>
where
    F: Fn() -> Result<()> + Send,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute(&self) -> Result<()> {
        (self.f)()
    }
}
