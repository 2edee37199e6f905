mod coordinator;
mod cron;
mod job;

pub use coordinator::{Coordinator, QueueStats};
pub use cron::{ScheduleHandle, schedule};
pub use job::{FnJob, Job};
