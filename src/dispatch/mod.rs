//! Dispatch core: lock manager, delivery pipeline, scheduler loop, summary

mod lock;
mod pipeline;
mod render;
mod scheduler;
mod summary;

pub use lock::{LockManager, LockOutcome};
pub use pipeline::{
    ChannelAttempt, ChannelOutcome, DeliveryPipeline, DispatchOutcome, DispatchReport,
};
pub use render::{render, DEFAULT_TEMPLATE, MISSING_VALUE};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerStats};
pub use summary::{SummaryBroadcaster, SummaryReport};
