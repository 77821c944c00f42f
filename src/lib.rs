pub mod assignment;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod matching;
pub mod store;
pub mod transport;

pub use assignment::AssignmentEngine;
pub use config::AppConfig;
pub use dispatch::{
    DeliveryPipeline, DispatchOutcome, DispatchReport, LockManager, LockOutcome, Scheduler,
    SchedulerHandle, SummaryBroadcaster,
};
pub use error::{AdcastError, Result};
pub use store::{DispatchBookkeeping, PostgresStore, RecordStore};
pub use transport::{MediaTransport, SendError, TelegramBot};
