//! Record store seam
//!
//! The dispatcher core talks to persistence through [`RecordStore`] so the
//! pipeline, scheduler, and assignment engine can run against mocks in tests.
//! The production implementation is [`PostgresStore`].

mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use postgres::PostgresStore;

use crate::domain::{Agent, Channel, Listing, ListingMedia, TeamLead, Template};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// State changes applied when a dispatch lock is released.
///
/// Folded from the per-channel attempt outcomes by the delivery pipeline;
/// an empty value clears the lock without touching any bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchBookkeeping {
    /// Set `sent_to_broadcast` (monotonic; never cleared)
    pub mark_broadcast_sent: bool,
    /// Confirmed successful-channel posting to record
    pub last_posted: Option<PostedTo>,
}

/// A confirmed posting to a successful-category channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedTo {
    pub chat_id: String,
    pub at: DateTime<Utc>,
}

/// Transactional persistence consumed by the dispatcher core
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn channels(&self) -> Result<Vec<Channel>>;

    async fn listings(&self) -> Result<Vec<Listing>>;

    async fn listing(&self, listing_id: i64) -> Result<Option<Listing>>;

    /// Media for a listing ordered by position, at most `limit` items
    async fn media_for_listing(&self, listing_id: i64, limit: i64) -> Result<Vec<ListingMedia>>;

    async fn template_by_name(&self, name: &str) -> Result<Option<Template>>;

    /// Check-and-set acquire of the per-listing dispatch lock.
    ///
    /// Returns the locked listing on success, `None` when another caller
    /// already holds the lock (benign skip). A transaction failure leaves
    /// prior state intact and surfaces as an error.
    async fn try_acquire_dispatch_lock(&self, listing_id: i64) -> Result<Option<Listing>>;

    /// Clear the dispatch lock and apply delivery bookkeeping.
    ///
    /// Must be invoked on every exit path of the delivery pipeline.
    async fn release_dispatch_lock(
        &self,
        listing_id: i64,
        bookkeeping: &DispatchBookkeeping,
    ) -> Result<()>;

    async fn agents(&self) -> Result<Vec<Agent>>;

    async fn team_leads(&self) -> Result<Vec<TeamLead>>;

    /// One transaction: read the round-robin cursor, pick the next agent,
    /// update the listing, append the assignment-log row.
    async fn assign_listing_to_next_agent(&self, listing_id: i64) -> Result<i64>;

    /// Order counterpart of [`Self::assign_listing_to_next_agent`]
    async fn assign_order_to_next_team_lead(&self, order_id: i64) -> Result<i64>;

    async fn unassigned_listing_ids(&self) -> Result<Vec<i64>>;

    async fn unassigned_order_ids(&self) -> Result<Vec<i64>>;

    /// Listings posted to any channel since the given instant
    async fn count_posted_since(&self, since: DateTime<Utc>) -> Result<i64>;
}
