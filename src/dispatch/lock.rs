//! Dispatch lock manager
//!
//! At-most-one in-flight dispatch per listing, across scheduler ticks and
//! manual triggers. Acquisition is a transactional check-and-set in the
//! record store; `AlreadyInFlight` is a benign skip, not an error.

use crate::domain::Listing;
use crate::error::Result;
use crate::store::{DispatchBookkeeping, RecordStore};
use std::sync::Arc;
use tracing::debug;

/// Result of a lock acquisition attempt
#[derive(Debug)]
pub enum LockOutcome {
    /// Lock taken; the caller owns the dispatch until release
    Acquired(Listing),
    /// Another caller is dispatching this listing right now
    AlreadyInFlight,
}

pub struct LockManager<S> {
    store: Arc<S>,
}

impl<S> Clone for LockManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: RecordStore> LockManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Try to take the per-listing dispatch lock.
    ///
    /// A store failure here means "not acquired": the transaction rolled
    /// back and prior state is intact.
    pub async fn acquire(&self, listing_id: i64) -> Result<LockOutcome> {
        match self.store.try_acquire_dispatch_lock(listing_id).await? {
            Some(listing) => Ok(LockOutcome::Acquired(listing)),
            None => {
                debug!("Listing {} is already being dispatched, skipping", listing_id);
                Ok(LockOutcome::AlreadyInFlight)
            }
        }
    }

    /// Clear the lock and apply delivery bookkeeping.
    ///
    /// Must run on every exit path of the delivery pipeline; the lock is
    /// never left set after a finished (or failed) dispatch.
    pub async fn release(
        &self,
        listing_id: i64,
        bookkeeping: &DispatchBookkeeping,
    ) -> Result<()> {
        self.store
            .release_dispatch_lock(listing_id, bookkeeping)
            .await
    }
}
