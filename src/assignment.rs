//! Round-robin assignment engine
//!
//! Distributes unassigned listings to agents and unassigned orders to team
//! leads. The cursor is the assignee of the most recent assignment-log row,
//! read inside the same transaction that appends the next one; sequential
//! invocations are exactly fair, concurrent invocations are best-effort.

use crate::error::Result;
use crate::store::RecordStore;
use std::sync::Arc;
use tracing::{info, warn};

/// What kind of record an assignment-log row tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentKind {
    Listing,
    Order,
}

impl AssignmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Order => "order",
        }
    }
}

/// Pick the next assignee after `cursor` in the sorted id sequence.
///
/// Wraps to the first id when the cursor is the last one, unknown, or absent.
/// Returns `None` only when there are no assignees at all.
pub fn next_assignee(sorted_ids: &[i64], cursor: Option<i64>) -> Option<i64> {
    if sorted_ids.is_empty() {
        return None;
    }
    let next = match cursor.and_then(|c| sorted_ids.iter().position(|id| *id == c)) {
        Some(pos) => sorted_ids[(pos + 1) % sorted_ids.len()],
        None => sorted_ids[0],
    };
    Some(next)
}

/// Round-robin distributor over the record store
pub struct AssignmentEngine<S> {
    store: Arc<S>,
}

impl<S: RecordStore> AssignmentEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Assign one listing to the next agent in rotation
    pub async fn assign_listing(&self, listing_id: i64) -> Result<i64> {
        let agent_id = self.store.assign_listing_to_next_agent(listing_id).await?;
        info!("Assigned listing {} to agent {}", listing_id, agent_id);
        Ok(agent_id)
    }

    /// Assign one order to the next team lead in rotation
    pub async fn assign_order(&self, order_id: i64) -> Result<i64> {
        let lead_id = self.store.assign_order_to_next_team_lead(order_id).await?;
        info!("Assigned order {} to team lead {}", order_id, lead_id);
        Ok(lead_id)
    }

    /// Assign every currently unassigned listing, in id order
    pub async fn sweep_listings(&self) -> Result<Vec<(i64, i64)>> {
        let mut assigned = Vec::new();
        for listing_id in self.store.unassigned_listing_ids().await? {
            match self.assign_listing(listing_id).await {
                Ok(agent_id) => assigned.push((listing_id, agent_id)),
                Err(e) => {
                    warn!("Skipping listing {} during sweep: {}", listing_id, e);
                }
            }
        }
        Ok(assigned)
    }

    /// Assign every currently unassigned order, in id order
    pub async fn sweep_orders(&self) -> Result<Vec<(i64, i64)>> {
        let mut assigned = Vec::new();
        for order_id in self.store.unassigned_order_ids().await? {
            match self.assign_order(order_id).await {
                Ok(lead_id) => assigned.push((order_id, lead_id)),
                Err(e) => {
                    warn!("Skipping order {} during sweep: {}", order_id, e);
                }
            }
        }
        Ok(assigned)
    }
}
