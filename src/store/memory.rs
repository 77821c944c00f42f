//! In-memory record store for tests

use super::{DispatchBookkeeping, RecordStore};
use crate::assignment::{next_assignee, AssignmentKind};
use crate::domain::{
    Agent, Channel, Listing, ListingMedia, TeamLead, Template,
};
use crate::error::{AdcastError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

#[derive(Default)]
struct State {
    listings: Vec<Listing>,
    channels: Vec<Channel>,
    media: Vec<ListingMedia>,
    templates: Vec<Template>,
    agents: Vec<Agent>,
    team_leads: Vec<TeamLead>,
    unassigned_orders: Vec<i64>,
    order_assignments: Vec<(i64, i64)>,
    assignment_log: Vec<(AssignmentKind, i64, i64)>,
    releases: Vec<(i64, DispatchBookkeeping)>,
    fail_media_for: Option<i64>,
}

/// Mutex-backed store; every trait call is one atomic "transaction"
pub(crate) struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_listings(self, listings: Vec<Listing>) -> Self {
        self.state.lock().unwrap().listings = listings;
        self
    }

    pub fn with_channels(self, channels: Vec<Channel>) -> Self {
        self.state.lock().unwrap().channels = channels;
        self
    }

    pub fn with_media(self, media: Vec<ListingMedia>) -> Self {
        self.state.lock().unwrap().media = media;
        self
    }

    pub fn with_templates(self, templates: Vec<Template>) -> Self {
        self.state.lock().unwrap().templates = templates;
        self
    }

    pub fn with_agents(self, ids: &[i64]) -> Self {
        self.state.lock().unwrap().agents = ids
            .iter()
            .map(|id| Agent {
                id: *id,
                name: format!("Agent {id}"),
                username: format!("agent{id}"),
            })
            .collect();
        self
    }

    pub fn with_team_leads(self, ids: &[i64]) -> Self {
        self.state.lock().unwrap().team_leads = ids
            .iter()
            .map(|id| TeamLead {
                id: *id,
                name: format!("Lead {id}"),
                username: format!("lead{id}"),
            })
            .collect();
        self
    }

    pub fn with_unassigned_listings(self, ids: &[i64]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for id in ids {
                let mut listing = crate::matching::tests::listing(*id);
                listing.agent_id = None;
                state.listings.push(listing);
            }
        }
        self
    }

    pub fn with_unassigned_orders(self, ids: &[i64]) -> Self {
        self.state.lock().unwrap().unassigned_orders = ids.to_vec();
        self
    }

    /// Make `media_for_listing` fail for one listing, to exercise error paths
    pub fn fail_media_for(self, listing_id: i64) -> Self {
        self.state.lock().unwrap().fail_media_for = Some(listing_id);
        self
    }

    pub fn listing_snapshot(&self, listing_id: i64) -> Listing {
        self.state
            .lock()
            .unwrap()
            .listings
            .iter()
            .find(|l| l.id == listing_id)
            .cloned()
            .expect("listing present")
    }

    pub fn releases(&self) -> Vec<(i64, DispatchBookkeeping)> {
        self.state.lock().unwrap().releases.clone()
    }

    pub fn order_assignments(&self) -> Vec<(i64, i64)> {
        self.state.lock().unwrap().order_assignments.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn channels(&self) -> Result<Vec<Channel>> {
        Ok(self.state.lock().unwrap().channels.clone())
    }

    async fn listings(&self) -> Result<Vec<Listing>> {
        Ok(self.state.lock().unwrap().listings.clone())
    }

    async fn listing(&self, listing_id: i64) -> Result<Option<Listing>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .listings
            .iter()
            .find(|l| l.id == listing_id)
            .cloned())
    }

    async fn media_for_listing(&self, listing_id: i64, limit: i64) -> Result<Vec<ListingMedia>> {
        let state = self.state.lock().unwrap();
        if state.fail_media_for == Some(listing_id) {
            return Err(AdcastError::Internal("media backend unavailable".into()));
        }
        let mut media: Vec<ListingMedia> = state
            .media
            .iter()
            .filter(|m| m.listing_id == listing_id)
            .cloned()
            .collect();
        media.sort_by_key(|m| m.position);
        media.truncate(limit as usize);
        Ok(media)
    }

    async fn template_by_name(&self, name: &str) -> Result<Option<Template>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .templates
            .iter()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn try_acquire_dispatch_lock(&self, listing_id: i64) -> Result<Option<Listing>> {
        let mut state = self.state.lock().unwrap();
        let listing = state
            .listings
            .iter_mut()
            .find(|l| l.id == listing_id)
            .ok_or(AdcastError::ListingNotFound(listing_id))?;
        if listing.sending_lock {
            return Ok(None);
        }
        listing.sending_lock = true;
        Ok(Some(listing.clone()))
    }

    async fn release_dispatch_lock(
        &self,
        listing_id: i64,
        bookkeeping: &DispatchBookkeeping,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(listing) = state.listings.iter_mut().find(|l| l.id == listing_id) {
            listing.sending_lock = false;
            listing.sent_to_broadcast |= bookkeeping.mark_broadcast_sent;
            if let Some(posted) = &bookkeeping.last_posted {
                listing.last_posted_channel_id = Some(posted.chat_id.clone());
                listing.last_posted_at = Some(posted.at);
            }
        }
        state.releases.push((listing_id, bookkeeping.clone()));
        Ok(())
    }

    async fn agents(&self) -> Result<Vec<Agent>> {
        Ok(self.state.lock().unwrap().agents.clone())
    }

    async fn team_leads(&self) -> Result<Vec<TeamLead>> {
        Ok(self.state.lock().unwrap().team_leads.clone())
    }

    async fn assign_listing_to_next_agent(&self, listing_id: i64) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        let agent_ids: Vec<i64> = state.agents.iter().map(|a| a.id).collect();
        let cursor = state
            .assignment_log
            .iter()
            .rev()
            .find(|(kind, _, _)| *kind == AssignmentKind::Listing)
            .map(|(_, _, assignee)| *assignee);
        let Some(agent_id) = next_assignee(&agent_ids, cursor) else {
            return Err(AdcastError::Validation(
                "no agents available for assignment".to_string(),
            ));
        };
        let listing = state
            .listings
            .iter_mut()
            .find(|l| l.id == listing_id)
            .ok_or(AdcastError::ListingNotFound(listing_id))?;
        listing.agent_id = Some(agent_id);
        state
            .assignment_log
            .push((AssignmentKind::Listing, listing_id, agent_id));
        Ok(agent_id)
    }

    async fn assign_order_to_next_team_lead(&self, order_id: i64) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        let lead_ids: Vec<i64> = state.team_leads.iter().map(|l| l.id).collect();
        let cursor = state
            .assignment_log
            .iter()
            .rev()
            .find(|(kind, _, _)| *kind == AssignmentKind::Order)
            .map(|(_, _, assignee)| *assignee);
        let Some(lead_id) = next_assignee(&lead_ids, cursor) else {
            return Err(AdcastError::Validation(
                "no team leads available for assignment".to_string(),
            ));
        };
        if !state.unassigned_orders.contains(&order_id)
            && !state.order_assignments.iter().any(|(id, _)| *id == order_id)
        {
            return Err(AdcastError::OrderNotFound(order_id));
        }
        state.unassigned_orders.retain(|id| *id != order_id);
        state.order_assignments.push((order_id, lead_id));
        state
            .assignment_log
            .push((AssignmentKind::Order, order_id, lead_id));
        Ok(lead_id)
    }

    async fn unassigned_listing_ids(&self) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = self
            .state
            .lock()
            .unwrap()
            .listings
            .iter()
            .filter(|l| l.agent_id.is_none())
            .map(|l| l.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn unassigned_order_ids(&self) -> Result<Vec<i64>> {
        let mut ids = self.state.lock().unwrap().unassigned_orders.clone();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn count_posted_since(&self, since: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .listings
            .iter()
            .filter(|l| l.last_posted_at.map(|at| at >= since).unwrap_or(false))
            .count() as i64)
    }
}
