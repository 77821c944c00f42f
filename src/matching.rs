//! Matching engine
//!
//! Pure filter rules deciding which listings are eligible for which channels.
//! Reads no state of its own; the scheduler feeds it the current corpus and
//! the delivery pipeline re-checks eligibility after taking the dispatch lock.

use crate::config::MatchingConfig;
use crate::domain::{Channel, ChannelCategory, Listing, ListingStatus};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::error;

/// Currency marker for Ukrainian hryvnia in scraped price text
const UAH_MARKER: &str = "грн";

/// Normalize raw price text to USD.
///
/// Strips all non-digit characters, then converts UAH-marked amounts at the
/// configured rate. Empty text normalizes to zero; `None` means the digits
/// did not form a representable number and the listing must be excluded from
/// price-filtered channels.
pub fn normalize_price(raw: &str, rules: &MatchingConfig) -> Option<Decimal> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Some(Decimal::ZERO);
    }

    let amount = match Decimal::from_str(&digits) {
        Ok(amount) => amount,
        Err(e) => {
            error!("Unparseable price text {:?}: {}", raw, e);
            return None;
        }
    };

    if raw.contains(UAH_MARKER) {
        Some(amount / rules.uah_to_usd)
    } else {
        Some(amount)
    }
}

/// Category base filter: which listings a channel category considers at all
fn passes_base_filter(channel: &Channel, listing: &Listing) -> bool {
    match channel.category {
        ChannelCategory::Broadcast => listing.status.is_none() && !listing.sent_to_broadcast,
        ChannelCategory::Successful => {
            listing.status == Some(ListingStatus::Successful)
                && listing.last_posted_channel_id.as_deref() != Some(channel.chat_id.as_str())
        }
    }
}

/// Inclusive USD price range check; a channel with no bounds does not filter on price
fn passes_price_filter(channel: &Channel, listing: &Listing, rules: &MatchingConfig) -> bool {
    if channel.price_from.is_none() && channel.price_to.is_none() {
        return true;
    }

    let Some(price) = normalize_price(&listing.price, rules) else {
        // Unparseable price: exclude from this channel, never abort the tick
        return false;
    };

    if let Some(from) = channel.price_from {
        if price < Decimal::from(from) {
            return false;
        }
    }
    if let Some(to) = channel.price_to {
        if price > Decimal::from(to) {
            return false;
        }
    }
    true
}

fn passes_location_filter(channel: &Channel, listing: &Listing, rules: &MatchingConfig) -> bool {
    use crate::domain::LocationFilter::*;
    match channel.location {
        All => true,
        City => listing.location.contains(&rules.anchor_city),
        // Heuristic: scraped non-city addresses carry no comma-separated parts
        Region => !listing.location.contains(','),
        Suburbs => rules.suburbs.iter().any(|s| s == &listing.location),
    }
}

/// Full eligibility check of one listing against one channel
pub fn eligible(channel: &Channel, listing: &Listing, rules: &MatchingConfig) -> bool {
    passes_base_filter(channel, listing)
        && listing.deal_type == channel.deal_type
        && listing.object_type == channel.object_type
        && passes_price_filter(channel, listing, rules)
        && passes_location_filter(channel, listing, rules)
}

/// Group eligible listings per channel; channels with no matches are omitted
pub fn pending_by_channel(
    channels: &[Channel],
    listings: &[Listing],
    rules: &MatchingConfig,
) -> Vec<(Channel, Vec<Listing>)> {
    channels
        .iter()
        .filter_map(|channel| {
            let matched: Vec<Listing> = listings
                .iter()
                .filter(|listing| eligible(channel, listing, rules))
                .cloned()
                .collect();
            if matched.is_empty() {
                None
            } else {
                Some((channel.clone(), matched))
            }
        })
        .collect()
}

/// All channels one listing is currently eligible for, in channel order.
///
/// Used by the delivery pipeline to re-validate eligibility after the
/// dispatch lock is acquired.
pub fn channels_for_listing(
    channels: &[Channel],
    listing: &Listing,
    rules: &MatchingConfig,
) -> Vec<Channel> {
    channels
        .iter()
        .filter(|channel| eligible(channel, listing, rules))
        .cloned()
        .collect()
}
