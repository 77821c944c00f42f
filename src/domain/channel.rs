use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What the channel does with delivery bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookkeepingPolicy {
    /// Mark the listing as sent after any terminal attempt, success or not.
    /// Trades delivery guarantees for never re-spamming the channel.
    BestEffortOnce,
    /// Record the posting only on confirmed success, so future ticks rotate
    /// the listing through the remaining channels of this category.
    OnConfirmedSuccess,
}

/// Channel category; each carries its own bookkeeping policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCategory {
    Broadcast,
    Successful,
}

impl ChannelCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::Successful => "successful",
        }
    }

    pub fn bookkeeping_policy(&self) -> BookkeepingPolicy {
        match self {
            Self::Broadcast => BookkeepingPolicy::BestEffortOnce,
            Self::Successful => BookkeepingPolicy::OnConfirmedSuccess,
        }
    }

    /// Name of the message template this category renders with
    pub fn template_name(&self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast_channel",
            Self::Successful => "successful_channel",
        }
    }
}

impl std::fmt::Display for ChannelCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelCategory {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "broadcast" => Ok(Self::Broadcast),
            "successful" => Ok(Self::Successful),
            _ => Err("invalid channel category; expected broadcast|successful"),
        }
    }
}

/// Location rule applied by the matching engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationFilter {
    All,
    City,
    Region,
    Suburbs,
}

impl LocationFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::City => "city",
            Self::Region => "region",
            Self::Suburbs => "suburbs",
        }
    }
}

impl std::fmt::Display for LocationFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LocationFilter {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "city" => Ok(Self::City),
            "region" => Ok(Self::Region),
            "suburbs" => Ok(Self::Suburbs),
            _ => Err("invalid location filter; expected all|city|region|suburbs"),
        }
    }
}

/// A messaging channel listings are distributed to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub category: ChannelCategory,
    pub deal_type: String,
    pub object_type: String,
    /// Transport address (Telegram chat id)
    pub chat_id: String,
    /// Inclusive USD price bounds; unset bound means unfiltered dimension
    pub price_from: Option<i64>,
    pub price_to: Option<i64>,
    pub location: LocationFilter,
}

/// Channel payload for the control surface
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub category: ChannelCategory,
    pub deal_type: String,
    pub object_type: String,
    pub chat_id: String,
    pub price_from: Option<i64>,
    pub price_to: Option<i64>,
    pub location: LocationFilter,
}
