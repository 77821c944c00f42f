use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    New,
    Active,
    Verification,
    Spam,
    Successful,
    Archived,
    NotRelevant,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Active => "active",
            Self::Verification => "verification",
            Self::Spam => "spam",
            Self::Successful => "successful",
            Self::Archived => "archived",
            Self::NotRelevant => "not_relevant",
        }
    }

    /// Parse a persisted status value; absent or empty text means "no status yet"
    pub fn parse_opt(raw: Option<&str>) -> Option<Self> {
        match raw {
            None => None,
            Some(s) if s.trim().is_empty() => None,
            Some(s) => Self::from_str(s).ok(),
        }
    }
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "active" => Ok(Self::Active),
            "verification" => Ok(Self::Verification),
            "spam" => Ok(Self::Spam),
            "successful" => Ok(Self::Successful),
            "archived" => Ok(Self::Archived),
            "not_relevant" => Ok(Self::NotRelevant),
            _ => Err("invalid listing status"),
        }
    }
}

/// A scraped real-estate listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub deal_type: String,
    pub object_type: String,
    pub title: String,
    /// Raw price text as scraped; mixed currency ("15000 грн", "$500")
    pub price: String,
    pub location: String,
    pub description: Option<String>,
    pub rooms: Option<String>,
    pub area: Option<String>,
    pub floor: Option<String>,
    /// Stable unique key used by the ingestion upsert
    pub url: String,
    pub status: Option<ListingStatus>,
    /// Dispatch lock flag; at most one in-flight dispatch per listing
    pub sending_lock: bool,
    /// Monotonic: transitions false -> true only
    pub sent_to_broadcast: bool,
    pub last_posted_channel_id: Option<String>,
    pub last_posted_at: Option<DateTime<Utc>>,
    pub agent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Look up a template placeholder by name
    pub fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.to_string()),
            "deal_type" => Some(self.deal_type.clone()),
            "object_type" => Some(self.object_type.clone()),
            "title" => Some(self.title.clone()),
            "price" => Some(self.price.clone()),
            "location" => Some(self.location.clone()),
            "description" => self.description.clone(),
            "rooms" => self.rooms.clone(),
            "area" => self.area.clone(),
            "floor" => self.floor.clone(),
            "url" => Some(self.url.clone()),
            _ => None,
        }
    }
}

/// Listing payload produced by the ingestion collaborator (upsert by URL)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewListing {
    pub deal_type: String,
    pub object_type: String,
    pub title: String,
    pub price: String,
    pub location: String,
    pub description: Option<String>,
    pub rooms: Option<String>,
    pub area: Option<String>,
    pub floor: Option<String>,
    pub url: String,
}

/// Media file attached to a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingMedia {
    pub id: i64,
    pub listing_id: i64,
    pub file_path: String,
    pub content_type: String,
    /// Explicit ordering within the listing's media set
    pub position: i32,
}
