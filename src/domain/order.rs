use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A client request, optionally linked to a listing and a team lead
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub telegram_username: Option<String>,
    pub wishes: Option<String>,
    pub budget: Option<String>,
    pub district: Option<String>,
    pub listing_id: Option<i64>,
    pub team_lead_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
