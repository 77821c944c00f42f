use serde::{Deserialize, Serialize};

/// A human operator listings are assigned to; `id` is the round-robin ordering key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub username: String,
}

/// A team lead client orders are assigned to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamLead {
    pub id: i64,
    pub name: String,
    pub username: String,
}
