use serde::{Deserialize, Serialize};

/// Message template with named `{placeholder}` tokens bound to listing attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub body: String,
}
