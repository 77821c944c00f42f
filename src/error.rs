use thiserror::Error;

/// Main error type for the dispatcher
#[derive(Error, Debug)]
pub enum AdcastError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Record lookup errors
    #[error("Listing not found: {0}")]
    ListingNotFound(i64),

    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("Channel not found: {0}")]
    ChannelNotFound(i64),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for AdcastError
pub type Result<T> = std::result::Result<T, AdcastError>;
