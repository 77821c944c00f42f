use super::{DispatchBookkeeping, RecordStore};
use crate::assignment::{next_assignee, AssignmentKind};
use crate::domain::{
    Agent, Channel, ChannelCategory, Listing, ListingMedia, ListingStatus, LocationFilter,
    NewChannel, NewListing, TeamLead, Template,
};
use crate::error::{AdcastError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

/// PostgreSQL record store
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ==================== Ingestion collaborator surface ====================

    /// Upsert a listing by its stable unique URL (update-in-place on match)
    pub async fn upsert_listing(&self, listing: &NewListing) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO listings (
                deal_type, object_type, title, price, location,
                description, rooms, area, floor, url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (url) DO UPDATE SET
                deal_type = EXCLUDED.deal_type,
                object_type = EXCLUDED.object_type,
                title = EXCLUDED.title,
                price = EXCLUDED.price,
                location = EXCLUDED.location,
                description = EXCLUDED.description,
                rooms = EXCLUDED.rooms,
                area = EXCLUDED.area,
                floor = EXCLUDED.floor,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(&listing.deal_type)
        .bind(&listing.object_type)
        .bind(&listing.title)
        .bind(&listing.price)
        .bind(&listing.location)
        .bind(&listing.description)
        .bind(&listing.rooms)
        .bind(&listing.area)
        .bind(&listing.floor)
        .bind(&listing.url)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    /// Set (or clear) a listing's status
    pub async fn set_listing_status(
        &self,
        listing_id: i64,
        status: Option<ListingStatus>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE listings SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(listing_id)
        .bind(status.map(|s| s.as_str()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AdcastError::ListingNotFound(listing_id));
        }
        Ok(())
    }

    // ==================== Control surface ====================

    pub async fn add_channel(&self, channel: &NewChannel) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO channels (
                category, deal_type, object_type, chat_id,
                price_from, price_to, location_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(channel.category.as_str())
        .bind(&channel.deal_type)
        .bind(&channel.object_type)
        .bind(&channel.chat_id)
        .bind(channel.price_from)
        .bind(channel.price_to)
        .bind(channel.location.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    pub async fn remove_channel(&self, channel_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM channels WHERE id = $1")
            .bind(channel_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AdcastError::ChannelNotFound(channel_id));
        }
        Ok(())
    }

    pub async fn order(&self, order_id: i64) -> Result<Option<crate::domain::Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, phone, telegram_username, wishes, budget, district,
                   listing_id, team_lead_id, created_at
            FROM orders WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| crate::domain::Order {
            id: r.get("id"),
            name: r.get("name"),
            phone: r.get("phone"),
            telegram_username: r.get("telegram_username"),
            wishes: r.get("wishes"),
            budget: r.get("budget"),
            district: r.get("district"),
            listing_id: r.get("listing_id"),
            team_lead_id: r.get("team_lead_id"),
            created_at: r.get("created_at"),
        }))
    }
}

const LISTING_COLUMNS: &str = r#"
    id, deal_type, object_type, title, price, location, description,
    rooms, area, floor, url, status, sending_lock, sent_to_broadcast,
    last_posted_channel_id, last_posted_at, agent_id, created_at, updated_at
"#;

fn listing_from_row(row: &PgRow) -> Listing {
    Listing {
        id: row.get("id"),
        deal_type: row.get("deal_type"),
        object_type: row.get("object_type"),
        title: row.get("title"),
        price: row.get("price"),
        location: row.get("location"),
        description: row.get("description"),
        rooms: row.get("rooms"),
        area: row.get("area"),
        floor: row.get("floor"),
        url: row.get("url"),
        status: ListingStatus::parse_opt(row.get::<Option<String>, _>("status").as_deref()),
        sending_lock: row.get("sending_lock"),
        sent_to_broadcast: row.get("sent_to_broadcast"),
        last_posted_channel_id: row.get("last_posted_channel_id"),
        last_posted_at: row.get("last_posted_at"),
        agent_id: row.get("agent_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn channel_from_row(row: &PgRow) -> Result<Channel> {
    let category: String = row.get("category");
    let location: String = row.get("location_type");
    Ok(Channel {
        id: row.get("id"),
        category: ChannelCategory::from_str(&category)
            .map_err(|e| AdcastError::Internal(format!("channel row: {e}")))?,
        deal_type: row.get("deal_type"),
        object_type: row.get("object_type"),
        chat_id: row.get("chat_id"),
        price_from: row.get("price_from"),
        price_to: row.get("price_to"),
        location: LocationFilter::from_str(&location)
            .map_err(|e| AdcastError::Internal(format!("channel row: {e}")))?,
    })
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn channels(&self) -> Result<Vec<Channel>> {
        let rows = sqlx::query(
            r#"
            SELECT id, category, deal_type, object_type, chat_id,
                   price_from, price_to, location_type
            FROM channels
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(channel_from_row).collect()
    }

    async fn listings(&self) -> Result<Vec<Listing>> {
        let rows = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(listing_from_row).collect())
    }

    async fn listing(&self, listing_id: i64) -> Result<Option<Listing>> {
        let row = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1"
        ))
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(listing_from_row))
    }

    async fn media_for_listing(&self, listing_id: i64, limit: i64) -> Result<Vec<ListingMedia>> {
        let rows = sqlx::query(
            r#"
            SELECT id, listing_id, file_path, content_type, position
            FROM listing_media
            WHERE listing_id = $1
            ORDER BY position ASC
            LIMIT $2
            "#,
        )
        .bind(listing_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ListingMedia {
                id: row.get("id"),
                listing_id: row.get("listing_id"),
                file_path: row.get("file_path"),
                content_type: row.get("content_type"),
                position: row.get("position"),
            })
            .collect())
    }

    async fn template_by_name(&self, name: &str) -> Result<Option<Template>> {
        let row = sqlx::query("SELECT id, name, body FROM templates WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Template {
            id: r.get("id"),
            name: r.get("name"),
            body: r.get("body"),
        }))
    }

    async fn try_acquire_dispatch_lock(&self, listing_id: i64) -> Result<Option<Listing>> {
        let mut tx = self.pool.begin().await?;

        // Exclusive read; concurrent acquirers serialize here
        let row = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1 FOR UPDATE"
        ))
        .bind(listing_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(AdcastError::ListingNotFound(listing_id));
        };
        let mut listing = listing_from_row(&row);

        if listing.sending_lock {
            // Already in flight; dropping the transaction rolls back the read lock
            return Ok(None);
        }

        sqlx::query("UPDATE listings SET sending_lock = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(listing_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        listing.sending_lock = true;
        debug!("Acquired dispatch lock for listing {}", listing_id);
        Ok(Some(listing))
    }

    async fn release_dispatch_lock(
        &self,
        listing_id: i64,
        bookkeeping: &DispatchBookkeeping,
    ) -> Result<()> {
        let (posted_chat, posted_at) = match &bookkeeping.last_posted {
            Some(posted) => (Some(posted.chat_id.clone()), Some(posted.at)),
            None => (None, None),
        };

        sqlx::query(
            r#"
            UPDATE listings SET
                sending_lock = FALSE,
                sent_to_broadcast = sent_to_broadcast OR $2,
                last_posted_channel_id = COALESCE($3, last_posted_channel_id),
                last_posted_at = COALESCE($4, last_posted_at),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(listing_id)
        .bind(bookkeeping.mark_broadcast_sent)
        .bind(posted_chat)
        .bind(posted_at)
        .execute(&self.pool)
        .await?;

        debug!("Released dispatch lock for listing {}", listing_id);
        Ok(())
    }

    async fn agents(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query("SELECT id, name, username FROM agents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| Agent {
                id: r.get("id"),
                name: r.get("name"),
                username: r.get("username"),
            })
            .collect())
    }

    async fn team_leads(&self) -> Result<Vec<TeamLead>> {
        let rows = sqlx::query("SELECT id, name, username FROM team_leads ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| TeamLead {
                id: r.get("id"),
                name: r.get("name"),
                username: r.get("username"),
            })
            .collect())
    }

    async fn assign_listing_to_next_agent(&self, listing_id: i64) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let agent_ids: Vec<i64> = sqlx::query("SELECT id FROM agents ORDER BY id")
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|r| r.get("id"))
            .collect();

        let cursor: Option<i64> = sqlx::query(
            "SELECT assignee_id FROM assignment_log WHERE kind = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(AssignmentKind::Listing.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| r.get("assignee_id"));

        let Some(agent_id) = next_assignee(&agent_ids, cursor) else {
            return Err(AdcastError::Validation(
                "no agents available for assignment".to_string(),
            ));
        };

        let result =
            sqlx::query("UPDATE listings SET agent_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(listing_id)
                .bind(agent_id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AdcastError::ListingNotFound(listing_id));
        }

        sqlx::query(
            "INSERT INTO assignment_log (kind, target_id, assignee_id) VALUES ($1, $2, $3)",
        )
        .bind(AssignmentKind::Listing.as_str())
        .bind(listing_id)
        .bind(agent_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(agent_id)
    }

    async fn assign_order_to_next_team_lead(&self, order_id: i64) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let lead_ids: Vec<i64> = sqlx::query("SELECT id FROM team_leads ORDER BY id")
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|r| r.get("id"))
            .collect();

        let cursor: Option<i64> = sqlx::query(
            "SELECT assignee_id FROM assignment_log WHERE kind = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(AssignmentKind::Order.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| r.get("assignee_id"));

        let Some(lead_id) = next_assignee(&lead_ids, cursor) else {
            return Err(AdcastError::Validation(
                "no team leads available for assignment".to_string(),
            ));
        };

        let result =
            sqlx::query("UPDATE orders SET team_lead_id = $2 WHERE id = $1")
                .bind(order_id)
                .bind(lead_id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AdcastError::OrderNotFound(order_id));
        }

        sqlx::query(
            "INSERT INTO assignment_log (kind, target_id, assignee_id) VALUES ($1, $2, $3)",
        )
        .bind(AssignmentKind::Order.as_str())
        .bind(order_id)
        .bind(lead_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(lead_id)
    }

    async fn unassigned_listing_ids(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT id FROM listings WHERE agent_id IS NULL ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn unassigned_order_ids(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT id FROM orders WHERE team_lead_id IS NULL ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn count_posted_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM listings WHERE last_posted_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }
}
