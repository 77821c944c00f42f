//! Daily summary broadcast
//!
//! Counts listings posted since the start of the current UTC day and sends a
//! short promo text to every channel. Per-channel failures are logged and do
//! not abort the remaining channels.

use crate::error::Result;
use crate::store::RecordStore;
use crate::transport::MediaTransport;
use chrono::{NaiveTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct SummaryReport {
    pub published_today: i64,
    pub notified: usize,
    pub failed: usize,
}

pub struct SummaryBroadcaster<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
}

impl<S: RecordStore, T: MediaTransport> SummaryBroadcaster<S, T> {
    pub fn new(store: Arc<S>, transport: Arc<T>) -> Self {
        Self { store, transport }
    }

    pub async fn send_daily_summary(&self) -> Result<SummaryReport> {
        let start_of_day = Utc::now()
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        let published_today = self.store.count_posted_since(start_of_day).await?;

        let text = format!(
            "Today the RentSearch team added another {published_today} exclusive objects. \
             Hurry up and sign up for a review 🧐!"
        );

        let mut report = SummaryReport {
            published_today,
            ..Default::default()
        };
        for channel in self.store.channels().await? {
            match self.transport.send_message(&channel.chat_id, &text).await {
                Ok(()) => {
                    info!("Summary sent to channel {}", channel.chat_id);
                    report.notified += 1;
                }
                Err(e) => {
                    warn!("Failed to send summary to channel {}: {}", channel.chat_id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChannelCategory;
    use crate::matching::tests::{channel, listing};
    use crate::store::memory::MemoryStore;
    use crate::transport::{MockMediaTransport, SendError};
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_summary_counts_and_survives_channel_failure() {
        let mut posted = listing(1);
        posted.last_posted_at = Some(Utc::now());
        let store = Arc::new(
            MemoryStore::new()
                .with_listings(vec![posted, listing(2)])
                .with_channels(vec![
                    channel(1, ChannelCategory::Broadcast),
                    channel(2, ChannelCategory::Successful),
                ]),
        );

        let mut transport = MockMediaTransport::new();
        transport
            .expect_send_message()
            .with(eq("-1001"), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(()));
        transport
            .expect_send_message()
            .with(eq("-1002"), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Err(SendError::Transport("blocked".to_string())));

        let broadcaster = SummaryBroadcaster::new(store, Arc::new(transport));
        let report = broadcaster.send_daily_summary().await.unwrap();

        assert_eq!(report.published_today, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(report.failed, 1);
    }
}
