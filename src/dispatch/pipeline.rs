//! Delivery pipeline
//!
//! For a locked listing: re-check channel eligibility, render the template,
//! attach media, send to every eligible channel with retry/backoff, fold the
//! per-channel outcomes into release bookkeeping. One failing channel never
//! blocks its siblings, and the lock is released on every exit path.

use super::lock::{LockManager, LockOutcome};
use super::render::{render, DEFAULT_TEMPLATE};
use crate::config::{AppConfig, DispatchConfig, MatchingConfig};
use crate::domain::{BookkeepingPolicy, Channel, Listing, ListingMedia};
use crate::error::{AdcastError, Result};
use crate::matching;
use crate::store::{DispatchBookkeeping, PostedTo, RecordStore};
use crate::transport::{MediaItem, MediaKind, MediaTransport, SendError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

/// Terminal outcome of one channel's delivery attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// Confirmed success
    Delivered,
    /// The attempt timed out; no further retries for this channel
    TimedOut,
    /// Retries exhausted (rate limiting or transport failures)
    Failed,
}

/// One channel's recorded delivery result
#[derive(Debug, Clone)]
pub struct ChannelAttempt {
    pub channel: Channel,
    pub outcome: ChannelOutcome,
}

/// Overall dispatch outcome for one listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { succeeded: usize, failed: usize },
    AlreadyInFlight,
    NoEligibleChannels,
}

#[derive(Debug)]
pub struct DispatchReport {
    pub listing_id: i64,
    pub outcome: DispatchOutcome,
    pub attempts: Vec<ChannelAttempt>,
}

enum Payload<'a> {
    Media(&'a [MediaItem]),
    Text(&'a str),
}

pub struct DeliveryPipeline<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    lock: LockManager<S>,
    dispatch: DispatchConfig,
    matching: MatchingConfig,
    media_base: Url,
}

impl<S: RecordStore, T: MediaTransport> DeliveryPipeline<S, T> {
    pub fn new(store: Arc<S>, transport: Arc<T>, config: &AppConfig) -> Result<Self> {
        let media_base = Url::parse(&config.telegram.media_base_url)
            .map_err(|e| AdcastError::Validation(format!("media_base_url: {e}")))?;

        Ok(Self {
            lock: LockManager::new(store.clone()),
            store,
            transport,
            dispatch: config.dispatch.clone(),
            matching: config.matching.clone(),
            media_base,
        })
    }

    /// Dispatch one listing to every channel it is currently eligible for.
    ///
    /// Safe to call concurrently with the scheduler loop; the dispatch lock
    /// serializes per listing and a held lock is reported as
    /// [`DispatchOutcome::AlreadyInFlight`] without sending anything.
    pub async fn dispatch(&self, listing_id: i64) -> Result<DispatchReport> {
        let listing = match self.lock.acquire(listing_id).await? {
            LockOutcome::Acquired(listing) => listing,
            LockOutcome::AlreadyInFlight => {
                return Ok(DispatchReport {
                    listing_id,
                    outcome: DispatchOutcome::AlreadyInFlight,
                    attempts: Vec::new(),
                });
            }
        };

        let mut attempts = Vec::new();
        let delivered = self.deliver(&listing, &mut attempts).await;

        // The lock must clear no matter how delivery ended
        let bookkeeping = fold_bookkeeping(&attempts);
        let released = self.lock.release(listing_id, &bookkeeping).await;

        match delivered {
            Ok(outcome) => {
                released?;
                Ok(DispatchReport {
                    listing_id,
                    outcome,
                    attempts,
                })
            }
            Err(e) => {
                if let Err(release_err) = released {
                    error!(
                        "Failed to release dispatch lock for listing {}: {}",
                        listing_id, release_err
                    );
                }
                error!("Dispatch of listing {} failed: {}", listing_id, e);
                Err(e)
            }
        }
    }

    async fn deliver(
        &self,
        listing: &Listing,
        attempts: &mut Vec<ChannelAttempt>,
    ) -> Result<DispatchOutcome> {
        let dispatch_id = Uuid::new_v4();

        // Re-validate eligibility now that we own the lock; matching reads
        // may have been stale at tick time
        let channels = self.store.channels().await?;
        let eligible = matching::channels_for_listing(&channels, listing, &self.matching);
        if eligible.is_empty() {
            warn!("No eligible channels for listing {}", listing.id);
            return Ok(DispatchOutcome::NoEligibleChannels);
        }

        // All channels a listing can match at once share a category
        let category = eligible[0].category;
        let body = self
            .store
            .template_by_name(category.template_name())
            .await?
            .map(|t| t.body)
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
        let caption = render(&body, listing);

        let media = self
            .store
            .media_for_listing(listing.id, self.dispatch.max_media as i64)
            .await?;
        let batch = self.build_batch(&media, &caption);

        for channel in eligible {
            let payload = if batch.is_empty() {
                Payload::Text(&caption)
            } else {
                Payload::Media(&batch)
            };
            let outcome = self.send_with_retry(&channel, payload).await;

            info!(
                "Dispatch {} listing {} -> channel {}: {:?}",
                dispatch_id, listing.id, channel.chat_id, outcome
            );
            attempts.push(ChannelAttempt { channel, outcome });
        }

        let succeeded = attempts
            .iter()
            .filter(|a| a.outcome == ChannelOutcome::Delivered)
            .count();
        Ok(DispatchOutcome::Delivered {
            succeeded,
            failed: attempts.len() - succeeded,
        })
    }

    fn build_batch(&self, media: &[ListingMedia], caption: &str) -> Vec<MediaItem> {
        media
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| {
                let url = self
                    .media_base
                    .join(item.file_path.trim_start_matches('/'))
                    .ok()?;
                Some(MediaItem {
                    kind: MediaKind::from_content_type(&item.content_type),
                    url: url.to_string(),
                    caption: (idx == 0).then(|| caption.to_string()),
                })
            })
            .collect()
    }

    /// Send one payload to one channel, honoring the retry policy:
    /// server-suggested waits for rate limits, exponential backoff for other
    /// failures, timeouts terminal.
    async fn send_with_retry(&self, channel: &Channel, payload: Payload<'_>) -> ChannelOutcome {
        let max_attempts = self.dispatch.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let result = match &payload {
                Payload::Media(batch) => {
                    self.transport.send_media_group(&channel.chat_id, batch).await
                }
                Payload::Text(text) => self.transport.send_message(&channel.chat_id, text).await,
            };

            match result {
                Ok(()) => return ChannelOutcome::Delivered,
                Err(SendError::RateLimited { retry_after }) => {
                    if attempt == max_attempts {
                        warn!(
                            "Channel {} still rate limited after {} attempts",
                            channel.chat_id, attempt
                        );
                        return ChannelOutcome::Failed;
                    }
                    warn!(
                        "Flood control on channel {}, retrying in {:?}",
                        channel.chat_id, retry_after
                    );
                    sleep(retry_after).await;
                }
                Err(SendError::Timeout) => {
                    error!("Timed out sending to channel {}", channel.chat_id);
                    return ChannelOutcome::TimedOut;
                }
                Err(SendError::Transport(msg)) => {
                    if attempt == max_attempts {
                        error!(
                            "Giving up on channel {} after {} attempts: {}",
                            channel.chat_id, attempt, msg
                        );
                        return ChannelOutcome::Failed;
                    }
                    let delay =
                        Duration::from_secs(self.dispatch.retry_base_secs << (attempt - 1));
                    warn!(
                        "Send to channel {} failed ({}), retrying in {:?}",
                        channel.chat_id, msg, delay
                    );
                    sleep(delay).await;
                }
            }
        }

        ChannelOutcome::Failed
    }
}

/// Fold per-channel outcomes into the state applied at lock release.
///
/// Broadcast channels advance the sent flag after any terminal attempt
/// (best-effort-once); successful channels record the posting only on
/// confirmed success.
fn fold_bookkeeping(attempts: &[ChannelAttempt]) -> DispatchBookkeeping {
    let mut bookkeeping = DispatchBookkeeping::default();
    for attempt in attempts {
        match attempt.channel.category.bookkeeping_policy() {
            BookkeepingPolicy::BestEffortOnce => {
                bookkeeping.mark_broadcast_sent = true;
            }
            BookkeepingPolicy::OnConfirmedSuccess => {
                if attempt.outcome == ChannelOutcome::Delivered {
                    bookkeeping.last_posted = Some(PostedTo {
                        chat_id: attempt.channel.chat_id.clone(),
                        at: Utc::now(),
                    });
                }
            }
        }
    }
    bookkeeping
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DatabaseConfig, LoggingConfig, SchedulerConfig, TelegramConfig,
    };
    use crate::domain::{ChannelCategory, ListingStatus};
    use crate::matching::tests::{channel, listing};
    use crate::store::memory::MemoryStore;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    fn config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                url: "postgres://localhost/adcast".to_string(),
                max_connections: 1,
            },
            telegram: TelegramConfig {
                bot_token: "123:abc".to_string(),
                api_base: "https://api.telegram.org".to_string(),
                media_base_url: "https://media.rentsearch.example/".to_string(),
                request_timeout_secs: 30,
            },
            dispatch: DispatchConfig {
                max_attempts: 3,
                retry_base_secs: 5,
                max_media: 5,
            },
            matching: MatchingConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Transport with a scripted outcome queue per chat id; default is success
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<HashMap<String, VecDeque<std::result::Result<(), SendError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn script(self, chat_id: &str, outcomes: Vec<std::result::Result<(), SendError>>) -> Self {
            self.script
                .lock()
                .unwrap()
                .insert(chat_id.to_string(), outcomes.into());
            self
        }

        fn calls_for(&self, chat_id: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.as_str() == chat_id)
                .count()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn next_outcome(&self, chat_id: &str) -> std::result::Result<(), SendError> {
            self.calls.lock().unwrap().push(chat_id.to_string());
            self.script
                .lock()
                .unwrap()
                .get_mut(chat_id)
                .and_then(|q| q.pop_front())
                .unwrap_or(Ok(()))
        }
    }

    #[async_trait::async_trait]
    impl MediaTransport for ScriptedTransport {
        async fn send_media_group(
            &self,
            chat_id: &str,
            _media: &[MediaItem],
        ) -> std::result::Result<(), SendError> {
            self.next_outcome(chat_id)
        }

        async fn send_message(
            &self,
            chat_id: &str,
            _text: &str,
        ) -> std::result::Result<(), SendError> {
            self.next_outcome(chat_id)
        }
    }

    fn pipeline(
        store: Arc<MemoryStore>,
        transport: Arc<ScriptedTransport>,
    ) -> DeliveryPipeline<MemoryStore, ScriptedTransport> {
        DeliveryPipeline::new(store, transport, &config()).unwrap()
    }

    #[tokio::test]
    async fn test_delivers_to_all_eligible_channels() {
        let store = Arc::new(
            MemoryStore::new()
                .with_listings(vec![listing(1)])
                .with_channels(vec![
                    channel(1, ChannelCategory::Broadcast),
                    channel(2, ChannelCategory::Broadcast),
                ]),
        );
        let transport = Arc::new(ScriptedTransport::default());
        let report = pipeline(store.clone(), transport.clone())
            .dispatch(1)
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            DispatchOutcome::Delivered {
                succeeded: 2,
                failed: 0
            }
        );
        assert_eq!(transport.calls_for("-1001"), 1);
        assert_eq!(transport.calls_for("-1002"), 1);

        let snapshot = store.listing_snapshot(1);
        assert!(!snapshot.sending_lock);
        assert!(snapshot.sent_to_broadcast);
    }

    #[tokio::test]
    async fn test_already_in_flight_sends_nothing() {
        let mut locked = listing(1);
        locked.sending_lock = true;
        let store = Arc::new(
            MemoryStore::new()
                .with_listings(vec![locked])
                .with_channels(vec![channel(1, ChannelCategory::Broadcast)]),
        );
        let transport = Arc::new(ScriptedTransport::default());
        let report = pipeline(store.clone(), transport.clone())
            .dispatch(1)
            .await
            .unwrap();

        assert_eq!(report.outcome, DispatchOutcome::AlreadyInFlight);
        assert_eq!(transport.total_calls(), 0);
        // The foreign lock stays held
        assert!(store.listing_snapshot(1).sending_lock);
    }

    #[tokio::test]
    async fn test_exhausted_channel_does_not_block_siblings() {
        let store = Arc::new(
            MemoryStore::new()
                .with_listings(vec![listing(1)])
                .with_channels(vec![
                    channel(1, ChannelCategory::Broadcast),
                    channel(2, ChannelCategory::Broadcast),
                ]),
        );
        let failing = vec![
            Err(SendError::Transport("boom".to_string())),
            Err(SendError::Transport("boom".to_string())),
            Err(SendError::Transport("boom".to_string())),
        ];
        let transport = Arc::new(ScriptedTransport::default().script("-1001", failing));

        tokio::time::pause();
        let report = pipeline(store.clone(), transport.clone())
            .dispatch(1)
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            DispatchOutcome::Delivered {
                succeeded: 1,
                failed: 1
            }
        );
        assert_eq!(transport.calls_for("-1001"), 3); // retries exhausted
        assert_eq!(transport.calls_for("-1002"), 1); // sibling still attempted
        assert!(store.listing_snapshot(1).sent_to_broadcast); // best-effort-once
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_server_suggested_duration() {
        let store = Arc::new(
            MemoryStore::new()
                .with_listings(vec![listing(1)])
                .with_channels(vec![channel(1, ChannelCategory::Broadcast)]),
        );
        let transport = Arc::new(ScriptedTransport::default().script(
            "-1001",
            vec![
                Err(SendError::RateLimited {
                    retry_after: Duration::from_secs(8),
                }),
                Ok(()),
            ],
        ));

        let started = tokio::time::Instant::now();
        let report = pipeline(store, transport.clone()).dispatch(1).await.unwrap();

        assert_eq!(
            report.outcome,
            DispatchOutcome::Delivered {
                succeeded: 1,
                failed: 0
            }
        );
        assert_eq!(transport.calls_for("-1001"), 2);
        assert!(started.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_timeout_is_terminal_but_marks_broadcast_sent() {
        let store = Arc::new(
            MemoryStore::new()
                .with_listings(vec![listing(1)])
                .with_channels(vec![channel(1, ChannelCategory::Broadcast)]),
        );
        let transport = Arc::new(
            ScriptedTransport::default().script("-1001", vec![Err(SendError::Timeout)]),
        );

        let report = pipeline(store.clone(), transport.clone())
            .dispatch(1)
            .await
            .unwrap();

        assert_eq!(report.attempts[0].outcome, ChannelOutcome::TimedOut);
        assert_eq!(transport.calls_for("-1001"), 1); // no retry after timeout
        assert!(store.listing_snapshot(1).sent_to_broadcast);
        assert!(!store.listing_snapshot(1).sending_lock);
    }

    #[tokio::test]
    async fn test_successful_channel_records_posting_only_on_success() {
        let mut sold = listing(1);
        sold.status = Some(ListingStatus::Successful);
        let store = Arc::new(
            MemoryStore::new()
                .with_listings(vec![sold])
                .with_channels(vec![channel(7, ChannelCategory::Successful)]),
        );

        // First dispatch fails: nothing recorded
        let transport = Arc::new(ScriptedTransport::default().script(
            "-1007",
            vec![Err(SendError::Timeout)],
        ));
        pipeline(store.clone(), transport).dispatch(1).await.unwrap();
        let snapshot = store.listing_snapshot(1);
        assert_eq!(snapshot.last_posted_channel_id, None);
        assert!(!snapshot.sent_to_broadcast);

        // Second dispatch succeeds: posting recorded
        let transport = Arc::new(ScriptedTransport::default());
        pipeline(store.clone(), transport).dispatch(1).await.unwrap();
        let snapshot = store.listing_snapshot(1);
        assert_eq!(snapshot.last_posted_channel_id.as_deref(), Some("-1007"));
        assert!(snapshot.last_posted_at.is_some());
    }

    #[tokio::test]
    async fn test_no_eligible_channels_releases_without_bookkeeping() {
        let store = Arc::new(MemoryStore::new().with_listings(vec![listing(1)]));
        let transport = Arc::new(ScriptedTransport::default());
        let report = pipeline(store.clone(), transport).dispatch(1).await.unwrap();

        assert_eq!(report.outcome, DispatchOutcome::NoEligibleChannels);
        let snapshot = store.listing_snapshot(1);
        assert!(!snapshot.sending_lock);
        assert!(!snapshot.sent_to_broadcast);

        // The release carried no bookkeeping at all
        assert_eq!(store.releases(), vec![(1, DispatchBookkeeping::default())]);
    }

    #[tokio::test]
    async fn test_lock_released_on_unexpected_failure() {
        let store = Arc::new(
            MemoryStore::new()
                .with_listings(vec![listing(1)])
                .with_channels(vec![channel(1, ChannelCategory::Broadcast)])
                .fail_media_for(1),
        );
        let transport = Arc::new(ScriptedTransport::default());
        let result = pipeline(store.clone(), transport.clone()).dispatch(1).await;

        assert!(result.is_err());
        assert_eq!(transport.total_calls(), 0);
        let snapshot = store.listing_snapshot(1);
        assert!(!snapshot.sending_lock); // released despite the failure
        assert!(!snapshot.sent_to_broadcast); // no attempt was started
    }

    #[tokio::test]
    async fn test_media_batch_captions_first_item_only() {
        use crate::domain::ListingMedia;

        let media: Vec<ListingMedia> = (0..3)
            .map(|i| ListingMedia {
                id: i,
                listing_id: 1,
                file_path: format!("/uploads/{i}.jpg"),
                content_type: "image/jpeg".to_string(),
                position: i as i32,
            })
            .collect();
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(ScriptedTransport::default());
        let p = pipeline(store, transport);

        let batch = p.build_batch(&media, "caption");
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].caption.as_deref(), Some("caption"));
        assert!(batch[1].caption.is_none());
        assert!(batch[2].caption.is_none());
        assert_eq!(
            batch[0].url,
            "https://media.rentsearch.example/uploads/0.jpg"
        );
    }
}
