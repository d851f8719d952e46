//! Per-platform payment metadata cache.
//!
//! The extension pushes `metadata_messages_response` unprompted (typically
//! after the re-authentication flow opened via `open_new_tab`); each push
//! replaces that platform's record wholesale; stale entries are never
//! merged. A never-loaded platform is `None`, which is distinct from a
//! loaded-but-empty list.
//!
//! Expiry is pull-based: a 1-second tick compares `expires_at` minus a
//! 30-second buffer against wall-clock now, and fires one expiry event per
//! record generation when the boundary passes.

use crate::core::bus::{ExtensionBus, MetadataUpdate};
use crate::core::client::AppEvent;
use crate::core::config::{METADATA_EXPIRY_BUFFER_MS, METADATA_EXPIRY_TICK};
use crate::core::messages::{OutboundMessage, PaymentCandidate};
use crate::utils::sos::SignalOfStop;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// `actionType` sent with the refresh tab request. The extension opens the
/// platform's history page, which re-authenticates and triggers a push.
const REFRESH_ACTION_TYPE: &str = "fetch_transactions";

/// One platform's cached candidate list.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformMetadata {
    pub entries: Vec<PaymentCandidate>,
    /// Unix milliseconds; extension-side records lapse at this time.
    pub expires_at: u64,
}

#[derive(Debug)]
struct PlatformRecord {
    metadata: PlatformMetadata,
    /// Set once the expiry event for this record generation has fired.
    expiry_notified: bool,
}

/// Shared cache handle. Written only by the dispatch-fed writer task.
#[derive(Clone)]
pub struct MetadataCache {
    inner: Arc<RwLock<HashMap<String, PlatformRecord>>>,
    bus: ExtensionBus,
    sos: SignalOfStop,
}

/// True once `expires_at` minus the safety buffer has been reached: a
/// candidate selected now could not finish proving and submission in time.
pub fn is_expired(expires_at_ms: u64, now_ms: u64) -> bool {
    now_ms >= expires_at_ms.saturating_sub(METADATA_EXPIRY_BUFFER_MS)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl MetadataCache {
    /// Spawn the writer task (consuming the demux route) and the expiry
    /// tick task.
    pub fn spawn(
        bus: ExtensionBus,
        mut metadata_rx: mpsc::UnboundedReceiver<MetadataUpdate>,
        event_tx: mpsc::UnboundedSender<AppEvent>,
        parent: &SignalOfStop,
    ) -> Self {
        let inner: Arc<RwLock<HashMap<String, PlatformRecord>>> = Arc::new(RwLock::new(HashMap::new()));
        let sos = parent.linked();

        // Writer: wholesale replacement per push.
        let writer_inner = inner.clone();
        let writer_events = event_tx.clone();
        let writer_sos = sos.clone();
        tokio::spawn(async move {
            loop {
                let update = tokio::select! {
                    _ = writer_sos.wait() => return,
                    received = metadata_rx.recv() => match received {
                        Some(u) => u,
                        None => return,
                    },
                };
                let count = update.entries.len();
                info!(
                    event = "metadata_replaced",
                    platform = %update.platform,
                    entries = count,
                    expires_at = update.expires_at,
                    "Platform metadata replaced"
                );
                writer_inner.write().unwrap().insert(
                    update.platform.clone(),
                    PlatformRecord {
                        metadata: PlatformMetadata {
                            entries: update.entries,
                            expires_at: update.expires_at,
                        },
                        expiry_notified: false,
                    },
                );
                let _ = writer_events.send(AppEvent::MetadataUpdated {
                    platform: update.platform,
                    count,
                });
            }
        });

        // Expiry tick.
        let tick_inner = inner.clone();
        let tick_sos = sos.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(METADATA_EXPIRY_TICK);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick_sos.wait() => return,
                    _ = ticker.tick() => {}
                }
                let now = now_ms();
                let mut expired_platforms = Vec::new();
                {
                    let mut records = tick_inner.write().unwrap();
                    for (platform, record) in records.iter_mut() {
                        if !record.expiry_notified && is_expired(record.metadata.expires_at, now) {
                            record.expiry_notified = true;
                            expired_platforms.push(platform.clone());
                        }
                    }
                }
                for platform in expired_platforms {
                    debug!(event = "metadata_expired", platform = %platform, "Cached payments crossed the expiry buffer");
                    let _ = event_tx.send(AppEvent::MetadataExpired { platform });
                }
            }
        });

        Self { inner, bus, sos }
    }

    /// Ask the extension to refresh a platform. The reply arrives out of
    /// band as a metadata push; there is no return value to wait on.
    pub fn request_metadata(&self, platform: &str) {
        self.bus.send(&OutboundMessage::OpenNewTab {
            action_type: REFRESH_ACTION_TYPE.to_string(),
            platform: platform.to_string(),
        });
    }

    /// Cached record for a platform; `None` until the first push lands.
    pub fn get(&self, platform: &str) -> Option<PlatformMetadata> {
        self.inner
            .read()
            .unwrap()
            .get(platform)
            .map(|r| r.metadata.clone())
    }

    /// Whether the platform's record currently sits past the expiry
    /// buffer. A never-loaded platform is not expired.
    pub fn is_platform_expired(&self, platform: &str) -> bool {
        self.inner
            .read()
            .unwrap()
            .get(platform)
            .map(|r| is_expired(r.metadata.expires_at, now_ms()))
            .unwrap_or(false)
    }

    pub fn dispose(&self) {
        self.sos.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bus::{BusEndpoint, DispatchRoutes};
    use crate::core::messages::InboundMessage;
    use std::time::Duration;

    const ORIGIN: &str = "https://app.payproof.test";

    fn candidate(index: u32) -> PaymentCandidate {
        PaymentCandidate {
            recipient: "alice".into(),
            amount: "12.50".into(),
            date: "2025-07-01".into(),
            currency: "USD".into(),
            payment_id: format!("p-{index}"),
            original_index: index,
            hidden: false,
        }
    }

    fn fixture() -> (
        MetadataCache,
        BusEndpoint,
        mpsc::UnboundedReceiver<AppEvent>,
        SignalOfStop,
    ) {
        let (version_tx, _version_rx) = mpsc::unbounded_channel();
        let (metadata_tx, metadata_rx) = mpsc::unbounded_channel();
        let (proof_tx, _proof_rx) = mpsc::unbounded_channel();
        let sos = SignalOfStop::new();
        let (bus, endpoint, _dispatch) = ExtensionBus::open(
            ORIGIN,
            DispatchRoutes { version_tx, metadata_tx, proof_tx },
            sos.clone(),
        );
        let (event_tx, events) = mpsc::unbounded_channel();
        let cache = MetadataCache::spawn(bus, metadata_rx, event_tx, &sos);
        (cache, endpoint, events, sos)
    }

    #[test]
    fn expiry_predicate_respects_the_buffer_boundary() {
        let now = 1_754_000_000_000u64;
        assert!(is_expired(now + METADATA_EXPIRY_BUFFER_MS - 1, now));
        assert!(is_expired(now + METADATA_EXPIRY_BUFFER_MS, now));
        assert!(!is_expired(now + METADATA_EXPIRY_BUFFER_MS + 1, now));
        // Degenerate timestamps never underflow.
        assert!(is_expired(0, now));
    }

    #[tokio::test]
    async fn never_loaded_differs_from_loaded_empty() {
        let (cache, endpoint, mut events, _sos) = fixture();
        assert!(cache.get("venmo").is_none());

        endpoint.push(&InboundMessage::MetadataResponse {
            platform: "venmo".into(),
            metadata: vec![],
            expires_at: u64::MAX,
        });
        loop {
            match events.recv().await.unwrap() {
                AppEvent::MetadataUpdated { platform, count } => {
                    assert_eq!(platform, "venmo");
                    assert_eq!(count, 0);
                    break;
                }
                _ => continue,
            }
        }
        let record = cache.get("venmo").unwrap();
        assert!(record.entries.is_empty());
    }

    #[tokio::test]
    async fn pushes_replace_wholesale_not_merge() {
        let (cache, endpoint, mut events, _sos) = fixture();

        endpoint.push(&InboundMessage::MetadataResponse {
            platform: "venmo".into(),
            metadata: vec![candidate(0), candidate(1)],
            expires_at: u64::MAX,
        });
        events.recv().await.unwrap();
        endpoint.push(&InboundMessage::MetadataResponse {
            platform: "venmo".into(),
            metadata: vec![candidate(7)],
            expires_at: u64::MAX,
        });
        events.recv().await.unwrap();

        let record = cache.get("venmo").unwrap();
        assert_eq!(record.entries.len(), 1);
        assert_eq!(record.entries[0].original_index, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_fires_one_expiry_event_per_record_generation() {
        let (cache, endpoint, mut events, _sos) = fixture();

        // Already inside the buffer when stored.
        endpoint.push(&InboundMessage::MetadataResponse {
            platform: "venmo".into(),
            metadata: vec![candidate(0)],
            expires_at: now_ms() + METADATA_EXPIRY_BUFFER_MS / 2,
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            events.try_recv(),
            Ok(AppEvent::MetadataUpdated { .. })
        ));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(matches!(
            events.try_recv(),
            Ok(AppEvent::MetadataExpired { .. })
        ));
        assert!(cache.is_platform_expired("venmo"));

        // Several more ticks: no repeat notification for the same record.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(events.try_recv().is_err());

        // A fresh push re-arms expiry for the new generation.
        endpoint.push(&InboundMessage::MetadataResponse {
            platform: "venmo".into(),
            metadata: vec![candidate(1)],
            expires_at: now_ms() + METADATA_EXPIRY_BUFFER_MS / 2,
        });
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let kinds: Vec<AppEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert!(kinds.iter().any(|e| matches!(e, AppEvent::MetadataUpdated { .. })));
        assert!(kinds.iter().any(|e| matches!(e, AppEvent::MetadataExpired { .. })));
    }
}
